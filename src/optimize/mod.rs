//! Tree-level optimization passes, selected by optimization level.
//!
//! | level | passes                                                        |
//! |-------|---------------------------------------------------------------|
//! | 0     | none                                                          |
//! | 1     | constant folding, dead code after terminators                 |
//! | 2     | + literal branch pruning, unused nested functions, peephole   |
//! | 3     | + constant function inlining, then folding and DCE once more  |
//!
//! The peephole pass works on instructions and is run by the pipeline after
//! code generation; its statistics are merged into the same report.

pub mod dce;
pub mod fold;
pub mod inline;
pub mod peephole;

use alloy_primitives::U256;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::config::MAX_OPTIMIZATION_LEVEL;
use crate::context::CompilerContext;
use crate::lang::node::{Block, Expression, Object, Statement};

pub use inline::{InlineCandidate, InlineKind};
pub use peephole::PeepholeStats;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    #[error("optimization level {0} is not supported (expected 0..={max})", max = MAX_OPTIMIZATION_LEVEL)]
    InvalidLevel(u8),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationReport {
    pub level: u8,
    pub folded: usize,
    pub dead_statements_removed: usize,
    pub branches_pruned: usize,
    pub functions_removed: usize,
    pub inlined: usize,
    pub inline_candidates: Vec<InlineCandidate>,
    /// Constant functions found at level 3.
    pub constants: IndexMap<String, U256>,
    pub peephole: PeepholeStats,
}

impl OptimizationReport {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Total number of tree rewrites, peephole excluded.
    pub fn tree_rewrites(&self) -> usize {
        self.folded
            + self.dead_statements_removed
            + self.branches_pruned
            + self.functions_removed
            + self.inlined
    }
}

/// Runs the tree passes enabled at `ctx.options.optimization_level`.
///
/// Relies on the symbol usage recorded by the analyzer for unused-function
/// removal.
pub fn optimize(
    object: Object,
    ctx: &CompilerContext,
) -> Result<(Object, OptimizationReport), OptimizeError> {
    let level = ctx.options.optimization_level;
    if level > MAX_OPTIMIZATION_LEVEL {
        return Err(OptimizeError::InvalidLevel(level));
    }

    let mut report = OptimizationReport::new(level);
    let mut code = object.code;

    if level >= 1 {
        report.folded += fold::fold_block(&mut code);
        report.dead_statements_removed += dce::eliminate_dead_code(&mut code);
    }
    if level >= 2 {
        report.branches_pruned += dce::prune_branches(&mut code);
        report.functions_removed += dce::remove_unused_functions(&mut code, &ctx.symbols);
        report.dead_statements_removed += dce::eliminate_dead_code(&mut code);
    }
    if level >= 3 {
        report.inline_candidates = inline::candidates(&code);
        report.constants = inline::constant_functions(&code);
        report.inlined += inline::inline_constants(&mut code, &report.constants);
        report.folded += fold::fold_block(&mut code);
        report.branches_pruned += dce::prune_branches(&mut code);
        report.dead_statements_removed += dce::eliminate_dead_code(&mut code);
    }

    debug!(
        object = %object.name,
        level,
        folded = report.folded,
        dead = report.dead_statements_removed,
        pruned = report.branches_pruned,
        removed_functions = report.functions_removed,
        inlined = report.inlined,
        "optimized"
    );

    Ok((Object { code, ..object }, report))
}

/// Applies `f` to every expression rooted in a statement of `block`,
/// descending into nested blocks, loops and function bodies. `f` sees the
/// outermost expression and is responsible for its sub-expressions.
pub(crate) fn walk_expressions(block: &mut Block, f: &mut impl FnMut(&mut Expression)) {
    for stmt in &mut block.statements {
        match stmt {
            Statement::Block(inner) => walk_expressions(inner, f),
            Statement::FunctionDefinition(def) => walk_expressions(&mut def.body, f),
            Statement::VariableDeclaration(decl) => {
                if let Some(value) = &mut decl.value {
                    f(value);
                }
            }
            Statement::Assignment(assign) => f(&mut assign.value),
            Statement::If(s) => {
                f(&mut s.condition);
                walk_expressions(&mut s.body, f);
            }
            Statement::Switch(s) => {
                f(&mut s.expression);
                for case in &mut s.cases {
                    walk_expressions(&mut case.body, f);
                }
                if let Some(default) = &mut s.default {
                    walk_expressions(default, f);
                }
            }
            Statement::ForLoop(l) => {
                walk_expressions(&mut l.init, f);
                f(&mut l.condition);
                walk_expressions(&mut l.body, f);
                walk_expressions(&mut l.post, f);
            }
            Statement::Expression(expr) => f(expr),
            Statement::Break(_) | Statement::Continue(_) | Statement::Leave(_) => {}
        }
    }
}

/// Read-only counterpart of [`walk_expressions`].
pub(crate) fn visit_expressions(block: &Block, f: &mut impl FnMut(&Expression)) {
    for stmt in &block.statements {
        match stmt {
            Statement::Block(inner) => visit_expressions(inner, f),
            Statement::FunctionDefinition(def) => visit_expressions(&def.body, f),
            Statement::VariableDeclaration(decl) => {
                if let Some(value) = &decl.value {
                    f(value);
                }
            }
            Statement::Assignment(assign) => f(&assign.value),
            Statement::If(s) => {
                f(&s.condition);
                visit_expressions(&s.body, f);
            }
            Statement::Switch(s) => {
                f(&s.expression);
                for case in &s.cases {
                    visit_expressions(&case.body, f);
                }
                if let Some(default) = &s.default {
                    visit_expressions(default, f);
                }
            }
            Statement::ForLoop(l) => {
                visit_expressions(&l.init, f);
                f(&l.condition);
                visit_expressions(&l.body, f);
                visit_expressions(&l.post, f);
            }
            Statement::Expression(expr) => f(expr),
            Statement::Break(_) | Statement::Continue(_) | Statement::Leave(_) => {}
        }
    }
}
