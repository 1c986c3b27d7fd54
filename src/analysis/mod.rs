//! Static analysis of the normalized tree.
//!
//! The analyzer never modifies the tree. It validates names, arities and
//! scoping, builds control-flow graphs and records security and performance
//! findings. Every problem is accumulated in the report; the caller decides
//! whether to stop.

pub mod cfg;

use std::collections::HashMap;

use alloy_primitives::U256;
use indexmap::IndexMap;
use strum::Display;
use tracing::debug;

use crate::context::{CompilerContext, StorageLocation, Symbol, SymbolKind};
use crate::diagnostics::{Diagnostic, Phase};
use crate::lang::builtins::{self, Builtin, Lowering};
use crate::lang::literal::LiteralValue;
use crate::lang::node::{
    Block, Expression, FunctionCall, FunctionDefinition, Literal, Object, Position, Statement,
    TypedName,
};

pub use cfg::ControlFlowGraph;

const MAX_STRING_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FindingKind {
    #[strum(serialize = "division by zero")]
    DivisionByZero,
    #[strum(serialize = "reentrancy risk")]
    ReentrancyRisk,
    #[strum(serialize = "unchecked external call")]
    UncheckedExternalCall,
    #[strum(serialize = "state write after external call")]
    StateWriteAfterCall,
    #[strum(serialize = "storage write in loop")]
    StorageWriteInLoop,
    #[strum(serialize = "storage read in loop")]
    StorageReadInLoop,
    #[strum(serialize = "hashing in loop")]
    HashingInLoop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
    pub pos: Position,
}

impl Finding {
    fn new(kind: FindingKind, detail: impl std::fmt::Display, pos: Position) -> Self {
        Self {
            kind,
            message: format!("{}: {}", kind, detail),
            pos,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warning(Phase::Analyzer, self.message.clone(), self.pos)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub cfg: Vec<ControlFlowGraph>,
    pub security_issues: Vec<Finding>,
    pub performance_issues: Vec<Finding>,
}

impl AnalysisReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Warnings followed by every finding, as diagnostics.
    pub fn warning_diagnostics(&self) -> Vec<Diagnostic> {
        self.warnings
            .iter()
            .cloned()
            .chain(self.security_issues.iter().map(Finding::to_diagnostic))
            .chain(self.performance_issues.iter().map(Finding::to_diagnostic))
            .collect()
    }
}

/// Per-function bookkeeping.
#[derive(Debug, Default)]
struct Frame {
    next_local: usize,
    called_external: bool,
}

/// Analyzes the top-level code of `object`. Nested objects are analyzed by
/// their own compilation.
pub fn analyze(object: &Object, ctx: &mut CompilerContext) -> AnalysisReport {
    ctx.symbols.clear();
    let mut analyzer = Analyzer {
        ctx,
        report: AnalysisReport::default(),
        frames: vec![Frame::default()],
        loop_depth: 0,
        in_post: false,
        function_depth: 0,
        functions_declared: 0,
        events: IndexMap::new(),
    };

    analyzer.ctx.symbols.push_function_scope();
    analyzer.block_in_scope(&object.code);
    analyzer.close_scope();
    analyzer.report.cfg.push(ControlFlowGraph::build("main", &object.code));
    analyzer.unreachable_warnings();

    let report = analyzer.report;
    debug!(
        object = %object.name,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        security = report.security_issues.len(),
        performance = report.performance_issues.len(),
        "analyzed"
    );
    report
}

/// Label a function's code gets in the emitted stream.
pub fn function_label(index: usize, name: &str) -> String {
    format!("fn{}_{}", index, name)
}

struct Analyzer<'a> {
    ctx: &'a mut CompilerContext,
    report: AnalysisReport,
    frames: Vec<Frame>,
    loop_depth: usize,
    /// Inside the post block of the innermost loop.
    in_post: bool,
    function_depth: usize,
    functions_declared: usize,
    /// Event name → (topic count, first emission).
    events: IndexMap<String, (usize, Position)>,
}

impl Analyzer<'_> {
    fn error(&mut self, message: impl Into<String>, pos: Position) {
        self.report
            .errors
            .push(Diagnostic::error(Phase::Analyzer, message, pos));
    }

    fn warning(&mut self, message: impl Into<String>, pos: Position) {
        self.report
            .warnings
            .push(Diagnostic::warning(Phase::Analyzer, message, pos));
    }

    fn frame(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn declare(&mut self, symbol: Symbol) {
        let pos = symbol.pos;
        let name = symbol.name.clone();
        if builtins::is_builtin(&name) {
            self.error(format!("cannot redeclare built-in '{}'", name), pos);
            return;
        }
        if let Err(existing) = self.ctx.symbols.declare(symbol) {
            self.error(
                format!(
                    "duplicate declaration of '{}' (previously declared at {})",
                    name, existing.pos
                ),
                pos,
            );
        }
    }

    fn check_type(&mut self, name: &TypedName) {
        if let Some(ty) = &name.ty {
            if !self.ctx.types.contains(ty) {
                self.error(format!("unknown type '{}'", ty), name.pos);
            }
        }
    }

    fn declare_variable(&mut self, name: &TypedName) {
        self.check_type(name);
        let frame = self.frame();
        let slot = frame.next_local;
        frame.next_local += 1;
        self.declare(Symbol::variable(
            &name.name,
            StorageLocation::Local(slot),
            name.pos,
        ));
    }

    fn close_scope(&mut self) {
        let unused: Vec<(String, Position)> = match self.ctx.symbols.pop_scope() {
            Some(scope) => scope
                .symbols
                .values()
                .filter(|s| {
                    s.kind == SymbolKind::Variable
                        && matches!(s.location, StorageLocation::Local(_))
                        && !s.used
                })
                .map(|s| (s.name.clone(), s.pos))
                .collect(),
            None => Vec::new(),
        };
        for (name, pos) in unused {
            self.warning(format!("unused variable '{}'", name), pos);
        }
    }

    fn unreachable_warnings(&mut self) {
        let positions: Vec<Position> = self
            .report
            .cfg
            .iter()
            .flat_map(|g| g.unreachable_blocks())
            .filter_map(|b| b.statements.first().copied())
            .collect();
        for pos in positions {
            self.warning("unreachable code", pos);
        }
    }

    fn block(&mut self, block: &Block) {
        self.ctx.symbols.push_scope();
        self.block_in_scope(block);
        self.close_scope();
    }

    /// Visits `block` in the current scope. Functions are declared before any
    /// statement so they can be called from anywhere in the block.
    fn block_in_scope(&mut self, block: &Block) {
        for stmt in &block.statements {
            if let Statement::FunctionDefinition(def) = stmt {
                let label = function_label(self.functions_declared, &def.name);
                self.functions_declared += 1;
                self.declare(Symbol::function(
                    &def.name,
                    def.parameters.len(),
                    def.returns.len(),
                    label,
                    def.pos,
                ));
            }
        }
        for stmt in &block.statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block(block) => self.block(block),
            Statement::FunctionDefinition(def) => self.function(def),
            Statement::VariableDeclaration(decl) => {
                if let Some(value) = &decl.value {
                    let yielded = self.expression(value);
                    if yielded != decl.variables.len() {
                        self.error(
                            format!(
                                "declaration of {} variable(s) but expression yields {} value(s)",
                                decl.variables.len(),
                                yielded
                            ),
                            decl.pos,
                        );
                    }
                }
                for var in &decl.variables {
                    self.declare_variable(var);
                }
            }
            Statement::Assignment(assign) => {
                let yielded = self.expression(&assign.value);
                for target in &assign.targets {
                    match self.ctx.symbols.lookup(&target.name).map(|s| s.kind) {
                        None => self.error(
                            format!("assignment to undeclared variable '{}'", target.name),
                            target.pos,
                        ),
                        Some(SymbolKind::Function { .. }) => self.error(
                            format!("cannot assign to function '{}'", target.name),
                            target.pos,
                        ),
                        Some(_) => {}
                    }
                }
                if yielded != assign.targets.len() {
                    self.error(
                        format!(
                            "assignment to {} target(s) but expression yields {} value(s)",
                            assign.targets.len(),
                            yielded
                        ),
                        assign.pos,
                    );
                }
            }
            Statement::If(s) => {
                self.single_value(&s.condition);
                self.block(&s.body);
            }
            Statement::Switch(s) => {
                self.single_value(&s.expression);
                let mut seen: HashMap<U256, Position> = HashMap::new();
                for case in &s.cases {
                    self.literal(&case.value);
                    if let Some(word) = case.value.value.word() {
                        if let Some(first) = seen.insert(word, case.pos) {
                            self.error(
                                format!(
                                    "duplicate case value {} (first used at {})",
                                    case.value.value, first
                                ),
                                case.pos,
                            );
                        }
                    }
                    self.block(&case.body);
                }
                if let Some(default) = &s.default {
                    self.block(default);
                }
            }
            Statement::ForLoop(l) => {
                self.ctx.symbols.push_scope();
                self.block_in_scope(&l.init);
                self.loop_depth += 1;
                self.single_value(&l.condition);
                let saved_in_post = std::mem::replace(&mut self.in_post, false);
                self.block(&l.body);
                self.in_post = true;
                self.block(&l.post);
                self.in_post = saved_in_post;
                self.loop_depth -= 1;
                self.close_scope();
            }
            Statement::Break(pos) => {
                if self.loop_depth == 0 {
                    self.error("'break' outside of a loop", *pos);
                } else if self.in_post {
                    self.error("'break' in a loop's post block", *pos);
                }
            }
            Statement::Continue(pos) => {
                if self.loop_depth == 0 {
                    self.error("'continue' outside of a loop", *pos);
                } else if self.in_post {
                    self.error("'continue' in a loop's post block", *pos);
                }
            }
            Statement::Leave(pos) => {
                if self.function_depth == 0 {
                    self.error("'leave' outside of a function", *pos);
                }
            }
            Statement::Expression(expr) => {
                let yielded = self.expression(expr);
                if yielded != 0 {
                    self.error(
                        format!(
                            "expression statement yields {} unused value(s); discard with pop()",
                            yielded
                        ),
                        expr.pos(),
                    );
                }
            }
        }
    }

    fn function(&mut self, def: &FunctionDefinition) {
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let saved_in_post = std::mem::replace(&mut self.in_post, false);
        self.function_depth += 1;
        self.frames.push(Frame {
            next_local: def.returns.len(),
            called_external: false,
        });
        self.ctx.symbols.push_function_scope();

        for (index, param) in def.parameters.iter().enumerate() {
            self.check_type(param);
            self.declare(Symbol::variable(
                &param.name,
                StorageLocation::Argument(index),
                param.pos,
            ));
        }
        for (index, ret) in def.returns.iter().enumerate() {
            self.check_type(ret);
            self.declare(Symbol::variable(
                &ret.name,
                StorageLocation::Return(index),
                ret.pos,
            ));
        }
        self.block_in_scope(&def.body);

        self.close_scope();
        self.frames.pop();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        self.in_post = saved_in_post;
        self.report
            .cfg
            .push(ControlFlowGraph::build(&def.name, &def.body));
    }

    /// Visits an expression in value position.
    fn single_value(&mut self, expr: &Expression) {
        let yielded = self.expression(expr);
        if yielded != 1 {
            let what = match expr {
                Expression::FunctionCall(call) => format!("'{}'", call.name.name),
                _ => "expression".to_string(),
            };
            self.error(
                format!("expected a single value, but {} yields {}", what, yielded),
                expr.pos(),
            );
        }
    }

    fn literal(&mut self, literal: &Literal) {
        if let LiteralValue::String(s) = &literal.value {
            if s.len() > MAX_STRING_BYTES {
                self.error(
                    format!(
                        "string literal too long ({} bytes, at most {})",
                        s.len(),
                        MAX_STRING_BYTES
                    ),
                    literal.pos,
                );
            }
        }
    }

    /// Returns how many values `expr` leaves on the stack.
    fn expression(&mut self, expr: &Expression) -> usize {
        match expr {
            Expression::Literal(literal) => {
                self.literal(literal);
                1
            }
            Expression::Identifier(ident) => {
                match self.ctx.symbols.mark_used(&ident.name).map(|s| s.kind) {
                    Some(SymbolKind::Function { .. }) => {
                        self.error(format!("function '{}' used as a value", ident.name), ident.pos)
                    }
                    Some(_) => {}
                    None if builtins::is_builtin(&ident.name) => self.error(
                        format!("built-in '{}' used as a value", ident.name),
                        ident.pos,
                    ),
                    None => self.error(
                        format!("undefined identifier '{}'", ident.name),
                        ident.pos,
                    ),
                }
                1
            }
            Expression::FunctionCall(call) => match builtins::lookup(&call.name.name) {
                Some(builtin) => self.builtin_call(builtin, call),
                None => self.user_call(call),
            },
        }
    }

    fn user_call(&mut self, call: &FunctionCall) -> usize {
        for arg in &call.arguments {
            self.single_value(arg);
        }
        let name = &call.name.name;
        match self.ctx.symbols.mark_used(name).map(|s| s.kind) {
            Some(SymbolKind::Function { params, returns }) => {
                if params != call.arguments.len() {
                    self.error(
                        format!(
                            "function '{}' expects {} argument(s), got {}",
                            name,
                            params,
                            call.arguments.len()
                        ),
                        call.pos,
                    );
                }
                returns
            }
            Some(_) => {
                self.error(format!("'{}' is not a function", name), call.pos);
                1
            }
            None => {
                self.error(format!("unknown function or built-in '{}'", name), call.pos);
                1
            }
        }
    }

    fn builtin_call(&mut self, builtin: &'static Builtin, call: &FunctionCall) -> usize {
        let name = builtin.name;
        let pos = call.pos;
        if builtin.args != call.arguments.len() {
            self.error(
                format!(
                    "built-in '{}' expects {} argument(s), got {}",
                    name,
                    builtin.args,
                    call.arguments.len()
                ),
                pos,
            );
        }

        let mut skip_first = false;
        if let Lowering::Notify { topics } = builtin.lowering {
            skip_first = true;
            self.event(name, topics, call);
        }
        for arg in call.arguments.iter().skip(usize::from(skip_first)) {
            self.single_value(arg);
        }

        if let Some(index) = builtin.divisor {
            let zero = call
                .arguments
                .get(index)
                .and_then(Expression::as_literal)
                .is_some_and(|l| l.value.is_zero());
            if zero {
                self.report.security_issues.push(Finding::new(
                    FindingKind::DivisionByZero,
                    format!("'{}' with literal zero divisor aborts at run time", name),
                    pos,
                ));
            }
        }

        if builtin.external_call {
            self.report.security_issues.push(Finding::new(
                FindingKind::ReentrancyRisk,
                format!("'{}' hands control to another contract", name),
                pos,
            ));
            if builtin.state_mutating {
                self.frame().called_external = true;
            }
        }

        if name == "pop" {
            let unchecked = match call.arguments.first() {
                Some(Expression::FunctionCall(inner)) => {
                    builtins::lookup(&inner.name.name).is_some_and(|b| b.external_call)
                }
                _ => false,
            };
            if unchecked {
                self.report.security_issues.push(Finding::new(
                    FindingKind::UncheckedExternalCall,
                    "result of external call is discarded",
                    pos,
                ));
            }
        }

        if builtin.storage_write && self.frame().called_external {
            self.report.security_issues.push(Finding::new(
                FindingKind::StateWriteAfterCall,
                format!("'{}' after an external call", name),
                pos,
            ));
        }

        if self.loop_depth > 0 {
            let kind = if builtin.storage_write {
                Some(FindingKind::StorageWriteInLoop)
            } else if builtin.storage_read {
                Some(FindingKind::StorageReadInLoop)
            } else if builtin.hashing {
                Some(FindingKind::HashingInLoop)
            } else {
                None
            };
            if let Some(kind) = kind {
                self.report.performance_issues.push(Finding::new(
                    kind,
                    format!("'{}' runs on every iteration", name),
                    pos,
                ));
            }
        }

        builtin.rets
    }

    fn event(&mut self, builtin: &str, topics: usize, call: &FunctionCall) {
        let event_name = match call.arguments.first() {
            Some(Expression::Literal(Literal {
                value: LiteralValue::String(s),
                ..
            })) => match String::from_utf8(s.clone()) {
                Ok(name) => name,
                Err(_) => {
                    self.error("event name must be valid UTF-8", call.pos);
                    return;
                }
            },
            _ => {
                self.error(
                    format!(
                        "first argument of '{}' must be a string literal event name",
                        builtin
                    ),
                    call.pos,
                );
                return;
            }
        };
        match self.events.get(&event_name) {
            Some(&(known, first)) if known != topics => self.error(
                format!(
                    "event '{}' emitted with {} topic(s), but with {} at {}",
                    event_name, topics, known, first
                ),
                call.pos,
            ),
            Some(_) => {}
            None => {
                self.events.insert(event_name, (topics, call.pos));
            }
        }
    }
}
