//! Rewrites a parsed tree into the canonical form later stages rely on.
//!
//! Canonical form:
//! - every `if`, `switch` and `for` carries a label
//! - `for` loops have an empty init block; init statements live in an
//!   enclosing block
//! - function definitions come first in their block, in source order
//! - `let x` (single variable) has an explicit `0` value
//! - literals are `Number`s, except event names and strings over 32 bytes
//! - `neq`, `le`, `ge` and statement-level `require` are expanded
//!
//! Normalizing canonical input returns it unchanged.

use alloy_primitives::U256;
use tracing::debug;

use crate::context::{CompilerContext, LabelCounter};
use crate::lang::builtins::{self, Lowering};
use crate::lang::literal::LiteralValue;
use crate::lang::node::{
    Block, Case, Expression, ForLoop, FunctionCall, FunctionDefinition, If, LabelId, Literal,
    Object, Position, Statement, Switch, VariableDeclaration,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub labels_assigned: usize,
    pub loops_hoisted: usize,
    pub composites_expanded: usize,
}

/// Normalizes the code of `object`. Nested objects are left to their own
/// compilation.
pub fn normalize(object: Object, ctx: &mut CompilerContext) -> Object {
    if let Some(max) = max_label(&object.code) {
        ctx.labels.reserve_above(max);
    }

    let mut normalizer = Normalizer {
        labels: &mut ctx.labels,
        stats: NormalizeStats::default(),
    };
    let code = normalizer.block(object.code);
    let stats = normalizer.stats;

    debug!(
        object = %object.name,
        labels = stats.labels_assigned,
        hoisted = stats.loops_hoisted,
        expanded = stats.composites_expanded,
        "normalized"
    );

    Object { code, ..object }
}

struct Normalizer<'a> {
    labels: &'a mut LabelCounter,
    stats: NormalizeStats,
}

impl Normalizer<'_> {
    fn label(&mut self, existing: Option<LabelId>) -> Option<LabelId> {
        Some(existing.unwrap_or_else(|| {
            self.stats.labels_assigned += 1;
            self.labels.next()
        }))
    }

    fn block(&mut self, block: Block) -> Block {
        let mut functions = Vec::new();
        let mut rest = Vec::new();
        for stmt in block.statements {
            match self.statement(stmt) {
                def @ Statement::FunctionDefinition(_) => functions.push(def),
                other => rest.push(other),
            }
        }
        functions.extend(rest);
        Block::new(functions, block.pos)
    }

    fn statement(&mut self, stmt: Statement) -> Statement {
        match stmt {
            Statement::Block(block) => Statement::Block(self.block(block)),
            Statement::FunctionDefinition(def) => {
                Statement::FunctionDefinition(FunctionDefinition {
                    body: self.block(def.body),
                    ..def
                })
            }
            Statement::VariableDeclaration(decl) => {
                let value = match decl.value {
                    Some(value) => Some(self.expression(value)),
                    None if decl.variables.len() == 1 => Some(zero(decl.pos)),
                    None => None,
                };
                Statement::VariableDeclaration(VariableDeclaration { value, ..decl })
            }
            Statement::Assignment(mut assign) => {
                assign.value = self.expression(assign.value);
                Statement::Assignment(assign)
            }
            Statement::If(stmt) => Statement::If(If {
                condition: self.expression(stmt.condition),
                body: self.block(stmt.body),
                label: self.label(stmt.label),
                pos: stmt.pos,
            }),
            Statement::Switch(stmt) => {
                let expression = self.expression(stmt.expression);
                let label = self.label(stmt.label);
                let cases = stmt
                    .cases
                    .into_iter()
                    .map(|case| Case {
                        value: canonical(case.value),
                        body: self.block(case.body),
                        pos: case.pos,
                    })
                    .collect();
                let default = stmt.default.map(|block| self.block(block));
                Statement::Switch(Switch {
                    expression,
                    cases,
                    default,
                    label,
                    pos: stmt.pos,
                })
            }
            Statement::ForLoop(l) if !l.init.statements.is_empty() => {
                self.stats.loops_hoisted += 1;
                let pos = l.pos;
                let mut statements = l.init.statements;
                statements.push(Statement::ForLoop(ForLoop {
                    init: Block::empty(l.init.pos),
                    ..l
                }));
                self.statement(Statement::Block(Block::new(statements, pos)))
            }
            Statement::ForLoop(l) => {
                let label = self.label(l.label);
                Statement::ForLoop(ForLoop {
                    init: l.init,
                    condition: self.expression(l.condition),
                    post: self.block(l.post),
                    body: self.block(l.body),
                    label,
                    pos: l.pos,
                })
            }
            Statement::Expression(Expression::FunctionCall(call))
                if call.name.name == "require" && call.arguments.len() == 1 =>
            {
                self.stats.composites_expanded += 1;
                let pos = call.pos;
                let condition = call.arguments.into_iter().next().map_or_else(
                    || zero(pos),
                    |c| Expression::call("iszero", vec![c], pos),
                );
                let revert = Expression::call("revert", vec![zero(pos), zero(pos)], pos);
                self.statement(Statement::If(If {
                    condition,
                    body: Block::new(vec![Statement::Expression(revert)], pos),
                    label: None,
                    pos,
                }))
            }
            Statement::Expression(expr) => Statement::Expression(self.expression(expr)),
            stmt @ (Statement::Break(_) | Statement::Continue(_) | Statement::Leave(_)) => stmt,
        }
    }

    fn expression(&mut self, expr: Expression) -> Expression {
        match expr {
            Expression::Literal(literal) => Expression::Literal(canonical(literal)),
            Expression::Identifier(_) => expr,
            Expression::FunctionCall(call) => self.call(call),
        }
    }

    fn call(&mut self, call: FunctionCall) -> Expression {
        let emits_event = builtins::lookup(&call.name.name)
            .is_some_and(|b| matches!(b.lowering, Lowering::Notify { .. }));

        let arguments: Vec<Expression> = call
            .arguments
            .into_iter()
            .enumerate()
            .map(|(index, arg)| match arg {
                // event names stay strings
                Expression::Literal(literal)
                    if index == 0
                        && emits_event
                        && matches!(literal.value, LiteralValue::String(_)) =>
                {
                    Expression::Literal(literal)
                }
                other => self.expression(other),
            })
            .collect();

        let pos = call.pos;
        let primitive = match (call.name.name.as_str(), arguments.len()) {
            ("neq", 2) => "eq",
            ("le", 2) => "gt",
            ("ge", 2) => "lt",
            _ => {
                return Expression::FunctionCall(FunctionCall {
                    name: call.name,
                    arguments,
                    pos,
                });
            }
        };
        self.stats.composites_expanded += 1;
        Expression::call("iszero", vec![Expression::call(primitive, arguments, pos)], pos)
    }
}

fn zero(pos: Position) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Number(U256::ZERO),
        pos,
    })
}

/// Folds every literal form into `Number`, leaving strings that do not fit a
/// word untouched.
fn canonical(literal: Literal) -> Literal {
    if matches!(literal.value, LiteralValue::Number(_)) {
        return literal;
    }
    match literal.value.word() {
        Some(word) => Literal {
            value: LiteralValue::Number(word),
            pos: literal.pos,
        },
        None => literal,
    }
}

/// Highest label already present in `block`.
pub fn max_label(block: &Block) -> Option<LabelId> {
    block.statements.iter().filter_map(max_label_in).max()
}

fn max_label_in(stmt: &Statement) -> Option<LabelId> {
    match stmt {
        Statement::Block(block) => max_label(block),
        Statement::FunctionDefinition(def) => max_label(&def.body),
        Statement::If(stmt) => stmt.label.max(max_label(&stmt.body)),
        Statement::Switch(stmt) => stmt
            .cases
            .iter()
            .map(|case| max_label(&case.body))
            .chain(stmt.default.iter().map(max_label))
            .fold(stmt.label, |acc, label| acc.max(label)),
        Statement::ForLoop(l) => [
            l.label,
            max_label(&l.init),
            max_label(&l.post),
            max_label(&l.body),
        ]
        .into_iter()
        .max()
        .flatten(),
        Statement::VariableDeclaration(_)
        | Statement::Assignment(_)
        | Statement::Break(_)
        | Statement::Continue(_)
        | Statement::Leave(_)
        | Statement::Expression(_) => None,
    }
}
