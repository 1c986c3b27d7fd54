//! Dead code removal: statements after terminators, branches decided by a
//! literal, and nested functions nothing calls.

use crate::analysis::cfg::terminates;
use crate::context::SymbolTable;
use crate::lang::node::{Block, Expression, Statement};

/// Truncates every block after its first terminating statement. Function
/// definitions past the terminator are kept. Returns the number of
/// statements removed.
pub fn eliminate_dead_code(block: &mut Block) -> usize {
    let mut removed = 0;
    for stmt in &mut block.statements {
        removed += nested(stmt, eliminate_dead_code);
    }

    let Some(index) = block.statements.iter().position(always_exits) else {
        return removed;
    };
    let tail = block.statements.split_off(index + 1);
    let before = tail.len();
    block.statements.extend(
        tail.into_iter()
            .filter(|s| matches!(s, Statement::FunctionDefinition(_))),
    );
    removed + before - (block.statements.len() - index - 1)
}

/// Whether control never reaches the statement after `stmt`.
fn always_exits(stmt: &Statement) -> bool {
    match stmt {
        Statement::Break(_) | Statement::Continue(_) | Statement::Leave(_) => true,
        Statement::Expression(expr) => terminates(expr),
        Statement::Block(block) => block.statements.iter().any(always_exits),
        Statement::Switch(s) => {
            s.default
                .as_ref()
                .is_some_and(|d| d.statements.iter().any(always_exits))
                && s
                    .cases
                    .iter()
                    .all(|c| c.body.statements.iter().any(always_exits))
        }
        _ => false,
    }
}

/// Resolves `if`, `switch` and `for` whose deciding expression is a literal.
/// Returns the number of statements rewritten.
pub fn prune_branches(block: &mut Block) -> usize {
    let mut pruned = 0;
    let statements = std::mem::take(&mut block.statements);
    for mut stmt in statements {
        pruned += nested(&mut stmt, prune_branches);
        match stmt {
            Statement::If(s) => match literal_word(&s.condition) {
                Some(true) => {
                    pruned += 1;
                    block.statements.push(Statement::Block(s.body));
                }
                Some(false) => pruned += 1,
                None => block.statements.push(Statement::If(s)),
            },
            Statement::Switch(s) => match s.expression.as_literal().and_then(|l| l.value.word()) {
                Some(value) => {
                    pruned += 1;
                    let chosen = s
                        .cases
                        .into_iter()
                        .find(|c| c.value.value.word() == Some(value))
                        .map(|c| c.body)
                        .or(s.default);
                    if let Some(body) = chosen {
                        block.statements.push(Statement::Block(body));
                    }
                }
                None => block.statements.push(Statement::Switch(s)),
            },
            Statement::ForLoop(l) if literal_word(&l.condition) == Some(false) => {
                pruned += 1;
                if !l.init.statements.is_empty() {
                    block.statements.push(Statement::Block(l.init));
                }
            }
            other => block.statements.push(other),
        }
    }
    pruned
}

/// `Some(nonzero)` for a literal condition.
fn literal_word(expr: &Expression) -> Option<bool> {
    let word = expr.as_literal()?.value.word()?;
    Some(!word.is_zero())
}

/// Drops function definitions below the top level whose symbol was never
/// referenced. Top-level functions are entry points and always stay.
pub fn remove_unused_functions(block: &mut Block, symbols: &SymbolTable) -> usize {
    let mut removed = 0;
    for stmt in &mut block.statements {
        removed += nested(stmt, |inner| remove_nested(inner, symbols));
    }
    removed
}

fn remove_nested(block: &mut Block, symbols: &SymbolTable) -> usize {
    let before = block.statements.len();
    block.statements.retain(|stmt| match stmt {
        Statement::FunctionDefinition(def) => symbols.function_used(&def.name, def.pos) != Some(false),
        _ => true,
    });
    let mut removed = before - block.statements.len();
    for stmt in &mut block.statements {
        removed += nested(stmt, |inner| remove_nested(inner, symbols));
    }
    removed
}

/// Applies `pass` to every block directly nested in `stmt`.
fn nested(stmt: &mut Statement, mut pass: impl FnMut(&mut Block) -> usize) -> usize {
    match stmt {
        Statement::Block(block) => pass(block),
        Statement::FunctionDefinition(def) => pass(&mut def.body),
        Statement::If(s) => pass(&mut s.body),
        Statement::Switch(s) => {
            let mut n = 0;
            for case in &mut s.cases {
                n += pass(&mut case.body);
            }
            if let Some(default) = &mut s.default {
                n += pass(default);
            }
            n
        }
        Statement::ForLoop(l) => pass(&mut l.init) + pass(&mut l.body) + pass(&mut l.post),
        _ => 0,
    }
}
