//! Inlining of constant functions.
//!
//! A constant function takes no parameters, returns one value and its body
//! is exactly `r := <literal>`. Calls to it are replaced by the literal when
//! its name is defined once in the whole object.

use std::collections::HashMap;

use alloy_primitives::U256;
use indexmap::IndexMap;

use crate::lang::literal::LiteralValue;
use crate::lang::node::{Block, Expression, FunctionDefinition, Literal, Position, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    /// Returns a literal; calls are replaced by it.
    Constant,
    /// Called from exactly one place.
    SingleCall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCandidate {
    pub name: String,
    pub kind: InlineKind,
    pub pos: Position,
}

fn collect_functions<'a>(block: &'a Block, out: &mut Vec<&'a FunctionDefinition>) {
    for stmt in &block.statements {
        match stmt {
            Statement::FunctionDefinition(def) => {
                out.push(def);
                collect_functions(&def.body, out);
            }
            Statement::Block(inner) => collect_functions(inner, out),
            Statement::If(s) => collect_functions(&s.body, out),
            Statement::Switch(s) => {
                for case in &s.cases {
                    collect_functions(&case.body, out);
                }
                if let Some(default) = &s.default {
                    collect_functions(default, out);
                }
            }
            Statement::ForLoop(l) => {
                collect_functions(&l.init, out);
                collect_functions(&l.body, out);
                collect_functions(&l.post, out);
            }
            _ => {}
        }
    }
}

/// The literal a function returns, if it is a constant function.
pub fn constant_value(def: &FunctionDefinition) -> Option<U256> {
    let [ret] = def.returns.as_slice() else {
        return None;
    };
    if !def.parameters.is_empty() {
        return None;
    }
    let [Statement::Assignment(assign)] = def.body.statements.as_slice() else {
        return None;
    };
    match assign.targets.as_slice() {
        [target] if target.name == ret.name => assign.value.as_literal()?.value.word(),
        _ => None,
    }
}

fn definition_counts<'a>(functions: &[&'a FunctionDefinition]) -> HashMap<&'a str, usize> {
    let mut counts = HashMap::new();
    for def in functions {
        *counts.entry(def.name.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Constant functions whose name is unambiguous, in definition order.
pub fn constant_functions(block: &Block) -> IndexMap<String, U256> {
    let mut functions = Vec::new();
    collect_functions(block, &mut functions);
    let counts = definition_counts(&functions);
    functions
        .into_iter()
        .filter(|def| counts.get(def.name.as_str()) == Some(&1))
        .filter_map(|def| constant_value(def).map(|v| (def.name.clone(), v)))
        .collect()
}

fn count_calls(expr: &Expression, calls: &mut HashMap<String, usize>) {
    if let Expression::FunctionCall(call) = expr {
        *calls.entry(call.name.name.clone()).or_insert(0) += 1;
        for arg in &call.arguments {
            count_calls(arg, calls);
        }
    }
}

/// Functions worth inlining: constant functions, and functions with a
/// single call site.
pub fn candidates(block: &Block) -> Vec<InlineCandidate> {
    let mut functions = Vec::new();
    collect_functions(block, &mut functions);
    let counts = definition_counts(&functions);

    let mut calls = HashMap::new();
    super::visit_expressions(block, &mut |expr| count_calls(expr, &mut calls));

    let mut out = Vec::new();
    for def in functions {
        if counts.get(def.name.as_str()) != Some(&1) {
            continue;
        }
        let kind = if constant_value(def).is_some() {
            InlineKind::Constant
        } else if calls.get(&def.name) == Some(&1) {
            InlineKind::SingleCall
        } else {
            continue;
        };
        out.push(InlineCandidate {
            name: def.name.clone(),
            kind,
            pos: def.pos,
        });
    }
    out
}

fn inline_expression(expr: &mut Expression, constants: &IndexMap<String, U256>) -> usize {
    let Expression::FunctionCall(call) = expr else {
        return 0;
    };
    if call.arguments.is_empty() {
        if let Some(value) = constants.get(&call.name.name) {
            *expr = Expression::Literal(Literal {
                value: LiteralValue::Number(*value),
                pos: call.pos,
            });
            return 1;
        }
    }
    call.arguments
        .iter_mut()
        .map(|arg| inline_expression(arg, constants))
        .sum()
}

/// Replaces calls to constant functions by their value. Returns the number
/// of calls replaced.
pub fn inline_constants(block: &mut Block, constants: &IndexMap<String, U256>) -> usize {
    if constants.is_empty() {
        return 0;
    }
    let mut inlined = 0;
    super::walk_expressions(block, &mut |expr| inlined += inline_expression(expr, constants));
    inlined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Lexer, Parser};
    use crate::lang::node::Object;

    fn parse(source: &str) -> Object {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    #[test]
    fn test_detects_constant_functions() {
        let object = parse(
            "{ function decimals() -> d { d := 18 } \
               function notconst(a) -> r { r := 1 } \
               function twostmts() -> r { r := 1 r := 2 } \
               function wrongtarget() -> r { let x := 0 } }",
        );
        let constants = constant_functions(&object.code);
        assert_eq!(constants.len(), 1);
        assert_eq!(constants["decimals"], U256::from(18));
    }

    #[test]
    fn test_ambiguous_names_are_not_constants() {
        let object = parse(
            "{ { function k() -> r { r := 1 } } { function k() -> r { r := 2 } } }",
        );
        assert!(constant_functions(&object.code).is_empty());
    }

    #[test]
    fn test_inline_replaces_calls() {
        let mut object = parse(
            "{ function k() -> r { r := 5 } sstore(k(), add(k(), 1)) }",
        );
        let constants = constant_functions(&object.code);
        assert_eq!(inline_constants(&mut object.code, &constants), 2);
        let Statement::Expression(Expression::FunctionCall(call)) = &object.code.statements[1]
        else {
            panic!();
        };
        assert!(call.arguments[0].as_literal().is_some());
    }

    #[test]
    fn test_candidates() {
        let object = parse(
            "{ function k() -> r { r := 5 } \
               function once(a) -> r { r := add(a, 1) } \
               function twice(a) -> r { r := a } \
               sstore(once(1), add(twice(1), twice(2))) }",
        );
        let found: Vec<(String, InlineKind)> = candidates(&object.code)
            .into_iter()
            .map(|c| (c.name, c.kind))
            .collect();
        assert_eq!(
            found,
            vec![
                ("k".to_string(), InlineKind::Constant),
                ("once".to_string(), InlineKind::SingleCall),
            ]
        );
    }
}
