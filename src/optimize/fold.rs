//! Implements constant folding to collapse pure built-in calls on literals
//! into a single literal.

use alloy_primitives::U256;

use crate::bytecode::semantics;
use crate::lang::builtins::{self, Lowering};
use crate::lang::literal::LiteralValue;
use crate::lang::node::{Block, Expression, Literal};

/// Folds every foldable call in `block`. Returns the number of calls
/// replaced.
pub fn fold_block(block: &mut Block) -> usize {
    let mut folded = 0;
    super::walk_expressions(block, &mut |expr| folded += fold_expression(expr));
    folded
}

/// Folds `expr` bottom-up in place.
pub fn fold_expression(expr: &mut Expression) -> usize {
    let Expression::FunctionCall(call) = expr else {
        return 0;
    };
    let mut folded: usize = call.arguments.iter_mut().map(fold_expression).sum();

    if let Some(value) = evaluate_call(&call.name.name, &call.arguments) {
        *expr = Expression::Literal(Literal {
            value: LiteralValue::Number(value),
            pos: call.pos,
        });
        folded += 1;
    }
    folded
}

/// Value of a pure built-in applied to literal arguments. `None` when the
/// callee is not a pure built-in, an argument is not a literal word, or the
/// machine would abort (zero divisor).
pub fn evaluate_call(name: &str, arguments: &[Expression]) -> Option<U256> {
    let builtin = builtins::lookup(name).filter(|b| b.pure)?;
    let Lowering::Opcode(op) = builtin.lowering else {
        return None;
    };
    if arguments.len() != builtin.args {
        return None;
    }
    let words = arguments
        .iter()
        .map(|arg| arg.as_literal().and_then(|l| l.value.word()))
        .collect::<Option<Vec<U256>>>()?;
    semantics::evaluate(op, &words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Lexer, Parser};

    fn expression(source: &str) -> Expression {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse_expression().unwrap()
    }

    fn folded(source: &str) -> Option<U256> {
        let mut expr = expression(source);
        fold_expression(&mut expr);
        expr.as_literal().and_then(|l| l.value.word())
    }

    #[test]
    fn test_fold_nested_arithmetic() {
        assert_eq!(folded("add(mul(2, 3), 4)"), Some(U256::from(10)));
        assert_eq!(folded("sub(0, 1)"), Some(U256::MAX));
        assert_eq!(folded("iszero(eq(1, 2))"), Some(U256::from(1)));
        assert_eq!(folded("shl(8, 0x01)"), Some(U256::from(256)));
    }

    #[test]
    fn test_fold_counts_every_call() {
        let mut expr = expression("add(mul(2, 3), 4)");
        assert_eq!(fold_expression(&mut expr), 2);
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        assert_eq!(folded("div(10, 0)"), None);
        assert_eq!(folded("mulmod(2, 3, 0)"), None);

        // the operands are still folded
        let mut expr = expression("div(add(1, 1), sub(1, 1))");
        assert_eq!(fold_expression(&mut expr), 2);
        let Expression::FunctionCall(call) = expr else {
            panic!("division must stay a call");
        };
        assert!(call.arguments.iter().all(|a| a.as_literal().is_some()));
    }

    #[test]
    fn test_partial_folding_keeps_variables() {
        let mut expr = expression("add(x, mul(2, 2))");
        assert_eq!(fold_expression(&mut expr), 1);
        assert!(expr.as_literal().is_none());
    }

    #[test]
    fn test_impure_calls_are_left_alone() {
        assert_eq!(folded("sload(0)"), None);
        assert_eq!(folded("f(1, 2)"), None);
    }

    #[test]
    fn test_fold_block_reaches_nested_statements() {
        let tokens = Lexer::new(
            "{ function f() -> r { r := add(1, 1) } if lt(1, 2) { sstore(0, not(0)) } }",
        )
        .tokenize()
        .unwrap();
        let mut object = Parser::new(tokens).parse().unwrap();
        assert_eq!(fold_block(&mut object.code), 3);
    }
}
