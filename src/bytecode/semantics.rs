//! Word arithmetic of the target machine.
//!
//! Operands are given in argument order: for `sub(a, b)` the slice is
//! `[a, b]`, which is also the pop order on the machine. Everything wraps
//! modulo 2^256; signed operations read words as two's complement.

use alloy_primitives::U256;

use crate::bytecode::op::Op;
use crate::lang::literal::word_to_u64;

const SIGN_BIT: usize = 255;

fn bool_word(b: bool) -> U256 {
    if b { U256::from(1) } else { U256::ZERO }
}

fn is_negative(x: U256) -> bool {
    x.bit(SIGN_BIT)
}

fn abs(x: U256) -> U256 {
    if is_negative(x) { x.wrapping_neg() } else { x }
}

/// Shift amount when it is below the word width.
fn shift_amount(shift: U256) -> Option<usize> {
    word_to_u64(shift)
        .filter(|s| *s < 256)
        .map(|s| s as usize)
}

fn signed_lt(a: U256, b: U256) -> bool {
    let flip = U256::from(1) << SIGN_BIT;
    (a ^ flip) < (b ^ flip)
}

fn sdiv(a: U256, b: U256) -> U256 {
    let quotient = abs(a) / abs(b);
    if is_negative(a) != is_negative(b) {
        quotient.wrapping_neg()
    } else {
        quotient
    }
}

fn smod(a: U256, b: U256) -> U256 {
    let remainder = abs(a) % abs(b);
    if is_negative(a) {
        remainder.wrapping_neg()
    } else {
        remainder
    }
}

fn sar(shift: U256, value: U256) -> U256 {
    match (shift_amount(shift), is_negative(value)) {
        (Some(s), false) => value >> s,
        (Some(s), true) => !((!value) >> s),
        (None, false) => U256::ZERO,
        (None, true) => U256::MAX,
    }
}

/// Big-endian byte `n` of `x`, zero when `n >= 32`.
fn byte(n: U256, x: U256) -> U256 {
    match word_to_u64(n).filter(|n| *n < 32) {
        Some(n) => U256::from(x.byte(31 - n as usize)),
        None => U256::ZERO,
    }
}

/// Evaluates a pure opcode. Returns `None` when the opcode is not a pure
/// word operation, the operand count is wrong, or the machine would abort
/// (zero divisor or modulus).
pub fn evaluate(op: Op, args: &[U256]) -> Option<U256> {
    use Op::*;
    let value = match (op, args) {
        (Add, [a, b]) => a.wrapping_add(*b),
        (Sub, [a, b]) => a.wrapping_sub(*b),
        (Mul, [a, b]) => a.wrapping_mul(*b),
        (Div, [a, b]) => a.checked_div(*b)?,
        (Mod, [a, b]) => a.checked_rem(*b)?,
        (SDiv, [_, b]) | (SMod, [_, b]) if b.is_zero() => return None,
        (SDiv, [a, b]) => sdiv(*a, *b),
        (SMod, [a, b]) => smod(*a, *b),
        (Pow, [a, b]) => a.wrapping_pow(*b),
        (AddMod, [_, _, n]) | (MulMod, [_, _, n]) if n.is_zero() => return None,
        (AddMod, [a, b, n]) => a.add_mod(*b, *n),
        (MulMod, [a, b, n]) => a.mul_mod(*b, *n),

        (Lt, [a, b]) => bool_word(a < b),
        (Gt, [a, b]) => bool_word(a > b),
        (Slt, [a, b]) => bool_word(signed_lt(*a, *b)),
        (Sgt, [a, b]) => bool_word(signed_lt(*b, *a)),
        (Equal, [a, b]) => bool_word(a == b),
        (Not, [a]) => bool_word(a.is_zero()),
        (Nz, [a]) => bool_word(!a.is_zero()),

        (And, [a, b]) => *a & *b,
        (Or, [a, b]) => *a | *b,
        (Xor, [a, b]) => *a ^ *b,
        (Invert, [a]) => !*a,
        (Shl, [shift, value]) => shift_amount(*shift).map_or(U256::ZERO, |s| *value << s),
        (Shr, [shift, value]) => shift_amount(*shift).map_or(U256::ZERO, |s| *value >> s),
        (Sar, [shift, value]) => sar(*shift, *value),
        (Byte, [n, x]) => byte(*n, *x),
        _ => return None,
    };
    Some(value)
}
