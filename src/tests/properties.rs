//! Property tests over generated programs.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use proptest::prelude::*;
use proptest::sample::Index;

use super::machine::{Machine, Notification, Status};
use super::{compile_at, instructions, options_at};
use crate::analysis::analyze;
use crate::bytecode::compile::{Generated, generate};
use crate::bytecode::compile_error::CodegenError;
use crate::bytecode::assembly::jump_offset;
use crate::bytecode::disasm::decode;
use crate::bytecode::op::Op;
use crate::bytecode::stack_check::{check, net_effect};
use crate::context::CompilerContext;
use crate::frontend::{Lexer, Parser};
use crate::lang::node::Object;
use crate::normalize::normalize;
use crate::optimize::{optimize, peephole};
use crate::pipeline::compile;

const BINARY: &[&str] = &[
    "add", "sub", "mul", "div", "sdiv", "mod", "smod", "exp", "lt", "gt", "slt", "sgt", "eq",
    "and", "or", "xor", "shl", "shr", "sar", "byte", "neq", "le", "ge",
];
const UNARY: &[&str] = &["iszero", "not"];
const TERNARY: &[&str] = &["addmod", "mulmod"];

const DIVISIONS: &[&str] = &["div", "mod", "sdiv", "smod"];

const GUARDED: &[Op] = &[Op::Div, Op::Mod, Op::SDiv, Op::SMod, Op::AddMod, Op::MulMod];

fn arb_word() -> impl Strategy<Value = U256> {
    prop_oneof![
        Just(U256::ZERO),
        Just(U256::from(1)),
        Just(U256::MAX),
        (0u64..300).prop_map(U256::from),
        any::<u8>().prop_map(|shift| U256::from(1) << usize::from(shift)),
        any::<[u64; 4]>().prop_map(U256::from_limbs),
    ]
}

/// Expressions over `vars`, literals and storage reads.
fn arb_expr(vars: &'static [&'static str]) -> BoxedStrategy<String> {
    let leaf = prop_oneof![
        arb_word().prop_map(|w| w.to_string()),
        prop::sample::select(vars).prop_map(str::to_string),
        (0u64..4).prop_map(|slot| format!("sload({})", slot)),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (prop::sample::select(BINARY), inner.clone(), inner.clone())
                .prop_map(|(op, a, b)| format!("{}({}, {})", op, a, b)),
            (prop::sample::select(UNARY), inner.clone())
                .prop_map(|(op, a)| format!("{}({})", op, a)),
            (prop::sample::select(TERNARY), inner.clone(), inner.clone(), inner)
                .prop_map(|(op, a, b, n)| format!("{}({}, {}, {})", op, a, b, n)),
        ]
    })
    .boxed()
}

/// A program touching every statement kind.
fn arb_program() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(arb_expr(&["a", "b"]), 7),
        arb_expr(&["a", "b", "i"]),
        arb_expr(&["x", "y"]),
    )
        .prop_map(|(e, looped, body)| {
            format!(
                "{{
                    function f(x, y) -> r {{ r := {body} }}
                    let a := sload(0)
                    let b := sload(1)
                    sstore(2, {e0})
                    if {e1} {{ sstore(3, {e2}) }}
                    switch mod({e3}, 3)
                    case 0 {{ sstore(4, 1) }}
                    case 1 {{ sstore(4, {e4}) }}
                    default {{ log1(\"Seen\", a, {e5}) }}
                    require(or(1, {e6}))
                    for {{ let i := 0 }} lt(i, 3) {{ i := add(i, 1) }} {{
                        sstore(add(10, i), {looped})
                    }}
                    sstore(5, f(a, b))
                }}",
                e0 = e[0],
                e1 = e[1],
                e2 = e[2],
                e3 = e[3],
                e4 = e[4],
                e5 = e[5],
                e6 = e[6],
                looped = looped,
                body = body,
            )
        })
}

/// Declarations and storage writes only.
fn arb_straight_line() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_expr(&["a", "b"]), 1..6).prop_map(|exprs| {
        let mut source = String::from("{ let a := sload(0) let b := sload(1) ");
        for (i, expr) in exprs.iter().enumerate() {
            match i % 3 {
                0 => source.push_str(&format!("let v{} := {} ", i, expr)),
                1 => source.push_str(&format!("sstore({}, {}) ", i, expr)),
                _ => source.push_str(&format!("pop({}) ", expr)),
            }
        }
        source.push('}');
        source
    })
}

fn arb_storage() -> impl Strategy<Value = Vec<(U256, U256)>> {
    prop::collection::vec(arb_word(), 4).prop_map(|words| {
        words
            .into_iter()
            .enumerate()
            .map(|(slot, w)| (U256::from(slot), w))
            .collect()
    })
}

fn parse(source: &str) -> Object {
    let tokens = Lexer::new(source).tokenize().unwrap();
    Parser::new(tokens).parse().unwrap()
}

/// Runs every stage up to and including peephole, stopping before
/// resolution.
fn generated(source: &str, level: u8) -> Generated {
    let options = options_at(level);
    let mut ctx = CompilerContext::new(options.clone());
    let object = normalize(parse(source), &mut ctx);
    let report = analyze(&object, &mut ctx);
    assert!(!report.has_errors(), "{:?}", report.errors);
    let (object, _) = optimize(object, &ctx).unwrap();
    let mut generated = generate(&object, &options).unwrap();
    if level >= 2 {
        peephole::optimize(&mut generated.assembly);
    }
    generated
}

type Observation = (Status, BTreeMap<U256, U256>, Vec<Notification>);

fn observe(source: &str, level: u8, storage: &[(U256, U256)]) -> Observation {
    let artifact = compile_at(source, level);
    let mut machine = Machine::with_storage(storage.iter().copied());
    let execution = machine.run(&artifact);
    (execution.status, machine.storage, machine.notifications)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_compilation_is_deterministic(source in arb_program(), level in 0u8..=3) {
        let options = options_at(level);
        let first = compile(&source, &options).unwrap();
        let second = compile(&source, &options).unwrap();
        prop_assert_eq!(&first.artifact, &second.artifact);
        prop_assert_eq!(first.artifact.to_bytes().unwrap(), second.artifact.to_bytes().unwrap());
        prop_assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_optimization_preserves_behaviour(source in arb_program(), storage in arb_storage()) {
        let baseline = observe(&source, 0, &storage);
        prop_assert!(
            matches!(baseline.0, Status::Halted | Status::Aborted),
            "unexpected status {:?}",
            baseline.0
        );
        for level in 1..=3 {
            prop_assert_eq!(&observe(&source, level, &storage), &baseline, "level {}", level);
        }
    }

    #[test]
    fn test_normalize_is_idempotent(source in arb_program()) {
        let mut ctx = CompilerContext::new(options_at(1));
        let once = normalize(parse(&source), &mut ctx);
        let twice = normalize(once.clone(), &mut ctx);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_every_pending_label_resolves(source in arb_program(), level in 0u8..=3, victim in any::<Index>()) {
        let generated = generated(&source, level);
        let asm = &generated.assembly;
        for pending in &asm.pending {
            prop_assert!(asm.labels.contains_key(&pending.label), "{}", pending.label);
        }
        prop_assert!(asm.resolve().is_ok());

        // a missing label is an error, never offset zero
        prop_assert!(!asm.pending.is_empty());
        let label = asm.pending[victim.index(asm.pending.len())].label.clone();
        let mut broken = asm.clone();
        broken.labels.shift_remove(&label);
        match broken.resolve() {
            Err(CodegenError::UnresolvedLabel { label: missing }) => {
                prop_assert_eq!(missing, label);
            }
            other => {
                prop_assert!(false, "expected an unresolved label, got {:?}", other);
            }
        }
    }

    #[test]
    fn test_straight_line_code_is_balanced(source in arb_straight_line()) {
        let generated = generated(&source, 0);
        let code = &generated.assembly.instructions;
        prop_assert_eq!(net_effect(code), 0);
        let profile = check(code).unwrap();
        prop_assert_eq!(profile.final_height, 0);
        prop_assert_eq!(profile.max_height, generated.max_stack_depth);
    }

    #[test]
    fn test_divisions_are_guarded(source in arb_program(), level in 0u8..=3) {
        let artifact = compile_at(&source, level);
        let code = decode(&artifact.bytecode).unwrap();
        for (i, (address, instruction)) in code.iter().enumerate() {
            if !GUARDED.contains(&instruction.opcode) {
                continue;
            }
            prop_assert!(i >= 2);
            prop_assert_eq!(code[i - 1].1.opcode, Op::Abort);
            let (jump_address, jump) = &code[i - 2];
            prop_assert!(jump.opcode.is_conditional_jump());
            let offset = jump_offset(&jump.operand).unwrap();
            prop_assert_eq!(*jump_address as i64 + i64::from(offset), *address as i64);
        }
    }

    #[test]
    fn test_division_by_zero_aborts(a in arb_word(), op in prop::sample::select(DIVISIONS)) {
        let source = format!("{{ sstore(0, {}(sload(1), sload(2))) }}", op);
        let artifact = compile_at(&source, 2);
        let mut machine = Machine::with_storage([(U256::from(1), a)]);
        prop_assert_eq!(machine.run(&artifact).status, Status::Aborted);
        prop_assert!(machine.storage.get(&U256::ZERO).is_none());
        prop_assert!(instructions(&artifact).iter().any(|i| i.opcode == Op::Abort));
    }
}
