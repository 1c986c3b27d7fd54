use alloy_primitives::U256;

use super::machine::{CALLER, Machine, Notification, Status};
use super::{compile_at, instructions, options_at, run_at};
use crate::bytecode::op::Op;
use crate::diagnostics::Phase;
use crate::frontend::MAX_NESTING;
use crate::lang::builtins::syscall_id;
use crate::pipeline::compile;

fn u(n: u64) -> U256 {
    U256::from(n)
}

fn syscalls_to(source: &str, level: u8, service: &str) -> usize {
    let id = syscall_id(service).to_le_bytes().to_vec();
    instructions(&compile_at(source, level))
        .iter()
        .filter(|i| i.opcode == Op::Syscall && i.operand == id)
        .count()
}

// -----------------------------------------------------------------------------
// pipeline behaviour
// -----------------------------------------------------------------------------

#[test]
fn test_literal_arithmetic_folds_to_one_push() {
    let code = instructions(&compile_at("{ let x := add(1, 2) }", 3));
    let pushes: Vec<U256> = code.iter().filter_map(|i| i.push_value()).collect();
    assert_eq!(pushes, vec![u(3)]);
    assert!(!code.iter().any(|i| i.opcode == Op::Add));
}

#[test]
fn test_code_after_leave_is_not_emitted() {
    let source = "{ function f() { leave if 1 { sstore(7, 1) } } f() }";
    assert_eq!(syscalls_to(source, 0, "System.Storage.Put"), 1);
    assert_eq!(syscalls_to(source, 1, "System.Storage.Put"), 0);
}

#[test]
fn test_undeclared_identifier_is_named() {
    let failure = compile("{ sstore(0, y) }", &options_at(1)).unwrap_err();
    let error = failure.first_error().unwrap();
    assert_eq!(error.phase, Phase::Analyzer);
    assert!(error.message.contains("y"), "{}", error.message);
}

#[test]
fn test_literal_zero_divisor_is_guarded_not_rejected() {
    let artifact = compile_at("{ sstore(0, div(10, 0)) }", 1);
    let code = instructions(&artifact);
    let div = code.iter().position(|i| i.opcode == Op::Div).unwrap();
    assert_eq!(code[div - 1].opcode, Op::Abort);
    assert_eq!(code[div - 2].opcode, Op::JmpIfNotL);

    let mut machine = Machine::new();
    assert_eq!(machine.run(&artifact).status, Status::Aborted);
    assert!(machine.storage.is_empty());
}

#[test]
fn test_deepest_allowed_nesting_compiles() {
    let depth = MAX_NESTING - 1;
    let blocks = format!("{}{}", "{".repeat(depth), "}".repeat(depth));
    for level in 0..=3 {
        assert!(compile(&blocks, &options_at(level)).is_ok(), "level {}", level);
    }

    // root block, one block per `if`, then three nested calls
    let ifs = MAX_NESTING - 4;
    let source = format!(
        "{{ {} sstore(1, add(sload(0), 6)) {} }}",
        "if sload(0) { ".repeat(ifs),
        "} ".repeat(ifs)
    );
    for level in 0..=3 {
        let (execution, machine) = run_at(&source, level, &[(0, u(1))]);
        assert!(execution.halted(), "level {}: {:?}", level, execution.status);
        assert_eq!(machine.sload(1), u(7));
    }
}

#[test]
fn test_nesting_past_limit_is_a_parser_error() {
    let depth = MAX_NESTING + 1;
    let source = format!("{}{}", "{".repeat(depth), "}".repeat(depth));
    let failure = compile(&source, &options_at(1)).unwrap_err();
    let error = failure.first_error().unwrap();
    assert_eq!(error.phase, Phase::Parser);
    assert!(error.message.contains("nesting"), "{}", error.message);
}

#[test]
fn test_storage_write_in_loop_warning() {
    let in_loop = compile(
        "{ for { let i := 0 } lt(i, 3) { i := add(i, 1) } { sstore(i, 1) } }",
        &options_at(1),
    )
    .unwrap();
    assert!(
        in_loop
            .diagnostics
            .iter()
            .any(|d| d.message.contains("storage write in loop"))
    );

    let outside = compile("{ sstore(0, 1) }", &options_at(1)).unwrap();
    assert!(
        !outside
            .diagnostics
            .iter()
            .any(|d| d.message.contains("storage write in loop"))
    );
}

// -----------------------------------------------------------------------------
// execution
// -----------------------------------------------------------------------------

#[test]
fn test_operand_order() {
    let source = "{
        let a := sload(0)
        let b := sload(1)
        sstore(10, sub(a, b))
        sstore(11, lt(b, a))
        sstore(12, shl(b, 1))
        sstore(13, div(a, b))
        sstore(14, exp(b, 2))
    }";
    for level in 0..=3 {
        let (execution, machine) = run_at(source, level, &[(0, u(10)), (1, u(3))]);
        assert!(execution.halted(), "{:?}", execution.status);
        assert_eq!(machine.sload(10), u(7));
        assert_eq!(machine.sload(11), u(1));
        assert_eq!(machine.sload(12), u(8));
        assert_eq!(machine.sload(13), u(3));
        assert_eq!(machine.sload(14), u(9));
    }
}

#[test]
fn test_loop_accumulates() {
    let source = "{
        let s := 0
        for { let i := 1 } lt(i, 11) { i := add(i, 1) } { s := add(s, i) }
        sstore(0, s)
    }";
    for level in 0..=3 {
        let (execution, machine) = run_at(source, level, &[]);
        assert!(execution.halted());
        assert_eq!(machine.sload(0), u(55));
    }
}

#[test]
fn test_multiple_returns() {
    let source = "{
        function divmod(a, b) -> q, r { q := div(a, b) r := mod(a, b) }
        let q, r := divmod(17, 5)
        sstore(0, q)
        sstore(1, r)
    }";
    let (execution, machine) = run_at(source, 1, &[]);
    assert!(execution.halted());
    assert_eq!(machine.sload(0), u(3));
    assert_eq!(machine.sload(1), u(2));
}

#[test]
fn test_recursion() {
    let source = "{
        function fact(n) -> r {
            r := 1
            if gt(n, 1) { r := mul(n, fact(sub(n, 1))) }
        }
        sstore(0, fact(10))
    }";
    let (execution, machine) = run_at(source, 2, &[]);
    assert!(execution.halted());
    assert_eq!(machine.sload(0), u(3_628_800));
}

#[test]
fn test_switch_selects_case() {
    let source = "{
        function classify(x) -> c {
            switch x
            case 0 { c := 10 }
            case 1 { c := 20 }
            default { c := 30 }
        }
        sstore(0, classify(0))
        sstore(1, classify(1))
        sstore(2, classify(9))
    }";
    for level in 0..=3 {
        let (execution, machine) = run_at(source, level, &[]);
        assert!(execution.halted());
        assert_eq!(
            [machine.sload(0), machine.sload(1), machine.sload(2)],
            [u(10), u(20), u(30)]
        );
        assert!(execution.stack.is_empty());
    }
}

#[test]
fn test_break_and_continue_inside_switch() {
    let source = "{
        for { let i := 0 } lt(i, 10) { i := add(i, 1) } {
            switch i
            case 3 { continue }
            case 7 { break }
            default { }
            sstore(i, 1)
        }
    }";
    let (execution, machine) = run_at(source, 1, &[]);
    assert!(execution.halted());
    assert!(execution.stack.is_empty());
    let written: Vec<U256> = machine.storage.keys().copied().collect();
    assert_eq!(written, vec![u(0), u(1), u(2), u(4), u(5), u(6)]);
}

#[test]
fn test_leave_inside_switch() {
    let source = "{
        function pick(x) -> r {
            switch x
            case 1 { r := 5 leave }
            default { }
            r := 9
        }
        sstore(0, pick(1))
        sstore(1, pick(2))
    }";
    let (execution, machine) = run_at(source, 1, &[]);
    assert!(execution.halted());
    assert!(execution.stack.is_empty());
    assert_eq!(machine.sload(0), u(5));
    assert_eq!(machine.sload(1), u(9));
}

#[test]
fn test_event_notification() {
    let (execution, machine) = run_at("{ log2(\"Transfer\", 1, 2, 100) }", 1, &[]);
    assert!(execution.halted());
    assert_eq!(
        machine.notifications,
        vec![Notification {
            name: "Transfer".into(),
            values: vec![u(1), u(2), u(100)],
        }]
    );
}

#[test]
fn test_require() {
    let source = "{ require(lt(sload(0), 5)) sstore(1, 1) }";
    let (execution, machine) = run_at(source, 1, &[(0, u(3))]);
    assert!(execution.halted());
    assert_eq!(machine.sload(1), u(1));

    let (execution, machine) = run_at(source, 1, &[(0, u(9))]);
    assert_eq!(execution.status, Status::Aborted);
    assert_eq!(machine.sload(1), U256::ZERO);
}

#[test]
fn test_memory_builtins() {
    let source = "{
        mstore(64, 0x2a)
        sstore(0, mload(64))
        mstore8(31, 7)
        sstore(1, mload(0))
    }";
    let (execution, machine) = run_at(source, 1, &[]);
    assert!(execution.halted());
    assert_eq!(machine.sload(0), u(42));
    assert_eq!(machine.sload(1), u(7));
}

#[test]
fn test_runtime_bounds_check() {
    let source = "{ mstore(sload(0), 1) }";
    let limit = options_at(1).memory_limit_bytes;

    let (execution, _) = run_at(source, 1, &[(0, u(limit))]);
    assert_eq!(execution.status, Status::Aborted);

    let (execution, _) = run_at(source, 1, &[(0, u(limit - 32))]);
    assert!(execution.halted());

    let unchecked = compile(source, &options_at(1).with_bounds_checking(false)).unwrap();
    let mut machine = Machine::with_storage([(U256::ZERO, u(limit))]);
    assert!(machine.run(&unchecked.artifact).halted());
}

#[test]
fn test_high_byte_string_fills_word() {
    let source = format!("{{ sstore(0, \"{}\") sstore(1, \"\\xffa\") }}", "\\xff".repeat(32));
    let (execution, machine) = run_at(&source, 1, &[]);
    assert!(execution.halted(), "{:?}", execution.status);
    assert_eq!(machine.sload(0), U256::MAX);
    let mut expected = [0u8; 32];
    expected[0] = 0xff;
    expected[1] = b'a';
    assert_eq!(machine.sload(1), U256::from_be_bytes(expected));
}

#[test]
fn test_environment() {
    let (execution, machine) = run_at("{ sstore(0, caller()) }", 1, &[]);
    assert!(execution.halted());
    assert_eq!(machine.sload(0), CALLER);
}

#[test]
fn test_methods_are_invocable() {
    let artifact = compile_at(
        "{ function get() -> v { v := sload(0) } function put(v) { sstore(0, v) } }",
        1,
    );
    let mut machine = Machine::new();
    let put = machine.invoke(&artifact, "put", &[u(77)]);
    assert!(put.halted());
    assert!(put.stack.is_empty());

    let get = machine.invoke(&artifact, "get", &[]);
    assert!(get.halted());
    assert_eq!(get.returns(), vec![u(77)]);
}

#[test]
fn test_revert_aborts_execution() {
    let (execution, _) = run_at("{ sstore(0, 1) revert(0, 0) sstore(1, 1) }", 0, &[]);
    assert_eq!(execution.status, Status::Aborted);
}

#[test]
fn test_nested_object_runs() {
    let source = r#"object "Token" {
        code { sstore(0, 1) }
        object "Runtime" {
            code { sstore(1, add(sload(0), 1)) }
        }
    }"#;
    let artifact = compile_at(source, 1);
    let mut machine = Machine::new();
    assert!(machine.run(&artifact).halted());
    assert!(machine.run(artifact.sub_object("Runtime").unwrap()).halted());
    assert_eq!(machine.sload(1), u(2));
}
