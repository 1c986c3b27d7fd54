//! Built-in operations of the IR.
//!
//! Built-ins are called with ordinary call syntax. Each one has a fixed
//! argument and return count and a fixed lowering: a single opcode, a host
//! service reached through `SYSCALL`, or a composite form the normalizer
//! expands into other built-ins.

use sha2::{Digest, Sha256};

use crate::bytecode::op::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lowering {
    /// One instruction consuming the arguments.
    Opcode(Op),
    /// Host service provided by the runtime library.
    Syscall { name: &'static str, price: u64 },
    /// Event emission: string name, `topics` indexed values, one data value.
    Notify { topics: usize },
    /// Unconditional abort of the current execution.
    Abort,
    /// Rewritten by the normalizer, never reaches code generation.
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub args: usize,
    pub rets: usize,
    pub lowering: Lowering,
    /// Foldable when every argument is a literal.
    pub pure: bool,
    /// Index of the divisor/modulus argument for operations needing a zero
    /// guard.
    pub divisor: Option<usize>,
    pub hashing: bool,
    pub storage_read: bool,
    pub storage_write: bool,
    pub external_call: bool,
    /// Changes persistent state or emits notifications.
    pub state_mutating: bool,
    pub terminates: bool,
    /// Access width in bytes for memory built-ins; the offset is argument 0.
    pub memory: Option<u32>,
}

impl Builtin {
    const fn base(name: &'static str, args: usize, rets: usize, lowering: Lowering) -> Self {
        Self {
            name,
            args,
            rets,
            lowering,
            pure: false,
            divisor: None,
            hashing: false,
            storage_read: false,
            storage_write: false,
            external_call: false,
            state_mutating: false,
            terminates: false,
            memory: None,
        }
    }

    const fn op(name: &'static str, args: usize, op: Op) -> Self {
        let mut b = Self::base(name, args, 1, Lowering::Opcode(op));
        b.pure = true;
        b
    }

    const fn syscall(
        name: &'static str,
        args: usize,
        rets: usize,
        service: &'static str,
        price: u64,
    ) -> Self {
        Self::base(
            name,
            args,
            rets,
            Lowering::Syscall {
                name: service,
                price,
            },
        )
    }

    const fn divides(mut self, index: usize) -> Self {
        self.divisor = Some(index);
        self
    }

    const fn hashing(mut self) -> Self {
        self.hashing = true;
        self
    }

    const fn reads_storage(mut self) -> Self {
        self.storage_read = true;
        self
    }

    const fn writes_storage(mut self) -> Self {
        self.storage_write = true;
        self.state_mutating = true;
        self
    }

    const fn external(mut self, mutating: bool) -> Self {
        self.external_call = true;
        self.state_mutating = mutating;
        self
    }

    const fn mutating(mut self) -> Self {
        self.state_mutating = true;
        self
    }

    const fn terminating(mut self) -> Self {
        self.terminates = true;
        self
    }

    const fn memory(mut self, width: u32) -> Self {
        self.memory = Some(width);
        self
    }

    const fn impure(mut self) -> Self {
        self.pure = false;
        self
    }

    const fn composite(name: &'static str, args: usize, rets: usize) -> Self {
        Self::base(name, args, rets, Lowering::Composite)
    }

    const fn log(name: &'static str, topics: usize) -> Self {
        Self::base(name, topics + 2, 0, Lowering::Notify { topics }).mutating()
    }
}

pub const NOTIFY_SERVICE: &str = "System.Runtime.Notify";
pub const NOTIFY_PRICE: u64 = 1 << 15;

static BUILTINS: &[Builtin] = &[
    // arithmetic
    Builtin::op("add", 2, Op::Add),
    Builtin::op("sub", 2, Op::Sub),
    Builtin::op("mul", 2, Op::Mul),
    Builtin::op("div", 2, Op::Div).divides(1),
    Builtin::op("sdiv", 2, Op::SDiv).divides(1),
    Builtin::op("mod", 2, Op::Mod).divides(1),
    Builtin::op("smod", 2, Op::SMod).divides(1),
    Builtin::op("exp", 2, Op::Pow),
    Builtin::op("addmod", 3, Op::AddMod).divides(2),
    Builtin::op("mulmod", 3, Op::MulMod).divides(2),
    // comparison
    Builtin::op("lt", 2, Op::Lt),
    Builtin::op("gt", 2, Op::Gt),
    Builtin::op("slt", 2, Op::Slt),
    Builtin::op("sgt", 2, Op::Sgt),
    Builtin::op("eq", 2, Op::Equal),
    Builtin::op("iszero", 1, Op::Not),
    // bitwise
    Builtin::op("and", 2, Op::And),
    Builtin::op("or", 2, Op::Or),
    Builtin::op("xor", 2, Op::Xor),
    Builtin::op("not", 1, Op::Invert),
    Builtin::op("shl", 2, Op::Shl),
    Builtin::op("shr", 2, Op::Shr),
    Builtin::op("sar", 2, Op::Sar),
    Builtin::op("byte", 2, Op::Byte),
    // stack and termination
    Builtin::base("pop", 1, 0, Lowering::Opcode(Op::Drop)),
    Builtin::base("revert", 2, 0, Lowering::Abort).terminating(),
    Builtin::base("invalid", 0, 0, Lowering::Abort).terminating(),
    // storage
    Builtin::syscall("sload", 1, 1, "System.Storage.Get", 1 << 15).reads_storage(),
    Builtin::syscall("sstore", 2, 0, "System.Storage.Put", 1 << 15).writes_storage(),
    // memory, emulated by the runtime library
    Builtin::syscall("mload", 1, 1, "Runtime.Memory.Load", 1 << 4).memory(32),
    Builtin::syscall("mstore", 2, 0, "Runtime.Memory.Store", 1 << 4).memory(32),
    Builtin::syscall("mstore8", 2, 0, "Runtime.Memory.Store8", 1 << 4).memory(1),
    // hashing
    Builtin::syscall("sha256", 1, 1, "System.Crypto.Sha256", 1 << 15).hashing(),
    Builtin::syscall("ripemd160", 1, 1, "System.Crypto.Ripemd160", 1 << 15).hashing(),
    Builtin::syscall("keccak256", 2, 1, "System.Crypto.Keccak256", 1 << 15).hashing(),
    // environment
    Builtin::syscall("caller", 0, 1, "System.Runtime.GetCallingScriptHash", 1 << 4),
    Builtin::syscall("address", 0, 1, "System.Runtime.GetExecutingScriptHash", 1 << 4),
    Builtin::syscall("timestamp", 0, 1, "System.Runtime.GetTime", 1 << 3),
    Builtin::syscall("gas", 0, 1, "System.Runtime.GasLeft", 1 << 4),
    // external invocation
    Builtin::syscall("call", 3, 1, "System.Contract.Call", 1 << 15).external(true),
    Builtin::syscall("staticcall", 3, 1, "System.Contract.CallReadOnly", 1 << 15)
        .external(false),
    // events
    Builtin::log("log0", 0),
    Builtin::log("log1", 1),
    Builtin::log("log2", 2),
    Builtin::log("log3", 3),
    Builtin::log("log4", 4),
    // expanded by the normalizer
    Builtin::composite("neq", 2, 1),
    Builtin::composite("le", 2, 1),
    Builtin::composite("ge", 2, 1),
    Builtin::composite("require", 1, 0).impure(),
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn all() -> &'static [Builtin] {
    BUILTINS
}

/// Interop id of a host service: the first four bytes of SHA-256 of its
/// name, read little endian.
pub fn syscall_id(service: &str) -> u32 {
    let digest = Sha256::digest(service.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        let div = lookup("div").unwrap();
        assert_eq!((div.args, div.rets), (2, 1));
        assert_eq!(div.divisor, Some(1));
        assert!(div.pure);
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn test_names_unique() {
        let mut seen = HashSet::new();
        for b in all() {
            assert!(seen.insert(b.name), "duplicate builtin {}", b.name);
        }
    }

    #[test]
    fn test_effect_flags() {
        assert!(lookup("sstore").unwrap().storage_write);
        assert!(lookup("sstore").unwrap().state_mutating);
        assert!(lookup("sload").unwrap().storage_read);
        assert!(!lookup("sload").unwrap().state_mutating);
        assert!(lookup("keccak256").unwrap().hashing);
        assert!(lookup("call").unwrap().external_call);
        assert!(lookup("call").unwrap().state_mutating);
        assert!(!lookup("staticcall").unwrap().state_mutating);
        assert!(lookup("log2").unwrap().state_mutating);
        assert_eq!(lookup("log2").unwrap().args, 4);
        assert!(lookup("revert").unwrap().terminates);
        assert!(!lookup("require").unwrap().pure);
    }

    #[test]
    fn test_syscall_ids_distinct_and_stable() {
        let a = syscall_id("System.Storage.Get");
        let b = syscall_id("System.Storage.Put");
        assert_ne!(a, b);
        assert_eq!(a, syscall_id("System.Storage.Get"));
    }
}
