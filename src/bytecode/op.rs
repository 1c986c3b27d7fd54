use alloy_primitives::U256;
use strum::{Display, EnumIter, FromRepr};

use crate::lang::node::Position;

// =============================================================================
// OPCODE - target machine instruction set
// =============================================================================

/// One-byte opcodes of the target machine.
///
/// Words are 256-bit unsigned integers with wrapping arithmetic. Binary
/// operators take their first operand from the top of the stack: `SUB` with
/// stack `[.. b, a]` pushes `a - b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Op {
    // constants
    PushInt8 = 0x00,
    PushInt16 = 0x01,
    PushInt32 = 0x02,
    PushInt64 = 0x03,
    PushInt128 = 0x04,
    PushInt256 = 0x05,
    PushData1 = 0x0C,
    PushM1 = 0x0F,
    Push0 = 0x10,
    Push1 = 0x11,
    Push2 = 0x12,
    Push3 = 0x13,
    Push4 = 0x14,
    Push5 = 0x15,
    Push6 = 0x16,
    Push7 = 0x17,
    Push8 = 0x18,
    Push9 = 0x19,
    Push10 = 0x1A,
    Push11 = 0x1B,
    Push12 = 0x1C,
    Push13 = 0x1D,
    Push14 = 0x1E,
    Push15 = 0x1F,
    Push16 = 0x20,

    // flow control
    Nop = 0x21,
    #[strum(serialize = "JMP_L")]
    JmpL = 0x23,
    #[strum(serialize = "JMPIF_L")]
    JmpIfL = 0x25,
    #[strum(serialize = "JMPIFNOT_L")]
    JmpIfNotL = 0x27,
    #[strum(serialize = "CALL_L")]
    CallL = 0x35,
    Abort = 0x38,
    Assert = 0x39,
    Ret = 0x40,
    Syscall = 0x41,

    // stack
    Drop = 0x45,
    Nip = 0x46,
    Dup = 0x4A,
    Over = 0x4B,
    Pick = 0x4D,
    Swap = 0x50,
    Rot = 0x51,

    // slots
    InitSlot = 0x57,
    LdLoc = 0x6D,
    StLoc = 0x75,
    LdArg = 0x7D,
    StArg = 0x85,

    // bitwise
    Invert = 0x90,
    And = 0x91,
    Or = 0x92,
    Xor = 0x93,
    Equal = 0x97,

    // arithmetic
    Add = 0x9E,
    Sub = 0x9F,
    Mul = 0xA0,
    Div = 0xA1,
    Mod = 0xA2,
    Pow = 0xA3,
    AddMod = 0xA4,
    MulMod = 0xA5,
    SDiv = 0xA6,
    SMod = 0xA7,
    Shl = 0xA8,
    Shr = 0xA9,
    Not = 0xAA,
    Sar = 0xAB,
    Byte = 0xAC,
    Nz = 0xB1,
    Lt = 0xB5,
    Slt = 0xB6,
    Gt = 0xB7,
    Sgt = 0xB8,

    // compound
    Pack = 0xC0,
}

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSize {
    None,
    Fixed(usize),
    /// One length byte followed by that many bytes.
    Prefixed,
}

impl Op {
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn operand_size(self) -> OperandSize {
        use Op::*;
        match self {
            PushInt8 => OperandSize::Fixed(1),
            PushInt16 => OperandSize::Fixed(2),
            PushInt32 => OperandSize::Fixed(4),
            PushInt64 => OperandSize::Fixed(8),
            PushInt128 => OperandSize::Fixed(16),
            PushInt256 => OperandSize::Fixed(32),
            PushData1 => OperandSize::Prefixed,
            JmpL | JmpIfL | JmpIfNotL | CallL | Syscall => OperandSize::Fixed(4),
            InitSlot => OperandSize::Fixed(2),
            LdLoc | StLoc | LdArg | StArg => OperandSize::Fixed(1),
            _ => OperandSize::None,
        }
    }

    /// Returns (pops, pushes) for an op, or None if the effect depends on the
    /// call site (calls, syscalls, slot setup, packing).
    pub fn stack_effect(self) -> Option<(usize, usize)> {
        use Op::*;
        Some(match self {
            PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushInt128 | PushInt256
            | PushData1 | PushM1 => (0, 1),
            Push0 | Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8 | Push9
            | Push10 | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 => (0, 1),

            Nop | JmpL | Abort | Ret => (0, 0),
            JmpIfL | JmpIfNotL | Assert => (1, 0),

            Drop => (1, 0),
            Nip => (2, 1),
            Dup => (1, 2),
            Over => (2, 3),
            // PICK pops the index and pushes the copied item
            Pick => (1, 1),
            Swap => (2, 2),
            Rot => (3, 3),

            LdLoc | LdArg => (0, 1),
            StLoc | StArg => (1, 0),

            Invert | Not | Nz => (1, 1),
            And | Or | Xor | Equal => (2, 1),
            Add | Sub | Mul | Div | Mod | Pow | SDiv | SMod => (2, 1),
            Shl | Shr | Sar | Byte => (2, 1),
            Lt | Slt | Gt | Sgt => (2, 1),
            AddMod | MulMod => (3, 1),

            CallL | Syscall | InitSlot | Pack => return None,
        })
    }

    /// Static execution cost in machine fee units.
    pub fn base_cost(self) -> u64 {
        use Op::*;
        match self {
            PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushM1 | Push0 | Push1 | Push2
            | Push3 | Push4 | Push5 | Push6 | Push7 | Push8 | Push9 | Push10 | Push11
            | Push12 | Push13 | Push14 | Push15 | Push16 | Nop => 1,
            PushInt128 | PushInt256 => 4,
            PushData1 => 8,
            JmpL | JmpIfL | JmpIfNotL | Drop | Nip | Dup | Over | Swap | Rot | Pick => 2,
            LdLoc | StLoc | LdArg | StArg => 2,
            Abort | Assert | Ret => 1,
            Invert | And | Or | Xor | Not | Nz => 8,
            Equal | Lt | Slt | Gt | Sgt => 8,
            Add | Sub | Mul | Div | Mod | SDiv | SMod | Shl | Shr | Sar | Byte => 8,
            AddMod | MulMod => 32,
            Pow => 64,
            InitSlot => 64,
            Pack => 2048,
            CallL => 512,
            // the syscall's own price is added by the caller
            Syscall => 0,
        }
    }

    pub fn is_push(self) -> bool {
        let b = self.byte();
        b <= Op::PushInt256.byte()
            || self == Op::PushData1
            || (Op::PushM1.byte()..=Op::Push16.byte()).contains(&b)
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::JmpL | Op::JmpIfL | Op::JmpIfNotL | Op::CallL)
    }

    pub fn is_conditional_jump(self) -> bool {
        matches!(self, Op::JmpIfL | Op::JmpIfNotL)
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

/// One emitted instruction. Its position in the instruction vector is its
/// address until label resolution turns positions into byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Op,
    pub operand: Vec<u8>,
    pub pops: usize,
    pub pushes: usize,
    pub cost: u64,
    pub source: Option<Position>,
}

impl Instruction {
    /// Instruction with the opcode's static stack effect and no operand.
    pub fn new(opcode: Op) -> Self {
        let (pops, pushes) = opcode.stack_effect().unwrap_or((0, 0));
        Self {
            opcode,
            operand: Vec::new(),
            pops,
            pushes,
            cost: opcode.base_cost(),
            source: None,
        }
    }

    pub fn with_operand(opcode: Op, operand: Vec<u8>) -> Self {
        Self {
            operand,
            ..Self::new(opcode)
        }
    }

    /// Overrides the stack effect for call-site dependent opcodes.
    pub fn with_effect(mut self, pops: usize, pushes: usize) -> Self {
        self.pops = pops;
        self.pushes = pushes;
        self
    }

    pub fn with_cost(mut self, extra: u64) -> Self {
        self.cost += extra;
        self
    }

    pub fn at(mut self, pos: Position) -> Self {
        self.source = Some(pos);
        self
    }

    /// Jump or call with a zeroed offset, patched during label resolution.
    pub fn jump(opcode: Op) -> Self {
        Self::with_operand(opcode, vec![0; 4])
    }

    /// Shortest encoding pushing `value`.
    pub fn push_int(value: U256) -> Self {
        if value == U256::MAX {
            return Self::new(Op::PushM1);
        }
        if value <= U256::from(16) {
            let small = value.as_limbs()[0] as u8;
            // Push0..Push16 are contiguous
            let opcode = Op::from_repr(Op::Push0.byte() + small).unwrap_or(Op::Push0);
            return Self::new(opcode);
        }

        let bytes = value.to_le_bytes::<32>();
        for (width, opcode) in [
            (1, Op::PushInt8),
            (2, Op::PushInt16),
            (4, Op::PushInt32),
            (8, Op::PushInt64),
            (16, Op::PushInt128),
        ] {
            let fill = if bytes[width - 1] & 0x80 == 0 { 0x00 } else { 0xFF };
            if bytes[width..].iter().all(|b| *b == fill) {
                return Self::with_operand(opcode, bytes[..width].to_vec());
            }
        }
        Self::with_operand(Op::PushInt256, bytes.to_vec())
    }

    pub fn push_data(data: &[u8]) -> Self {
        Self::with_operand(Op::PushData1, data.to_vec())
            .with_cost(data.len() as u64)
    }

    /// Value pushed by an integer push instruction.
    pub fn push_value(&self) -> Option<U256> {
        use Op::*;
        match self.opcode {
            PushM1 => Some(U256::MAX),
            op if (Push0.byte()..=Push16.byte()).contains(&op.byte()) => {
                Some(U256::from(op.byte() - Push0.byte()))
            }
            PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushInt128 | PushInt256 => {
                Some(sign_extend(&self.operand))
            }
            _ => None,
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self.opcode.operand_size() {
            OperandSize::None => 1,
            OperandSize::Fixed(n) => 1 + n,
            OperandSize::Prefixed => 2 + self.operand.len(),
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode.byte());
        if self.opcode.operand_size() == OperandSize::Prefixed {
            out.push(self.operand.len() as u8);
        }
        out.extend_from_slice(&self.operand);
    }

    /// Net stack effect, `pushes - pops`.
    pub fn net_effect(&self) -> i64 {
        self.pushes as i64 - self.pops as i64
    }
}

/// Sign-extends little-endian two's complement bytes to a full word.
pub fn sign_extend(bytes: &[u8]) -> U256 {
    let fill = match bytes.last() {
        Some(b) if b & 0x80 != 0 => 0xFF,
        _ => 0x00,
    };
    let mut word = [fill; 32];
    let len = bytes.len().min(32);
    word[..len].copy_from_slice(&bytes[..len]);
    U256::from_le_bytes(word)
}
