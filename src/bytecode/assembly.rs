//! Instruction arena with symbolic labels.
//!
//! Jumps are emitted with a zeroed 4-byte operand and a pending-label
//! entry. `resolve` assigns byte addresses and patches every pending operand
//! with the little-endian signed offset from the jump to its target.

use indexmap::IndexMap;
use tracing::trace;

use crate::bytecode::compile_error::CodegenError;
use crate::bytecode::op::{Instruction, Op};
use crate::lang::node::Position;

/// A jump or call waiting for its target address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLabel {
    pub label: String,
    /// Index of the jump instruction.
    pub instruction: usize,
    /// Byte offset of the patched field inside the operand.
    pub operand_offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub instructions: Vec<Instruction>,
    /// Label name → index of the instruction it precedes. A label may point
    /// one past the last instruction.
    pub labels: IndexMap<String, usize>,
    pub pending: Vec<PendingLabel>,
}

/// Output of label resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub bytecode: Vec<u8>,
    /// Byte address of every instruction, plus the end address.
    pub addresses: Vec<usize>,
    pub label_addresses: IndexMap<String, usize>,
}

impl Resolved {
    pub fn address_of(&self, label: &str) -> Option<usize> {
        self.label_addresses.get(label).copied()
    }
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Appends an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Appends a jump or call to `label`.
    pub fn emit_jump(&mut self, opcode: Op, label: &str, source: Option<Position>) -> usize {
        let mut instruction = Instruction::jump(opcode);
        instruction.source = source;
        self.emit_labelled(instruction, label)
    }

    /// Appends an instruction whose first four operand bytes receive the
    /// offset to `label`.
    pub fn emit_labelled(&mut self, instruction: Instruction, label: &str) -> usize {
        let index = self.emit(instruction);
        self.pending.push(PendingLabel {
            label: label.to_string(),
            instruction: index,
            operand_offset: 0,
        });
        index
    }

    /// Binds `label` to the next instruction index.
    pub fn define_label(&mut self, label: &str) -> Result<(), CodegenError> {
        if self.labels.contains_key(label) {
            return Err(CodegenError::DuplicateLabel {
                label: label.to_string(),
            });
        }
        self.labels.insert(label.to_string(), self.instructions.len());
        Ok(())
    }

    /// Byte address of every instruction; the final entry is the code size.
    pub fn addresses(&self) -> Vec<usize> {
        let mut addresses = Vec::with_capacity(self.instructions.len() + 1);
        let mut address = 0;
        for instruction in &self.instructions {
            addresses.push(address);
            address += instruction.encoded_len();
        }
        addresses.push(address);
        addresses
    }

    /// Patches every pending operand and encodes the stream.
    pub fn resolve(&self) -> Result<Resolved, CodegenError> {
        let addresses = self.addresses();
        let label_addresses: IndexMap<String, usize> = self
            .labels
            .iter()
            .map(|(name, index)| (name.clone(), addresses[*index]))
            .collect();

        let mut instructions = self.instructions.clone();
        for pending in &self.pending {
            let target = *label_addresses
                .get(&pending.label)
                .ok_or_else(|| CodegenError::unresolved(&pending.label))?;
            let source = addresses[pending.instruction];
            let offset = i32::try_from(target as i64 - source as i64).map_err(|_| {
                CodegenError::JumpOutOfRange {
                    from: source,
                    to: target,
                }
            })?;
            let instruction = instructions
                .get_mut(pending.instruction)
                .ok_or_else(|| CodegenError::internal("pending label past end of code"))?;
            let field = instruction
                .operand
                .get_mut(pending.operand_offset..pending.operand_offset + 4)
                .ok_or_else(|| CodegenError::internal("jump operand too short"))?;
            field.copy_from_slice(&offset.to_le_bytes());
            trace!(label = %pending.label, source, target, offset, "patched");
        }

        let size = addresses.last().copied().unwrap_or(0);
        let mut bytecode = Vec::with_capacity(size);
        for instruction in &instructions {
            instruction.encode_into(&mut bytecode);
        }

        Ok(Resolved {
            bytecode,
            addresses,
            label_addresses,
        })
    }
}

/// Reads the little-endian jump offset of an encoded jump operand.
pub fn jump_offset(operand: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = operand.get(..4)?.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}
