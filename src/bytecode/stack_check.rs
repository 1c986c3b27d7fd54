use thiserror::Error;

use crate::bytecode::op::Instruction;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stack-check error at instruction {index}: {message}")]
pub struct StackCheckError {
    pub message: String,
    /// Index of the offending instruction.
    pub index: usize,
}

/// Heights seen while scanning a straight-line slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackProfile {
    pub initial: usize,
    pub final_height: usize,
    pub max_height: usize,
}

impl StackProfile {
    pub fn net_effect(&self) -> i64 {
        self.final_height as i64 - self.initial as i64
    }
}

/// Sum of `pushes - pops` over a slice.
pub fn net_effect(instructions: &[Instruction]) -> i64 {
    instructions.iter().map(Instruction::net_effect).sum()
}

/// Check stack effects with a given initial stack height.
///
/// NOTE: This is a linear scan that doesn't follow jump targets. Each
/// instruction's recorded `pops`/`pushes` are trusted, so calls and
/// syscalls are checked with the effect codegen gave them.
pub fn check_with_initial(
    instructions: &[Instruction],
    initial: usize,
) -> Result<StackProfile, StackCheckError> {
    let mut height = initial;
    let mut max_height = initial;

    for (index, instruction) in instructions.iter().enumerate() {
        height = height
            .checked_sub(instruction.pops)
            .ok_or_else(|| StackCheckError {
                message: format!(
                    "stack underflow at index {}, op={}, needed {} items, had {}",
                    index, instruction.opcode, instruction.pops, height
                ),
                index,
            })?;
        height += instruction.pushes;
        max_height = max_height.max(height);
    }

    Ok(StackProfile {
        initial,
        final_height: height,
        max_height,
    })
}

/// Check stack effects starting from empty stack.
pub fn check(instructions: &[Instruction]) -> Result<StackProfile, StackCheckError> {
    check_with_initial(instructions, 0)
}
