use std::collections::HashMap;

use thiserror::Error;

use crate::bytecode::artifact::CompiledArtifact;
use crate::bytecode::assembly::jump_offset;
use crate::bytecode::op::{Instruction, Op, OperandSize};
use crate::lang::builtins::{self, Lowering, NOTIFY_SERVICE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisasmError {
    #[error("unknown opcode 0x{byte:02X} at {address:04}")]
    UnknownOpcode { byte: u8, address: usize },
    #[error("truncated operand for {opcode} at {address:04}")]
    Truncated { opcode: Op, address: usize },
}

/// Decodes a byte stream into `(address, instruction)` pairs.
///
/// Stack effects of call-site dependent opcodes are unknown after encoding
/// and decode as zero.
pub fn decode(bytecode: &[u8]) -> Result<Vec<(usize, Instruction)>, DisasmError> {
    let mut out = Vec::new();
    let mut address = 0;
    while address < bytecode.len() {
        let byte = bytecode[address];
        let opcode = Op::from_repr(byte).ok_or(DisasmError::UnknownOpcode { byte, address })?;
        let truncated = DisasmError::Truncated { opcode, address };
        let (start, len) = match opcode.operand_size() {
            OperandSize::None => (address + 1, 0),
            OperandSize::Fixed(n) => (address + 1, n),
            OperandSize::Prefixed => {
                let len = *bytecode.get(address + 1).ok_or(truncated.clone())?;
                (address + 2, len as usize)
            }
        };
        let operand = bytecode.get(start..start + len).ok_or(truncated)?;
        let instruction = Instruction::with_operand(opcode, operand.to_vec());
        let next = address + instruction.encoded_len();
        out.push((address, instruction));
        address = next;
    }
    Ok(out)
}

/// Host service name behind a syscall id, if it is one the compiler emits.
pub fn service_name(id: u32) -> Option<&'static str> {
    builtins::all()
        .iter()
        .filter_map(|b| match b.lowering {
            Lowering::Syscall { name, .. } => Some(name),
            _ => None,
        })
        .chain(std::iter::once(NOTIFY_SERVICE))
        .find(|name| builtins::syscall_id(name) == id)
}

fn jump_target(address: usize, instruction: &Instruction) -> Option<usize> {
    if !instruction.opcode.is_jump() {
        return None;
    }
    let offset = jump_offset(&instruction.operand)?;
    usize::try_from(address as i64 + offset as i64).ok()
}

fn collect_jump_targets(code: &[(usize, Instruction)]) -> Vec<usize> {
    let mut targets = Vec::new();
    for (address, instruction) in code {
        if let Some(target) = jump_target(*address, instruction) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

fn format_instruction(address: usize, instruction: &Instruction) -> String {
    let mnemonic = instruction.opcode.to_string();
    let operand = &instruction.operand;
    match instruction.opcode {
        op if op.is_jump() => match jump_offset(operand) {
            Some(offset) => {
                let target = address as i64 + offset as i64;
                let direction = if offset < 0 { "↑" } else { "↓" };
                format!("{:<11} {:+} {} (→ {:04})", mnemonic, offset, direction, target)
            }
            None => mnemonic,
        },
        Op::PushData1 => match std::str::from_utf8(operand) {
            Ok(text) if text.chars().all(|c| !c.is_control()) => {
                format!("{:<11} {:?}", mnemonic, text)
            }
            _ => format!("{:<11} 0x{}", mnemonic, hex(operand)),
        },
        Op::Syscall => {
            let id = jump_offset(operand).map(|v| v as u32).unwrap_or_default();
            match service_name(id) {
                Some(name) => format!("{:<11} 0x{:08X} ; {}", mnemonic, id, name),
                None => format!("{:<11} 0x{:08X}", mnemonic, id),
            }
        }
        Op::InitSlot => match operand.as_slice() {
            [locals, args] => format!("{:<11} {} local(s), {} arg(s)", mnemonic, locals, args),
            _ => mnemonic,
        },
        Op::LdLoc | Op::StLoc | Op::LdArg | Op::StArg => match operand.first() {
            Some(slot) => format!("{:<11} {}", mnemonic, slot),
            None => mnemonic,
        },
        _ => match instruction.push_value() {
            Some(value) if !operand.is_empty() => format!("{:<11} {}", mnemonic, value),
            _ => mnemonic,
        },
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Return disassembly as a String
pub fn disassemble_to_string(bytecode: &[u8]) -> Result<String, DisasmError> {
    let code = decode(bytecode)?;
    let jump_targets = collect_jump_targets(&code);
    let mut output = String::new();

    for (address, instruction) in &code {
        if jump_targets.contains(address) {
            output.push_str("      ┌──────────────────────────────────\n");
        }
        output.push_str(&format!("{:04} ", address));
        if jump_targets.contains(address) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }
        output.push_str(&format_instruction(*address, instruction));
        output.push('\n');
    }

    Ok(output)
}

/// Print disassembly of an artifact and its sub-objects
pub fn print_bc(artifact: &CompiledArtifact) {
    println!("════════════════════════════════════════");
    println!(" {} ({})", artifact.name, artifact.target_version);
    println!(" {} bytes", artifact.bytecode.len());
    println!("════════════════════════════════════════");
    for (name, address) in &artifact.entry_points {
        println!(" entry {:<20} @{:04}", name, address);
    }
    match disassemble_to_string(&artifact.bytecode) {
        Ok(text) => print!("{}", text),
        Err(e) => println!("<{}>", e),
    }
    println!();
    for sub in &artifact.sub_objects {
        print_bc(sub);
    }
}

/// Print bytecode statistics
pub fn print_bc_stats(artifact: &CompiledArtifact) {
    println!("=== BYTECODE STATISTICS ===\n");
    let code = match decode(&artifact.bytecode) {
        Ok(code) => code,
        Err(e) => {
            println!("<{}>", e);
            return;
        }
    };

    println!("Bytes:            {}", artifact.bytecode.len());
    println!("Instructions:     {}", code.len());
    println!("Methods:          {}", artifact.methods.len());
    println!("Max stack depth:  {}", artifact.max_stack_depth);
    println!();

    let mut op_counts: HashMap<String, usize> = HashMap::new();
    for (_, instruction) in &code {
        *op_counts.entry(instruction.opcode.to_string()).or_default() += 1;
    }

    println!("Op frequency:");
    let mut counts: Vec<_> = op_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (op, count) in counts {
        println!("  {:<12} {}", op, count);
    }
}
