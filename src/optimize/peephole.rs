//! Instruction-level peephole rewriting.
//!
//! A fixed table of patterns is applied left to right over the emitted
//! stream, one pass per rule in table order. Matches are greedy and never
//! overlap. A window is skipped when a label points into it past its first
//! instruction, so no jump target is ever rewritten away. Labels and
//! pending-label entries are remapped after each pass.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use crate::bytecode::assembly::Assembly;
use crate::bytecode::op::{Instruction, Op};
use crate::bytecode::stack_check::net_effect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpPattern {
    Exact(Op),
    /// Any integer or data push.
    AnyPush,
}

impl OpPattern {
    fn matches(self, instruction: &Instruction) -> bool {
        match self {
            OpPattern::Exact(op) => instruction.opcode == op,
            OpPattern::AnyPush => instruction.opcode.is_push(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// A fresh operand-less instruction.
    Emit(Op),
    /// The window's instruction at this offset with a new opcode. Operand and
    /// pending label are kept.
    Retarget(usize, Op),
}

#[derive(Debug, Clone, Copy)]
pub struct PeepholeRule {
    pub name: &'static str,
    pub pattern: &'static [OpPattern],
    pub replacement: &'static [Replacement],
    /// Minimum bytes saved per rewrite.
    pub savings: usize,
}

use OpPattern::{AnyPush, Exact};
use Replacement::{Emit, Retarget};

pub static RULES: &[PeepholeRule] = &[
    PeepholeRule {
        name: "push-drop",
        pattern: &[AnyPush, Exact(Op::Drop)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "dup-drop",
        pattern: &[Exact(Op::Dup), Exact(Op::Drop)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "swap-swap",
        pattern: &[Exact(Op::Swap), Exact(Op::Swap)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "invert-invert",
        pattern: &[Exact(Op::Invert), Exact(Op::Invert)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "add-zero",
        pattern: &[Exact(Op::Push0), Exact(Op::Add)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "mul-one",
        pattern: &[Exact(Op::Push1), Exact(Op::Mul)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "or-zero",
        pattern: &[Exact(Op::Push0), Exact(Op::Or)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "xor-zero",
        pattern: &[Exact(Op::Push0), Exact(Op::Xor)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "shl-zero",
        pattern: &[Exact(Op::Push0), Exact(Op::Shl)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "shr-zero",
        pattern: &[Exact(Op::Push0), Exact(Op::Shr)],
        replacement: &[],
        savings: 2,
    },
    PeepholeRule {
        name: "equal-zero",
        pattern: &[Exact(Op::Push0), Exact(Op::Equal)],
        replacement: &[Emit(Op::Not)],
        savings: 1,
    },
    PeepholeRule {
        name: "not-not-jmpif",
        pattern: &[Exact(Op::Not), Exact(Op::Not), Exact(Op::JmpIfL)],
        replacement: &[Retarget(2, Op::JmpIfL)],
        savings: 2,
    },
    PeepholeRule {
        name: "not-not-jmpifnot",
        pattern: &[Exact(Op::Not), Exact(Op::Not), Exact(Op::JmpIfNotL)],
        replacement: &[Retarget(2, Op::JmpIfNotL)],
        savings: 2,
    },
    PeepholeRule {
        name: "not-jmpifnot",
        pattern: &[Exact(Op::Not), Exact(Op::JmpIfNotL)],
        replacement: &[Retarget(1, Op::JmpIfL)],
        savings: 1,
    },
    PeepholeRule {
        name: "not-jmpif",
        pattern: &[Exact(Op::Not), Exact(Op::JmpIfL)],
        replacement: &[Retarget(1, Op::JmpIfNotL)],
        savings: 1,
    },
    PeepholeRule {
        name: "nz-jmpif",
        pattern: &[Exact(Op::Nz), Exact(Op::JmpIfL)],
        replacement: &[Retarget(1, Op::JmpIfL)],
        savings: 1,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeepholeStats {
    pub rewrites: usize,
    pub bytes_saved: usize,
    /// Rule name → rewrites.
    pub by_rule: IndexMap<&'static str, usize>,
}

/// Runs every rule of [`RULES`] once over `asm`.
pub fn optimize(asm: &mut Assembly) -> PeepholeStats {
    optimize_with(asm, RULES)
}

pub fn optimize_with(asm: &mut Assembly, rules: &[PeepholeRule]) -> PeepholeStats {
    let mut stats = PeepholeStats::default();
    for rule in rules {
        let before: usize = asm.instructions.iter().map(Instruction::encoded_len).sum();
        let hits = apply_rule(asm, rule);
        if hits > 0 {
            let after: usize = asm.instructions.iter().map(Instruction::encoded_len).sum();
            stats.rewrites += hits;
            stats.bytes_saved += before.saturating_sub(after);
            *stats.by_rule.entry(rule.name).or_default() += hits;
        }
    }
    stats
}

fn window_matches(rule: &PeepholeRule, window: &[Instruction]) -> bool {
    window.len() >= rule.pattern.len()
        && rule
            .pattern
            .iter()
            .zip(window)
            .all(|(pattern, instruction)| pattern.matches(instruction))
}

/// Instructions replacing a matched window, each with the window offset it
/// was retargeted from.
fn replacement(
    rule: &PeepholeRule,
    window: &[Instruction],
) -> (Vec<Instruction>, Vec<Option<usize>>) {
    rule.replacement
        .iter()
        .map(|replacement| match *replacement {
            Emit(op) => {
                let mut instruction = Instruction::new(op);
                instruction.source = window[0].source;
                (instruction, None)
            }
            Retarget(k, op) => {
                let mut instruction = window[k].clone();
                instruction.opcode = op;
                (instruction, Some(k))
            }
        })
        .unzip()
}

/// One left-to-right pass of `rule`. Returns the number of rewrites.
fn apply_rule(asm: &mut Assembly, rule: &PeepholeRule) -> usize {
    let width = rule.pattern.len();
    let old = std::mem::take(&mut asm.instructions);
    let targets: HashSet<usize> = asm.labels.values().copied().collect();

    let mut out = Vec::with_capacity(old.len());
    // old index → index of the instruction now standing in its place
    let mut remap = vec![0; old.len() + 1];
    // old index → new index of that same instruction, if it survived
    let mut moved: Vec<Option<usize>> = vec![None; old.len()];
    let mut hits = 0;

    let mut i = 0;
    while i < old.len() {
        let labelled_inside = (1..width).any(|k| targets.contains(&(i + k)));
        let rewrite = (!labelled_inside && window_matches(rule, &old[i..]))
            .then(|| replacement(rule, &old[i..i + width]))
            .filter(|(instructions, _)| {
                let balanced = net_effect(instructions) == net_effect(&old[i..i + width]);
                if !balanced {
                    trace!(rule = rule.name, at = i, "rewrite would change the stack effect");
                }
                balanced
            });
        if let Some((instructions, origins)) = rewrite {
            for slot in &mut remap[i..i + width] {
                *slot = out.len();
            }
            for (instruction, origin) in instructions.into_iter().zip(origins) {
                if let Some(k) = origin {
                    moved[i + k] = Some(out.len());
                }
                out.push(instruction);
            }
            trace!(rule = rule.name, at = i, "peephole");
            hits += 1;
            i += width;
        } else {
            remap[i] = out.len();
            moved[i] = Some(out.len());
            out.push(old[i].clone());
            i += 1;
        }
    }
    remap[old.len()] = out.len();

    asm.instructions = out;
    for index in asm.labels.values_mut() {
        *index = remap[*index];
    }
    asm.pending.retain_mut(|pending| match moved[pending.instruction] {
        Some(new) => {
            pending.instruction = new;
            true
        }
        None => false,
    });
    hits
}
