//! End-to-end tests: source text through the whole pipeline, then executed
//! on the reference machine.

use alloy_primitives::U256;

use crate::bytecode::CompiledArtifact;
use crate::bytecode::disasm::decode;
use crate::bytecode::op::Instruction;
use crate::config::CompilerOptions;
use crate::pipeline::compile;


mod properties;
mod scenarios;

use machine::{Execution, Machine};

pub(crate) fn options_at(level: u8) -> CompilerOptions {
    CompilerOptions::default().with_level(level)
}

/// Compiles `source` at `level`, panicking with every diagnostic on failure.
pub(crate) fn compile_at(source: &str, level: u8) -> CompiledArtifact {
    match compile(source, &options_at(level)) {
        Ok(compilation) => compilation.artifact,
        Err(failure) => {
            let messages: Vec<String> = failure.diagnostics.iter().map(|d| d.to_string()).collect();
            panic!("{} failed to compile:\n{}", source, messages.join("\n"))
        }
    }
}

pub(crate) fn instructions(artifact: &CompiledArtifact) -> Vec<Instruction> {
    decode(&artifact.bytecode)
        .expect("compiler emits decodable bytecode")
        .into_iter()
        .map(|(_, instruction)| instruction)
        .collect()
}

/// Runs the top-level code of `source` on a machine seeded with `storage`.
pub(crate) fn run_at(source: &str, level: u8, storage: &[(u64, U256)]) -> (Execution, Machine) {
    let artifact = compile_at(source, level);
    let mut machine = Machine::with_storage(storage.iter().map(|(k, v)| (U256::from(*k), *v)));
    let execution = machine.run(&artifact);
    (execution, machine)
}
