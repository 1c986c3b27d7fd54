//! `sirc`: compiles a Yul-style stack IR into bytecode for a NeoVM-style
//! stack machine.
//!
//! The pipeline is lexer → parser → normalizer → static analyzer →
//! optimizer → code generator (with peephole) → label resolution. The
//! [`pipeline::compile`] entry point runs all of it.

pub mod analysis;
pub mod bytecode;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod frontend;
pub mod lang;
pub mod normalize;
pub mod optimize;
pub mod pipeline;

#[cfg(test)]
mod tests;

pub use bytecode::CompiledArtifact;
pub use config::CompilerOptions;
pub use pipeline::{Compilation, CompileFailure, compile};
