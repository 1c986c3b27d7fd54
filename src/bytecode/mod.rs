pub mod artifact;
pub mod assembly;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod op;
pub mod semantics;
pub mod stack_check;

pub use artifact::CompiledArtifact;
pub use assembly::Assembly;
pub use compile_error::CodegenError;
pub use op::{Instruction, Op};
