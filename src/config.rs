use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lang::types::{TypeDeclaration, TypeError, TypeTable};

/// Target machine versions the code generator can emit for.
pub const SUPPORTED_TARGETS: &[&str] = &["neo3", "neo3.5", "neo3.6"];

/// Highest supported optimization level.
pub const MAX_OPTIMIZATION_LEVEL: u8 = 3;

/// Smallest memory that still holds one full-word access.
pub const MIN_MEMORY_BYTES: u64 = 32;

/// Options recognized by the compiler.
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// 0 = no transformation, 3 = everything.
    pub optimization_level: u8,
    pub target_version: String,
    /// Emit run-time offset checks for memory built-ins.
    pub enable_bounds_checking: bool,
    /// Attach source maps, function ranges and variable locations.
    pub enable_debug_info: bool,
    /// Evaluation stack ceiling per function.
    pub max_stack_depth: usize,
    /// Size of the emulated linear memory.
    pub memory_limit_bytes: u64,
    /// Structural types annotations may name besides the primitives.
    pub types: Vec<TypeDeclaration>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            optimization_level: 1,
            target_version: SUPPORTED_TARGETS[0].to_string(),
            enable_bounds_checking: true,
            enable_debug_info: false,
            max_stack_depth: 2048,
            memory_limit_bytes: 1 << 20,
            types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("optimization level {0} is not supported (expected 0..={max})", max = MAX_OPTIMIZATION_LEVEL)]
    UnsupportedLevel(u8),
    #[error("target version '{0}' is not supported (expected one of: {targets})", targets = SUPPORTED_TARGETS.join(", "))]
    UnsupportedTarget(String),
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("memory limit of {0} bytes is below one word ({min} bytes)", min = MIN_MEMORY_BYTES)]
    MemoryTooSmall(u64),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CompilerOptions {
    pub fn with_level(mut self, level: u8) -> Self {
        self.optimization_level = level;
        self
    }

    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.enable_debug_info = enabled;
        self
    }

    pub fn with_bounds_checking(mut self, enabled: bool) -> Self {
        self.enable_bounds_checking = enabled;
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_type(mut self, declaration: TypeDeclaration) -> Self {
        self.types.push(declaration);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.optimization_level > MAX_OPTIMIZATION_LEVEL {
            return Err(ConfigError::UnsupportedLevel(self.optimization_level));
        }
        if !SUPPORTED_TARGETS.contains(&self.target_version.as_str()) {
            return Err(ConfigError::UnsupportedTarget(self.target_version.clone()));
        }
        if self.max_stack_depth == 0 {
            return Err(ConfigError::ZeroLimit("max_stack_depth"));
        }
        if self.memory_limit_bytes < MIN_MEMORY_BYTES {
            return Err(ConfigError::MemoryTooSmall(self.memory_limit_bytes));
        }
        TypeTable::with_declarations(&self.types)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let options = CompilerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.target_version, "neo3");
    }

    #[test]
    fn test_rejects_level_above_three() {
        let options = CompilerOptions::default().with_level(4);
        assert_eq!(options.validate(), Err(ConfigError::UnsupportedLevel(4)));
        assert!(options.validate().unwrap_err().to_string().contains("0..=3"));
    }

    #[test]
    fn test_rejects_unknown_target() {
        let options = CompilerOptions {
            target_version: "evm".to_string(),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("neo3.5"));
    }

    #[test]
    fn test_rejects_zero_limits() {
        assert_eq!(
            CompilerOptions::default().with_max_stack_depth(0).validate(),
            Err(ConfigError::ZeroLimit("max_stack_depth"))
        );
        assert_eq!(
            CompilerOptions::default().with_memory_limit(0).validate(),
            Err(ConfigError::MemoryTooSmall(0))
        );
    }

    #[test]
    fn test_memory_must_hold_one_word() {
        assert_eq!(
            CompilerOptions::default().with_memory_limit(31).validate(),
            Err(ConfigError::MemoryTooSmall(31))
        );
        assert!(CompilerOptions::default().with_memory_limit(32).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_type_declaration() {
        let options = CompilerOptions::default().with_type(TypeDeclaration::Array {
            name: "bool".to_string(),
            element: "u256".to_string(),
            length: 2,
        });
        assert_eq!(
            options.validate(),
            Err(ConfigError::Type(TypeError::Duplicate("bool".to_string())))
        );
    }

    #[test]
    fn test_postcard_roundtrip() {
        let options = CompilerOptions::default().with_level(3).with_debug_info(true);
        let bytes = postcard::to_allocvec(&options).unwrap();
        let back: CompilerOptions = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, options);
    }
}
