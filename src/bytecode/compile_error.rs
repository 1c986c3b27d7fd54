use thiserror::Error;

use crate::diagnostics::{Diagnostic, Phase};
use crate::lang::node::Position;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// A jump references a label that was never defined. Always a compiler
    /// defect.
    #[error("internal error: unresolved label '{label}'")]
    UnresolvedLabel { label: String },

    #[error("internal error: label '{label}' defined twice")]
    DuplicateLabel { label: String },

    #[error("function '{function}' needs {depth} stack slots, limit is {limit}")]
    StackTooDeep {
        function: String,
        depth: usize,
        limit: usize,
    },

    #[error("function '{function}' uses {count} locals, at most 255 are addressable")]
    TooManyLocals { function: String, count: usize },

    #[error("memory access at offset {offset} exceeds the {limit}-byte memory limit")]
    MemoryOutOfBounds {
        offset: String,
        limit: u64,
        pos: Position,
    },

    #[error("case body changes the stack depth by {delta}")]
    UnbalancedCase { delta: i64, pos: Position },

    #[error("jump from {from} to {to} does not fit a 32-bit offset")]
    JumpOutOfRange { from: usize, to: usize },

    #[error("'{name}' cannot be compiled: {reason}")]
    Unsupported {
        name: String,
        reason: String,
        pos: Position,
    },

    #[error("function '{function}': invalid transition {from} -> {to}")]
    InvalidState {
        function: String,
        from: String,
        to: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CodegenError {
    pub fn unresolved(label: impl Into<String>) -> Self {
        CodegenError::UnresolvedLabel {
            label: label.into(),
        }
    }

    pub fn unsupported(name: &str, reason: impl Into<String>, pos: Position) -> Self {
        CodegenError::Unsupported {
            name: name.to_string(),
            reason: reason.into(),
            pos,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CodegenError::Internal(msg.into())
    }

    /// Source position, when the error is tied to one.
    pub fn position(&self) -> Option<Position> {
        match self {
            CodegenError::MemoryOutOfBounds { pos, .. }
            | CodegenError::UnbalancedCase { pos, .. }
            | CodegenError::Unsupported { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(
            Phase::Codegen,
            self.to_string(),
            self.position().unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_label_display() {
        let err = CodegenError::unresolved("if_3_end");
        let msg = err.to_string();
        assert!(msg.contains("unresolved label"));
        assert!(msg.contains("if_3_end"));
    }

    #[test]
    fn test_resource_errors_display() {
        let err = CodegenError::StackTooDeep {
            function: "main".to_string(),
            depth: 9,
            limit: 4,
        };
        assert_eq!(err.to_string(), "function 'main' needs 9 stack slots, limit is 4");

        let err = CodegenError::TooManyLocals {
            function: "f".to_string(),
            count: 300,
        };
        assert!(err.to_string().contains("300 locals"));
    }

    #[test]
    fn test_diagnostic_carries_position() {
        let pos = Position {
            line: 4,
            column: 2,
            offset: 30,
        };
        let err = CodegenError::MemoryOutOfBounds {
            offset: "70000".to_string(),
            limit: 1024,
            pos,
        };
        let diag = err.to_diagnostic();
        assert_eq!((diag.line, diag.column), (4, 2));
        assert_eq!(diag.phase, Phase::Codegen);
        assert!(diag.message.contains("70000"));

        let diag = CodegenError::internal("boom").to_diagnostic();
        assert_eq!((diag.line, diag.column), (0, 0));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CodegenError::internal("test");
        let _: &dyn std::error::Error = &err;
    }
}
