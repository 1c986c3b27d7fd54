use thiserror::Error;

/// A parsing error with source location.
///
/// `line` and `col` are 1-based positions coming from the lexer spans.
/// For errors at end of input the parser uses the last consumed token's span
/// so locations are never `0:0`.
#[derive(Debug, Clone, Error)]
#[error("{line}:{col}: {message}")]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}
