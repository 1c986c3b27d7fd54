//! Structured diagnostics shared by every stage.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::frontend::{LexerError, ParserError};
use crate::lang::node::Position;

/// Stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Config,
    Lexer,
    Parser,
    Normalizer,
    Analyzer,
    Optimizer,
    Codegen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(phase: Phase, message: impl Into<String>, pos: Position) -> Self {
        Self {
            phase,
            message: message.into(),
            line: pos.line,
            column: pos.column,
            severity: Severity::Error,
        }
    }

    pub fn warning(phase: Phase, message: impl Into<String>, pos: Position) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(phase, message, pos)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    /// `error[parser] 3:7: message`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {}:{}: {}",
            self.severity, self.phase, self.line, self.column, self.message
        )
    }
}

impl From<LexerError> for Diagnostic {
    fn from(err: LexerError) -> Self {
        Self {
            phase: Phase::Lexer,
            message: err.message,
            line: err.line,
            column: err.col,
            severity: Severity::Error,
        }
    }
}

impl From<ParserError> for Diagnostic {
    fn from(err: ParserError) -> Self {
        Self {
            phase: Phase::Parser,
            message: err.message,
            line: err.line,
            column: err.col,
            severity: Severity::Error,
        }
    }
}

/// Ordered collector of diagnostics for one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, phase: Phase, message: impl Into<String>, pos: Position) {
        self.push(Diagnostic::error(phase, message, pos));
    }

    pub fn warning(&mut self, phase: Phase, message: impl Into<String>, pos: Position) {
        self.push(Diagnostic::warning(phase, message, pos));
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| !d.is_error())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
