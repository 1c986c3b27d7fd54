//! # IR language model
//!
//! Syntax tree, literal values, the built-in registry and type descriptors.
//! The tree is produced by the parser, rewritten by the normalizer and the
//! optimizer, and consumed by the analyzer and the code generator.
//!
//! ## Conventions
//!
//! - Every node carries the `Position` of the token that starts it.
//! - Built-in names are ordinary identifiers in the tree; `builtins::lookup`
//!   decides whether a call is a built-in.

pub mod builtins;
pub mod literal;
pub mod node;
pub mod types;
