//! The two-domain error type shared by the compiler and the VM.
//!
//! Loxide has exactly two failure domains (§7 of the design spec): a
//! compile-time domain, raised while parsing/emitting bytecode, and a
//! runtime domain, raised by the dispatch loop. Both carry a message that
//! has already been formatted for display (source location included where
//! relevant) — callers print it as-is and use the variant only to pick an
//! exit code.

use std::fmt;

/// A compile or runtime failure. The message is already formatted for
/// direct display; this type exists to let callers distinguish the two
/// domains (for exit-code selection) without re-parsing the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoxError {
    /// One or more compile errors were reported; the program was never run.
    Compile(String),
    /// A runtime error aborted an in-progress interpretation.
    Runtime(String),
}

impl fmt::Display for LoxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoxError::Compile(msg) | LoxError::Runtime(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LoxError {}
