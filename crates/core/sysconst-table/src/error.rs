//! Error types for constant tables.

use std::fmt;

/// Errors produced while building or parsing a [`ConstTable`](crate::ConstTable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The same architecture was added twice.
    DuplicateArch(String),
    /// A name was reported both resolved and undeclared for one architecture.
    Conflict {
        /// Constant name.
        name: String,
        /// Architecture that reported it both ways.
        arch: String,
    },
    /// Malformed serialized table.
    Syntax {
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateArch(arch) => write!(f, "architecture {arch} added twice"),
            Self::Conflict { name, arch } => {
                write!(f, "{name} is both resolved and undeclared on {arch}")
            }
            Self::Syntax { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl std::error::Error for TableError {}
