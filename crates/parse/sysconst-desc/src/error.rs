//! Error types for definition loading.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::lexer::Span;

/// A syntax error at a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self { span, message: message.into() }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Errors that can occur while loading a definition directory.
#[derive(Debug)]
pub enum DescError {
    /// I/O error reading the directory or a definition file.
    Io { path: PathBuf, source: io::Error },
    /// One or more files failed to parse. Every error found is reported.
    Parse(Vec<ParseError>),
    /// The directory contains no definition files.
    Empty(PathBuf),
}

impl fmt::Display for DescError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse(errors) => {
                for (i, e) in errors.iter().enumerate() {
                    if i != 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            Self::Empty(dir) => write!(f, "no definition files found in {}", dir.display()),
        }
    }
}

impl std::error::Error for DescError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
