//! CLI support for motif-lang
//!
//! Loads schema files into a catalog and runs source text through the
//! pipeline, for the `motif` binary and for embedding in other tools.

mod check;

pub use check::{Checked, CheckOptions, InputKind, execute_check, explain_schema_file, load_motif};

use crate::MotifError;
use std::io;
use std::path::PathBuf;

/// Errors that can occur during CLI operations
#[derive(Debug)]
pub enum CliError {
    /// Parse, bind or validation failure
    Motif(MotifError),
    /// A schema file that could not be loaded
    SchemaFile(PathBuf, MotifError),
    /// IO error
    Io(io::Error),
    /// No source text given and nothing on stdin
    NoInput,
    /// An expression or view with no schema to bind against
    NoSchema,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Motif(e) => write!(f, "error: {}", e),
            CliError::SchemaFile(path, e) => write!(f, "error in schema file {}: {}", path.display(), e),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::NoInput => write!(f, "No input provided. Pass source text or pipe it to stdin."),
            CliError::NoSchema => {
                write!(f, "No schema to bind against.\nUse --schema NAME or load one with --schema-file.")
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Motif(e) | CliError::SchemaFile(_, e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MotifError> for CliError {
    fn from(e: MotifError) -> Self {
        CliError::Motif(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}
