//! CLI support for the query compiler: programmatic access to the same
//! operations `main.rs` exposes as subcommands, so the binary's logic stays
//! a thin wrapper and any embedding host can call the same functions
//! `main.rs` does.

mod compile;
mod request;
mod validate;

pub use compile::{execute_compile, CompileCliOptions, CompileCliResult};
pub use request::{parse_compile_request, CompileRequest};
pub use validate::{execute_validate, ValidateCliOptions};

use std::io;

/// Errors that can occur during CLI operations. Distinct from
/// [`crate::error::Diagnostic`]: a `Diagnostic` is a recoverable condition
/// the compiler logs and carries on past; a `CliError` is the CLI's own
/// "the request couldn't even be decoded" failure.
#[derive(Debug)]
pub enum CliError {
    MalformedRequest(&'static str),
    Model(crate::model::ModelError),
    Json(serde_json::Error),
    Io(io::Error),
    NoInput,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::MalformedRequest(reason) => write!(f, "malformed request: {reason}"),
            CliError::Model(e) => write!(f, "invalid filter tree: {e}"),
            CliError::Json(e) => write!(f, "invalid JSON: {e}"),
            CliError::Io(e) => write!(f, "IO error: {e}"),
            CliError::NoInput => write!(f, "no input provided. Use --input or pipe JSON to stdin."),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Model(e) => Some(e),
            CliError::Json(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}
