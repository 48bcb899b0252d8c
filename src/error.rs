//! Compile-time diagnostics. None of these ever abort a compile (§7): they
//! are collected and logged, and [`crate::compile_report`] hands the whole
//! list back to a caller that wants to surface them instead of just the
//! pipeline.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    MalformedCondition { id: String },
    UnknownOperator { id: String, operator: String },
    ConversionFailed { variable: String, reason: String },
    VariableCycle { variable: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedCondition { id } => write!(f, "condition '{id}' is missing a field or operator"),
            Diagnostic::UnknownOperator { id, operator } => {
                write!(f, "condition '{id}' uses unrecognized operator '{operator}'")
            }
            Diagnostic::ConversionFailed { variable, reason } => {
                write!(f, "variable '{variable}' failed to convert: {reason}")
            }
            Diagnostic::VariableCycle { variable } => {
                write!(f, "variable '{variable}' participates in a dependency cycle")
            }
        }
    }
}

impl std::error::Error for Diagnostic {}
