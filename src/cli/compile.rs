//! The `compile` subcommand: decode a [`super::CompileRequest`], run
//! [`crate::compile`]/[`crate::compile_with_projection`], and hand back the
//! resulting pipeline (optionally alongside diagnostics, §6.2's
//! `compile_report`).

use crate::convert::DefaultMathConverter;
use crate::error::Diagnostic;
use crate::pipeline::Pipeline;

use super::{parse_compile_request, CliError};

#[derive(Debug, Clone, Default)]
pub struct CompileCliOptions {
    /// Raw JSON request body (see [`super::request::parse_compile_request`]).
    pub request: serde_json::Value,
    /// Append the annotations stage built from `projectionFields` (§4.8).
    pub with_projection: bool,
    /// Return diagnostics alongside the pipeline (§6.2's `compile_report`).
    pub report: bool,
}

#[derive(Debug)]
pub enum CompileCliResult {
    Pipeline(Pipeline),
    Report { pipeline: Pipeline, diagnostics: Vec<Diagnostic> },
}

pub fn execute_compile(options: &CompileCliOptions) -> Result<CompileCliResult, CliError> {
    let request = parse_compile_request(&options.request)?;
    let converter = DefaultMathConverter::new();

    if options.report {
        let report = crate::pipeline::compile_report(
            &request.tree,
            &request.schema,
            &request.config,
            &request.arithmetic_vars,
            &request.list_vars,
            &converter,
        );
        return Ok(CompileCliResult::Report {
            pipeline: report.pipeline,
            diagnostics: report.diagnostics,
        });
    }

    let pipeline = if options.with_projection && !request.projection_fields.is_empty() {
        crate::pipeline::compile_with_projection(
            &request.tree,
            &request.schema,
            &request.config,
            &request.arithmetic_vars,
            &request.list_vars,
            &converter,
            &request.projection_fields,
        )
    } else {
        crate::pipeline::compile(
            &request.tree,
            &request.schema,
            &request.config,
            &request.arithmetic_vars,
            &request.list_vars,
            &converter,
        )
    };

    Ok(CompileCliResult::Pipeline(pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_a_trivial_request_into_a_pipeline() {
        let options = CompileCliOptions {
            request: json!({
                "filters": {"id": "c1", "kind": "condition", "field": "ra", "operator": "=", "value": 10},
            }),
            with_projection: false,
            report: false,
        };
        let result = execute_compile(&options).unwrap();
        match result {
            CompileCliResult::Pipeline(pipeline) => {
                assert_eq!(pipeline[0], json!({"$match": {"ra": {"$eq": 10}}}));
            }
            other => panic!("expected Pipeline, got {other:?}"),
        }
    }

    #[test]
    fn report_mode_surfaces_an_unknown_operator_diagnostic() {
        let options = CompileCliOptions {
            request: json!({
                "filters": {"id": "c1", "kind": "condition", "field": "ra", "operator": "smells-like", "value": 10},
            }),
            with_projection: false,
            report: true,
        };
        let result = execute_compile(&options).unwrap();
        match result {
            CompileCliResult::Report { diagnostics, .. } => {
                assert!(diagnostics
                    .iter()
                    .any(|d| matches!(d, Diagnostic::UnknownOperator { .. })));
            }
            other => panic!("expected Report, got {other:?}"),
        }
    }
}
