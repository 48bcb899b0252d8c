//! Decodes the CLI's wire request — a single JSON object bundling the
//! filter tree, schema, and variable catalogs §6.2's `compile` takes as
//! separate typed arguments. This bridging is a CLI-only concern: the
//! library surface itself takes the typed model, not raw JSON for every
//! argument.

use std::collections::HashMap;

use serde_json::Value;

use crate::model::{
    parse_arithmetic_variable, parse_list_variable, parse_node, parse_schema, ArithmeticVariable, CompilerConfig,
    ListVariable, Node, OpTag, Schema,
};
use crate::pipeline::ProjectionField;

use super::CliError;

pub struct CompileRequest {
    pub tree: Node,
    pub schema: Schema,
    pub config: CompilerConfig,
    pub arithmetic_vars: Vec<ArithmeticVariable>,
    pub list_vars: Vec<ListVariable>,
    pub projection_fields: Vec<ProjectionField>,
}

/// Parses `{ filters, schema?, config?, arithmeticVariables?, listVariables?,
/// projectionFields? }`. Only `filters` is required; every other key
/// defaults to empty, matching the library's own defaults.
pub fn parse_compile_request(raw: &Value) -> Result<CompileRequest, CliError> {
    let map = raw.as_object().ok_or(CliError::MalformedRequest("request body must be a JSON object"))?;

    let filters_raw = map.get("filters").ok_or(CliError::MalformedRequest("missing 'filters'"))?;
    let config = map
        .get("config")
        .map(CompilerConfig::from_overrides)
        .unwrap_or_default();
    let aliases: HashMap<String, OpTag> = config.operator_aliases.clone();

    let tree = parse_node(filters_raw, &aliases).map_err(CliError::Model)?;

    let schema = map.get("schema").map(parse_schema).unwrap_or_default();

    let arithmetic_vars = map
        .get("arithmeticVariables")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_arithmetic_variable).collect())
        .unwrap_or_default();

    let list_vars = map
        .get("listVariables")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| parse_list_variable(v, &aliases)).collect())
        .unwrap_or_default();

    let projection_fields = map
        .get("projectionFields")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_projection_field).collect())
        .unwrap_or_default();

    Ok(CompileRequest {
        tree,
        schema,
        config,
        arithmetic_vars,
        list_vars,
        projection_fields,
    })
}

/// `{ field, type: "include"|"exclude"|"round", decimals? }` (§4.8's
/// annotation path).
fn parse_projection_field(raw: &Value) -> Option<ProjectionField> {
    let map = raw.as_object()?;
    let field = map.get("field").and_then(Value::as_str)?.to_string();
    match map.get("type").and_then(Value::as_str).unwrap_or("include") {
        "exclude" => Some(ProjectionField::Exclude(field)),
        "round" => {
            let decimals = map.get("decimals").and_then(Value::as_u64).map(|n| n as u32);
            Some(ProjectionField::Round(field, decimals))
        }
        _ => Some(ProjectionField::Include(field)),
    }
}
