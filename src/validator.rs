//! C10 — structural validation of an emitted pipeline (§4.10).
//!
//! This is a syntactic check only: it never inspects a schema or re-derives
//! the tree the pipeline came from, it just asks whether the wire shape
//! (§6.3) is internally consistent enough for a document database to accept
//! it. Per the second Open Question in §9, this implementation takes the
//! strict path rather than an "intentional laxness" one — an unknown stage
//! key is always rejected here, not just when its value happens to be null
//! or missing.

use serde_json::Value;

/// The only stage keys a pipeline this compiler emits may use (§6.3).
const KNOWN_STAGES: &[&str] = &[
    "$match",
    "$project",
    "$group",
    "$sort",
    "$limit",
    "$skip",
    "$lookup",
    "$unwind",
    "$addFields",
];

/// §4.10 / P6: a pipeline is valid iff it is a non-empty list of objects,
/// each with exactly one top-level key drawn from the known stage set, and
/// each stage's value passes the structural checks below.
pub fn is_valid_pipeline(pipeline: &[Value]) -> bool {
    !pipeline.is_empty() && pipeline.iter().all(is_valid_stage)
}

fn is_valid_stage(stage: &Value) -> bool {
    let Some(map) = stage.as_object() else {
        return false;
    };
    if map.len() != 1 {
        return false;
    }
    let (key, value) = map.iter().next().expect("len checked above");
    if !KNOWN_STAGES.contains(&key.as_str()) {
        return false;
    }

    match key.as_str() {
        "$match" | "$project" | "$addFields" => is_valid_document(value),
        "$group" => value.is_object() && value.as_object().is_some_and(|m| m.contains_key("_id")),
        "$sort" => value.is_object() && !value.as_object().unwrap().is_empty(),
        "$limit" | "$skip" => value.as_i64().is_some_and(|n| n >= 0),
        "$lookup" => value.is_object() && !value.as_object().unwrap().is_empty(),
        "$unwind" => matches!(value, Value::String(s) if !s.is_empty()) || value.is_object(),
        _ => unreachable!("filtered by KNOWN_STAGES above"),
    }
}

/// A `$match`/`$project`/`$addFields` value: non-empty object whose every
/// leaf recursively passes validation (§4.10).
fn is_valid_document(value: &Value) -> bool {
    match value.as_object() {
        Some(map) if !map.is_empty() => map.iter().all(|(k, v)| is_valid_field_name(k) && is_valid_value(v)),
        _ => false,
    }
}

fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
}

/// Recursively walks an operator document or expression tree, applying the
/// per-operator constraints §4.10 calls out wherever that operator's key
/// appears, at any depth.
fn is_valid_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().all(|(k, v)| is_valid_field_name(k) && obeys_operator_constraint(k, v) && is_valid_value(v)),
        Value::Array(arr) => arr.iter().all(is_valid_value),
        _ => true,
    }
}

fn obeys_operator_constraint(key: &str, value: &Value) -> bool {
    match key {
        "$in" | "$nin" => value.is_array(),
        "$size" => value.as_i64().is_some_and(|n| n >= 0),
        "$gt" | "$gte" | "$lt" | "$lte" => match value.as_array() {
            // The expression-operator form (Context B/C, §4.3): a two-element
            // array, at least one side of which must be a genuine comparable
            // literal rather than two bare field references compared against
            // each other with no anchor value.
            Some(arr) if arr.len() == 2 => arr.iter().any(is_comparable_literal),
            // The Context A match-operator form (`{field: {$gt: 5}}`) is a
            // bare scalar, not a two-element array — always fine.
            _ => true,
        },
        _ => true,
    }
}

/// A literal operand, as opposed to a field reference (`"$field"` /
/// `"$$this.field"`) or a nested expression object.
fn is_comparable_literal(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => !s.starts_with('$'),
        Value::Object(map) => map.len() == 1 && map.contains_key("$date"),
        _ => false,
    }
}
