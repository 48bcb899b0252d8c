//! C11 — canonical textual rendering of a compiled [`crate::pipeline::Pipeline`]
//! (§6.2's `formatPipeline`).
//!
//! Hand-rolled in the style of a JSON printer kept in-house rather than
//! pulled off the shelf: a small recursive printer rather than reaching for
//! `serde_json::to_string_pretty`, so indentation and key ordering stay
//! under this crate's control instead of a library default. Object keys in
//! a [`serde_json::Value`] are already insertion/sorted-stable the way this
//! crate builds them (it never enables `preserve_order`, so `Map` is
//! `BTreeMap`-backed), which gives P10's "stable across runs, sorted keys"
//! property for free — this printer just has to render that order
//! faithfully, not impose one.

use serde_json::Value;

/// Pretty-prints a pipeline as a JSON array, 2-space indent per level.
pub fn format_pipeline(pipeline: &[Value]) -> String {
    print_array(pipeline, 0)
}

/// Pretty-prints an arbitrary JSON value in the same 2-space style —
/// used by the CLI for shapes that wrap a pipeline (e.g. `compile_report`'s
/// `{pipeline, diagnostics}`) rather than a bare stage array.
pub fn format_value(value: &Value) -> String {
    print_value(value, 0)
}

fn print_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", escape_string(s)),
        Value::Array(arr) => print_array(arr, indent),
        Value::Object(map) => print_object(map, indent),
    }
}

fn print_array(arr: &[Value], indent: usize) -> String {
    if arr.is_empty() {
        return "[]".to_string();
    }
    let inner = indentation(indent + 1);
    let items: Vec<String> = arr
        .iter()
        .map(|v| format!("{inner}{}", print_value(v, indent + 1)))
        .collect();
    format!("[\n{}\n{}]", items.join(",\n"), indentation(indent))
}

fn print_object(map: &serde_json::Map<String, Value>, indent: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }
    let inner = indentation(indent + 1);
    let items: Vec<String> = map
        .iter()
        .map(|(k, v)| format!("{inner}\"{}\": {}", escape_string(k), print_value(v, indent + 1)))
        .collect();
    format!("{{\n{}\n{}}}", items.join(",\n"), indentation(indent))
}

fn indentation(level: usize) -> String {
    "  ".repeat(level)
}

fn escape_string(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            '\n' => vec!['\\', 'n'],
            '\r' => vec!['\\', 'r'],
            '\t' => vec!['\\', 't'],
            c if c.is_control() => format!("\\u{:04x}", c as u32).chars().collect(),
            c => vec![c],
        })
        .collect()
}
