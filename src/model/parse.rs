//! Normalization pass from loose wire JSON into the sealed [`Node`] tree.
//!
//! The wire shape predates the sealed variants: some producers discriminate
//! nodes with `kind`, older ones with `type`, and at least one with
//! `category`. This module absorbs all three so nothing downstream ever has
//! to look at a string discriminator again.
//!
//! Per §7, a malformed condition (missing `field` or `operator` key) must not
//! abort the compile — it degrades to an always-empty predicate further down
//! the pipeline. So only the root call enforces that the input is at least a
//! JSON object; every recursive descent beneath that is infallible and
//! synthesizes an [`OpTag::Malformed`] condition in place of garbage.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::field::normalize_field;
use super::node::{Block, Condition, Logic, Node};
use super::operator::{resolve_operator, OpTag};
use super::value::PredicateValue;
use super::variable::{ArithmeticVariable, ListCondition, ListVariable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The root of the tree is not a JSON object at all.
    NotAnObject,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::NotAnObject => write!(f, "filter tree root is not a JSON object"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Parse a raw JSON node into the sealed tree, using the built-in operator
/// table plus any `config`-supplied aliases.
///
/// Only the root shape is enforced; malformed descendants are kept as inert
/// placeholder conditions rather than dropped, so sibling indices and ids
/// stay stable for diagnostics.
pub fn parse_node(raw: &Value, aliases: &HashMap<String, OpTag>) -> Result<Node, ModelError> {
    if !raw.is_object() {
        return Err(ModelError::NotAnObject);
    }
    Ok(parse_node_lenient(raw, aliases))
}

fn parse_node_lenient(raw: &Value, aliases: &HashMap<String, OpTag>) -> Node {
    let Some(map) = raw.as_object() else {
        return malformed_condition(String::new());
    };

    let id = map
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let discriminator = map
        .get("kind")
        .or_else(|| map.get("type"))
        .or_else(|| map.get("category"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    let is_block = matches!(discriminator.as_str(), "block" | "group")
        || (discriminator != "condition" && discriminator != "rule" && map.contains_key("children"));

    if is_block {
        parse_block(&id, map, aliases)
    } else {
        parse_condition(&id, map, aliases)
    }
}

fn parse_block(id: &str, map: &serde_json::Map<String, Value>, aliases: &HashMap<String, OpTag>) -> Node {
    let logic = match map.get("logic").and_then(Value::as_str).map(str::to_lowercase) {
        Some(ref s) if s == "or" => Logic::Or,
        _ => Logic::And,
    };
    let children = map
        .get("children")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(|c| parse_node_lenient(c, aliases)).collect())
        .unwrap_or_default();
    let custom_block_name = map
        .get("customBlockName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let is_true = map.get("isTrue").and_then(Value::as_bool);

    Node::Block(Block {
        id: id.to_string(),
        logic,
        children,
        custom_block_name,
        is_true,
    })
}

fn parse_condition(id: &str, map: &serde_json::Map<String, Value>, aliases: &HashMap<String, OpTag>) -> Node {
    let (Some(field_raw), Some(operator_raw)) = (map.get("field"), map.get("operator").and_then(Value::as_str))
    else {
        return malformed_condition(id.to_string());
    };

    let field = normalize_field(field_raw);
    let operator = resolve_operator(operator_raw, aliases);
    let value_raw = map.get("value").cloned().unwrap_or(Value::Null);
    let value = parse_predicate_value(&value_raw, &operator, aliases);
    let boolean_switch = map.get("booleanSwitch").and_then(Value::as_bool);

    Node::Condition(Condition {
        id: id.to_string(),
        field,
        operator,
        value,
        boolean_switch,
    })
}

fn malformed_condition(id: String) -> Node {
    Node::Condition(Condition {
        id,
        field: String::new(),
        operator: OpTag::Malformed,
        value: PredicateValue::Scalar(Value::Null),
        boolean_switch: None,
    })
}

/// A raw value is a nested sub-tree when it carries either a `children` array
/// or both a `field` and an `operator` key — i.e. it parses as a [`Node`] in
/// its own right, used for list-reduction conditions whose body is itself a
/// filter tree (§3).
fn looks_like_node(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("children") || (map.contains_key("field") && map.contains_key("operator"))
}

/// Parses `{ name, variable: "<name>=<mathExpr>" }` (§3) from wire JSON.
/// A missing `variable` string degrades to an empty expression rather than
/// erroring — the dependency analyzer will simply fail to parse it and log
/// a warning (§7 rule 2), not abort the whole catalog.
pub fn parse_arithmetic_variable(raw: &Value) -> Option<ArithmeticVariable> {
    let map = raw.as_object()?;
    let name = map.get("name").and_then(Value::as_str)?.to_string();
    let variable = map.get("variable").and_then(Value::as_str).unwrap_or_default();
    Some(ArithmeticVariable::from_variable_string(&name, variable))
}

/// Parses `{ field, operator, subField?, value?, comparisonOperator?,
/// comparisonValue?, booleanSwitch? }` (§3) — the body of a list variable or
/// an array-reduction condition's explicit-comparator form.
pub fn parse_list_condition(raw: &Value, aliases: &HashMap<String, OpTag>) -> ListCondition {
    let empty = serde_json::Map::new();
    let map = raw.as_object().unwrap_or(&empty);

    let field = map.get("field").map(normalize_field).unwrap_or_default();
    let operator = map
        .get("operator")
        .and_then(Value::as_str)
        .map(|s| resolve_operator(s, aliases))
        .unwrap_or(OpTag::Malformed);
    let sub_field = map.get("subField").map(normalize_field);
    let inner = map.get("value").map(|v| parse_predicate_value(v, &operator, aliases));
    let comparison_operator = map
        .get("comparisonOperator")
        .and_then(Value::as_str)
        .map(|s| resolve_operator(s, aliases));
    let comparison_value = map.get("comparisonValue").cloned();
    let boolean_switch = map.get("booleanSwitch").and_then(Value::as_bool);

    ListCondition {
        field,
        operator,
        sub_field,
        inner,
        comparison_operator,
        comparison_value,
        boolean_switch,
    }
}

/// Parses `{ name, listCondition: {...} }` (§3).
pub fn parse_list_variable(raw: &Value, aliases: &HashMap<String, OpTag>) -> Option<ListVariable> {
    let map = raw.as_object()?;
    let name = map.get("name").and_then(Value::as_str)?.to_string();
    let condition_raw = map.get("listCondition").cloned().unwrap_or(Value::Null);
    let condition = parse_list_condition(&condition_raw, aliases);
    Some(ListVariable { name, condition })
}

fn parse_predicate_value(raw: &Value, operator: &OpTag, aliases: &HashMap<String, OpTag>) -> PredicateValue {
    match raw {
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("array") => {
            let field = map.get("field").map(normalize_field).unwrap_or_default();
            let sub_field = map.get("subField").map(normalize_field);
            let inner_raw = map.get("value").cloned().unwrap_or(Value::Null);
            let comparison = map
                .get("comparison")
                .and_then(Value::as_str)
                .map(|s| resolve_operator(s, aliases));
            let comparison_value = map.get("comparisonValue").cloned();
            PredicateValue::ArrayTest {
                field,
                sub_field,
                value: Box::new(parse_predicate_value(&inner_raw, operator, aliases)),
                comparison,
                comparison_value,
            }
        }
        Value::Object(map) if looks_like_node(map) => {
            PredicateValue::Nested(Box::new(parse_node_lenient(raw, aliases)))
        }
        Value::Array(arr) if arr.len() == 2 && matches!(operator, OpTag::Between | OpTag::NotBetween) => {
            PredicateValue::Range(arr[0].clone(), arr[1].clone())
        }
        other => PredicateValue::Scalar(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_condition() {
        let raw = json!({"id": "c1", "kind": "condition", "field": "candidate.magpsf", "operator": "<", "value": 18.5});
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        let cond = node.as_condition().unwrap();
        assert_eq!(cond.field, "candidate.magpsf");
        assert_eq!(cond.operator, OpTag::Lt);
        assert_eq!(cond.value.as_scalar().unwrap(), &json!(18.5));
    }

    #[test]
    fn legacy_type_category_discriminator_resolves_to_block() {
        let raw = json!({"id": "b1", "type": "group", "logic": "OR", "children": []});
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        assert!(node.as_block().unwrap().logic == Logic::Or);
    }

    #[test]
    fn missing_operator_key_is_malformed_not_an_error() {
        let raw = json!({"id": "c2", "kind": "condition", "field": "foo"});
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        assert_eq!(node.as_condition().unwrap().operator, OpTag::Malformed);
    }

    #[test]
    fn unrecognized_operator_spelling_is_unknown_not_an_error() {
        let raw = json!({"id": "c3", "kind": "condition", "field": "foo", "operator": "smells-like"});
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        assert_eq!(
            node.as_condition().unwrap().operator,
            OpTag::Unknown("smells-like".to_string())
        );
    }

    #[test]
    fn two_element_array_is_range_only_for_between() {
        let raw = json!({"id": "c4", "kind": "condition", "field": "foo", "operator": "between", "value": [1, 10]});
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        match node.as_condition().unwrap().value {
            PredicateValue::Range(ref lo, ref hi) => {
                assert_eq!(lo, &json!(1));
                assert_eq!(hi, &json!(10));
            }
            ref other => panic!("expected Range, got {other:?}"),
        }
    }

    #[test]
    fn two_element_array_stays_scalar_for_in() {
        let raw = json!({"id": "c5", "kind": "condition", "field": "foo", "operator": "in", "value": [1, 10]});
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        assert!(matches!(
            node.as_condition().unwrap().value,
            PredicateValue::Scalar(_)
        ));
    }

    #[test]
    fn non_object_root_is_an_error() {
        let raw = json!([1, 2, 3]);
        assert_eq!(parse_node(&raw, &HashMap::new()), Err(ModelError::NotAnObject));
    }

    #[test]
    fn malformed_child_does_not_drop_siblings() {
        let raw = json!({
            "id": "root", "kind": "block", "logic": "and",
            "children": [
                {"id": "c1", "kind": "condition", "field": "a", "operator": "="},
                {"id": "c2", "kind": "condition", "field": "b", "operator": "=", "value": 1},
            ]
        });
        let node = parse_node(&raw, &HashMap::new()).unwrap();
        let children = &node.as_block().unwrap().children;
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].as_condition().unwrap().operator, OpTag::Malformed);
        assert_eq!(children[1].as_condition().unwrap().operator, OpTag::Eq);
    }
}
