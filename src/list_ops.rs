//! C8 — list-variable compilation: turns a named array reduction
//! (`filter`/`any`/`all`/`min`/`max`/`avg`/`sum`, §4.5) into the aggregation
//! expression that computes it, for use as the right-hand side of a
//! `$project` field.

use serde_json::{json, Value};

use crate::block;
use crate::model::{Condition, ListCondition, ListVariable, Node, OpTag, PredicateValue, Schema};
use crate::predicate::{self, Context, VarCatalog};

pub fn compile_list_variable(var: &ListVariable, schema: &Schema, vars: VarCatalog) -> Value {
    compile_list_condition(&var.condition, schema, vars)
}

/// Builds the `ListCondition` a reduction-operator `Condition` implies,
/// mapping whichever shape its `value` arrived in (§3: a nested sub-tree for
/// `filter`/`any`/`all`, an explicit-comparator `ArrayTest` for aggregations,
/// or a bare scalar for the "missing inner block" per-element equality case).
fn list_condition_from_condition(cond: &Condition) -> ListCondition {
    match &cond.value {
        PredicateValue::Nested(node) => ListCondition {
            field: cond.field.clone(),
            operator: cond.operator.clone(),
            sub_field: None,
            inner: Some(PredicateValue::Nested(node.clone())),
            comparison_operator: None,
            comparison_value: None,
            boolean_switch: cond.boolean_switch,
        },
        PredicateValue::ArrayTest {
            field,
            sub_field,
            value,
            comparison,
            comparison_value,
        } => ListCondition {
            field: if field.is_empty() { cond.field.clone() } else { field.clone() },
            operator: cond.operator.clone(),
            sub_field: sub_field.clone(),
            inner: Some((**value).clone()),
            comparison_operator: comparison.clone(),
            comparison_value: comparison_value.clone(),
            boolean_switch: cond.boolean_switch,
        },
        scalar => ListCondition {
            field: cond.field.clone(),
            operator: cond.operator.clone(),
            sub_field: None,
            inner: Some(scalar.clone()),
            comparison_operator: None,
            comparison_value: None,
            boolean_switch: cond.boolean_switch,
        },
    }
}

fn comparator_expr(op: &OpTag, lhs: Value, rhs: Value) -> Value {
    let key = match op {
        OpTag::Eq => "$eq",
        OpTag::Ne => "$ne",
        OpTag::Lt => "$lt",
        OpTag::Le => "$lte",
        OpTag::Gt => "$gt",
        OpTag::Ge => "$gte",
        _ => "$eq",
    };
    json!({ key: [lhs, rhs] })
}

/// Compiles a reduction-operator `Condition` (one of §3's list-reduction
/// `OpTag`s appearing directly as a condition's operator, as opposed to a
/// list *variable* invocation) into a standalone boolean expression fragment
/// — never wrapped in `$expr` here; the caller (`block.rs`) wraps it exactly
/// once when the fragment lands at the top of a `$match` stage (§4.5,
/// scenario 4).
pub fn compile_reduction_condition(cond: &Condition, schema: &Schema, vars: VarCatalog) -> Value {
    let lc = list_condition_from_condition(cond);
    match cond.operator {
        OpTag::Filter => {
            let filtered = compile_list_condition(&lc, schema, vars);
            json!({ "$gt": [{ "$size": filtered }, 0] })
        }
        OpTag::AnyElementTrue | OpTag::AllElementsTrue => {
            let reduction = compile_list_condition(&lc, schema, vars);
            if cond.boolean_switch == Some(false) {
                json!({ "$not": [reduction] })
            } else {
                reduction
            }
        }
        OpTag::Min | OpTag::Max | OpTag::Avg | OpTag::Sum => {
            let agg = compile_list_condition(&lc, schema, vars);
            match (&lc.comparison_operator, &lc.comparison_value) {
                (Some(op), Some(val)) => comparator_expr(op, agg, val.clone()),
                _ => json!({ "$gt": [agg, 0] }),
            }
        }
        _ => json!(true),
    }
}

/// §6.3: "Array-element scans always guard inputs with `$ifNull:[<arr>, []]`"
/// — a missing array field must scan as empty, never null-propagate the whole
/// reduction.
fn guarded_input(field: &str) -> Value {
    json!({ "$ifNull": [format!("${field}"), []] })
}

pub fn compile_list_condition(lc: &ListCondition, schema: &Schema, vars: VarCatalog) -> Value {
    let inner = compile_inner(lc, schema, vars);

    match lc.operator {
        OpTag::Filter => json!({
            "$filter": { "input": guarded_input(&lc.field), "cond": inner }
        }),
        OpTag::AnyElementTrue | OpTag::AllElementsTrue => {
            let mapped = json!({ "$map": { "input": guarded_input(&lc.field), "in": inner } });
            let op = if lc.operator == OpTag::AnyElementTrue {
                "$anyElementTrue"
            } else {
                "$allElementsTrue"
            };
            json!({ op: mapped })
        }
        OpTag::Min | OpTag::Max | OpTag::Avg | OpTag::Sum => {
            let op = match lc.operator {
                OpTag::Min => "$min",
                OpTag::Max => "$max",
                OpTag::Avg => "$avg",
                OpTag::Sum => "$sum",
                _ => unreachable!(),
            };
            // §4.5: "compute {op: \"$A.s\"}" — the dotted path alone, no
            // explicit $map: the accumulator flattens across the array of
            // sub-documents the same way Mongo's own dotted-path addressing
            // does for an array of objects.
            let source = match &lc.sub_field {
                Some(sub) => json!(format!("${}.{}", lc.field, sub)),
                None => json!(format!("${}", lc.field)),
            };
            json!({ op: source })
        }
        _ => json!(true),
    }
}

/// The per-element predicate a reduction applies, compiled in the
/// [`Context::ArrayScan`] where `$$this` names the element under scan.
fn compile_inner(lc: &ListCondition, schema: &Schema, vars: VarCatalog) -> Value {
    if let Some(inner) = &lc.inner {
        return match inner {
            PredicateValue::Nested(node) => {
                let relative = strip_scanned_array_prefix(node, &lc.field);
                block::compile_node(&relative, Context::ArrayScan, schema, vars)
            }
            scalar => {
                let field = lc.sub_field.clone().unwrap_or_default();
                let op = lc.comparison_operator.clone().unwrap_or(OpTag::Eq);
                let value = scalar.as_scalar().cloned().unwrap_or(Value::Null);
                let fake = Condition {
                    id: String::new(),
                    field,
                    operator: op,
                    value: PredicateValue::Scalar(value),
                    boolean_switch: lc.boolean_switch,
                };
                predicate::compile_condition(&fake, Context::ArrayScan, schema)
            }
        };
    }

    if let (Some(op), Some(value)) = (lc.comparison_operator.clone(), lc.comparison_value.clone()) {
        let field = lc.sub_field.clone().unwrap_or_default();
        let fake = Condition {
            id: String::new(),
            field,
            operator: op,
            value: PredicateValue::Scalar(value),
            boolean_switch: lc.boolean_switch,
        };
        return predicate::compile_condition(&fake, Context::ArrayScan, schema);
    }

    json!(true)
}

/// §"Field paths referencing the array being scanned lose their array
/// prefix and become `$this.<sub>`": a reduction body's own conditions were
/// authored against the document's full paths (`candidates.fwhm`), but once
/// inside the scan every field is relative to the scanned element, so the
/// array's own field name is stripped from any condition field that starts
/// with it before the body is compiled.
fn strip_scanned_array_prefix(node: &Node, array_field: &str) -> Node {
    match node {
        Node::Block(b) => {
            let mut rewritten = b.clone();
            rewritten.children = b.children.iter().map(|c| strip_scanned_array_prefix(c, array_field)).collect();
            Node::Block(rewritten)
        }
        Node::Condition(c) => {
            let mut rewritten = c.clone();
            rewritten.field = relative_field(&c.field, array_field);
            rewritten.value = strip_value_prefix(&c.value, array_field);
            Node::Condition(rewritten)
        }
    }
}

fn relative_field(field: &str, array_field: &str) -> String {
    let prefix = format!("{array_field}.");
    field.strip_prefix(&prefix).map(str::to_string).unwrap_or_else(|| field.to_string())
}

fn strip_value_prefix(value: &PredicateValue, array_field: &str) -> PredicateValue {
    match value {
        PredicateValue::Nested(node) => PredicateValue::Nested(Box::new(strip_scanned_array_prefix(node, array_field))),
        PredicateValue::ArrayTest {
            field,
            sub_field,
            value,
            comparison,
            comparison_value,
        } => PredicateValue::ArrayTest {
            field: relative_field(field, array_field),
            sub_field: sub_field.clone(),
            value: Box::new(strip_value_prefix(value, array_field)),
            comparison: comparison.clone(),
            comparison_value: comparison_value.clone(),
        },
        other => other.clone(),
    }
}
