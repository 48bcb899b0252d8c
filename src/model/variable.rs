//! The two user-defined variable catalogs: arithmetic variables (per-document
//! scalar expressions in the math notation) and list variables (named array
//! reductions).

use super::operator::OpTag;
use super::value::PredicateValue;

/// `{ name, variable: "<name>=<mathExpr>" }` — the raw `variable` string is
/// kept as-is; splitting off the `name=` prefix and parsing the expression is
/// the dependency analyzer's job (§4.2), not this type's.
#[derive(Debug, Clone)]
pub struct ArithmeticVariable {
    pub name: String,
    pub expr: String,
}

impl ArithmeticVariable {
    /// Parse the wire form `"name=expr"`. If the string doesn't contain `=`,
    /// the whole string is treated as the expression and `name` is used
    /// verbatim as the variable's own name (mirrors §7 rule 2's "the
    /// variable is effectively treated as its own name" fallback).
    pub fn from_variable_string(name: &str, variable: &str) -> Self {
        let expr = match variable.split_once('=') {
            Some((_, rhs)) => rhs.trim().to_string(),
            None => variable.trim().to_string(),
        };
        ArithmeticVariable {
            name: name.to_string(),
            expr,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListCondition {
    pub field: String,
    pub operator: OpTag,
    pub sub_field: Option<String>,
    /// For `filter`: the inner filter tree. For `any`/`all` with a scalar
    /// body: `None`, and `scalar_value` below carries the per-element
    /// equality target (§4.5's "missing inner block with a scalar value").
    pub inner: Option<PredicateValue>,
    pub comparison_operator: Option<OpTag>,
    pub comparison_value: Option<serde_json::Value>,
    pub boolean_switch: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ListVariable {
    pub name: String,
    pub condition: ListCondition,
}
