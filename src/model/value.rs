//! `PredicateValue` — the right-hand side of a [`crate::model::Condition`].

use super::node::Node;
use super::operator::OpTag;

/// The value carried by a condition or a [`crate::model::ListCondition`].
///
/// A scalar is the common case; `Range` backs `between`/`not between`;
/// `Nested` is a sub-tree, used by list-reduction conditions whose body is
/// itself a filter tree (§3); `ArrayTest` is the explicit-comparator form of
/// a list reduction.
#[derive(Debug, Clone)]
pub enum PredicateValue {
    Scalar(serde_json::Value),
    Range(serde_json::Value, serde_json::Value),
    Nested(Box<Node>),
    ArrayTest {
        field: String,
        sub_field: Option<String>,
        value: Box<PredicateValue>,
        comparison: Option<OpTag>,
        comparison_value: Option<serde_json::Value>,
    },
}

impl PredicateValue {
    /// The plain scalar, if this value is one — used by operators that never
    /// accept ranges or nested trees.
    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            PredicateValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}
