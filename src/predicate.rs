//! C6 — predicate compilation: turns a single [`Condition`] into its wire
//! JSON form, in one of three emission contexts (§"Three predicate-emission
//! contexts" in the design notes):
//!
//! - `Match` (A): a `$match`-stage query clause, bare field key, raw operator
//!   values (`{"field": {"$gt": 5}}`).
//! - `ArrayScan` (B): inside a `$filter`/`$map`/`$anyElementTrue` condition,
//!   where the scanned element is `$$this` and everything is `$expr`-shaped.
//! - `Projection` (C): a `$project`/`$expr` stage outside any array scan,
//!   where fields are absolute `$field` references.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::convert::{ConversionError, DbExpr, IdentResolver, MathConverter};
use crate::model::{Condition, OpTag, PredicateValue, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Match,
    ArrayScan,
    Projection,
}

/// Bundles the arithmetic-variable catalog and math converter the
/// "inlined-variable" path (§"'Inlined' variables" in the design notes)
/// needs once it's inside [`Context::ArrayScan`]. Threaded through the whole
/// condition-compiling call chain (`predicate`/`block`/`list_ops`) even
/// though `Context::Match`/`Context::Projection` never consult it, so every
/// compiling function shares one signature regardless of which context it's
/// asked to compile for.
#[derive(Clone, Copy)]
pub struct VarCatalog<'a> {
    pub arithmetic_exprs: &'a HashMap<String, String>,
    pub list_var_names: &'a HashSet<String>,
    pub converter: &'a dyn MathConverter,
}

impl<'a> VarCatalog<'a> {
    pub fn new(
        arithmetic_exprs: &'a HashMap<String, String>,
        list_var_names: &'a HashSet<String>,
        converter: &'a dyn MathConverter,
    ) -> Self {
        VarCatalog {
            arithmetic_exprs,
            list_var_names,
            converter,
        }
    }

    /// A catalog with no arithmetic variables or list variables at all —
    /// used wherever a condition is compiled in a context where inlining
    /// can never trigger (tests, or a projected-boolean's own definition).
    pub fn empty(converter: &'a dyn MathConverter) -> Self {
        VarCatalog {
            arithmetic_exprs: empty_exprs(),
            list_var_names: empty_names(),
            converter,
        }
    }
}

fn empty_exprs() -> &'static HashMap<String, String> {
    static EMPTY: std::sync::OnceLock<HashMap<String, String>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(HashMap::new)
}

fn empty_names() -> &'static HashSet<String> {
    static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(HashSet::new)
}

/// Resolves a bare identifier inside a math-notation expression according to
/// the emission context it was encountered in.
///
/// Outside an array scan, a reference to an already-dependency-layered
/// arithmetic variable is just a field reference (`$name`) — the projection
/// stage that defined it already ran. *Inside* an array scan (§"'Inlined'
/// variables" in the design notes) no projected name is reachable from
/// `$$this`'s scope, so the identifier must be inlined: the variable's own
/// expression text is recursively converted through this same resolver. A
/// `currently_inlining` guard turns a cyclic definition that slipped past
/// [`crate::dependency::DependencyGraph`] into a field-reference fallback
/// instead of a stack overflow (§7 rule 3's "the offending edge is skipped").
pub struct ContextResolver<'a> {
    pub ctx: Context,
    pub arithmetic_exprs: &'a HashMap<String, String>,
    pub list_var_names: &'a HashSet<String>,
    pub converter: &'a dyn MathConverter,
    currently_inlining: RefCell<HashSet<String>>,
}

impl<'a> ContextResolver<'a> {
    pub fn new(
        ctx: Context,
        arithmetic_exprs: &'a HashMap<String, String>,
        list_var_names: &'a HashSet<String>,
        converter: &'a dyn MathConverter,
    ) -> Self {
        ContextResolver {
            ctx,
            arithmetic_exprs,
            list_var_names,
            converter,
            currently_inlining: RefCell::new(HashSet::new()),
        }
    }
}

impl<'a> IdentResolver for ContextResolver<'a> {
    fn resolve(&self, name: &str) -> Result<DbExpr, ConversionError> {
        if self.list_var_names.contains(name) && self.ctx != Context::ArrayScan {
            return Err(ConversionError::ListVariableOutsideArrayContext(name.to_string()));
        }
        if self.ctx == Context::ArrayScan {
            if let Some(expr) = self.arithmetic_exprs.get(name) {
                if !self.currently_inlining.borrow_mut().insert(name.to_string()) {
                    log::warn!("cyclic variable dependency while inlining '{name}' in array scan");
                    return Ok(field_ref(name, self.ctx));
                }
                let result = self.converter.convert(expr, self);
                self.currently_inlining.borrow_mut().remove(name);
                return result;
            }
        }
        Ok(field_ref(name, self.ctx))
    }
}

fn field_ref(field: &str, ctx: Context) -> DbExpr {
    match ctx {
        Context::Match => DbExpr::FieldRef(field.to_string()),
        Context::ArrayScan => DbExpr::FieldRef(format!("$$this.{field}")),
        Context::Projection => DbExpr::FieldRef(format!("${field}")),
    }
}

fn raw_field_ref(field: &str, ctx: Context) -> Value {
    match ctx {
        Context::Match => json!(field),
        Context::ArrayScan => json!(format!("$$this.{field}")),
        Context::Projection => json!(format!("${field}")),
    }
}

fn escape_regex(literal: &str) -> String {
    regex::escape(literal)
}

/// §4.3: "Numeric string values are coerced to numbers when numeric-like" —
/// applies to Context A match values only; B/C already operate in expression
/// land where a string literal is never silently reinterpreted.
fn coerce_numeric_like(value: Value) -> Value {
    match &value {
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if !s.trim().is_empty() => json!(n),
            _ => value,
        },
        _ => value,
    }
}

/// Compiles a single condition. `schema` backs the boolean-equality rule
/// (P7): equality/inequality against a field the schema declares boolean
/// emits `$in`/`$nin` of a one-element array instead of `$eq`/`$ne`, in every
/// context, so a document where the field is missing (`null`) never compares
/// true against a boolean literal.
pub fn compile_condition(cond: &Condition, ctx: Context, schema: &Schema) -> Value {
    compile_condition_with_lhs(cond, ctx, schema, None)
}

/// Same as [`compile_condition`], but lets a caller supply the left-hand
/// operand explicitly instead of letting it default to the condition's own
/// field reference — the inlined-variable path (`block::compile_node`'s
/// `Context::ArrayScan` handling) uses this to substitute an arithmetic
/// variable's resolved expression for a bare `$$this.<field>` reference, per
/// the "Inlined" variables design note. `lhs_override` only matters outside
/// [`Context::Match`]; a condition's own field always names the `$match`
/// stage key regardless.
pub fn compile_condition_with_lhs(cond: &Condition, ctx: Context, schema: &Schema, lhs_override: Option<Value>) -> Value {
    if matches!(cond.operator, OpTag::Malformed) {
        return json!({});
    }

    let lhs = lhs_override.unwrap_or_else(|| raw_field_ref(&cond.field, ctx));

    if let OpTag::Unknown(_) = &cond.operator {
        return last_resort_equality(cond, ctx, lhs);
    }

    let scalar = cond.value.as_scalar();
    let boolean_site = schema.is_boolean(&cond.field);

    match &cond.operator {
        OpTag::Eq if boolean_site => {
            compare(cond, ctx, "$in", "$in", json!([scalar.cloned().unwrap_or(Value::Null)]), lhs)
        }
        OpTag::Ne if boolean_site => {
            not_in(cond, ctx, json!([scalar.cloned().unwrap_or(Value::Null)]), lhs)
        }
        OpTag::Eq => compare(cond, ctx, "$eq", "$eq", scalar.cloned().unwrap_or(Value::Null), lhs),
        OpTag::Ne => compare(cond, ctx, "$ne", "$ne", scalar.cloned().unwrap_or(Value::Null), lhs),
        OpTag::Lt => compare(cond, ctx, "$lt", "$lt", scalar.cloned().unwrap_or(Value::Null), lhs),
        OpTag::Le => compare(cond, ctx, "$lte", "$lte", scalar.cloned().unwrap_or(Value::Null), lhs),
        OpTag::Gt => compare(cond, ctx, "$gt", "$gt", scalar.cloned().unwrap_or(Value::Null), lhs),
        OpTag::Ge => compare(cond, ctx, "$gte", "$gte", scalar.cloned().unwrap_or(Value::Null), lhs),
        OpTag::In => compare(cond, ctx, "$in", "$in", scalar.cloned().unwrap_or(Value::Array(vec![])), lhs),
        OpTag::NotIn => not_in(cond, ctx, scalar.cloned().unwrap_or(Value::Array(vec![])), lhs),
        OpTag::Contains => regex_match(cond, ctx, scalar, RegexShape::Contains, lhs),
        OpTag::StartsWith => regex_match(cond, ctx, scalar, RegexShape::StartsWith, lhs),
        OpTag::EndsWith => regex_match(cond, ctx, scalar, RegexShape::EndsWith, lhs),
        OpTag::Exists => exists(cond, ctx, true, lhs),
        OpTag::NotExists => exists(cond, ctx, false, lhs),
        OpTag::IsNumber => is_number(ctx, lhs),
        OpTag::Between => between(cond, ctx, false, lhs),
        OpTag::NotBetween => between(cond, ctx, true, lhs),
        OpTag::ArrayEmpty => array_size(cond, ctx, 0, false, lhs),
        OpTag::ArrayNotEmpty => array_size(cond, ctx, 0, true, lhs),
        OpTag::ArrayLength => array_length_eq(cond, ctx, scalar, lhs),
        OpTag::LengthGt => length_threshold(cond, true),
        OpTag::LengthLt => length_threshold(cond, false),
        // Reduction operators are not standalone predicates; they're compiled
        // by `list_ops.rs` and surface here only if malformed input routed a
        // reduction condition straight to the predicate compiler. Treat as a
        // no-op match rather than panic.
        _ if cond.operator.is_reduction() => json!({}),
        OpTag::Malformed | OpTag::Unknown(_) => unreachable!("handled above"),
    }
}

fn compare(cond: &Condition, ctx: Context, match_op: &str, expr_op: &str, value: Value, lhs: Value) -> Value {
    match ctx {
        Context::Match => json!({ cond.field.clone(): { match_op: coerce_numeric_like(value) } }),
        _ => json!({ expr_op: [lhs, value] }),
    }
}

fn not_in(cond: &Condition, ctx: Context, values: Value, lhs: Value) -> Value {
    match ctx {
        Context::Match => json!({ cond.field.clone(): { "$nin": values } }),
        _ => {
            let is_in = json!({ "$in": [lhs, values] });
            json!({ "$not": [is_in] })
        }
    }
}

enum RegexShape {
    Contains,
    StartsWith,
    EndsWith,
}

fn regex_match(cond: &Condition, ctx: Context, scalar: Option<&Value>, shape: RegexShape, lhs: Value) -> Value {
    let literal = scalar.and_then(Value::as_str).unwrap_or_default();
    let escaped = escape_regex(literal);
    let pattern = match shape {
        RegexShape::Contains => escaped,
        RegexShape::StartsWith => format!("^{escaped}"),
        RegexShape::EndsWith => format!("{escaped}$"),
    };
    match ctx {
        Context::Match => json!({ cond.field.clone(): { "$regex": pattern, "options": "i" } }),
        _ => json!({
            "$regexMatch": { "input": lhs, "regex": pattern, "options": "i" }
        }),
    }
}

fn exists(cond: &Condition, ctx: Context, should_exist: bool, lhs: Value) -> Value {
    match ctx {
        Context::Match => json!({ cond.field.clone(): { "$exists": should_exist } }),
        _ => {
            let ne_null = json!({ "$ne": [lhs, Value::Null] });
            if should_exist {
                ne_null
            } else {
                json!({ "$not": [ne_null] })
            }
        }
    }
}

fn is_number(ctx: Context, lhs: Value) -> Value {
    let check = json!({ "$isNumber": lhs });
    match ctx {
        // `$isNumber` is an aggregation-only operator: even in Match context
        // it needs an `$expr` shell, since there is no query-language form.
        Context::Match => json!({ "$expr": check }),
        _ => check,
    }
}

fn between(cond: &Condition, ctx: Context, negate: bool, lhs: Value) -> Value {
    let (lo, hi) = match &cond.value {
        PredicateValue::Range(lo, hi) => (coerce_numeric_like(lo.clone()), coerce_numeric_like(hi.clone())),
        _ => (Value::Null, Value::Null),
    };
    match ctx {
        Context::Match if !negate => json!({ cond.field.clone(): { "$gte": lo, "$lte": hi } }),
        Context::Match => json!({
            "$or": [
                { cond.field.clone(): { "$lt": lo } },
                { cond.field.clone(): { "$gt": hi } },
            ]
        }),
        _ => {
            let inside = json!({ "$and": [ { "$gte": [lhs.clone(), lo] }, { "$lte": [lhs, hi] } ] });
            if negate {
                json!({ "$not": [inside] })
            } else {
                inside
            }
        }
    }
}

fn array_size(cond: &Condition, ctx: Context, size: i64, negate: bool, lhs: Value) -> Value {
    match ctx {
        Context::Match if !negate => json!({ cond.field.clone(): { "$size": size } }),
        Context::Match => json!({ cond.field.clone(): { "$not": { "$size": size } } }),
        _ => {
            let check = json!({ "$eq": [ { "$size": lhs }, size ] });
            if negate {
                json!({ "$not": [check] })
            } else {
                check
            }
        }
    }
}

fn array_length_eq(cond: &Condition, ctx: Context, scalar: Option<&Value>, lhs: Value) -> Value {
    let n = scalar.and_then(Value::as_i64).unwrap_or(0);
    array_size(cond, ctx, n, false, lhs)
}

/// Length-threshold optimization: `lengthGt`/`lengthLt` never compile to
/// `$size` — they compile to an `$exists` check at the positional index
/// right at the threshold, which lets the query planner use an index instead
/// of materializing and counting the whole array.
fn length_threshold(cond: &Condition, greater_than: bool) -> Value {
    let n = cond.value.as_scalar().and_then(Value::as_i64).unwrap_or(0);
    if greater_than {
        json!({ format!("{}.{}", cond.field, n): { "$exists": true } })
    } else {
        let idx = (n - 1).max(0);
        json!({ format!("{}.{}", cond.field, idx): { "$exists": false } })
    }
}

/// §7 rule 4: an unrecognized operator spelling degrades to a last-resort
/// equality comparison against the condition's value, coerced in whichever
/// shape the context demands.
fn last_resort_equality(cond: &Condition, ctx: Context, lhs: Value) -> Value {
    let value = cond.value.as_scalar().cloned().unwrap_or(Value::Null);
    compare(cond, ctx, "$eq", "$eq", value, lhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, Schema};

    fn cond(field: &str, op: OpTag, value: Value) -> Condition {
        Condition {
            id: "c".to_string(),
            field: field.to_string(),
            operator: op,
            value: PredicateValue::Scalar(value),
            boolean_switch: None,
        }
    }

    #[test]
    fn match_context_emits_bare_field_comparison() {
        let c = cond("candidate.magpsf", OpTag::Lt, json!(18.5));
        let schema = Schema::new().with_field("candidate.magpsf", FieldType::Float);
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"candidate.magpsf": {"$lt": 18.5}}));
    }

    #[test]
    fn projection_context_emits_raw_expression_operator() {
        let c = cond("candidate.magpsf", OpTag::Lt, json!(18.5));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Projection, &schema);
        assert_eq!(out, json!({"$lt": ["$candidate.magpsf", 18.5]}));
    }

    #[test]
    fn array_scan_context_uses_this_reference() {
        let c = cond("mag", OpTag::Gt, json!(15));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::ArrayScan, &schema);
        assert_eq!(out, json!({"$gt": ["$$this.mag", 15]}));
    }

    #[test]
    fn boolean_equality_uses_in_not_eq() {
        let c = cond("flag", OpTag::Eq, json!(true));
        let schema = Schema::new().with_field("flag", FieldType::Boolean);
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"flag": {"$in": [true]}}));
    }

    #[test]
    fn boolean_literal_value_alone_does_not_trigger_in_without_schema() {
        let c = cond("flag", OpTag::Eq, json!(true));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"flag": {"$eq": true}}));
    }

    #[test]
    fn regex_contains_sets_case_insensitive_option() {
        let c = cond("name", OpTag::Contains, json!("abc"));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"name": {"$regex": "abc", "options": "i"}}));
    }

    #[test]
    fn numeric_like_string_is_coerced_in_match_context() {
        let c = cond("candidate.magpsf", OpTag::Gt, json!("18.5"));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"candidate.magpsf": {"$gt": 18.5}}));
    }

    #[test]
    fn length_gt_compiles_to_positional_exists_never_size() {
        let c = cond("prv_candidates", OpTag::LengthGt, json!(3));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"prv_candidates.3": {"$exists": true}}));
    }

    #[test]
    fn unknown_operator_falls_back_to_equality() {
        let c = cond("foo", OpTag::Unknown("smells-like".to_string()), json!("bar"));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"foo": {"$eq": "bar"}}));
    }

    #[test]
    fn malformed_condition_compiles_to_empty_match() {
        let c = cond("", OpTag::Malformed, Value::Null);
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({}));
    }

    #[test]
    fn contains_escapes_regex_metacharacters() {
        let c = cond("name", OpTag::Contains, json!("a.b*c"));
        let schema = Schema::new();
        let out = compile_condition(&c, Context::Match, &schema);
        assert_eq!(out, json!({"name": {"$regex": "a\\.b\\*c", "options": "i"}}));
    }
}
