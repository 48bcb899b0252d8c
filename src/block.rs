//! C7 — block compilation: combines compiled children under `$and`/`$or`,
//! collapsing vacuous truths so a malformed or always-true child never
//! pollutes the combinator with a meaningless clause.

use serde_json::{json, Value};

use crate::list_ops;
use crate::model::{Block, Condition, Logic, Node, Schema};
use crate::predicate::{self, Context, ContextResolver, VarCatalog};

/// Replaces non-alphanumerics with `_` — the materialized name of a
/// `customBlockName` projected as a boolean (§4.9).
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn compile_node(node: &Node, ctx: Context, schema: &Schema, vars: VarCatalog) -> Value {
    match node {
        Node::Block(b) if b.is_projected_boolean() => {
            // Materialized elsewhere (§4.9's projected-boolean channel); here
            // it's referenced as the field the initial projection defined.
            let name = sanitize_name(b.custom_block_name.as_deref().unwrap_or_default());
            match ctx {
                Context::Match => json!({ name: false }),
                Context::ArrayScan => json!({ "$eq": [format!("$$this.{name}"), false] }),
                Context::Projection => json!({ "$eq": [format!("${name}"), false] }),
            }
        }
        Node::Block(b) => compile_block(b, ctx, schema, vars),
        Node::Condition(c) if ctx == Context::ArrayScan && vars.arithmetic_exprs.contains_key(&c.field) => {
            inline_arithmetic_condition(c, schema, vars)
        }
        Node::Condition(c) if c.operator.is_reduction() => {
            let raw = list_ops::compile_reduction_condition(c, schema, vars);
            match ctx {
                Context::Match => json!({ "$expr": raw }),
                _ => raw,
            }
        }
        Node::Condition(c) => predicate::compile_condition(c, ctx, schema),
    }
}

/// §"'Inlined' variables": a reduction body cannot reference a projected
/// name, since nothing is projected yet inside an array scan. When the
/// body's own condition names an arithmetic variable as its field, the
/// variable's expression is resolved right here (inlined) and substituted
/// for the bare `$$this.<field>` reference `compile_condition` would
/// otherwise produce. Falls back to the ordinary field reference if the
/// expression fails to convert (§7 rule 2).
fn inline_arithmetic_condition(cond: &Condition, schema: &Schema, vars: VarCatalog) -> Value {
    let Some(expr_text) = vars.arithmetic_exprs.get(&cond.field) else {
        return predicate::compile_condition(cond, Context::ArrayScan, schema);
    };
    let resolver = ContextResolver::new(Context::ArrayScan, vars.arithmetic_exprs, vars.list_var_names, vars.converter);
    match vars.converter.convert(expr_text, &resolver) {
        Ok(db_expr) => predicate::compile_condition_with_lhs(cond, Context::ArrayScan, schema, Some(db_expr.to_json())),
        Err(e) => {
            log::warn!("variable '{}' failed to inline in array scan ({e}), falling back to field reference", cond.field);
            predicate::compile_condition(cond, Context::ArrayScan, schema)
        }
    }
}

pub fn compile_block(block: &Block, ctx: Context, schema: &Schema, vars: VarCatalog) -> Value {
    let compiled: Vec<Value> = block.children.iter().map(|c| compile_node(c, ctx, schema, vars)).collect();
    let empty = json!({});

    match block.logic {
        Logic::And => {
            let nontrivial: Vec<Value> = compiled.into_iter().filter(|v| v != &empty).collect();
            combine("$and", nontrivial)
        }
        Logic::Or => {
            if compiled.is_empty() || compiled.iter().any(|v| v == &empty) {
                return empty;
            }
            combine("$or", compiled)
        }
    }
}

fn combine(op: &str, mut clauses: Vec<Value>) -> Value {
    match clauses.len() {
        0 => json!({}),
        1 => clauses.remove(0),
        _ => json!({ op: clauses }),
    }
}
