//! C4 — usage analysis over the filter tree: which field paths (including
//! variable names, since a condition's `field` may name either a base
//! document field or a catalog variable) the tree actually touches, and how
//! many times each variable is referenced. The pipeline assembler uses this
//! to decide which variables are worth compiling at all (§4.8: an unused
//! variable never needs a projection stage) and, together with
//! [`crate::dependency::DependencyGraph`], to size the final projection
//! (§3 invariant 5, P3).

use std::collections::{HashMap, HashSet};

use crate::dependency::DependencyGraph;
use crate::model::{Block, ListVariable, Node, PredicateValue, Schema};
use crate::predicate::{Context, VarCatalog};

/// Every field path (in the generic sense — base field or variable name)
/// referenced anywhere in a filter tree, in first-encountered order.
#[derive(Debug, Clone, Default)]
pub struct UsedFields {
    seen: Vec<String>,
}

impl UsedFields {
    pub fn contains(&self, field: &str) -> bool {
        self.seen.iter().any(|f| f == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }
}

pub fn collect_used_fields(root: &Node) -> UsedFields {
    let mut out = UsedFields::default();
    walk_node(root, &mut out);
    out
}

fn walk_node(node: &Node, out: &mut UsedFields) {
    match node {
        Node::Block(b) => {
            for child in &b.children {
                walk_node(child, out);
            }
        }
        Node::Condition(c) => {
            push(out, &c.field);
            walk_value(&c.value, out);
        }
    }
}

fn walk_value(value: &PredicateValue, out: &mut UsedFields) {
    match value {
        PredicateValue::Scalar(_) | PredicateValue::Range(_, _) => {}
        PredicateValue::Nested(node) => walk_node(node, out),
        PredicateValue::ArrayTest {
            field,
            sub_field,
            value,
            ..
        } => {
            push(out, field);
            if let Some(sf) = sub_field {
                push(out, sf);
            }
            walk_value(value, out);
        }
    }
}

fn push(out: &mut UsedFields, field: &str) {
    if !field.is_empty() && !out.contains(field) {
        out.seen.push(field.to_string());
    }
}

/// Counts every appearance of each name in `candidates` as a condition's
/// `field` (including inside nested reduction bodies and `ArrayTest` field
/// slots) — unlike [`collect_used_fields`] this does not dedupe, so a
/// variable referenced three times really does come back with count 3
/// (§4.6(a)'s inlining decision needs the real count, not just presence).
pub fn count_variable_usage(root: &Node, candidates: &[String]) -> HashMap<String, usize> {
    let wanted: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let mut counts: HashMap<String, usize> = candidates.iter().map(|n| (n.clone(), 0)).collect();
    count_walk_node(root, &wanted, &mut counts);
    counts
}

fn count_walk_node(node: &Node, wanted: &HashSet<&str>, counts: &mut HashMap<String, usize>) {
    match node {
        Node::Block(b) => {
            for child in &b.children {
                count_walk_node(child, wanted, counts);
            }
        }
        Node::Condition(c) => {
            count_push(&c.field, wanted, counts);
            count_walk_value(&c.value, wanted, counts);
        }
    }
}

fn count_walk_value(value: &PredicateValue, wanted: &HashSet<&str>, counts: &mut HashMap<String, usize>) {
    match value {
        PredicateValue::Scalar(_) | PredicateValue::Range(_, _) => {}
        PredicateValue::Nested(node) => count_walk_node(node, wanted, counts),
        PredicateValue::ArrayTest {
            field,
            sub_field,
            value,
            ..
        } => {
            count_push(field, wanted, counts);
            if let Some(sf) = sub_field {
                count_push(sf, wanted, counts);
            }
            count_walk_value(value, wanted, counts);
        }
    }
}

fn count_push(field: &str, wanted: &HashSet<&str>, counts: &mut HashMap<String, usize>) {
    if wanted.contains(field) {
        *counts.entry(field.to_string()).or_insert(0) += 1;
    }
}

/// Walks the whole tree (not just top-level children) collecting every
/// `customBlockName, isTrue=false` block, in first-encountered order — the
/// set §4.9 materializes into the initial projection as named booleans.
pub fn collect_projected_booleans(root: &Node) -> Vec<&Block> {
    let mut out = Vec::new();
    walk_projected_booleans(root, &mut out);
    out
}

fn walk_projected_booleans<'a>(node: &'a Node, out: &mut Vec<&'a Block>) {
    if let Node::Block(b) = node {
        if b.is_projected_boolean() {
            out.push(b);
        }
        for child in &b.children {
            walk_projected_booleans(child, out);
        }
    }
    if let Node::Condition(c) = node {
        if let PredicateValue::Nested(inner) = &c.value {
            walk_projected_booleans(inner, out);
        }
    }
}

/// The three sets §4.6(b) asks for, plus which of the arithmetic/list
/// variables are actually reachable from the tree at all — an unreferenced
/// variable contributes nothing to any stage.
#[derive(Debug, Clone, Default)]
pub struct UsageSets {
    pub base_fields: Vec<String>,
    pub arithmetic_vars: Vec<String>,
    pub list_vars: Vec<String>,
}

impl UsageSets {
    fn push_base(&mut self, name: &str) {
        if !name.is_empty() && !self.base_fields.iter().any(|f| f == name) {
            self.base_fields.push(name.to_string());
        }
    }

    fn push_arith(&mut self, name: &str) {
        if !self.arithmetic_vars.iter().any(|f| f == name) {
            self.arithmetic_vars.push(name.to_string());
        }
    }

    fn push_list(&mut self, name: &str) {
        if !self.list_vars.iter().any(|f| f == name) {
            self.list_vars.push(name.to_string());
        }
    }
}

/// Classifies every name [`collect_used_fields`] found as a base field, an
/// arithmetic variable, or a list variable, then pulls in each variable's
/// transitive dependencies so the final projection (P3) is complete even
/// when the tree only mentions the topmost variable in a dependency chain.
pub fn analyze(
    root: &Node,
    arithmetic_names: &HashSet<String>,
    list_var_table: &HashMap<String, &ListVariable>,
    deps: &DependencyGraph,
    schema: &Schema,
    vars: VarCatalog,
) -> UsageSets {
    let used = collect_used_fields(root);
    let mut sets = UsageSets::default();

    for name in used.iter() {
        classify_one(name, arithmetic_names, list_var_table, deps, schema, vars, &mut sets);
    }

    sets
}

fn classify_one(
    name: &str,
    arithmetic_names: &HashSet<String>,
    list_var_table: &HashMap<String, &ListVariable>,
    deps: &DependencyGraph,
    schema: &Schema,
    vars: VarCatalog,
    sets: &mut UsageSets,
) {
    if let Some(lv) = list_var_table.get(name) {
        sets.push_list(name);
        for base in list_variable_dependencies(lv, schema, vars) {
            sets.push_base(&base);
        }
        return;
    }
    if arithmetic_names.contains(name) {
        sets.push_arith(name);
        for dep in deps.transitive(name) {
            if list_var_table.contains_key(&dep) {
                sets.push_list(&dep);
                if let Some(lv) = list_var_table.get(&dep) {
                    for base in list_variable_dependencies(lv, schema, vars) {
                        sets.push_base(&base);
                    }
                }
            } else if arithmetic_names.contains(&dep) {
                sets.push_arith(&dep);
            } else {
                sets.push_base(&dep);
            }
        }
        return;
    }
    sets.push_base(name);
}

/// §4.6(b): "pulls in the underlying array field plus any absolute
/// references discovered by dry-compiling the reduction body through C6 in
/// Context B and scanning the output string literals starting with `$` but
/// not `$$`."
pub fn list_variable_dependencies(lv: &ListVariable, schema: &Schema, vars: VarCatalog) -> Vec<String> {
    let mut out = vec![lv.condition.field.clone()];
    let compiled = crate::list_ops::compile_list_condition(&lv.condition, schema, vars);
    let mut literals = Vec::new();
    scan_dollar_literals(&compiled, &mut literals);
    for lit in literals {
        if let Some(path) = lit.strip_prefix('$') {
            if !path.starts_with('$') && !path.is_empty() {
                out.push(path.to_string());
            }
        }
    }
    out
}

fn scan_dollar_literals(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) if s.starts_with('$') => out.push(s.clone()),
        serde_json::Value::Array(arr) => {
            for v in arr {
                scan_dollar_literals(v, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                scan_dollar_literals(v, out);
            }
        }
        _ => {}
    }
}

/// Compiles a projected-boolean block's *definition* (its children, combined
/// under its own logic) in Context C — used only for the initial projection
/// field, never for a reference to it elsewhere in the tree (that goes
/// through [`crate::block::compile_node`]'s redirect instead).
pub fn compile_projected_boolean_definition(block: &Block, schema: &Schema, vars: VarCatalog) -> serde_json::Value {
    crate::block::compile_block(block, Context::Projection, schema, vars)
}
