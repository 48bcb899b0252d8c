//! C5 — simple/complex partitioning over the root filter tree's top-level
//! children (§4.7), the basis for early-match hoisting (§4.8): a first
//! `$match` stage can safely run before any projection only for conditions
//! that need nothing the pipeline hasn't already got — a base scalar field,
//! no variable dependency, no nested reduction.

use std::collections::HashSet;

use crate::model::{Block, CompilerConfig, Condition, Logic, Node, OpTag, PredicateValue};

pub fn is_simple_condition(
    cond: &Condition,
    config: &CompilerConfig,
    arithmetic_vars: &HashSet<String>,
    list_vars: &HashSet<String>,
) -> bool {
    if matches!(cond.operator, OpTag::Malformed) {
        return false;
    }
    if cond.operator.is_reduction() {
        return false;
    }
    if arithmetic_vars.contains(&cond.field) || list_vars.contains(&cond.field) {
        return false;
    }
    if config.is_blocked_prefix(&cond.field) && !config.is_allowed_prefix(&cond.field) {
        return false;
    }
    !matches!(
        cond.value,
        PredicateValue::Nested(_) | PredicateValue::ArrayTest { .. }
    )
}

pub fn is_simple_block(
    block: &Block,
    config: &CompilerConfig,
    arithmetic_vars: &HashSet<String>,
    list_vars: &HashSet<String>,
) -> bool {
    if block.is_projected_boolean() {
        return false;
    }
    block
        .children
        .iter()
        .all(|c| is_simple_node(c, config, arithmetic_vars, list_vars))
}

pub fn is_simple_node(
    node: &Node,
    config: &CompilerConfig,
    arithmetic_vars: &HashSet<String>,
    list_vars: &HashSet<String>,
) -> bool {
    match node {
        Node::Block(b) => is_simple_block(b, config, arithmetic_vars, list_vars),
        Node::Condition(c) => is_simple_condition(c, config, arithmetic_vars, list_vars),
    }
}

/// The nodes early-match hoisting may consider independently: the direct
/// children of an AND-rooted tree, or the whole tree as a single unit when
/// the root is OR-logic (splitting an OR's branches would change which
/// documents match, since each branch alone is not a valid gate).
pub fn top_level_nodes(root: &Node) -> &[Node] {
    match root.as_block() {
        Some(b) if b.logic == Logic::And => &b.children,
        _ => std::slice::from_ref(root),
    }
}

/// Splits the root's top-level nodes into those safe to match before any
/// projection exists, and those that need pipeline machinery first.
pub fn partition_top_level<'a>(
    root: &'a Node,
    config: &CompilerConfig,
    arithmetic_vars: &HashSet<String>,
    list_vars: &HashSet<String>,
) -> (Vec<&'a Node>, Vec<&'a Node>) {
    let mut simple = Vec::new();
    let mut complex = Vec::new();
    for node in top_level_nodes(root) {
        if is_simple_node(node, config, arithmetic_vars, list_vars) {
            simple.push(node);
        } else {
            complex.push(node);
        }
    }
    (simple, complex)
}
