//! C9 — pipeline assembly (§4.8): orders the optional early match, the
//! initial projection, dependency-layered projections, the complex match,
//! and the always-present final projection into the emitted stage sequence.
//!
//! The assembler is the one place that decides *when* a projection stage is
//! worth emitting at all. Three of §4.8 point 2's three triggers collapse to
//! one rule once checked against the concrete end-to-end scenarios in §8: a
//! used base field alone never justifies an initial projection (scenario 1's
//! `ra` and scenario 2's `tags` are both used base fields with no projection
//! stage at all; scenario 4's directly-referenced `candidates` array is too —
//! a reduction condition reads the raw field straight off the document, it
//! never needs it pre-materialized). Only a *used list variable*, a *used
//! arithmetic variable*, or a *projected-boolean block* forces the stage to
//! exist; once it does, every used base field rides along as content. See
//! `DESIGN.md` for the full reasoning.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::block;
use crate::convert::{DbExpr, MathConverter};
use crate::dependency::DependencyGraph;
use crate::list_ops;
use crate::model::{ArithmeticVariable, CompilerConfig, ListVariable, Node, Schema};
use crate::partition;
use crate::predicate::{Context, ContextResolver, VarCatalog};
use crate::usage;

/// A single staged aggregation pipeline: `Vec<Value>`, each element a
/// one-key stage object (§6.3).
pub type Pipeline = Vec<Value>;

/// One entry of the caller-supplied annotation projection (§4.8's
/// "Annotation path", §6.2's `compileWithProjection`).
#[derive(Debug, Clone)]
pub enum ProjectionField {
    /// Keeps `field` under its own name in the `annotations` sub-document.
    Include(String),
    /// Explicitly excludes `field` from the `annotations` sub-document.
    Exclude(String),
    /// Rounds `field` to `decimals` places (default 4) in the sub-document.
    Round(String, Option<u32>),
}

/// Translates a filter tree into a staged pipeline (§6.2's `compile`).
/// Infallible per §7: any malformed input degrades gracefully rather than
/// failing the call, and recoverable problems are only logged.
pub fn compile(
    tree: &Node,
    schema: &Schema,
    config: &CompilerConfig,
    arithmetic_vars: &[ArithmeticVariable],
    list_vars: &[ListVariable],
    converter: &dyn MathConverter,
) -> Pipeline {
    let arithmetic_names: HashSet<String> = arithmetic_vars.iter().map(|v| v.name.clone()).collect();
    let list_var_names: HashSet<String> = list_vars.iter().map(|v| v.name.clone()).collect();
    let list_var_table: HashMap<String, &ListVariable> = list_vars.iter().map(|v| (v.name.clone(), v)).collect();
    let arithmetic_exprs: HashMap<String, String> = arithmetic_vars.iter().map(|v| (v.name.clone(), v.expr.clone())).collect();
    let deps = DependencyGraph::build(arithmetic_vars, converter);
    let vars = VarCatalog::new(&arithmetic_exprs, &list_var_names, converter);

    let usage_sets = usage::analyze(tree, &arithmetic_names, &list_var_table, &deps, schema, vars);
    let projected_booleans = usage::collect_projected_booleans(tree);

    let (simple, complex) = partition::partition_top_level(tree, config, &arithmetic_names, &list_var_names);

    let mut pipeline: Pipeline = Vec::new();

    push_match_stage(&mut pipeline, &simple, schema, vars);

    let needs_initial_projection =
        !usage_sets.list_vars.is_empty() || !usage_sets.arithmetic_vars.is_empty() || !projected_booleans.is_empty();

    if needs_initial_projection {
        let mut fields = base_projection_fields(config, &usage_sets);
        for lv_name in &usage_sets.list_vars {
            if let Some(lv) = list_var_table.get(lv_name) {
                fields.insert(lv_name.clone(), list_ops::compile_list_variable(lv, schema, vars));
            }
        }
        for b in &projected_booleans {
            let name = block::sanitize_name(b.custom_block_name.as_deref().unwrap_or_default());
            fields.insert(name, usage::compile_projected_boolean_definition(b, schema, vars));
        }
        pipeline.push(json!({ "$project": Value::Object(fields) }));
    }

    let arith_needed: HashSet<String> = usage_sets.arithmetic_vars.iter().cloned().collect();
    if !arith_needed.is_empty() {
        let mut already_projected: Vec<String> = Vec::new();
        for layer in layer_variables(&arith_needed, &deps) {
            let mut fields = base_projection_fields(config, &usage_sets);
            for lv_name in &usage_sets.list_vars {
                fields.insert(lv_name.clone(), json!(1));
            }
            for done in &already_projected {
                fields.insert(done.clone(), json!(1));
            }
            for name in &layer {
                let expr_text = arithmetic_exprs.get(name).cloned().unwrap_or_default();
                let resolver = ContextResolver::new(Context::Projection, &arithmetic_exprs, &list_var_names, converter);
                let db_expr = converter.convert(&expr_text, &resolver).unwrap_or_else(|e| {
                    log::warn!("variable '{name}' failed to convert ({e}), falling back to field reference");
                    DbExpr::FieldRef(format!("${name}"))
                });
                fields.insert(name.clone(), db_expr.to_json());
            }
            pipeline.push(json!({ "$project": Value::Object(fields) }));
            already_projected.extend(layer);
        }
    }

    push_match_stage(&mut pipeline, &complex, schema, vars);

    pipeline.push(json!({ "$project": Value::Object(final_projection_fields(config, &usage_sets)) }));

    pipeline
}

/// §6.2's `compileWithProjection`: `compile`, then an `annotations` stage
/// built from caller-supplied projection field descriptors.
pub fn compile_with_projection(
    tree: &Node,
    schema: &Schema,
    config: &CompilerConfig,
    arithmetic_vars: &[ArithmeticVariable],
    list_vars: &[ListVariable],
    converter: &dyn MathConverter,
    projection_fields: &[ProjectionField],
) -> Pipeline {
    let mut pipeline = compile(tree, schema, config, arithmetic_vars, list_vars, converter);
    if let Some(stage) = annotations_stage(config, projection_fields) {
        pipeline.push(stage);
    }
    pipeline
}

fn annotations_stage(config: &CompilerConfig, projection_fields: &[ProjectionField]) -> Option<Value> {
    if projection_fields.is_empty() {
        return None;
    }
    let mut annotations = serde_json::Map::new();
    for pf in projection_fields {
        match pf {
            ProjectionField::Include(field) => {
                annotations.insert(field.clone(), json!(format!("${field}")));
            }
            ProjectionField::Exclude(field) => {
                annotations.insert(field.clone(), json!(0));
            }
            ProjectionField::Round(field, decimals) => {
                let places = decimals.unwrap_or(4);
                annotations.insert(
                    field.clone(),
                    json!({ "$round": [format!("${field}"), places] }),
                );
            }
        }
    }
    if annotations.is_empty() {
        return None;
    }
    let mut stage = serde_json::Map::new();
    if !config.exclude_object_id {
        stage.insert("objectId".to_string(), json!(1));
    }
    stage.insert("annotations".to_string(), Value::Object(annotations));
    if stage.len() <= 1 {
        return None;
    }
    Some(json!({ "$project": stage }))
}

/// The struct-of-arrays result of [`compile_report`]: the pipeline plus every
/// diagnostic observed along the way, for a host that wants them as data
/// instead of scraping logs (§7, §9's "strongly-typed implementation" note).
#[derive(Debug, Clone)]
pub struct CompileReport {
    pub pipeline: Pipeline,
    pub diagnostics: Vec<crate::error::Diagnostic>,
}

pub fn compile_report(
    tree: &Node,
    schema: &Schema,
    config: &CompilerConfig,
    arithmetic_vars: &[ArithmeticVariable],
    list_vars: &[ListVariable],
    converter: &dyn MathConverter,
) -> CompileReport {
    let pipeline = compile(tree, schema, config, arithmetic_vars, list_vars, converter);

    let mut diagnostics = Vec::new();
    collect_condition_diagnostics(tree, &mut diagnostics);

    let deps = DependencyGraph::build(arithmetic_vars, converter);
    for variable in deps.cyclic_variables() {
        diagnostics.push(crate::error::Diagnostic::VariableCycle { variable });
    }

    let arithmetic_names: HashSet<String> = arithmetic_vars.iter().map(|v| v.name.clone()).collect();
    let list_var_table: HashMap<String, &ListVariable> = list_vars.iter().map(|v| (v.name.clone(), v)).collect();
    let arithmetic_exprs: HashMap<String, String> =
        arithmetic_vars.iter().map(|v| (v.name.clone(), v.expr.clone())).collect();
    let list_var_names: HashSet<String> = list_vars.iter().map(|v| v.name.clone()).collect();
    let vars = VarCatalog::new(&arithmetic_exprs, &list_var_names, converter);
    let usage_sets = usage::analyze(tree, &arithmetic_names, &list_var_table, &deps, schema, vars);
    for name in &usage_sets.arithmetic_vars {
        let Some(expr_text) = arithmetic_exprs.get(name) else { continue };
        let resolver = ContextResolver::new(Context::Projection, &arithmetic_exprs, &list_var_names, converter);
        if let Err(e) = converter.convert(expr_text, &resolver) {
            diagnostics.push(crate::error::Diagnostic::ConversionFailed {
                variable: name.clone(),
                reason: e.to_string(),
            });
        }
    }

    CompileReport { pipeline, diagnostics }
}

fn collect_condition_diagnostics(node: &Node, out: &mut Vec<crate::error::Diagnostic>) {
    match node {
        Node::Block(b) => {
            for child in &b.children {
                collect_condition_diagnostics(child, out);
            }
        }
        Node::Condition(c) => {
            match &c.operator {
                crate::model::OpTag::Malformed => {
                    out.push(crate::error::Diagnostic::MalformedCondition { id: c.id.clone() });
                }
                crate::model::OpTag::Unknown(op) => {
                    out.push(crate::error::Diagnostic::UnknownOperator {
                        id: c.id.clone(),
                        operator: op.clone(),
                    });
                }
                _ => {}
            }
            if let crate::model::PredicateValue::Nested(inner) = &c.value {
                collect_condition_diagnostics(inner, out);
            }
        }
    }
}

fn base_projection_fields(config: &CompilerConfig, usage_sets: &usage::UsageSets) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    if !config.exclude_object_id {
        fields.insert("objectId".to_string(), json!(1));
    }
    for base in &usage_sets.base_fields {
        fields.insert(base.clone(), json!(1));
    }
    fields
}

fn final_projection_fields(config: &CompilerConfig, usage_sets: &usage::UsageSets) -> serde_json::Map<String, Value> {
    let mut fields = base_projection_fields(config, usage_sets);
    for name in &usage_sets.arithmetic_vars {
        fields.insert(name.clone(), json!(1));
    }
    for name in &usage_sets.list_vars {
        fields.insert(name.clone(), json!(1));
    }
    fields
}

/// Compiles every node in `nodes` in [`Context::Match`] and merges their
/// top-level keys into one object (§4.7's "merged via `Object.assign`" /
/// §4.8 point 4's "top-level keys assigned together"). A collision on
/// `$expr` is combined under `$and` instead of silently overwritten — plain
/// `Object.assign` would drop all but the last reduction condition whenever
/// two complex blocks both compile to a bare `$expr` key.
fn merge_match_nodes(nodes: &[&Node], schema: &Schema, vars: VarCatalog) -> Value {
    let mut merged = serde_json::Map::new();
    let mut expr_terms: Vec<Value> = Vec::new();

    for node in nodes {
        let compiled = block::compile_node(node, Context::Match, schema, vars);
        if let Value::Object(map) = compiled {
            for (k, v) in map {
                if k == "$expr" {
                    expr_terms.push(v);
                } else {
                    merged.insert(k, v);
                }
            }
        }
    }

    match expr_terms.len() {
        0 => {}
        1 => {
            merged.insert("$expr".to_string(), expr_terms.remove(0));
        }
        _ => {
            merged.insert("$expr".to_string(), json!({ "$and": expr_terms }));
        }
    }

    Value::Object(merged)
}

fn push_match_stage(pipeline: &mut Pipeline, nodes: &[&Node], schema: &Schema, vars: VarCatalog) {
    if nodes.is_empty() {
        return;
    }
    let stage = merge_match_nodes(nodes, schema, vars);
    if let Value::Object(map) = &stage {
        if map.is_empty() {
            return;
        }
    }
    pipeline.push(json!({ "$match": stage }));
}

/// Groups `vars` into dependency sub-layers (§4.8 point 3): sub-layer `i`
/// contains every still-unplaced variable whose dependencies (restricted to
/// `vars` itself) are already in an earlier sub-layer. Iterates in
/// topological order so output is deterministic for equal inputs (P1).
fn layer_variables(vars: &HashSet<String>, deps: &DependencyGraph) -> Vec<Vec<String>> {
    let topo = deps.toposort();
    let mut remaining: HashSet<String> = vars.clone();
    let mut placed: HashSet<String> = HashSet::new();
    let mut layers: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let mut layer: Vec<String> = Vec::new();
        for name in &topo {
            if remaining.contains(name) {
                let ready = deps
                    .deps(name)
                    .iter()
                    .all(|d| !vars.contains(d) || placed.contains(d));
                if ready {
                    layer.push(name.clone());
                }
            }
        }
        if layer.is_empty() {
            // Only reachable if a cycle's back-edge left every remaining
            // variable waiting on another remaining one; flush them together
            // rather than loop forever (the cycle was already warned about
            // by `DependencyGraph::toposort`).
            layer = topo.iter().filter(|n| remaining.contains(n.as_str())).cloned().collect();
        }
        for name in &layer {
            remaining.remove(name);
            placed.insert(name.clone());
        }
        layers.push(layer);
    }

    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::DefaultMathConverter;
    use crate::model::{Block, Condition, FieldType, ListCondition, Logic, OpTag, PredicateValue};

    fn leaf_cond(field: &str, op: OpTag, value: Value) -> Node {
        Node::Condition(Condition {
            id: field.to_string(),
            field: field.to_string(),
            operator: op,
            value: PredicateValue::Scalar(value),
            boolean_switch: None,
        })
    }

    fn and_root(children: Vec<Node>) -> Node {
        Node::Block(Block {
            id: "root".to_string(),
            logic: Logic::And,
            children,
            custom_block_name: None,
            is_true: None,
        })
    }

    #[test]
    fn trivial_simple_tree_is_just_match_and_final_projection() {
        let tree = and_root(vec![leaf_cond("ra", OpTag::Eq, json!(10))]);
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

        assert_eq!(
            pipeline,
            vec![
                json!({"$match": {"ra": {"$eq": 10}}}),
                json!({"$project": {"objectId": 1, "ra": 1}}),
            ]
        );
    }

    #[test]
    fn length_threshold_hoists_to_early_match_with_no_projection_stage() {
        let tree = and_root(vec![leaf_cond("tags", OpTag::LengthGt, json!(2))]);
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

        assert_eq!(pipeline[0], json!({"$match": {"tags.2": {"$exists": true}}}));
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[1], json!({"$project": {"objectId": 1, "tags": 1}}));
    }

    #[test]
    fn arithmetic_variable_gets_its_own_dependency_layer() {
        let tree = leaf_cond("m", OpTag::Gt, json!(20));
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let vars = vec![ArithmeticVariable {
            name: "m".to_string(),
            expr: "mag - zp".to_string(),
        }];
        let pipeline = compile(&tree, &schema, &config, &vars, &[], &converter);

        assert_eq!(pipeline.len(), 4);
        assert_eq!(pipeline[0], json!({"$project": {"objectId": 1, "mag": 1, "zp": 1}}));
        assert_eq!(
            pipeline[1],
            json!({"$project": {"objectId": 1, "mag": 1, "zp": 1, "m": {"$subtract": ["$mag", "$zp"]}}})
        );
        assert_eq!(pipeline[2], json!({"$match": {"m": {"$gt": 20}}}));
        assert_eq!(
            pipeline[3],
            json!({"$project": {"objectId": 1, "mag": 1, "zp": 1, "m": 1}})
        );
    }

    #[test]
    fn direct_reduction_condition_never_gets_a_projection_stage() {
        let inner = Node::Block(Block {
            id: "b".to_string(),
            logic: Logic::And,
            children: vec![leaf_cond("candidates.fwhm", OpTag::Lt, json!(3))],
            custom_block_name: None,
            is_true: None,
        });
        let tree = Node::Condition(Condition {
            id: "c".to_string(),
            field: "candidates".to_string(),
            operator: OpTag::AnyElementTrue,
            value: PredicateValue::Nested(Box::new(inner)),
            boolean_switch: None,
        });
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

        assert_eq!(pipeline.len(), 2);
        assert_eq!(
            pipeline[0],
            json!({"$match": {"$expr": {"$anyElementTrue": {"$map": {
                "input": {"$ifNull": ["$candidates", []]},
                "in": {"$lt": ["$$this.fwhm", 3]}
            }}}}})
        );
        assert_eq!(
            pipeline[1],
            json!({"$project": {"objectId": 1, "candidates": 1, "candidates.fwhm": 1}})
        );
    }

    #[test]
    fn projected_boolean_block_materializes_then_matches_false() {
        let named = Block {
            id: "b1".to_string(),
            logic: Logic::And,
            children: vec![leaf_cond("flag", OpTag::Eq, json!(true))],
            custom_block_name: Some("CLEAN".to_string()),
            is_true: Some(false),
        };
        let tree = and_root(vec![Node::Block(named)]);
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

        assert_eq!(
            pipeline[0],
            json!({"$project": {"objectId": 1, "flag": 1, "CLEAN": {"$eq": ["$flag", true]}}})
        );
        assert_eq!(pipeline[1], json!({"$match": {"CLEAN": false}}));
        assert_eq!(pipeline[2], json!({"$project": {"objectId": 1, "flag": 1}}));
    }

    #[test]
    fn list_variable_with_comparator_projects_then_matches() {
        let tree = leaf_cond("peak", OpTag::Gt, json!(18.5));
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let list_vars = vec![ListVariable {
            name: "peak".to_string(),
            condition: ListCondition {
                field: "candidates.mag".to_string(),
                operator: OpTag::Max,
                sub_field: None,
                inner: None,
                comparison_operator: None,
                comparison_value: None,
                boolean_switch: None,
            },
        }];
        let pipeline = compile(&tree, &schema, &config, &[], &list_vars, &converter);

        assert_eq!(
            pipeline[0],
            json!({"$project": {"objectId": 1, "candidates.mag": 1, "peak": {"$max": "$candidates.mag"}}})
        );
        assert_eq!(pipeline[1], json!({"$match": {"peak": {"$gt": 18.5}}}));
    }

    #[test]
    fn boolean_schema_field_uses_in_not_eq_end_to_end() {
        let tree = leaf_cond("flag", OpTag::Eq, json!(true));
        let schema = Schema::new().with_field("flag", FieldType::Boolean);
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);
        assert_eq!(pipeline[0], json!({"$match": {"flag": {"$in": [true]}}}));
    }

    #[test]
    fn compile_report_surfaces_a_conversion_failure_for_malformed_expressions() {
        let tree = leaf_cond("m", OpTag::Gt, json!(20));
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let vars = vec![ArithmeticVariable {
            name: "m".to_string(),
            expr: "mag +".to_string(),
        }];
        let report = compile_report(&tree, &schema, &config, &vars, &[], &converter);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(d, crate::error::Diagnostic::ConversionFailed { variable, .. } if variable == "m")));
    }

    #[test]
    fn compile_report_is_clean_for_a_well_formed_tree() {
        let tree = leaf_cond("ra", OpTag::Eq, json!(10));
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let report = compile_report(&tree, &schema, &config, &[], &[], &converter);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn reduction_body_referencing_an_arithmetic_variable_inlines_it_instead_of_a_bare_field() {
        let inner = Node::Block(Block {
            id: "b".to_string(),
            logic: Logic::And,
            children: vec![leaf_cond("delta_mag", OpTag::Gt, json!(0))],
            custom_block_name: None,
            is_true: None,
        });
        let tree = Node::Condition(Condition {
            id: "c".to_string(),
            field: "candidates".to_string(),
            operator: OpTag::AnyElementTrue,
            value: PredicateValue::Nested(Box::new(inner)),
            boolean_switch: None,
        });
        let schema = Schema::new();
        let config = CompilerConfig::default();
        let converter = DefaultMathConverter::new();
        let vars = vec![ArithmeticVariable {
            name: "delta_mag".to_string(),
            expr: "mag - zp".to_string(),
        }];
        let pipeline = compile(&tree, &schema, &config, &vars, &[], &converter);

        let expected_match = json!({"$match": {"$expr": {"$anyElementTrue": {"$map": {
            "input": {"$ifNull": ["$candidates", []]},
            "in": {"$gt": [{"$subtract": ["$$this.mag", "$$this.zp"]}, 0]}
        }}}}});
        assert!(
            pipeline.contains(&expected_match),
            "expected an inlined anyElementTrue match stage, got: {pipeline:#?}"
        );
    }
}
