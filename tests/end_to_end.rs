//! End-to-end tests driving the public `compile`/`parse_node` surface the
//! way a real caller would: a raw JSON filter tree in, a pipeline out.
//!
//! Mirrors the unit tests in `src/pipeline.rs`, but builds the tree through
//! `parse_node` (the lenient wire parser) rather than hand-built `Node`
//! values, so the wire-shape edges (the `kind`/`operator` strings a caller
//! actually sends) get exercised too.

use querypipe::{
    compile, compile_report, is_valid_pipeline, parse_node, ArithmeticVariable, CompilerConfig, Diagnostic,
    DefaultMathConverter, FieldType, ListCondition, ListVariable, Schema,
};
use serde_json::json;

fn parse(raw: serde_json::Value, config: &CompilerConfig) -> querypipe::Node {
    parse_node(&raw, &config.operator_aliases).unwrap()
}

#[test]
fn trivial_equality_hoists_to_a_bare_match_and_final_projection() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "ra", "operator": "=", "value": 10}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

    assert_eq!(
        pipeline,
        vec![
            json!({"$match": {"ra": {"$eq": 10}}}),
            json!({"$project": {"objectId": 1, "ra": 1}}),
        ]
    );
    assert!(is_valid_pipeline(&pipeline));
}

#[test]
fn arithmetic_variable_flows_through_a_dependency_layer_before_matching() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "m", "operator": ">", "value": 20}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let vars = vec![ArithmeticVariable {
        name: "m".to_string(),
        expr: "mag - zp".to_string(),
    }];
    let pipeline = compile(&tree, &schema, &config, &vars, &[], &converter);

    assert_eq!(pipeline[1], json!({"$project": {"objectId": 1, "mag": 1, "zp": 1, "m": {"$subtract": ["$mag", "$zp"]}}}));
    assert_eq!(pipeline[2], json!({"$match": {"m": {"$gt": 20}}}));
    assert!(is_valid_pipeline(&pipeline));
}

#[test]
fn list_variable_with_a_comparator_is_projected_then_matched() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "peak", "operator": ">", "value": 18.5}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let list_vars = vec![ListVariable {
        name: "peak".to_string(),
        condition: ListCondition {
            field: "candidates.mag".to_string(),
            operator: querypipe::OpTag::Max,
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
fn boolean_schema_field_uses_in_not_eq_for_equality() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "isVariable", "operator": "=", "value": true}),
        &config,
    );
    let mut schema = Schema::new();
    schema.insert("isVariable", FieldType::Boolean);
    let converter = DefaultMathConverter::new();
    let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

    assert_eq!(pipeline[0], json!({"$match": {"isVariable": {"$in": [true]}}}));
}

#[test]
fn length_threshold_never_emits_size_only_positional_exists() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "tags", "operator": "lengthGt", "value": 2}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

    let rendered = serde_json::to_string(&pipeline).unwrap();
    assert!(!rendered.contains("$size"));
    assert!(rendered.contains("tags.2"));
    assert!(rendered.contains("$exists"));
}

#[test]
fn final_projection_retains_object_id_and_every_used_field() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({
            "id": "root",
            "kind": "block",
            "logic": "and",
            "children": [
                {"id": "c1", "kind": "condition", "field": "ra", "operator": "=", "value": 10},
                {"id": "c2", "kind": "condition", "field": "dec", "operator": "=", "value": 20},
            ],
        }),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

    let last = pipeline.last().unwrap();
    let project = &last["$project"];
    assert_eq!(project["objectId"], json!(1));
    assert_eq!(project["ra"], json!(1));
    assert_eq!(project["dec"], json!(1));
}

#[test]
fn an_unknown_operator_degrades_to_a_diagnostic_instead_of_failing_the_compile() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "ra", "operator": "smells-like", "value": 10}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let report = compile_report(&tree, &schema, &config, &[], &[], &converter);

    assert!(report
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UnknownOperator { id, .. } if id == "c1")));
}

#[test]
fn a_cyclic_arithmetic_variable_pair_is_reported_but_still_compiles() {
    let config = CompilerConfig::default();
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "a", "operator": ">", "value": 1}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let vars = vec![
        ArithmeticVariable { name: "a".to_string(), expr: "b + 1".to_string() },
        ArithmeticVariable { name: "b".to_string(), expr: "a + 1".to_string() },
    ];
    let report = compile_report(&tree, &schema, &config, &vars, &[], &converter);

    assert!(report
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::VariableCycle { .. })));
}

#[test]
fn empty_tree_produces_a_pipeline_the_validator_rejects() {
    let config = CompilerConfig::default();
    let tree = parse(json!({"id": "root", "kind": "block", "logic": "and", "children": []}), &config);
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

    assert!(!is_valid_pipeline(&pipeline));
}

#[test]
fn repeated_compiles_of_the_same_tree_are_byte_identical() {
    let config = CompilerConfig::default();
    let raw = json!({
        "id": "root",
        "kind": "block",
        "logic": "and",
        "children": [
            {"id": "c1", "kind": "condition", "field": "ra", "operator": "=", "value": 10},
            {"id": "c2", "kind": "condition", "field": "dec", "operator": ">", "value": 5},
        ],
    });
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();

    let tree_a = parse(raw.clone(), &config);
    let pipeline_a = compile(&tree_a, &schema, &config, &[], &[], &converter);
    let tree_b = parse(raw, &config);
    let pipeline_b = compile(&tree_b, &schema, &config, &[], &[], &converter);

    assert_eq!(
        serde_json::to_string(&pipeline_a).unwrap(),
        serde_json::to_string(&pipeline_b).unwrap()
    );
}

#[test]
fn operator_aliases_resolve_to_the_same_canonical_condition() {
    let mut config = CompilerConfig::default();
    config.operator_aliases.insert("is at least".to_string(), querypipe::OpTag::Ge);
    let tree = parse(
        json!({"id": "c1", "kind": "condition", "field": "ra", "operator": "is at least", "value": 10}),
        &config,
    );
    let schema = Schema::new();
    let converter = DefaultMathConverter::new();
    let pipeline = compile(&tree, &schema, &config, &[], &[], &converter);

    assert_eq!(pipeline[0], json!({"$match": {"ra": {"$gte": 10}}}));
}

