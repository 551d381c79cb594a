//! Integration tests for ViewDefinition evaluation
//!
//! Runs whole views through the public `evaluate` entry point and checks the
//! row-level laws: filtering, cardinality, joins, unions and null padding.

use octofhir_sof_eval::{Row, SofConfig, SofError, ViewDefinition, ViewRunner, evaluate};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn to_json(rows: Vec<Row>) -> Value {
    Value::Array(
        rows.into_iter()
            .map(|row| Value::Object(row.into_iter().collect()))
            .collect(),
    )
}

fn run(resources: Value, view: Value) -> Value {
    let resources = resources.as_array().cloned().unwrap_or_default();
    to_json(evaluate(&resources, &view).unwrap())
}

fn patients() -> Value {
    json!([
        {
            "resourceType": "Patient",
            "id": "pt1",
            "gender": "female",
            "name": [
                {"use": "official", "family": "F1", "given": ["G1", "G2"]},
                {"use": "maiden", "family": "F2"}
            ],
            "telecom": [{"system": "phone", "value": "555-1"}],
            "managingOrganization": {"reference": "Organization/org1"}
        },
        {
            "resourceType": "Patient",
            "id": "pt2",
            "gender": "male",
            "name": [{"family": "F3"}],
            "contact": [
                {"telecom": [{"system": "email", "value": "a@example.org"}]}
            ]
        },
        {"resourceType": "Observation", "id": "ob1", "subject": {"reference": "Patient/pt1"}}
    ])
}

#[test]
fn test_single_patient_id() {
    let rows = run(
        json!([{"resourceType": "Patient", "id": "123"}]),
        json!({"resource": "Patient", "column": [{"name": "id", "path": "id"}]}),
    );
    assert_eq!(rows, json!([{"id": "123"}]));
}

#[test]
fn test_empty_batch() {
    assert_eq!(run(json!([]), json!({"resource": "Patient"})), json!([]));
}

#[test]
fn test_only_matching_resource_type() {
    let rows = run(
        patients(),
        json!({"resource": "Observation", "column": [
            {"name": "id", "path": "getResourceKey()"},
            {"name": "patient", "path": "subject.getReferenceKey(Patient)"}
        ]}),
    );
    assert_eq!(rows, json!([{"id": "ob1", "patient": "pt1"}]));
}

#[test]
fn test_scalar_column_with_many_values_fails() {
    let resources = patients().as_array().cloned().unwrap();
    let err = evaluate(
        &resources,
        &json!({"resource": "Patient", "column": [{"name": "family", "path": "name.family"}]}),
    )
    .unwrap_err();
    assert!(matches!(err, SofError::MultipleValues { ref column, count: 2 } if column == "family"));
}

#[test]
fn test_collection_columns_are_never_unwrapped() {
    let rows = run(
        patients(),
        json!({"resource": "Patient", "column": [
            {"name": "id", "path": "id"},
            {"name": "given", "path": "name.given", "collection": true}
        ]}),
    );
    assert_eq!(
        rows,
        json!([
            {"id": "pt1", "given": ["G1", "G2"]},
            {"id": "pt2", "given": []}
        ])
    );
}

#[test]
fn test_union_all_row_counts_add() {
    let rows = run(
        patients(),
        json!({
            "resource": "Patient",
            "select": [
                {"column": [{"name": "id", "path": "id"}]},
                {"unionAll": [
                    {"forEach": "telecom", "column": [{"name": "value", "path": "value"}]},
                    {"forEach": "contact.telecom", "column": [{"name": "value", "path": "value"}]}
                ]}
            ]
        }),
    );
    assert_eq!(
        rows,
        json!([
            {"id": "pt1", "value": "555-1"},
            {"id": "pt2", "value": "a@example.org"}
        ])
    );
}

#[test]
fn test_select_join_multiplies_rows() {
    let rows = run(
        json!([{
            "resourceType": "Patient",
            "name": [{"family": "A"}, {"family": "B"}],
            "telecom": [{"value": "1"}, {"value": "2"}, {"value": "3"}]
        }]),
        json!({
            "resource": "Patient",
            "select": [
                {"forEach": "name", "column": [{"name": "family", "path": "family"}]},
                {"forEach": "telecom", "column": [{"name": "tel", "path": "value"}]}
            ]
        }),
    );
    assert_eq!(rows.as_array().map(Vec::len), Some(6));
    assert_eq!(rows[0], json!({"family": "A", "tel": "1"}));
    assert_eq!(rows[1], json!({"family": "B", "tel": "1"}));
}

#[test]
fn test_join_with_empty_side_is_empty() {
    let rows = run(
        json!([{"resourceType": "Patient", "name": [{"family": "A"}]}]),
        json!({
            "resource": "Patient",
            "select": [
                {"forEach": "name", "column": [{"name": "family", "path": "family"}]},
                {"forEach": "telecom", "column": [{"name": "tel", "path": "value"}]}
            ]
        }),
    );
    assert_eq!(rows, json!([]));
}

#[test]
fn test_for_each_or_null_on_missing_path() {
    let rows = run(
        json!([{"resourceType": "Patient", "id": "p"}]),
        json!({
            "resource": "Patient",
            "forEachOrNull": "missingPath",
            "select": [{"column": [{"name": "x", "path": "x"}]}]
        }),
    );
    assert_eq!(rows, json!([{"x": null}]));
}

#[test]
fn test_for_each_or_null_keeps_parent_rows() {
    let rows = run(
        patients(),
        json!({
            "resource": "Patient",
            "column": [{"name": "id", "path": "id"}],
            "select": [{
                "forEachOrNull": "telecom",
                "column": [{"name": "system", "path": "system"}]
            }]
        }),
    );
    assert_eq!(
        rows,
        json!([
            {"id": "pt1", "system": "phone"},
            {"id": "pt2", "system": null}
        ])
    );
}

#[test]
fn test_string_constant_is_quoted() {
    let rows = run(
        patients(),
        json!({
            "resource": "Patient",
            "constant": [{"name": "g", "valueCode": "male"}],
            "where": [{"path": "gender = %g"}],
            "column": [{"name": "id", "path": "id"}]
        }),
    );
    assert_eq!(rows, json!([{"id": "pt2"}]));
}

#[test]
fn test_constants_in_for_each_and_columns() {
    let rows = run(
        patients(),
        json!({
            "resource": "Patient",
            "constant": [
                {"name": "use", "valueString": "official"},
                {"name": "n", "valueInteger": 0}
            ],
            "select": [{
                "forEach": "name.where(use = %use)",
                "column": [
                    {"name": "family", "path": "family"},
                    {"name": "first", "path": "given[%n]"}
                ]
            }]
        }),
    );
    assert_eq!(rows, json!([{"family": "F1", "first": "G1"}]));
}

#[test]
fn test_where_must_be_boolean() {
    let resources = patients().as_array().cloned().unwrap();
    let err = evaluate(
        &resources,
        &json!({"resource": "Patient", "where": [{"path": "name.family.first()"}], "column": [{"name": "id", "path": "id"}]}),
    )
    .unwrap_err();
    assert!(matches!(err, SofError::NonBooleanWhere { .. }));
}

#[test]
fn test_configuration_errors() {
    let resources = patients().as_array().cloned().unwrap();
    let cases = [
        json!({"column": [{"name": "id", "path": "id"}]}),
        json!({"resource": "Patient", "unionAll": [
            {"column": [{"name": "a", "path": "id"}]},
            {"column": [{"name": "b", "path": "id"}]}
        ]}),
        json!({"resource": "Patient", "constant": [{"name": "c"}], "column": [{"name": "id", "path": "id"}]}),
    ];
    for view in cases {
        let err = evaluate(&resources, &view).unwrap_err();
        assert!(err.is_configuration_error(), "{err}");
    }
}

#[test]
fn test_deterministic_output() {
    let view = json!({
        "resource": "Patient",
        "select": [
            {"column": [{"name": "id", "path": "id"}]},
            {"forEachOrNull": "name", "column": [{"name": "family", "path": "family"}]}
        ]
    });
    assert_eq!(run(patients(), view.clone()), run(patients(), view));
}

#[test]
fn test_runner_reports_columns() {
    let view = ViewDefinition::from_json(&json!({
        "resource": "Patient",
        "column": [{"name": "id", "path": "id"}],
        "select": [{"forEachOrNull": "name", "column": [{"name": "family", "path": "family"}]}]
    }))
    .unwrap();
    let resources = patients().as_array().cloned().unwrap();
    let result = ViewRunner::new(SofConfig::strict()).run(&view, &resources).unwrap();
    assert_eq!(result.columns, vec!["id", "family"]);
    assert_eq!(result.len(), 3);
    assert_eq!(view.columns(), result.columns);
}
