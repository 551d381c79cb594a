//! Integration tests for the embedded FHIRPath engine
//!
//! Covers the expression subset ViewDefinitions rely on, evaluated through
//! the public `FhirPathEngine` API.

use octofhir_sof_eval::{FhirPathEngine, FhirPathError, FhirPathValue, parse};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};

fn observation() -> Value {
    json!({
        "resourceType": "Observation",
        "id": "obs-1",
        "status": "final",
        "code": {
            "coding": [
                {"system": "http://loinc.org", "code": "8480-6", "display": "Systolic"},
                {"system": "http://snomed.info/sct", "code": "271649006"}
            ],
            "text": "Systolic blood pressure"
        },
        "subject": {"reference": "Patient/p1"},
        "effectiveDateTime": "2024-01-15T10:30:00Z",
        "valueQuantity": {"value": 120.5, "unit": "mmHg"},
        "component": [
            {"valueInteger": 3},
            {"valueString": "x"}
        ],
        "extension": [
            {"url": "http://example.org/ext/device", "valueString": "cuff"}
        ]
    })
}

#[rstest]
#[case("id", json!(["obs-1"]))]
#[case("Observation.status", json!(["final"]))]
#[case("code.coding.code", json!(["8480-6", "271649006"]))]
#[case("code.coding[1].code", json!(["271649006"]))]
#[case("code.coding.where(system = 'http://loinc.org').display", json!(["Systolic"]))]
#[case("code.coding.exists(code = '8480-6')", json!([true]))]
#[case("code.coding.count()", json!([2]))]
#[case("code.coding.first().system", json!(["http://loinc.org"]))]
#[case("code.text.lower()", json!(["systolic blood pressure"]))]
#[case("code.text.substring(0, 8)", json!(["Systolic"]))]
#[case("code.coding.code.join('|')", json!(["8480-6|271649006"]))]
#[case("value.ofType(Quantity).value", json!([120.5]))]
#[case("value.unit", json!(["mmHg"]))]
#[case("component.value.ofType(integer)", json!([3]))]
#[case("subject.getReferenceKey()", json!(["p1"]))]
#[case("subject.getReferenceKey(Patient)", json!(["p1"]))]
#[case("subject.getReferenceKey(Group)", json!([]))]
#[case("getResourceKey()", json!(["obs-1"]))]
#[case("extension('http://example.org/ext/device').value.ofType(string)", json!(["cuff"]))]
#[case("status = 'final' and value.value > 100", json!([true]))]
#[case("iif(value.value > 140, 'high', 'normal')", json!(["normal"]))]
#[case("code.coding.code.where(identity().startsWith('84'))", json!(["8480-6"]))]
#[case("(1 | 2 | 2).count()", json!([2]))]
#[case("7 div 2 + 7 mod 2", json!([4]))]
#[case("'a' & {} & 'b'", json!(["ab"]))]
#[case("{}.exists()", json!([false]))]
fn test_expressions(#[case] expression: &str, #[case] expected: Value) {
    let mut engine = FhirPathEngine::new();
    let result = engine.evaluate(expression, &observation()).unwrap();
    assert_eq!(result.to_json(), expected, "{expression}");
}

#[test]
fn test_compiled_paths_are_reused() {
    let mut engine = FhirPathEngine::with_cache_capacity(16);
    let first = engine.compile("code.coding.code").unwrap();
    let second = engine.compile("code.coding.code").unwrap();
    assert_eq!(first.path(), second.path());
    assert_eq!(engine.cache().len(), 1);
    assert_eq!(engine.cache().stats(), (1, 1));

    let resource = FhirPathValue::from_json(&observation()).unwrap();
    assert_eq!(first.apply(&resource).unwrap(), second.apply(&resource).unwrap());
}

#[test]
fn test_errors() {
    let mut engine = FhirPathEngine::new();
    assert!(matches!(
        engine.evaluate("code.", &observation()),
        Err(FhirPathError::Parse { .. })
    ));
    assert!(matches!(
        engine.evaluate("%undeclared", &observation()),
        Err(FhirPathError::Evaluation { .. })
    ));
    assert!(matches!(
        engine.evaluate("code.nonexistentFunction()", &observation()),
        Err(FhirPathError::Evaluation { .. })
    ));
}

#[test]
fn test_parse_round_trip_display() {
    let ast = parse("name.where(use = 'official').family").unwrap();
    let reparsed = parse(&ast.to_string()).unwrap();
    assert_eq!(ast, reparsed);
}
