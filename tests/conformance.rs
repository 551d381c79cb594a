//! Runs the SQL-on-FHIR suites in tests/fixtures through the conformance runner

use octofhir_sof_eval::ViewRunner;
use octofhir_sof_eval::conformance::{CaseOutcome, TestReport, TestSuite};
use std::path::{Path, PathBuf};

fn fixture_files() -> Vec<PathBuf> {
    let pattern = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/*.json");
    let mut files: Vec<_> = glob::glob(&pattern.to_string_lossy())
        .unwrap()
        .map(Result::unwrap)
        .collect();
    files.sort();
    files
}

#[test]
fn test_fixture_suites_pass() {
    let files = fixture_files();
    assert!(!files.is_empty(), "no fixture suites found");

    let runner = ViewRunner::default();
    let mut failures = Vec::new();
    for file in &files {
        let name = file.file_name().unwrap().to_string_lossy().into_owned();
        let suite = TestSuite::from_file(file).unwrap();
        let result = suite.run(&name, &runner);
        for case in result.cases {
            if case.outcome != CaseOutcome::Passed {
                failures.push(format!("{name}::{}: {:?}", case.name, case.outcome));
            }
        }
    }
    assert!(failures.is_empty(), "failing cases:\n{}", failures.join("\n"));
}

#[test]
fn test_report_lists_every_case() {
    let runner = ViewRunner::default();
    let mut report = TestReport::new();
    let mut expected = 0;
    for file in fixture_files() {
        let name = file.file_name().unwrap().to_string_lossy().into_owned();
        let suite = TestSuite::from_file(&file).unwrap();
        expected += suite.tests.len();
        report.add_suite(&suite.run(&name, &runner));
    }

    let json = report.to_json().unwrap();
    let listed: usize = json
        .as_object()
        .unwrap()
        .values()
        .map(|file| file["tests"].as_array().unwrap().len())
        .sum();
    assert_eq!(listed, expected);
    assert_eq!(
        json["basic.json"]["tests"][0]["result"]["passed"],
        serde_json::Value::Bool(true)
    );
}
