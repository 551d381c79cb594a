// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SQL-on-FHIR conformance test suites
//!
//! A suite file holds shared `resources` and a list of `tests`, each with a
//! `view` and either the `expect`ed rows or `expectError: true`. Rows are
//! compared in order; keys within a row are compared without regard to order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::runner::ViewRunner;
use crate::sof::Row;

/// A conformance suite file
#[derive(Debug, Clone, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Resources shared by every test
    #[serde(default)]
    pub resources: Vec<Value>,
    pub tests: Vec<TestCase>,
}

/// One view and its expected outcome
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub view: Value,
    #[serde(default)]
    pub expect: Option<Vec<Value>>,
    #[serde(default)]
    pub expect_error: bool,
}

/// How a test case ended
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    Passed,
    /// Rows differ from the expectation
    Mismatch { expected: Value, actual: Value },
    /// Evaluation failed where rows were expected
    UnexpectedError(String),
    /// Evaluation succeeded where an error was expected
    MissingError { actual: Value },
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub name: String,
    pub outcome: CaseOutcome,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.outcome == CaseOutcome::Passed
    }
}

/// Results of one suite
#[derive(Debug, Clone, Default)]
pub struct SuiteResult {
    pub name: String,
    pub cases: Vec<CaseResult>,
}

impl SuiteResult {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|case| case.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }
}

impl TestSuite {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Run every test case, recording results under `name`
    pub fn run(&self, name: &str, runner: &ViewRunner) -> SuiteResult {
        let cases = self
            .tests
            .iter()
            .map(|case| run_case(runner, &self.resources, case))
            .collect();
        SuiteResult {
            name: name.to_string(),
            cases,
        }
    }
}

/// Run one test case against `resources`
pub fn run_case(runner: &ViewRunner, resources: &[Value], case: &TestCase) -> CaseResult {
    let result = runner.evaluate(resources, &case.view);
    let outcome = match (result, case.expect_error) {
        (Err(_), true) => CaseOutcome::Passed,
        (Ok(rows), true) => CaseOutcome::MissingError {
            actual: rows_to_json(&rows),
        },
        (Err(err), false) => CaseOutcome::UnexpectedError(err.to_string()),
        (Ok(rows), false) => {
            let actual = rows_to_json(&rows);
            let expected = case.expect.clone().unwrap_or_default();
            if rows_match(&expected, &rows) {
                CaseOutcome::Passed
            } else {
                CaseOutcome::Mismatch {
                    expected: Value::Array(expected),
                    actual,
                }
            }
        }
    };
    log::debug!("{}: {:?}", case.title, outcome);
    CaseResult {
        name: case.title.clone(),
        outcome,
    }
}

fn rows_to_json(rows: &[Row]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| Value::Object(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            .collect(),
    )
}

/// Compare expected JSON rows with produced rows
pub fn rows_match(expected: &[Value], actual: &[Row]) -> bool {
    expected.len() == actual.len()
        && expected.iter().zip(actual).all(|(expected, row)| match expected {
            Value::Object(object) => {
                object.len() == row.len()
                    && object
                        .iter()
                        .all(|(key, value)| row.get(key).is_some_and(|other| json_equal(value, other)))
            }
            _ => false,
        })
}

/// JSON equality with integer and decimal forms of one number treated equal
pub fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < 1e-10,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| json_equal(value, other)))
        }
        _ => left == right,
    }
}

#[derive(Debug, Clone, Serialize)]
struct ReportEntry {
    name: String,
    result: ReportResult,
}

#[derive(Debug, Clone, Serialize)]
struct ReportResult {
    passed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
struct ReportFile {
    tests: Vec<ReportEntry>,
}

/// Conformance report keyed by suite file name
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TestReport {
    files: BTreeMap<String, ReportFile>,
}

impl TestReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every case of `suite`
    pub fn add_suite(&mut self, suite: &SuiteResult) {
        let file = self.files.entry(suite.name.clone()).or_default();
        file.tests.extend(suite.cases.iter().map(|case| ReportEntry {
            name: case.name.clone(),
            result: ReportResult {
                passed: case.passed(),
            },
        }));
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
