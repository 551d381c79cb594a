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

//! Running ViewDefinitions over resource batches
//!
//! [`ViewRunner`] normalizes a view once, evaluates it against each resource
//! of the requested type and collects the rows into a [`ViewResult`]. Each
//! run gets a fresh [`FhirPathEngine`], so compiled paths are shared within a
//! batch and never between batches.

use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;

use crate::config::SofConfig;
use crate::engine::FhirPathEngine;
use crate::error::{Result, SofError};
use crate::model::FhirPathValue;
use crate::registry::{FunctionRegistry, create_standard_registry};
use crate::sof::{Evaluator, Row};
use crate::view::{ConstantTable, NormalizedNode, Normalizer, ViewDefinition};

/// Evaluate a JSON ViewDefinition over a batch of JSON resources
///
/// # Examples
///
/// ```rust
/// use octofhir_sof_eval::evaluate;
/// use serde_json::json;
///
/// let resources = vec![json!({"resourceType": "Patient", "id": "123"})];
/// let view = json!({"resource": "Patient", "column": [{"name": "id", "path": "id"}]});
/// let rows = evaluate(&resources, &view).unwrap();
/// assert_eq!(rows[0]["id"], json!("123"));
/// ```
pub fn evaluate(resources: &[Value], view: &Value) -> Result<Vec<Row>> {
    ViewRunner::default().evaluate(resources, view)
}

/// Rows produced by a view, with their column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewResult {
    /// Output columns in row order
    pub columns: Vec<String>,
    /// Rows in resource order
    pub rows: Vec<Row>,
}

impl ViewResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as a JSON array of objects
    pub fn to_json(&self) -> Value {
        Value::Array(self.rows.iter().map(row_to_json).collect())
    }

    /// Write one JSON object per line
    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<()> {
        for row in &self.rows {
            serde_json::to_writer(&mut writer, &row_to_json(row))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write a CSV table with a header row
    ///
    /// Nulls are empty fields; arrays and objects are written as compact JSON.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            let record = self
                .columns
                .iter()
                .map(|column| row.get(column).map(csv_field).unwrap_or_default());
            csv.write_record(record)?;
        }
        csv.flush()?;
        Ok(())
    }
}

fn row_to_json(row: &Row) -> Value {
    Value::Object(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluates ViewDefinitions with a fixed configuration
#[derive(Debug, Clone)]
pub struct ViewRunner {
    config: SofConfig,
    functions: Arc<FunctionRegistry>,
}

impl Default for ViewRunner {
    fn default() -> Self {
        Self::new(SofConfig::default())
    }
}

impl ViewRunner {
    pub fn new(config: SofConfig) -> Self {
        Self {
            config,
            functions: Arc::new(create_standard_registry()),
        }
    }

    pub fn config(&self) -> &SofConfig {
        &self.config
    }

    /// Check the view and produce its normalized tree
    pub fn prepare(&self, view: &ViewDefinition) -> Result<NormalizedNode> {
        if view.resource.is_none() {
            return Err(SofError::MissingResourceType);
        }
        let constants = ConstantTable::new(&view.constant, self.config.strict_constants)?;
        let node = Normalizer::new(&constants, &self.config).normalize_view(view)?;
        log::debug!(
            "normalized view {} with {} constants",
            view.name.as_deref().unwrap_or("<unnamed>"),
            constants.len()
        );
        Ok(node)
    }

    /// Evaluate a JSON view over `resources`; an empty batch yields no rows
    pub fn evaluate(&self, resources: &[Value], view: &Value) -> Result<Vec<Row>> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let view = ViewDefinition::from_json(view)?;
        Ok(self.run(&view, resources)?.rows)
    }

    /// Evaluate `view` over `resources`
    ///
    /// Resources of another type are skipped. The first error aborts the run.
    pub fn run(&self, view: &ViewDefinition, resources: &[Value]) -> Result<ViewResult> {
        let node = self.prepare(view)?;
        let resource_type = view.resource.as_deref().ok_or(SofError::MissingResourceType)?;
        let columns = node.column_names();

        let mut engine =
            FhirPathEngine::with_registry(Arc::clone(&self.functions), self.config.path_cache_capacity);
        let mut evaluator = Evaluator::new(&mut engine);

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for resource in resources {
            let Some(value) = FhirPathValue::from_json(resource) else {
                skipped += 1;
                continue;
            };
            if value.resource_type() != Some(resource_type) {
                skipped += 1;
                continue;
            }
            rows.extend(evaluator.evaluate(&node, &value)?);
        }

        let (hits, misses) = engine.cache().stats();
        log::debug!(
            "view over {}: {} resources matched, {} skipped, {} rows, path cache {} hits / {} misses",
            resource_type,
            resources.len() - skipped,
            skipped,
            rows.len(),
            hits,
            misses
        );

        Ok(ViewResult { columns, rows })
    }
}

/// Read resources from a JSON array, a Bundle, a single resource or NDJSON
pub fn parse_resources(text: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(document) if document.get("resourceType") == Some(&Value::from("Bundle")) => {
            Ok(document
                .get("entry")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.get("resource").cloned())
                .collect())
        }
        Ok(document) => Ok(vec![document]),
        Err(_) => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SofError::from))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn patients() -> Vec<Value> {
        vec![
            json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Doe", "given": ["John"]}]}),
            json!({"resourceType": "Observation", "id": "o1"}),
            json!({"id": "untyped"}),
            json!({"resourceType": "Patient", "id": "p2"}),
        ]
    }

    #[test]
    fn test_filters_by_resource_type() {
        let view = json!({"resource": "Patient", "column": [{"name": "id", "path": "id"}]});
        let rows = evaluate(&patients(), &view).unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row["id"].clone()).collect();
        assert_eq!(ids, vec![json!("p1"), json!("p2")]);
    }

    #[test]
    fn test_empty_batch_and_missing_resource() {
        let view = json!({"column": [{"name": "id", "path": "id"}]});
        assert!(evaluate(&[], &view).unwrap().is_empty());
        assert!(matches!(
            evaluate(&patients(), &view),
            Err(SofError::MissingResourceType)
        ));
    }

    #[test]
    fn test_first_error_aborts_batch() {
        let view = json!({"resource": "Patient", "column": [{"name": "g", "path": "name.given | name.family"}]});
        assert!(matches!(
            evaluate(&patients(), &view),
            Err(SofError::MultipleValues { .. })
        ));
    }

    #[test]
    fn test_output_formats() {
        let view = ViewDefinition::from_json(&json!({
            "resource": "Patient",
            "column": [
                {"name": "id", "path": "id"},
                {"name": "family", "path": "name.family"},
                {"name": "given", "path": "name.given", "collection": true}
            ]
        }))
        .unwrap();
        let result = ViewRunner::default().run(&view, &patients()).unwrap();
        assert_eq!(result.columns, vec!["id", "family", "given"]);
        assert_eq!(result.len(), 2);

        let mut csv = Vec::new();
        result.write_csv(&mut csv).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "id,family,given\np1,Doe,\"[\"\"John\"\"]\"\np2,,[]\n"
        );

        let mut ndjson = Vec::new();
        result.write_ndjson(&mut ndjson).unwrap();
        let text = String::from_utf8(ndjson).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(
            serde_json::from_str::<Value>(text.lines().next().unwrap()).unwrap(),
            json!({"id": "p1", "family": "Doe", "given": ["John"]})
        );
        assert_eq!(result.to_json()[1], json!({"id": "p2", "family": null, "given": []}));
    }

    #[test]
    fn test_parse_resources() {
        let bundle = r#"{"resourceType": "Bundle", "entry": [{"resource": {"resourceType": "Patient"}}, {}]}"#;
        assert_eq!(parse_resources(bundle).unwrap().len(), 1);
        assert_eq!(parse_resources("[{}, {}]").unwrap().len(), 2);
        assert_eq!(parse_resources("{\"a\": 1}\n\n{\"a\": 2}\n").unwrap().len(), 2);
        assert!(parse_resources("{not json").is_err());
    }
}
