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

//! ViewDefinition document model
//!
//! A direct serde mapping of the JSON ViewDefinition. Nodes keep every
//! selection field optional, exactly as authored; the
//! [`Normalizer`](super::Normalizer) turns them into a closed node enum.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A SQL-on-FHIR ViewDefinition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    /// Always `ViewDefinition` for well-formed documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Canonical URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Computer-friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-friendly title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Publication status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Natural language description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// FHIR resource type the view applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Named constants referenced as `%name` from paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constant: Vec<Constant>,

    /// Root selection
    #[serde(flatten)]
    pub root: ViewNode,
}

impl ViewDefinition {
    /// Parse a ViewDefinition from a JSON value
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Parse a ViewDefinition from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Output column names in row order
    pub fn columns(&self) -> Vec<String> {
        self.root.column_names()
    }
}

/// One selection node of a ViewDefinition tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    /// Columns produced by this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<Vec<Column>>,

    /// Nested selections joined by row product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<ViewNode>>,

    /// Branches whose rows are concatenated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_all: Option<Vec<ViewNode>>,

    /// Path whose items each produce rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,

    /// Like `forEach`, but an empty path still yields a null row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each_or_null: Option<String>,

    /// Filters that must all hold for the node to produce rows
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Vec<WhereClause>>,
}

impl ViewNode {
    /// Check if the node selects nothing at all
    pub fn is_empty(&self) -> bool {
        self.column.is_none()
            && self.select.is_none()
            && self.union_all.is_none()
            && self.for_each.is_none()
            && self.for_each_or_null.is_none()
    }

    /// Column names reachable from this node, in row order
    ///
    /// Follows the order nodes are joined in: unionAll branches, then the
    /// node's own columns, then nested selections.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = IndexSet::new();
        self.collect_column_names(&mut names);
        names.into_iter().collect()
    }

    fn collect_column_names(&self, names: &mut IndexSet<String>) {
        for branch in self.union_all.iter().flatten() {
            branch.collect_column_names(names);
        }
        for column in self.column.iter().flatten() {
            names.insert(column.name.clone());
        }
        for child in self.select.iter().flatten() {
            child.collect_column_names(names);
        }
    }
}

/// A column of the output table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its column list
    pub name: String,

    /// FHIRPath producing the value
    pub path: String,

    /// Keep every value instead of requiring at most one
    #[serde(default)]
    pub collection: bool,

    /// Declared FHIR type of the column
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A filter expression
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    /// FHIRPath that must evaluate to `true`
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named constant with a typed `value*` field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    /// Name referenced as `%name`
    pub name: String,

    /// Remaining fields in document order, including every `value*` field
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

impl Constant {
    /// The `value*` fields in document order
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter(|(key, _)| key.starts_with("value"))
            .map(|(key, value)| (key.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_view() {
        let view = ViewDefinition::from_json(&json!({
            "resourceType": "ViewDefinition",
            "resource": "Patient",
            "status": "active",
            "where": [{"path": "active"}],
            "select": [
                {"column": [{"name": "id", "path": "getResourceKey()"}]},
                {
                    "forEachOrNull": "name",
                    "column": [{"name": "given", "path": "given", "collection": true, "type": "string"}]
                }
            ]
        }))
        .unwrap();

        assert_eq!(view.resource.as_deref(), Some("Patient"));
        assert_eq!(view.root.where_.as_ref().map(Vec::len), Some(1));
        let select = view.root.select.as_ref().unwrap();
        assert_eq!(select[1].for_each_or_null.as_deref(), Some("name"));
        let given = &select[1].column.as_ref().unwrap()[0];
        assert!(given.collection);
        assert_eq!(given.type_.as_deref(), Some("string"));
    }

    #[test]
    fn test_columns_follow_join_order() {
        let view = ViewDefinition::from_json(&json!({
            "resource": "Patient",
            "column": [{"name": "id", "path": "id"}],
            "unionAll": [
                {"column": [{"name": "phone", "path": "value"}]},
                {"column": [{"name": "phone", "path": "value"}]}
            ],
            "select": [{"column": [{"name": "gender", "path": "gender"}]}]
        }))
        .unwrap();
        assert_eq!(view.columns(), vec!["phone", "id", "gender"]);
    }

    #[test]
    fn test_constant_values_keep_document_order() {
        let constant: Constant = serde_json::from_value(json!({
            "name": "c",
            "valueString": "a",
            "id": "x",
            "valueCode": "b"
        }))
        .unwrap();
        let keys: Vec<_> = constant.values().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["valueString", "valueCode"]);
    }

    #[test]
    fn test_empty_node() {
        assert!(ViewNode::default().is_empty());
        let node = ViewNode {
            for_each: Some("name".into()),
            ..ViewNode::default()
        };
        assert!(!node.is_empty());
    }
}
