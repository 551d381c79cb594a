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

//! View evaluation over a single resource
//!
//! The [`Evaluator`] walks a [`NormalizedNode`] tree. Every node produces a
//! list of [`Row`]s; selections join their children with [`row_product`],
//! iterations concatenate the rows produced for each item, and unionAll
//! concatenates branch rows.

use indexmap::IndexMap;
use serde_json::Value;

use crate::engine::FhirPathEngine;
use crate::error::{Result, SofError};
use crate::model::{Collection, FhirPathValue};
use crate::view::{ColumnSpec, NormalizedNode, Selection};

/// One output row: column name to scalar, array or null
pub type Row = IndexMap<String, Value>;

/// Evaluates normalized view nodes against resources
pub struct Evaluator<'e> {
    engine: &'e mut FhirPathEngine,
}

impl<'e> Evaluator<'e> {
    /// Create an evaluator compiling paths through `engine`
    pub fn new(engine: &'e mut FhirPathEngine) -> Self {
        Self { engine }
    }

    /// Rows produced by `node` for one resource
    pub fn evaluate(&mut self, node: &NormalizedNode, resource: &FhirPathValue) -> Result<Vec<Row>> {
        self.node(node, resource, resource)
    }

    fn node(
        &mut self,
        node: &NormalizedNode,
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<Vec<Row>> {
        match node {
            NormalizedNode::Column(columns) => self.column(columns, context, resource),
            NormalizedNode::Select(body) => self.select(body, context, resource),
            NormalizedNode::ForEach { path, body } => self.for_each(path, body, context, resource),
            NormalizedNode::ForEachOrNull { path, body } => {
                let items = self.apply(path, context, resource)?;
                if items.is_empty() {
                    return Ok(vec![null_row(node)]);
                }
                self.each(&items, body, resource)
            }
            NormalizedNode::UnionAll(branches) => self.union_all(branches, context, resource),
        }
    }

    fn apply(
        &mut self,
        path: &str,
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<Collection> {
        Ok(self.engine.compile(path)?.apply_with_root(context, resource)?)
    }

    fn column(
        &mut self,
        columns: &[ColumnSpec],
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<Vec<Row>> {
        let mut row = Row::with_capacity(columns.len());
        for column in columns {
            let values = self.apply(&column.path, context, resource)?;
            let value = if column.collection {
                values.to_json()
            } else {
                match values.as_slice() {
                    [] => Value::Null,
                    [value] => value.to_json(),
                    _ => {
                        return Err(SofError::MultipleValues {
                            column: column.name.clone(),
                            count: values.len(),
                        });
                    }
                }
            };
            row.insert(column.name.clone(), value);
        }
        Ok(vec![row])
    }

    fn select(
        &mut self,
        body: &Selection,
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<Vec<Row>> {
        for path in &body.where_ {
            if !self.condition(path, context, resource)? {
                return Ok(Vec::new());
            }
        }

        let mut parts = Vec::with_capacity(body.select.len());
        for child in &body.select {
            let rows = self.node(child, context, resource)?;
            if rows.is_empty() {
                return Ok(Vec::new());
            }
            parts.push(rows);
        }
        Ok(row_product(parts))
    }

    fn condition(
        &mut self,
        path: &str,
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<bool> {
        let result = self.apply(path, context, resource)?;
        match result.as_slice() {
            [] => Ok(false),
            [FhirPathValue::Boolean(b)] => Ok(*b),
            _ => Err(SofError::NonBooleanWhere {
                path: path.to_string(),
                value: result.to_json().to_string(),
            }),
        }
    }

    fn for_each(
        &mut self,
        path: &str,
        body: &Selection,
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<Vec<Row>> {
        let items = self.apply(path, context, resource)?;
        self.each(&items, body, resource)
    }

    fn each(
        &mut self,
        items: &Collection,
        body: &Selection,
        resource: &FhirPathValue,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for item in items {
            rows.extend(self.select(body, item, resource)?);
        }
        Ok(rows)
    }

    fn union_all(
        &mut self,
        branches: &[NormalizedNode],
        context: &FhirPathValue,
        resource: &FhirPathValue,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for branch in branches {
            rows.extend(self.node(branch, context, resource)?);
        }
        Ok(rows)
    }
}

/// Row with every column reachable from `node` set to null
pub fn null_row(node: &NormalizedNode) -> Row {
    node.column_names()
        .into_iter()
        .map(|name| (name, Value::Null))
        .collect()
}

/// Cross product of sibling row lists
///
/// Rows are merged left to right; on a name collision the row from the list
/// folded in later wins. Keys keep first-seen order, so the columns of earlier
/// lists lead each merged row. A single list is returned unchanged.
pub fn row_product(parts: Vec<Vec<Row>>) -> Vec<Row> {
    let parts = match <[Vec<Row>; 1]>::try_from(parts) {
        Ok([only]) => return only,
        Err(parts) => parts,
    };

    let mut rows = vec![Row::new()];
    for part in parts {
        let mut joined = Vec::with_capacity(rows.len() * part.len());
        for partial in &part {
            for row in &rows {
                let mut merged = row.clone();
                merged.extend(partial.iter().map(|(k, v)| (k.clone(), v.clone())));
                joined.push(merged);
            }
        }
        rows = joined;
    }
    rows
}
