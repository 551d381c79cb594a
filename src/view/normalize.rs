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

//! ViewDefinition normalization
//!
//! Normalization rewrites the authored tree into [`NormalizedNode`]s where
//! every node has exactly one shape. Siblings that the authored form allows
//! next to each other are hoisted into a selection so they are joined by row
//! product:
//!
//! ```text
//! { forEach: p, unionAll: U, column: C, select: [S...] }
//!   => ForEach(p, [UnionAll(U), Column(C), S...])
//! ```
//!
//! Constants are substituted into every path while normalizing, so the
//! evaluator never sees a `%constant` or `$this` token.

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use super::constants::ConstantTable;
use super::definition::{Column, ViewDefinition, ViewNode};
use crate::config::SofConfig;
use crate::error::{Result, SofError};

static COLUMN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

/// A column with its path ready for evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub path: String,
    pub collection: bool,
}

/// Filters plus the child nodes whose rows are joined
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    /// Where-clause paths, all of which must hold
    pub where_: Vec<String>,
    /// Children combined by row product
    pub select: Vec<NormalizedNode>,
}

/// A ViewDefinition node in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedNode {
    /// Leaf producing one row from its columns
    Column(Vec<ColumnSpec>),

    /// Filtered row product of child nodes
    Select(Selection),

    /// Selection repeated for every item of `path`
    ForEach { path: String, body: Selection },

    /// Like [`NormalizedNode::ForEach`], with a null row when `path` is empty
    ForEachOrNull { path: String, body: Selection },

    /// Concatenation of branch rows
    UnionAll(Vec<NormalizedNode>),
}

impl NormalizedNode {
    /// Every column name this node can produce, in row order
    pub fn column_names(&self) -> Vec<String> {
        let mut names = IndexSet::new();
        self.collect_column_names(&mut names);
        names.into_iter().collect()
    }

    fn collect_column_names(&self, names: &mut IndexSet<String>) {
        match self {
            Self::Column(columns) => {
                names.extend(columns.iter().map(|column| column.name.clone()));
            }
            Self::Select(body) | Self::ForEach { body, .. } | Self::ForEachOrNull { body, .. } => {
                for child in &body.select {
                    child.collect_column_names(names);
                }
            }
            Self::UnionAll(branches) => {
                for branch in branches {
                    branch.collect_column_names(names);
                }
            }
        }
    }
}

/// Rewrites ViewDefinition trees into [`NormalizedNode`]s
#[derive(Debug)]
pub struct Normalizer<'a> {
    constants: &'a ConstantTable,
    validate_column_names: bool,
}

impl<'a> Normalizer<'a> {
    pub fn new(constants: &'a ConstantTable, config: &SofConfig) -> Self {
        Self {
            constants,
            validate_column_names: config.validate_column_names,
        }
    }

    /// Normalize the root selection of `view`
    pub fn normalize_view(&self, view: &ViewDefinition) -> Result<NormalizedNode> {
        self.normalize(&view.root)
    }

    /// Normalize one node and its descendants
    pub fn normalize(&self, node: &ViewNode) -> Result<NormalizedNode> {
        if node.is_empty() {
            return Err(SofError::invalid_view(
                "a selection needs column, select, unionAll, forEach or forEachOrNull",
            ));
        }

        if let Some(path) = &node.for_each {
            if let Some(other) = &node.for_each_or_null {
                return Err(SofError::ConflictingIteration {
                    for_each: path.clone(),
                    for_each_or_null: other.clone(),
                });
            }
            log::trace!("normalizing forEach '{path}'");
            return Ok(NormalizedNode::ForEach {
                path: self.constants.substitute(path),
                body: self.selection(node)?,
            });
        }

        if let Some(path) = &node.for_each_or_null {
            log::trace!("normalizing forEachOrNull '{path}'");
            return Ok(NormalizedNode::ForEachOrNull {
                path: self.constants.substitute(path),
                body: self.selection(node)?,
            });
        }

        let both = node.union_all.is_some() && node.column.is_some();
        if node.select.is_some() || node.where_.is_some() || both {
            return Ok(NormalizedNode::Select(self.selection(node)?));
        }

        match (&node.union_all, &node.column) {
            (Some(branches), _) => self.union_all(branches),
            (None, Some(columns)) => self.columns(columns),
            (None, None) => Err(SofError::invalid_view("selection has no content")),
        }
    }

    /// Hoist unionAll and column into the select list and normalize it
    fn selection(&self, node: &ViewNode) -> Result<Selection> {
        let mut select = Vec::new();
        if let Some(branches) = &node.union_all {
            select.push(self.union_all(branches)?);
        }
        if let Some(columns) = &node.column {
            select.push(self.columns(columns)?);
        }
        for child in node.select.iter().flatten() {
            select.push(self.normalize(child)?);
        }

        let where_ = node
            .where_
            .iter()
            .flatten()
            .map(|clause| self.constants.substitute(&clause.path))
            .collect();

        Ok(Selection { where_, select })
    }

    fn union_all(&self, branches: &[ViewNode]) -> Result<NormalizedNode> {
        let branches = branches
            .iter()
            .map(|branch| self.normalize(branch))
            .collect::<Result<Vec<_>>>()?;

        if let Some((first, rest)) = branches.split_first() {
            let expected = first.column_names();
            for branch in rest {
                let actual = branch.column_names();
                if actual != expected {
                    return Err(SofError::UnionAllMismatch { expected, actual });
                }
            }
        }

        Ok(NormalizedNode::UnionAll(branches))
    }

    fn columns(&self, columns: &[Column]) -> Result<NormalizedNode> {
        let mut seen = FxHashSet::default();
        let mut specs = Vec::with_capacity(columns.len());
        for column in columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SofError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
            if self.validate_column_names && !COLUMN_NAME.is_match(&column.name) {
                return Err(SofError::invalid_view(format!(
                    "column name '{}' must match {}",
                    column.name,
                    COLUMN_NAME.as_str()
                )));
            }
            specs.push(ColumnSpec {
                name: column.name.clone(),
                path: self.constants.substitute(&column.path),
                collection: column.collection,
            });
        }
        Ok(NormalizedNode::Column(specs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn normalize_with(view: Value, config: &SofConfig) -> Result<NormalizedNode> {
        let view = ViewDefinition::from_json(&view).unwrap();
        let constants = ConstantTable::new(&view.constant, config.strict_constants)?;
        Normalizer::new(&constants, config).normalize_view(&view)
    }

    fn normalize(view: Value) -> Result<NormalizedNode> {
        normalize_with(view, &SofConfig::default())
    }

    fn column(name: &str, path: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.into(),
            path: path.into(),
            collection: false,
        }
    }

    #[test]
    fn test_column_leaf() {
        let node = normalize(json!({"column": [{"name": "id", "path": "id"}]})).unwrap();
        assert_eq!(node, NormalizedNode::Column(vec![column("id", "id")]));
    }

    #[test]
    fn test_hoist_order() {
        let node = normalize(json!({
            "forEach": "name",
            "column": [{"name": "family", "path": "family"}],
            "unionAll": [{"column": [{"name": "g", "path": "given"}]}],
            "select": [{"column": [{"name": "use", "path": "use"}]}]
        }))
        .unwrap();

        let NormalizedNode::ForEach { path, body } = node else {
            panic!("expected forEach, got {node:?}");
        };
        assert_eq!(path, "name");
        assert_eq!(
            body.select,
            vec![
                NormalizedNode::UnionAll(vec![NormalizedNode::Column(vec![column("g", "given")])]),
                NormalizedNode::Column(vec![column("family", "family")]),
                NormalizedNode::Column(vec![column("use", "use")]),
            ]
        );
    }

    #[test]
    fn test_union_all_with_column_becomes_select() {
        let node = normalize(json!({
            "column": [{"name": "id", "path": "id"}],
            "unionAll": [
                {"column": [{"name": "v", "path": "a"}]},
                {"column": [{"name": "v", "path": "b"}]}
            ]
        }))
        .unwrap();
        let NormalizedNode::Select(body) = node else {
            panic!("expected select");
        };
        assert!(matches!(body.select[0], NormalizedNode::UnionAll(_)));
        assert!(matches!(body.select[1], NormalizedNode::Column(_)));
        assert_eq!(body.select.len(), 2);
    }

    #[test]
    fn test_union_all_mismatch() {
        let err = normalize(json!({
            "unionAll": [
                {"column": [{"name": "a", "path": "a"}, {"name": "b", "path": "b"}]},
                {"column": [{"name": "b", "path": "b"}, {"name": "a", "path": "a"}]}
            ]
        }))
        .unwrap_err();
        let SofError::UnionAllMismatch { expected, actual } = err else {
            panic!("expected mismatch, got {err:?}");
        };
        assert_eq!(expected, vec!["a", "b"]);
        assert_eq!(actual, vec!["b", "a"]);
    }

    #[test]
    fn test_union_all_branch_without_columns() {
        let err = normalize(json!({
            "unionAll": [
                {"column": [{"name": "a", "path": "a"}]},
                {"select": []}
            ]
        }))
        .unwrap_err();
        let SofError::UnionAllMismatch { expected, actual } = err else {
            panic!("expected mismatch, got {err:?}");
        };
        assert_eq!(expected, vec!["a"]);
        assert!(actual.is_empty());
    }

    #[test]
    fn test_union_all_different_column_names() {
        let err = normalize(json!({
            "unionAll": [
                {"column": [{"name": "a", "path": "a"}]},
                {"column": [{"name": "b", "path": "b"}]}
            ]
        }))
        .unwrap_err();
        let SofError::UnionAllMismatch { expected, actual } = err else {
            panic!("expected mismatch, got {err:?}");
        };
        assert_eq!(expected, vec!["a"]);
        assert_eq!(actual, vec!["b"]);
    }

    #[test]
    fn test_union_all_nested_branches_compare_output_columns() {
        let node = normalize(json!({
            "unionAll": [
                {"forEach": "telecom", "column": [{"name": "v", "path": "value"}]},
                {"column": [{"name": "v", "path": "id"}]}
            ]
        }));
        assert!(node.is_ok());
    }

    #[test]
    fn test_constants_reach_every_path() {
        let node = normalize(json!({
            "constant": [{"name": "sys", "valueUri": "http://loinc.org"}],
            "where": [{"path": "code.coding.system = %sys"}],
            "select": [{
                "forEachOrNull": "code.coding.where(system = %sys)",
                "where": [{"path": "$this.code.exists()"}],
                "column": [{"name": "code", "path": "code"}]
            }]
        }))
        .unwrap();

        let NormalizedNode::Select(root) = node else {
            panic!("expected select");
        };
        assert_eq!(root.where_, vec!["code.coding.system = 'http://loinc.org'"]);
        let NormalizedNode::ForEachOrNull { path, body } = &root.select[0] else {
            panic!("expected forEachOrNull");
        };
        assert_eq!(path, "code.coding.where(system = 'http://loinc.org')");
        assert_eq!(body.where_, vec!["identity().code.exists()"]);
    }

    #[test]
    fn test_where_on_column_node_is_kept() {
        let node = normalize(json!({
            "where": [{"path": "active"}],
            "column": [{"name": "id", "path": "id"}]
        }))
        .unwrap();
        assert_eq!(
            node,
            NormalizedNode::Select(Selection {
                where_: vec!["active".into()],
                select: vec![NormalizedNode::Column(vec![column("id", "id")])],
            })
        );
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            normalize(json!({"resource": "Patient"})),
            Err(SofError::InvalidViewDefinition { .. })
        ));
        assert!(matches!(
            normalize(json!({"forEach": "a", "forEachOrNull": "b", "column": []})),
            Err(SofError::ConflictingIteration { .. })
        ));
        assert!(matches!(
            normalize(json!({"column": [{"name": "a", "path": "x"}, {"name": "a", "path": "y"}]})),
            Err(SofError::DuplicateColumn { ref name }) if name == "a"
        ));
    }

    #[test]
    fn test_column_name_validation() {
        let view = json!({"column": [{"name": "1st", "path": "id"}]});
        assert!(normalize(view.clone()).is_ok());
        assert!(normalize_with(view, &SofConfig::strict()).is_err());
    }

    #[test]
    fn test_null_row_columns() {
        let node = normalize(json!({
            "forEachOrNull": "contact",
            "column": [{"name": "a", "path": "a"}],
            "select": [{"unionAll": [
                {"column": [{"name": "b", "path": "b"}]},
                {"column": [{"name": "b", "path": "c"}]}
            ]}]
        }))
        .unwrap();
        assert_eq!(node.column_names(), vec!["a", "b"]);
    }
}
