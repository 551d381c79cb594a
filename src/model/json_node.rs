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

//! Shared handles into a JSON document
//!
//! A [`JsonNode`] points at one element of a document held behind an `Arc`.
//! Navigating to a child extends the pointer; the document itself is never
//! copied.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(Arc<str>),
    Index(usize),
}

/// Handle to an element inside a shared JSON document
#[derive(Clone)]
pub struct JsonNode {
    root: Arc<Value>,
    path: Arc<[Step]>,
}

impl JsonNode {
    /// Take ownership of a document and point at its root
    pub fn new(value: Value) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Point at the root of an already shared document
    pub fn from_arc(root: Arc<Value>) -> Self {
        Self {
            root,
            path: Arc::from(Vec::new()),
        }
    }

    /// The JSON value this node points at
    pub fn value(&self) -> &Value {
        let mut current = self.root.as_ref();
        for step in self.path.iter() {
            let next = match step {
                Step::Key(key) => current.get(key.as_ref()),
                Step::Index(index) => current.get(*index),
            };
            match next {
                Some(value) => current = value,
                None => return &NULL,
            }
        }
        current
    }

    /// The object this node points at, if it is one
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.value().as_object()
    }

    /// Borrow a field of the pointed-at object
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Node for the field `key`
    pub fn child(&self, key: &str) -> Self {
        self.extend(Step::Key(Arc::from(key)))
    }

    /// Node for the array item at `index`
    pub fn item(&self, index: usize) -> Self {
        self.extend(Step::Index(index))
    }

    /// Whether two nodes share the same document
    pub fn shares_document(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    fn extend(&self, step: Step) -> Self {
        let path: Vec<Step> = self.path.iter().cloned().chain(Some(step)).collect();
        Self {
            root: Arc::clone(&self.root),
            path: Arc::from(path),
        }
    }
}

impl PartialEq for JsonNode {
    fn eq(&self, other: &Self) -> bool {
        (self.shares_document(other) && self.path == other.path) || self.value() == other.value()
    }
}

impl fmt::Display for JsonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl fmt::Debug for JsonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonNode")
            .field("path", &self.path)
            .field("value", self.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn children_share_the_document() {
        let root = JsonNode::new(json!({"name": [{"family": "Doe"}, {"family": "Roe"}]}));
        let second = root.child("name").item(1);

        assert!(second.shares_document(&root));
        assert_eq!(second.get("family"), Some(&json!("Roe")));
        assert_eq!(second.child("family").value(), &json!("Roe"));
    }

    #[test]
    fn missing_steps_resolve_to_null() {
        let root = JsonNode::new(json!({"a": 1}));
        assert_eq!(root.child("b").item(3).value(), &Value::Null);
        assert!(root.child("a").as_object().is_none());
    }

    #[test]
    fn equality_compares_content() {
        let left = JsonNode::new(json!({"a": {"b": 1}}));
        let right = JsonNode::new(json!({"b": 1}));
        assert_eq!(left.child("a"), right);
        assert_ne!(left, right);
    }
}
