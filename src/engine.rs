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

//! FHIRPath engine - compiles path strings and applies them to resources
//!
//! A [`FhirPathEngine`] owns a [`PathCache`] so each distinct path is parsed
//! at most once for the engine's lifetime. View evaluation creates one engine
//! per batch, which keeps cached paths from leaking between batches.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::ast::ExpressionNode;
use crate::evaluator::{EvaluationError, ExpressionEvaluator};
use crate::model::{Collection, FhirPathValue};
use crate::parser::{ParseError, parse_expression};
use crate::registry::{FunctionRegistry, create_standard_registry};

/// Default upper bound on cached compiled paths
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Result type alias for FHIRPath operations
pub type Result<T> = std::result::Result<T, FhirPathError>;

/// Error raised while compiling or applying a path
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FhirPathError {
    /// The path did not parse
    #[error("Parse error in '{path}': {source}")]
    Parse {
        /// Path text
        path: String,
        /// Underlying parser error
        source: ParseError,
    },

    /// The path failed while being evaluated
    #[error("Evaluation error in '{path}': {source}")]
    Evaluation {
        /// Path text
        path: String,
        /// Underlying evaluation error
        source: EvaluationError,
    },
}

impl FhirPathError {
    /// The path that failed
    pub fn path(&self) -> &str {
        match self {
            Self::Parse { path, .. } | Self::Evaluation { path, .. } => path,
        }
    }
}

/// Cache of parsed paths keyed by the exact path text
#[derive(Debug)]
pub struct PathCache {
    entries: FxHashMap<String, Arc<ExpressionNode>>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl PathCache {
    /// Create a cache holding at most `capacity` paths
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Parsed form of `path`, parsing on first use
    ///
    /// When the cache is full it is cleared before inserting.
    pub fn get_or_parse(&mut self, path: &str) -> std::result::Result<Arc<ExpressionNode>, ParseError> {
        if let Some(expression) = self.entries.get(path) {
            self.hits += 1;
            log::trace!("path cache hit: {path}");
            return Ok(Arc::clone(expression));
        }
        self.misses += 1;
        log::trace!("path cache miss: {path}");
        let expression = Arc::new(parse_expression(path)?);
        if self.entries.len() >= self.capacity {
            log::debug!("path cache full ({} entries), clearing", self.entries.len());
            self.entries.clear();
        }
        self.entries.insert(path.to_string(), Arc::clone(&expression));
        Ok(expression)
    }

    /// Number of cached paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache hits and misses so far
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Drop every cached path
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// A parsed path ready to be applied to resources
#[derive(Clone)]
pub struct CompiledPath {
    path: Arc<str>,
    expression: Arc<ExpressionNode>,
    evaluator: ExpressionEvaluator,
}

impl CompiledPath {
    /// The source text of this path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The parsed expression
    pub fn expression(&self) -> &ExpressionNode {
        &self.expression
    }

    /// Evaluate against `context`, which also serves as `%resource`
    pub fn apply(&self, context: &FhirPathValue) -> Result<Collection> {
        self.apply_with_root(context, context)
    }

    /// Evaluate against `context` with `root` bound to `%resource`
    pub fn apply_with_root(&self, context: &FhirPathValue, root: &FhirPathValue) -> Result<Collection> {
        let mut scope = crate::registry::EvaluationContext::new(Collection::single(root.clone()));
        scope.input = Collection::single(context.clone());
        self.evaluator
            .evaluate_with_context(&self.expression, &scope)
            .map_err(|source| FhirPathError::Evaluation {
                path: self.path.to_string(),
                source,
            })
    }

    /// Evaluate against a JSON document
    pub fn apply_json(&self, context: &Value) -> Result<Collection> {
        match FhirPathValue::from_json(context) {
            Some(value) => self.apply(&value),
            None => Ok(Collection::new()),
        }
    }
}

impl std::fmt::Debug for CompiledPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPath")
            .field("path", &self.path)
            .field("expression", &self.expression.to_string())
            .finish()
    }
}

/// Main FHIRPath engine for compiling and evaluating paths
pub struct FhirPathEngine {
    evaluator: ExpressionEvaluator,
    cache: PathCache,
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FhirPathEngine {
    /// Create an engine with the standard function registry
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create an engine with the standard registry and a bounded path cache
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self::with_registry(Arc::new(create_standard_registry()), capacity)
    }

    /// Create an engine over a custom function registry
    pub fn with_registry(functions: Arc<FunctionRegistry>, capacity: usize) -> Self {
        Self {
            evaluator: ExpressionEvaluator::new(functions),
            cache: PathCache::new(capacity),
        }
    }

    /// The function registry paths are resolved against
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        self.evaluator.functions()
    }

    /// The compiled-path cache
    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Compile `path`, reusing a cached parse when available
    pub fn compile(&mut self, path: &str) -> Result<CompiledPath> {
        let expression = self
            .cache
            .get_or_parse(path)
            .map_err(|source| FhirPathError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(CompiledPath {
            path: Arc::from(path),
            expression,
            evaluator: self.evaluator.clone(),
        })
    }

    /// Compile and apply `path` to a JSON document
    pub fn evaluate(&mut self, path: &str, context: &Value) -> Result<Collection> {
        self.compile(path)?.apply_json(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_and_apply() {
        let mut engine = FhirPathEngine::new();
        let result = engine
            .evaluate("name.family", &json!({"name": [{"family": "Doe"}]}))
            .unwrap();
        assert_eq!(result.to_json(), json!(["Doe"]));
    }

    #[test]
    fn test_paths_are_parsed_once() {
        let mut engine = FhirPathEngine::new();
        engine.compile("id").unwrap();
        engine.compile("id").unwrap();
        engine.compile("name").unwrap();
        assert_eq!(engine.cache().len(), 2);
        assert_eq!(engine.cache().stats(), (1, 2));
    }

    #[test]
    fn test_full_cache_is_cleared() {
        let mut cache = PathCache::new(2);
        cache.get_or_parse("a").unwrap();
        cache.get_or_parse("b").unwrap();
        cache.get_or_parse("c").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_carry_the_path() {
        let mut engine = FhirPathEngine::new();
        let err = engine.compile("name.").unwrap_err();
        assert!(matches!(err, FhirPathError::Parse { .. }));
        assert_eq!(err.path(), "name.");

        let err = engine.evaluate("%unknown", &json!({})).unwrap_err();
        assert!(matches!(err, FhirPathError::Evaluation { .. }));
    }

    #[test]
    fn test_root_is_bound_separately_from_context() {
        let mut engine = FhirPathEngine::new();
        let root = FhirPathValue::from_json(&json!({"resourceType": "Patient", "id": "p1"})).unwrap();
        let item = FhirPathValue::from_json(&json!({"family": "Doe"})).unwrap();
        let path = engine.compile("family & '/' & %resource.id").unwrap();
        let result = path.apply_with_root(&item, &root).unwrap();
        assert_eq!(result.to_json(), json!(["Doe/p1"]));
    }
}
