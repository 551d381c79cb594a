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

//! Function traits, evaluation context and the function registry

use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::ast::ExpressionNode;
use crate::model::{Collection, FhirPathValue};
use crate::registry::signature::FunctionSignature;

/// Result type for function operations
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    /// Invalid number of arguments
    #[error("Function '{name}' expects {min}-{} arguments, got {actual}", max.map_or("∞".to_string(), |n| n.to_string()))]
    InvalidArity {
        /// Function name
        name: String,
        /// Minimum arguments
        min: usize,
        /// Maximum arguments (None for unlimited)
        max: Option<usize>,
        /// Actual arguments provided
        actual: usize,
    },

    /// Invalid argument type
    #[error("Function '{name}' argument {index} expects {expected}, got {actual}")]
    InvalidArgumentType {
        /// Function name
        name: String,
        /// Argument index
        index: usize,
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Runtime evaluation error
    #[error("Function '{name}' evaluation error: {message}")]
    EvaluationError {
        /// Function name
        name: String,
        /// Error message
        message: String,
    },
}

impl FunctionError {
    /// Shorthand for [`FunctionError::EvaluationError`]
    pub fn evaluation(name: &str, message: impl Into<String>) -> Self {
        Self::EvaluationError {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Context for function evaluation
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Input collection the function is invoked on
    pub input: Collection,
    /// Root resource (`%resource`, `%context`)
    pub root: Collection,
    /// Variables in scope (`this`, `index`)
    pub variables: FxHashMap<String, FhirPathValue>,
}

impl EvaluationContext {
    /// Create a new evaluation context rooted at `input`
    pub fn new(input: Collection) -> Self {
        Self {
            root: input.clone(),
            input,
            variables: FxHashMap::default(),
        }
    }

    /// Same root and variables with a different input collection
    pub fn with_input(&self, input: Collection) -> Self {
        Self {
            input,
            root: self.root.clone(),
            variables: self.variables.clone(),
        }
    }

    /// Scope for one lambda iteration: `$this` is `item`, `$index` is `index`
    pub fn for_item(&self, item: FhirPathValue, index: usize) -> Self {
        let mut variables = self.variables.clone();
        variables.insert("index".to_string(), FhirPathValue::Integer(index as i64));
        variables.insert("this".to_string(), item.clone());
        Self {
            input: Collection::single(item),
            root: self.root.clone(),
            variables,
        }
    }
}

/// Lambda evaluator: evaluates an argument expression with the given focus and `$index`
pub type LambdaEvaluator<'a> =
    dyn Fn(&ExpressionNode, &Collection, Option<usize>) -> FunctionResult<Collection> + 'a;

/// Extended context for lambda-supporting functions
pub struct LambdaEvaluationContext<'a> {
    /// Basic evaluation context
    pub context: &'a EvaluationContext,
    /// Lambda expression evaluator
    pub evaluator: &'a LambdaEvaluator<'a>,
}

impl LambdaEvaluationContext<'_> {
    /// Evaluate `expression` once per input item, yielding `(item, result)` pairs
    pub fn map_items(
        &self,
        expression: &ExpressionNode,
    ) -> FunctionResult<Vec<(FhirPathValue, Collection)>> {
        self.context
            .input
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let focus = Collection::single(item.clone());
                (self.evaluator)(expression, &focus, Some(index)).map(|r| (item.clone(), r))
            })
            .collect()
    }

    /// Evaluate `expression` once against the whole input collection
    pub fn evaluate_on_input(&self, expression: &ExpressionNode) -> FunctionResult<Collection> {
        (self.evaluator)(expression, &self.context.input, None)
    }
}

fn check_arity(signature: &FunctionSignature, name: &str, actual: usize) -> FunctionResult<()> {
    if signature.accepts(actual) {
        return Ok(());
    }
    Err(FunctionError::InvalidArity {
        name: name.to_string(),
        min: signature.min_arity,
        max: signature.max_arity,
        actual,
    })
}

/// Trait for FHIRPath functions whose arguments are evaluated before the call
pub trait FhirPathFunction: Send + Sync {
    /// Get the function name
    fn name(&self) -> &str;

    /// Get the human-friendly name for the function (for documentation)
    fn human_friendly_name(&self) -> &str;

    /// Get the function signature
    fn signature(&self) -> &FunctionSignature;

    /// Evaluate the function with given arguments
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection>;

    /// Get function documentation
    fn documentation(&self) -> &str {
        ""
    }

    /// Check if this function is pure (deterministic with no side effects)
    fn is_pure(&self) -> bool {
        true
    }

    /// Validate the argument count against the signature
    fn validate_args(&self, args: &[Collection]) -> FunctionResult<()> {
        check_arity(self.signature(), self.name(), args.len())
    }
}

/// Trait for functions that need to evaluate lambda expressions
pub trait LambdaFunction: Send + Sync {
    /// Get the function name
    fn name(&self) -> &str;

    /// Get the human-friendly name for the function (for documentation)
    fn human_friendly_name(&self) -> &str;

    /// Get the function signature
    fn signature(&self) -> &FunctionSignature;

    /// Evaluate function with lambda expressions
    fn evaluate_with_lambda(
        &self,
        args: &[ExpressionNode],
        context: &LambdaEvaluationContext<'_>,
    ) -> FunctionResult<Collection>;

    /// Get function documentation
    fn documentation(&self) -> &str {
        ""
    }

    /// Validate the argument count against the signature
    fn validate_args(&self, args: &[ExpressionNode]) -> FunctionResult<()> {
        check_arity(self.signature(), self.name(), args.len())
    }
}

/// Registered function implementation
#[derive(Clone)]
pub enum FunctionImpl {
    /// Function over evaluated arguments
    Value(Arc<dyn FhirPathFunction>),
    /// Function over unevaluated argument expressions
    Lambda(Arc<dyn LambdaFunction>),
}

impl std::fmt::Debug for FunctionImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionImpl::Value(func) => {
                f.debug_struct("Value").field("name", &func.name()).finish()
            }
            FunctionImpl::Lambda(func) => {
                f.debug_struct("Lambda").field("name", &func.name()).finish()
            }
        }
    }
}

impl FunctionImpl {
    /// Get the function name
    pub fn name(&self) -> &str {
        match self {
            FunctionImpl::Value(f) => f.name(),
            FunctionImpl::Lambda(f) => f.name(),
        }
    }

    /// Get the human-friendly name
    pub fn human_friendly_name(&self) -> &str {
        match self {
            FunctionImpl::Value(f) => f.human_friendly_name(),
            FunctionImpl::Lambda(f) => f.human_friendly_name(),
        }
    }

    /// Get the function signature
    pub fn signature(&self) -> &FunctionSignature {
        match self {
            FunctionImpl::Value(f) => f.signature(),
            FunctionImpl::Lambda(f) => f.signature(),
        }
    }

    /// Get function documentation
    pub fn documentation(&self) -> &str {
        match self {
            FunctionImpl::Value(f) => f.documentation(),
            FunctionImpl::Lambda(f) => f.documentation(),
        }
    }
}

/// Registry of FHIRPath functions, keyed by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, FunctionImpl>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function over evaluated arguments
    pub fn register<F: FhirPathFunction + 'static>(&mut self, function: F) {
        let name = function.name().to_string();
        self.functions
            .insert(name, FunctionImpl::Value(Arc::new(function)));
    }

    /// Register a lambda function
    pub fn register_lambda<F: LambdaFunction + 'static>(&mut self, function: F) {
        let name = function.name().to_string();
        self.functions
            .insert(name, FunctionImpl::Lambda(Arc::new(function)));
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionImpl> {
        self.functions.get(name)
    }

    /// Check if a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered function names, sorted
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Generate markdown documentation for all functions
    pub fn generate_function_docs(&self) -> String {
        let mut docs = String::from("# FHIRPath Functions\n\n");
        for name in self.function_names() {
            if let Some(function) = self.get(name) {
                docs.push_str(&format!(
                    "## {}\n\n`{}`\n\n{}\n\n",
                    function.human_friendly_name(),
                    function.signature(),
                    function.documentation()
                ));
            }
        }
        docs
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.function_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

    struct Twice;

    impl FhirPathFunction for Twice {
        fn name(&self) -> &str {
            "twice"
        }
        fn human_friendly_name(&self) -> &str {
            "Twice"
        }
        fn signature(&self) -> &FunctionSignature {
            static SIG: std::sync::LazyLock<FunctionSignature> = std::sync::LazyLock::new(|| {
                FunctionSignature::new(
                    "twice",
                    vec![ParameterInfo::optional("unused", ParameterKind::Value)],
                )
            });
            &SIG
        }
        fn evaluate(
            &self,
            args: &[Collection],
            context: &EvaluationContext,
        ) -> FunctionResult<Collection> {
            self.validate_args(args)?;
            let mut out = context.input.clone();
            out.extend(context.input.clone());
            Ok(out)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FunctionRegistry::new();
        registry.register(Twice);
        assert!(registry.contains("twice"));
        assert_eq!(registry.function_names(), vec!["twice"]);
        assert!(registry.generate_function_docs().contains("twice(unused: value?)"));

        let Some(FunctionImpl::Value(function)) = registry.get("twice") else {
            panic!("expected a value function");
        };
        let context = EvaluationContext::new(Collection::single(FhirPathValue::Integer(1)));
        assert_eq!(function.evaluate(&[], &context).unwrap().len(), 2);
    }

    #[test]
    fn test_arity_is_validated() {
        let context = EvaluationContext::new(Collection::new());
        let args = vec![Collection::new(), Collection::new()];
        let err = Twice.evaluate(&args, &context).unwrap_err();
        assert_eq!(
            err,
            FunctionError::InvalidArity {
                name: "twice".to_string(),
                min: 0,
                max: Some(1),
                actual: 2,
            }
        );
    }

    #[test]
    fn test_item_scope_binds_this_and_index() {
        let context = EvaluationContext::new(Collection::new());
        let scoped = context.for_item(FhirPathValue::Boolean(true), 3);
        assert_eq!(scoped.variables.get("index"), Some(&FhirPathValue::Integer(3)));
        assert_eq!(scoped.input.len(), 1);
    }
}
