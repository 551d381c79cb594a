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

//! Utility and conversion functions

use std::sync::LazyLock;

use super::{boolean, is_truthy, singleton};
use crate::ast::ExpressionNode;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{
    EvaluationContext, FhirPathFunction, FunctionRegistry, FunctionResult, LambdaEvaluationContext,
    LambdaFunction,
};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// Register all utility functions
pub fn register_utility_functions(registry: &mut FunctionRegistry) {
    registry.register_lambda(IifFunction);
    registry.register(ToStringFunction);
    registry.register(ToIntegerFunction);
    registry.register(HasValueFunction);
}

/// iif() function - conditional (immediate if)
pub struct IifFunction;

impl LambdaFunction for IifFunction {
    fn name(&self) -> &str {
        "iif"
    }
    fn human_friendly_name(&self) -> &str {
        "If"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "iif",
                vec![
                    ParameterInfo::required("criterion", ParameterKind::Expression),
                    ParameterInfo::required("true-result", ParameterKind::Expression),
                    ParameterInfo::optional("otherwise-result", ParameterKind::Expression),
                ],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "If `criterion` is true, returns `true-result`, otherwise `otherwise-result` (or empty). Only the selected branch is evaluated."
    }
    fn evaluate_with_lambda(
        &self,
        args: &[ExpressionNode],
        context: &LambdaEvaluationContext<'_>,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let criterion = context.evaluate_on_input(&args[0])?;
        if is_truthy(self.name(), &criterion)? {
            context.evaluate_on_input(&args[1])
        } else {
            match args.get(2) {
                Some(otherwise) => context.evaluate_on_input(otherwise),
                None => Ok(Collection::new()),
            }
        }
    }
}

/// toString() function
pub struct ToStringFunction;

impl FhirPathFunction for ToStringFunction {
    fn name(&self) -> &str {
        "toString"
    }
    fn human_friendly_name(&self) -> &str {
        "To String"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("toString", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(singleton(self.name(), &context.input)?
            .and_then(FhirPathValue::to_string_value)
            .map(FhirPathValue::String)
            .into_iter()
            .collect())
    }
}

/// toInteger() function
pub struct ToIntegerFunction;

impl FhirPathFunction for ToIntegerFunction {
    fn name(&self) -> &str {
        "toInteger"
    }
    fn human_friendly_name(&self) -> &str {
        "To Integer"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("toInteger", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Converts integers, integer strings and booleans to an integer. Anything else gives an empty result."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let converted = match singleton(self.name(), &context.input)? {
            Some(FhirPathValue::Integer(i)) => Some(*i),
            Some(FhirPathValue::Boolean(b)) => Some(i64::from(*b)),
            Some(FhirPathValue::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        Ok(converted.map(FhirPathValue::Integer).into_iter().collect())
    }
}

/// hasValue() function - true for a single primitive value
pub struct HasValueFunction;

impl FhirPathFunction for HasValueFunction {
    fn name(&self) -> &str {
        "hasValue"
    }
    fn human_friendly_name(&self) -> &str {
        "Has Value"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("hasValue", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let has_value = matches!(
            context.input.as_single(),
            Some(value) if !matches!(value, FhirPathValue::Resource(_))
        );
        Ok(boolean(has_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(function: &dyn FhirPathFunction, input: Collection) -> Collection {
        function
            .evaluate(&[], &EvaluationContext::new(input))
            .unwrap()
    }

    #[test]
    fn test_iif_evaluates_selected_branch_only() {
        let context = EvaluationContext::new(Collection::new());
        let evaluator = |expr: &ExpressionNode,
                         _: &Collection,
                         _: Option<usize>|
         -> FunctionResult<Collection> {
            match expr.as_identifier() {
                Some("yes") => Ok(boolean(true)),
                Some("no") => Ok(boolean(false)),
                Some(other) => Ok(Collection::single(FhirPathValue::String(other.into()))),
                None => panic!("unexpected expression"),
            }
        };
        let lambda = LambdaEvaluationContext {
            context: &context,
            evaluator: &evaluator,
        };
        let args = |names: &[&str]| -> Vec<ExpressionNode> {
            names.iter().map(|n| ExpressionNode::identifier(*n)).collect()
        };
        let result = IifFunction
            .evaluate_with_lambda(&args(&["yes", "a", "b"]), &lambda)
            .unwrap();
        assert_eq!(result, Collection::single(FhirPathValue::String("a".into())));
        let result = IifFunction
            .evaluate_with_lambda(&args(&["no", "a"]), &lambda)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_conversions() {
        let to_int = |v: serde_json::Value| call(&ToIntegerFunction, Collection::from_json(&v));
        assert_eq!(to_int(json!("42")), Collection::single(FhirPathValue::Integer(42)));
        assert_eq!(to_int(json!(true)), Collection::single(FhirPathValue::Integer(1)));
        assert!(to_int(json!("4.2")).is_empty());

        let text = call(&ToStringFunction, Collection::from_json(&json!(1.5)));
        assert_eq!(text, Collection::single(FhirPathValue::String("1.5".into())));
    }

    #[test]
    fn test_has_value() {
        assert_eq!(
            call(&HasValueFunction, Collection::from_json(&json!("x"))),
            boolean(true)
        );
        assert_eq!(
            call(&HasValueFunction, Collection::from_json(&json!({"a": 1}))),
            boolean(false)
        );
        assert_eq!(call(&HasValueFunction, Collection::new()), boolean(false));
    }
}
