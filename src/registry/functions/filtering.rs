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

//! Filtering and projection functions
//!
//! `where`, `select`, `exists` and `all` take their criteria unevaluated and
//! run it once per input item with `$this` bound to the item.

use std::sync::LazyLock;

use super::{boolean, is_truthy, string_arg};
use crate::ast::ExpressionNode;
use crate::model::{Collection, FhirPathValue, matches_type};
use crate::registry::function::{
    EvaluationContext, FhirPathFunction, FunctionRegistry, FunctionResult, LambdaEvaluationContext,
    LambdaFunction,
};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// Register all filtering functions
pub fn register_filtering_functions(registry: &mut FunctionRegistry) {
    registry.register_lambda(WhereFunction);
    registry.register_lambda(SelectFunction);
    registry.register_lambda(ExistsFunction);
    registry.register_lambda(AllFunction);
    registry.register(OfTypeFunction);
    registry.register(ExtensionFunction);
}

/// where() function - filters the input by a criteria expression
pub struct WhereFunction;

impl LambdaFunction for WhereFunction {
    fn name(&self) -> &str {
        "where"
    }
    fn human_friendly_name(&self) -> &str {
        "Where"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "where",
                vec![ParameterInfo::required("criteria", ParameterKind::Expression)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing only those elements in the input collection for which the stated criteria expression evaluates to `true`."
    }
    fn evaluate_with_lambda(
        &self,
        args: &[ExpressionNode],
        context: &LambdaEvaluationContext<'_>,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let mut result = Collection::new();
        for (item, outcome) in context.map_items(&args[0])? {
            if is_truthy(self.name(), &outcome)? {
                result.push(item);
            }
        }
        Ok(result)
    }
}

/// select() function - projects each input item and flattens the results
pub struct SelectFunction;

impl LambdaFunction for SelectFunction {
    fn name(&self) -> &str {
        "select"
    }
    fn human_friendly_name(&self) -> &str {
        "Select"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "select",
                vec![ParameterInfo::required("projection", ParameterKind::Expression)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Evaluates the projection expression for each item in the input collection and returns the flattened results."
    }
    fn evaluate_with_lambda(
        &self,
        args: &[ExpressionNode],
        context: &LambdaEvaluationContext<'_>,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let mut result = Collection::new();
        for (_, projected) in context.map_items(&args[0])? {
            result.extend(projected);
        }
        Ok(result)
    }
}

/// exists() function - with an optional criteria
pub struct ExistsFunction;

impl LambdaFunction for ExistsFunction {
    fn name(&self) -> &str {
        "exists"
    }
    fn human_friendly_name(&self) -> &str {
        "Exists"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "exists",
                vec![ParameterInfo::optional("criteria", ParameterKind::Expression)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` if the input collection has any elements (optionally filtered by the criteria), and `false` otherwise."
    }
    fn evaluate_with_lambda(
        &self,
        args: &[ExpressionNode],
        context: &LambdaEvaluationContext<'_>,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let Some(criteria) = args.first() else {
            return Ok(boolean(!context.context.input.is_empty()));
        };
        for (_, outcome) in context.map_items(criteria)? {
            if is_truthy(self.name(), &outcome)? {
                return Ok(boolean(true));
            }
        }
        Ok(boolean(false))
    }
}

/// all() function - true when the criteria holds for every item
pub struct AllFunction;

impl LambdaFunction for AllFunction {
    fn name(&self) -> &str {
        "all"
    }
    fn human_friendly_name(&self) -> &str {
        "All"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "all",
                vec![ParameterInfo::required("criteria", ParameterKind::Expression)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` if for every element in the input collection, criteria evaluates to `true`. If the input collection is empty, the result is `true`."
    }
    fn evaluate_with_lambda(
        &self,
        args: &[ExpressionNode],
        context: &LambdaEvaluationContext<'_>,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        for (_, outcome) in context.map_items(&args[0])? {
            if !is_truthy(self.name(), &outcome)? {
                return Ok(boolean(false));
            }
        }
        Ok(boolean(true))
    }
}

/// ofType() function - filters by type
///
/// Choice elements (`value.ofType(Quantity)`) are resolved by the evaluator
/// before this function sees them; here the input is filtered generically.
pub struct OfTypeFunction;

impl FhirPathFunction for OfTypeFunction {
    fn name(&self) -> &str {
        "ofType"
    }
    fn human_friendly_name(&self) -> &str {
        "Of Type"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "ofType",
                vec![ParameterInfo::required("type", ParameterKind::TypeSpecifier)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection that contains all items in the input collection that are of the given type or a subclass thereof."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let Some(type_name) = string_arg(self.name(), args, 0)? else {
            return Ok(Collection::new());
        };
        Ok(context
            .input
            .iter()
            .filter(|item| matches_type(item, type_name))
            .cloned()
            .collect())
    }
}

/// extension() function - extensions with the given url
pub struct ExtensionFunction;

impl FhirPathFunction for ExtensionFunction {
    fn name(&self) -> &str {
        "extension"
    }
    fn human_friendly_name(&self) -> &str {
        "Extension"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "extension",
                vec![ParameterInfo::required("url", ParameterKind::Value)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Filters the input collection for items named `extension` with the given url."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let Some(url) = string_arg(self.name(), args, 0)? else {
            return Ok(Collection::new());
        };
        let mut extensions = Collection::new();
        for item in context.input.iter() {
            item.push_children("extension", &mut extensions);
        }
        Ok(extensions
            .into_iter()
            .filter(|ext| ext.field("url").and_then(|u| u.as_str()) == Some(url))
            .collect::<Vec<FhirPathValue>>()
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn integers(values: &[i64]) -> Collection {
        values.iter().copied().map(FhirPathValue::Integer).collect()
    }

    /// Stand-in evaluator: the criteria is "item is even", the projection doubles
    fn run_lambda(
        function: &dyn LambdaFunction,
        input: Collection,
        with_arg: bool,
    ) -> FunctionResult<Collection> {
        let context = EvaluationContext::new(input);
        let evaluator =
            |_: &ExpressionNode, focus: &Collection, _: Option<usize>| -> FunctionResult<Collection> {
                let value = focus.first().and_then(FhirPathValue::as_integer).unwrap_or(0);
                Ok(if function.name() == "select" {
                    integers(&[value * 2])
                } else {
                    boolean(value % 2 == 0)
                })
            };
        let lambda = LambdaEvaluationContext {
            context: &context,
            evaluator: &evaluator,
        };
        let args = if with_arg {
            vec![ExpressionNode::identifier("criteria")]
        } else {
            vec![]
        };
        function.evaluate_with_lambda(&args, &lambda)
    }

    #[test]
    fn test_where_and_select() {
        assert_eq!(
            run_lambda(&WhereFunction, integers(&[1, 2, 3, 4]), true).unwrap(),
            integers(&[2, 4])
        );
        assert_eq!(
            run_lambda(&SelectFunction, integers(&[1, 2]), true).unwrap(),
            integers(&[2, 4])
        );
        assert!(run_lambda(&WhereFunction, integers(&[1]), false).is_err());
    }

    #[test]
    fn test_exists_and_all() {
        assert_eq!(
            run_lambda(&ExistsFunction, integers(&[1]), false).unwrap(),
            boolean(true)
        );
        assert_eq!(
            run_lambda(&ExistsFunction, integers(&[1, 3]), true).unwrap(),
            boolean(false)
        );
        assert_eq!(
            run_lambda(&AllFunction, integers(&[2, 4]), true).unwrap(),
            boolean(true)
        );
        assert_eq!(
            run_lambda(&AllFunction, Collection::new(), true).unwrap(),
            boolean(true)
        );
    }

    #[test]
    fn test_of_type_filters_primitives() {
        let input = Collection::from_json(&json!(["a", 1, true]));
        let args = [Collection::single(FhirPathValue::String("string".into()))];
        let result = OfTypeFunction
            .evaluate(&args, &EvaluationContext::new(input))
            .unwrap();
        assert_eq!(result, Collection::from_json(&json!(["a"])));
    }

    #[test]
    fn test_extension_by_url() {
        let patient = json!({
            "resourceType": "Patient",
            "extension": [
                {"url": "http://a", "valueString": "x"},
                {"url": "http://b", "valueString": "y"}
            ]
        });
        let args = [Collection::single(FhirPathValue::String("http://b".into()))];
        let result = ExtensionFunction
            .evaluate(&args, &EvaluationContext::new(Collection::from_json(&patient)))
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.first().and_then(|e| e.field("valueString")),
            Some(&json!("y"))
        );
    }
}
