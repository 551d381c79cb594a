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

//! Boolean functions

use std::sync::LazyLock;

use super::{boolean, singleton};
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{
    EvaluationContext, FhirPathFunction, FunctionError, FunctionRegistry, FunctionResult,
};
use crate::registry::signature::FunctionSignature;

/// Register all boolean functions
pub fn register_boolean_functions(registry: &mut FunctionRegistry) {
    registry.register(NotFunction);
    registry.register(AllTrueFunction);
    registry.register(AnyTrueFunction);
}

/// not() function - logical negation
pub struct NotFunction;

impl FhirPathFunction for NotFunction {
    fn name(&self) -> &str {
        "not"
    }
    fn human_friendly_name(&self) -> &str {
        "Not"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("not", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` if the input collection evaluates to `false`, and `false` if it evaluates to `true`. Otherwise, the result is empty (`{ }`)."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        match singleton(self.name(), &context.input)? {
            None => Ok(Collection::new()),
            Some(FhirPathValue::Boolean(b)) => Ok(boolean(!b)),
            // A non-boolean singleton counts as `true`
            Some(_) => Ok(boolean(false)),
        }
    }
}

fn booleans(name: &str, input: &Collection) -> FunctionResult<Vec<bool>> {
    input
        .iter()
        .map(|item| {
            item.as_boolean().ok_or_else(|| FunctionError::InvalidArgumentType {
                name: name.to_string(),
                index: 0,
                expected: "Boolean".to_string(),
                actual: item.type_name().to_string(),
            })
        })
        .collect()
}

/// allTrue() function
pub struct AllTrueFunction;

impl FhirPathFunction for AllTrueFunction {
    fn name(&self) -> &str {
        "allTrue"
    }
    fn human_friendly_name(&self) -> &str {
        "All True"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("allTrue", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Takes a collection of Boolean values and returns `true` if all the items are `true`. If any items are `false`, the result is `false`. If the input is empty, the result is `true`."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let values = booleans(self.name(), &context.input)?;
        Ok(boolean(values.into_iter().all(|b| b)))
    }
}

/// anyTrue() function
pub struct AnyTrueFunction;

impl FhirPathFunction for AnyTrueFunction {
    fn name(&self) -> &str {
        "anyTrue"
    }
    fn human_friendly_name(&self) -> &str {
        "Any True"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("anyTrue", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Takes a collection of Boolean values and returns `true` if any of the items are `true`. If the input is empty, the result is `false`."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let values = booleans(self.name(), &context.input)?;
        Ok(boolean(values.into_iter().any(|b| b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bools(values: &[bool]) -> Collection {
        values.iter().copied().map(FhirPathValue::Boolean).collect()
    }

    fn call(function: &dyn FhirPathFunction, input: Collection) -> FunctionResult<Collection> {
        function.evaluate(&[], &EvaluationContext::new(input))
    }

    #[test]
    fn test_not_is_three_valued() {
        assert_eq!(call(&NotFunction, bools(&[true])).unwrap(), boolean(false));
        assert_eq!(call(&NotFunction, Collection::new()).unwrap(), Collection::new());
        assert!(call(&NotFunction, bools(&[true, false])).is_err());
    }

    #[test]
    fn test_all_true_and_any_true() {
        assert_eq!(call(&AllTrueFunction, bools(&[])).unwrap(), boolean(true));
        assert_eq!(call(&AllTrueFunction, bools(&[true, false])).unwrap(), boolean(false));
        assert_eq!(call(&AnyTrueFunction, bools(&[])).unwrap(), boolean(false));
        assert_eq!(call(&AnyTrueFunction, bools(&[false, true])).unwrap(), boolean(true));
        assert!(call(&AnyTrueFunction, Collection::single(FhirPathValue::Integer(1))).is_err());
    }
}
