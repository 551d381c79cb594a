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

//! Collection functions: existence, subsetting and counting

use std::sync::LazyLock;

use super::{boolean, integer_arg};
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{
    EvaluationContext, FhirPathFunction, FunctionError, FunctionRegistry, FunctionResult,
};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// Register all collection functions
pub fn register_collection_functions(registry: &mut FunctionRegistry) {
    registry.register(EmptyFunction);
    registry.register(CountFunction);
    registry.register(FirstFunction);
    registry.register(LastFunction);
    registry.register(TailFunction);
    registry.register(SkipFunction);
    registry.register(TakeFunction);
    registry.register(SingleFunction);
    registry.register(DistinctFunction);
}

/// empty() function - true if the input collection is empty
pub struct EmptyFunction;

impl FhirPathFunction for EmptyFunction {
    fn name(&self) -> &str {
        "empty"
    }
    fn human_friendly_name(&self) -> &str {
        "Empty"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("empty", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` if the input collection is empty and `false` otherwise."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(boolean(context.input.is_empty()))
    }
}

/// count() function - returns the number of elements in the collection
pub struct CountFunction;

impl FhirPathFunction for CountFunction {
    fn name(&self) -> &str {
        "count"
    }
    fn human_friendly_name(&self) -> &str {
        "Count"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("count", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns the integer count of the number of items in the input collection. Returns 0 when the input collection is empty."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(Collection::single(FhirPathValue::Integer(
            context.input.len() as i64,
        )))
    }
}

/// first() function
pub struct FirstFunction;

impl FhirPathFunction for FirstFunction {
    fn name(&self) -> &str {
        "first"
    }
    fn human_friendly_name(&self) -> &str {
        "First"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("first", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing only the first item in the input collection."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(context.input.first().cloned().into_iter().collect())
    }
}

/// last() function
pub struct LastFunction;

impl FhirPathFunction for LastFunction {
    fn name(&self) -> &str {
        "last"
    }
    fn human_friendly_name(&self) -> &str {
        "Last"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("last", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing only the last item in the input collection."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(context.input.last().cloned().into_iter().collect())
    }
}

/// tail() function - all but the first item
pub struct TailFunction;

impl FhirPathFunction for TailFunction {
    fn name(&self) -> &str {
        "tail"
    }
    fn human_friendly_name(&self) -> &str {
        "Tail"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("tail", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing all but the first item in the input collection."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(context.input.iter().skip(1).cloned().collect())
    }
}

fn count_arg(name: &str, args: &[Collection]) -> FunctionResult<Option<usize>> {
    Ok(integer_arg(name, args, 0)?.map(|n| n.max(0) as usize))
}

/// skip() function - skips first n elements
pub struct SkipFunction;

impl FhirPathFunction for SkipFunction {
    fn name(&self) -> &str {
        "skip"
    }
    fn human_friendly_name(&self) -> &str {
        "Skip"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "skip",
                vec![ParameterInfo::required("num", ParameterKind::Value)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing all but the first `num` items in the input collection."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let Some(num) = count_arg(self.name(), args)? else {
            return Ok(Collection::new());
        };
        Ok(context.input.iter().skip(num).cloned().collect())
    }
}

/// take() function - the first n elements
pub struct TakeFunction;

impl FhirPathFunction for TakeFunction {
    fn name(&self) -> &str {
        "take"
    }
    fn human_friendly_name(&self) -> &str {
        "Take"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "take",
                vec![ParameterInfo::required("num", ParameterKind::Value)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing the first `num` items in the input collection."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let Some(num) = count_arg(self.name(), args)? else {
            return Ok(Collection::new());
        };
        Ok(context.input.iter().take(num).cloned().collect())
    }
}

/// single() function - the only item, or an error when there are several
pub struct SingleFunction;

impl FhirPathFunction for SingleFunction {
    fn name(&self) -> &str {
        "single"
    }
    fn human_friendly_name(&self) -> &str {
        "Single"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("single", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns the single item in the input if there is just one item. If the input collection is empty, the result is empty. If there are multiple items, an error is signaled."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        if context.input.len() > 1 {
            return Err(FunctionError::evaluation(
                self.name(),
                format!("input has {} items", context.input.len()),
            ));
        }
        Ok(context.input.clone())
    }
}

/// distinct() function - removes duplicates, keeping first occurrences
pub struct DistinctFunction;

impl FhirPathFunction for DistinctFunction {
    fn name(&self) -> &str {
        "distinct"
    }
    fn human_friendly_name(&self) -> &str {
        "Distinct"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("distinct", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns a collection containing only the unique items in the input collection."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let mut result = Collection::new();
        for item in context.input.iter() {
            if !result.contains(item) {
                result.push(item.clone());
            }
        }
        Ok(result)
    }
}
