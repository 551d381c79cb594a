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

//! Function implementations for FHIRPath expressions

pub mod boolean;
pub mod collection;
pub mod filtering;
pub mod sof;
pub mod string;
pub mod utility;

pub use boolean::*;
pub use collection::*;
pub use filtering::*;
pub use sof::*;
pub use string::*;
pub use utility::*;

use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionError, FunctionRegistry, FunctionResult};

/// Register every built-in function
pub fn register_builtin_functions(registry: &mut FunctionRegistry) {
    register_collection_functions(registry);
    register_boolean_functions(registry);
    register_filtering_functions(registry);
    register_string_functions(registry);
    register_utility_functions(registry);
    register_sof_functions(registry);
}

/// The single item of `input`; empty input yields `None`, more than one item is an error
pub(crate) fn singleton<'a>(
    name: &str,
    input: &'a Collection,
) -> FunctionResult<Option<&'a FhirPathValue>> {
    match input.len() {
        0 => Ok(None),
        1 => Ok(input.first()),
        n => Err(FunctionError::evaluation(
            name,
            format!("expects a single input item, got {n}"),
        )),
    }
}

/// The single string item of `input`; non-string items yield `None`
pub(crate) fn singleton_string<'a>(
    name: &str,
    input: &'a Collection,
) -> FunctionResult<Option<&'a str>> {
    Ok(singleton(name, input)?.and_then(FhirPathValue::as_string))
}

/// String argument at `index`; an empty argument yields `None`
pub(crate) fn string_arg<'a>(
    name: &str,
    args: &'a [Collection],
    index: usize,
) -> FunctionResult<Option<&'a str>> {
    let Some(arg) = args.get(index) else {
        return Ok(None);
    };
    match singleton(name, arg)? {
        None => Ok(None),
        Some(FhirPathValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(FunctionError::InvalidArgumentType {
            name: name.to_string(),
            index,
            expected: "String".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

/// Integer argument at `index`; an empty argument yields `None`
pub(crate) fn integer_arg(name: &str, args: &[Collection], index: usize) -> FunctionResult<Option<i64>> {
    let Some(arg) = args.get(index) else {
        return Ok(None);
    };
    match singleton(name, arg)? {
        None => Ok(None),
        Some(FhirPathValue::Integer(i)) => Ok(Some(*i)),
        Some(other) => Err(FunctionError::InvalidArgumentType {
            name: name.to_string(),
            index,
            expected: "Integer".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

/// Collection holding one boolean
pub(crate) fn boolean(value: bool) -> Collection {
    Collection::single(FhirPathValue::Boolean(value))
}

/// Truthiness of a criteria result: a single `true` passes, empty or `false` does not
pub(crate) fn is_truthy(name: &str, result: &Collection) -> FunctionResult<bool> {
    match singleton(name, result)? {
        None => Ok(false),
        Some(FhirPathValue::Boolean(b)) => Ok(*b),
        Some(other) => Err(FunctionError::evaluation(
            name,
            format!("criteria must evaluate to a Boolean, got {}", other.type_name()),
        )),
    }
}
