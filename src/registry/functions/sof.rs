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

//! SQL-on-FHIR functions: resource and reference keys, and `identity()`
//!
//! `identity()` backs the `$this` rewrite applied to view paths before they
//! are compiled.

use std::sync::LazyLock;

use super::string_arg;
use crate::model::{Collection, FhirPathValue, strip_namespace};
use crate::registry::function::{
    EvaluationContext, FhirPathFunction, FunctionRegistry, FunctionResult,
};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// Register the SQL-on-FHIR functions
pub fn register_sof_functions(registry: &mut FunctionRegistry) {
    registry.register(GetResourceKeyFunction);
    registry.register(GetReferenceKeyFunction);
    registry.register(IdentityFunction);
}

/// getResourceKey() function - the `id` of each input resource
pub struct GetResourceKeyFunction;

impl FhirPathFunction for GetResourceKeyFunction {
    fn name(&self) -> &str {
        "getResourceKey"
    }
    fn human_friendly_name(&self) -> &str {
        "Get Resource Key"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("getResourceKey", vec![]));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns the key of the input resource, which is its `id`."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let mut keys = Collection::new();
        for item in context.input.iter() {
            item.push_children("id", &mut keys);
        }
        Ok(keys)
    }
}

/// Split a reference (`Patient/123`) into its type segment and key
fn split_reference(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('/') {
        Some((resource_type, key)) => (Some(resource_type), key),
        None => (None, reference),
    }
}

/// getReferenceKey() function - the key a Reference points at
///
/// With a type argument the reference's type segment must equal the type name
/// exactly: `getReferenceKey(Patient)` gives nothing for `PatientX/1`.
pub struct GetReferenceKeyFunction;

impl FhirPathFunction for GetReferenceKeyFunction {
    fn name(&self) -> &str {
        "getReferenceKey"
    }
    fn human_friendly_name(&self) -> &str {
        "Get Reference Key"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "getReferenceKey",
                vec![ParameterInfo::optional("type", ParameterKind::TypeSpecifier)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns the part of `reference` after the first `/`. With a type argument, references to other resource types give an empty result."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let expected_type = string_arg(self.name(), args, 0)?.map(strip_namespace);
        let mut keys = Collection::new();
        for item in context.input.iter() {
            let reference = match item {
                FhirPathValue::String(s) => Some(s.as_str()),
                other => other.field("reference").and_then(|r| r.as_str()),
            };
            let Some(reference) = reference else {
                continue;
            };
            let (resource_type, key) = split_reference(reference);
            if expected_type.is_some() && resource_type != expected_type {
                continue;
            }
            keys.push(FhirPathValue::String(key.to_string()));
        }
        Ok(keys)
    }
}

/// identity() function - returns its input unchanged
pub struct IdentityFunction;

impl FhirPathFunction for IdentityFunction {
    fn name(&self) -> &str {
        "identity"
    }
    fn human_friendly_name(&self) -> &str {
        "Identity"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("identity", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        Ok(context.input.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn strings(values: &[&str]) -> Collection {
        values
            .iter()
            .map(|s| FhirPathValue::String(s.to_string()))
            .collect()
    }

    fn reference_key(reference: serde_json::Value, type_arg: Option<&str>) -> Collection {
        let args: Vec<Collection> = type_arg.map(|t| strings(&[t])).into_iter().collect();
        let context = EvaluationContext::new(Collection::from_json(&reference));
        GetReferenceKeyFunction.evaluate(&args, &context).unwrap()
    }

    #[test]
    fn test_resource_key_is_id() {
        let patient = Collection::from_json(&json!({"resourceType": "Patient", "id": "p1"}));
        let keys = GetResourceKeyFunction
            .evaluate(&[], &EvaluationContext::new(patient))
            .unwrap();
        assert_eq!(keys, strings(&["p1"]));
    }

    #[test]
    fn test_reference_key() {
        assert_eq!(
            reference_key(json!({"reference": "Patient/123"}), None),
            strings(&["123"])
        );
        assert_eq!(
            reference_key(json!({"reference": "Patient/123"}), Some("Patient")),
            strings(&["123"])
        );
        assert_eq!(
            reference_key(json!({"reference": "Patient/123"}), Some("Observation")),
            Collection::new()
        );
        assert_eq!(
            reference_key(json!({"reference": "PatientX/1"}), Some("Patient")),
            Collection::new()
        );
        assert_eq!(reference_key(json!({"reference": "abc"}), None), strings(&["abc"]));
        assert_eq!(reference_key(json!({"display": "x"}), None), Collection::new());
    }

    #[test]
    fn test_identity_returns_input() {
        let input = strings(&["a", "b"]);
        let result = IdentityFunction
            .evaluate(&[], &EvaluationContext::new(input.clone()))
            .unwrap();
        assert_eq!(result, input);
    }
}
