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

//! Function registry for FHIRPath
//!
//! Trait-based registry of FHIRPath functions, including the SQL-on-FHIR
//! functions `getResourceKey`, `getReferenceKey` and `identity`.

pub mod function;
pub mod functions;
pub mod signature;

pub use function::{
    EvaluationContext, FhirPathFunction, FunctionError, FunctionImpl, FunctionRegistry,
    FunctionResult, LambdaEvaluationContext, LambdaEvaluator, LambdaFunction,
};
pub use signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// Create a registry with every built-in function
pub fn create_standard_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    functions::register_builtin_functions(&mut registry);
    log::debug!("registered {} FHIRPath functions", registry.len());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_has_view_functions() {
        let registry = create_standard_registry();
        for name in [
            "where",
            "exists",
            "ofType",
            "join",
            "getResourceKey",
            "getReferenceKey",
            "identity",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(matches!(registry.get("where"), Some(FunctionImpl::Lambda(_))));
        assert!(matches!(registry.get("identity"), Some(FunctionImpl::Value(_))));
    }
}
