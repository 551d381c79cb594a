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

// Error types for FHIRPath evaluation

use thiserror::Error;

use crate::registry::FunctionError;

/// Result type for evaluation operations
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Errors that can occur during FHIRPath evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Function evaluation error
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    /// Function not present in the registry
    #[error("Unknown function: {name}")]
    UnknownFunction {
        /// Function name
        name: String,
    },

    /// `%name` or `$name` that is not defined
    #[error("Variable {name} not found")]
    UnknownVariable {
        /// Variable name including its sigil
        name: String,
    },

    /// Type error during evaluation
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError {
        /// Expected type
        expected: String,
        /// Actual type found
        actual: String,
    },

    /// An operand that must be a single item was a larger collection
    #[error("{operation} expects a single item, got {count}")]
    SingletonExpected {
        /// Operator or construct requiring the singleton
        operation: String,
        /// Number of items found
        count: usize,
    },

    /// Invalid operation
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Error message
        message: String,
    },
}

impl EvaluationError {
    /// Convert into a function error raised from inside the function `name`
    pub fn into_function_error(self, name: &str) -> FunctionError {
        match self {
            EvaluationError::Function(inner) => inner,
            other => FunctionError::evaluation(name, other.to_string()),
        }
    }
}
