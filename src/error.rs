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

//! Error types for view normalization and evaluation
//!
//! Configuration errors are raised while normalizing a ViewDefinition, before
//! any resource is read. Evaluation errors abort the whole batch.

use thiserror::Error;

use crate::engine::FhirPathError;

/// Result type alias for view operations
pub type Result<T> = std::result::Result<T, SofError>;

/// Errors raised by view normalization, evaluation and output
#[derive(Error, Debug)]
pub enum SofError {
    /// The ViewDefinition has no `resource` field
    #[error("ViewDefinition is missing the required 'resource' field")]
    MissingResourceType,

    /// Structurally invalid ViewDefinition
    #[error("Invalid ViewDefinition: {message}")]
    InvalidViewDefinition {
        /// What is wrong
        message: String,
    },

    /// unionAll branches with different columns
    #[error("unionAll branches must have the same columns: expected {expected:?}, got {actual:?}")]
    UnionAllMismatch {
        /// Columns of the first branch
        expected: Vec<String>,
        /// Columns of the mismatching branch
        actual: Vec<String>,
    },

    /// Constant without exactly one `value*` field
    #[error("Invalid constant '{name}': {message}")]
    InvalidConstant {
        /// Constant name
        name: String,
        /// What is wrong
        message: String,
    },

    /// Column name used twice in one column list
    #[error("Duplicate column name '{name}'")]
    DuplicateColumn {
        /// Column name
        name: String,
    },

    /// A node using both `forEach` and `forEachOrNull`
    #[error("A selection cannot use both forEach ('{for_each}') and forEachOrNull ('{for_each_or_null}')")]
    ConflictingIteration {
        /// The forEach path
        for_each: String,
        /// The forEachOrNull path
        for_each_or_null: String,
    },

    /// A where clause produced something other than empty or one boolean
    #[error("where clause '{path}' must return a single boolean, got {value}")]
    NonBooleanWhere {
        /// Where clause path
        path: String,
        /// The offending result, as JSON
        value: String,
    },

    /// A non-collection column produced more than one value
    #[error("unexpected multiple values for non-collection column '{column}' ({count} values)")]
    MultipleValues {
        /// Column name
        column: String,
        /// Number of values produced
        count: usize,
    },

    /// Path compilation or evaluation failure
    #[error(transparent)]
    Path(#[from] FhirPathError),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV output failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O failure while reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SofError {
    /// Shorthand for [`SofError::InvalidViewDefinition`]
    pub fn invalid_view(message: impl Into<String>) -> Self {
        Self::InvalidViewDefinition {
            message: message.into(),
        }
    }

    /// Whether the error was detected before any resource was evaluated
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingResourceType
                | Self::InvalidViewDefinition { .. }
                | Self::UnionAllMismatch { .. }
                | Self::InvalidConstant { .. }
                | Self::DuplicateColumn { .. }
                | Self::ConflictingIteration { .. }
        )
    }
}
