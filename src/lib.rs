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

//! SQL-on-FHIR ViewDefinition evaluation in Rust
//!
//! Projects FHIR resources into flat rows as described by a ViewDefinition.
//! Paths are evaluated by an embedded FHIRPath engine that carries the
//! SQL-on-FHIR functions `getResourceKey()`, `getReferenceKey()` and
//! `identity()`.
//!
//! ```rust
//! use octofhir_sof_eval::evaluate;
//! use serde_json::json;
//!
//! let resources = vec![json!({
//!     "resourceType": "Patient",
//!     "id": "pt1",
//!     "name": [{"family": "Doe"}, {"family": "Roe"}]
//! })];
//! let view = json!({
//!     "resource": "Patient",
//!     "column": [{"name": "id", "path": "getResourceKey()"}],
//!     "select": [{"forEach": "name", "column": [{"name": "family", "path": "family"}]}]
//! });
//!
//! let rows = evaluate(&resources, &view).unwrap();
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[1]["family"], json!("Roe"));
//! ```

pub mod ast;
pub mod config;
pub mod conformance;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod registry;
pub mod runner;
pub mod sof;
pub mod view;

pub use config::SofConfig;
pub use engine::{CompiledPath, FhirPathEngine, FhirPathError, PathCache};
pub use error::{Result, SofError};
pub use model::{Collection, FhirPathValue};
pub use parser::{ParseError, parse_expression as parse};
pub use registry::FunctionRegistry;
pub use runner::{ViewResult, ViewRunner, evaluate, parse_resources};
pub use sof::{Evaluator, Row, row_product};
pub use view::{ConstantTable, NormalizedNode, Normalizer, ViewDefinition};
