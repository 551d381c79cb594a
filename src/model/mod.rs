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

//! Data model and value types for FHIRPath expressions
//!
//! Values are built directly over `serde_json` documents. There is no
//! structure-definition model: choice elements and types are resolved from
//! the JSON shape alone.

pub mod compare;
pub mod json_node;
pub mod types;
pub mod value;

pub use compare::{parse_date_literal, parse_datetime_literal, parse_time_literal};
pub use json_node::JsonNode;
pub use types::{choice_suffix, is_choice_key, matches_type, strip_namespace};
pub use value::{Collection, FhirPathValue, JsonObject};
