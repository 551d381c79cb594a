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

//! Type names used for choice-element resolution and type tests
//!
//! Without a structure-definition model, types are inferred from the JSON
//! shape: primitives from the value kind, resources from `resourceType`.

use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

use super::value::FhirPathValue;

/// Type suffixes that may follow a choice element name (`value[x]` → `valueQuantity`)
static CHOICE_TYPE_SUFFIXES: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "Base64Binary",
        "Boolean",
        "Canonical",
        "Code",
        "Date",
        "DateTime",
        "Decimal",
        "Id",
        "Instant",
        "Integer",
        "Integer64",
        "Markdown",
        "Oid",
        "PositiveInt",
        "String",
        "Time",
        "UnsignedInt",
        "Uri",
        "Url",
        "Uuid",
        "Address",
        "Age",
        "Annotation",
        "Attachment",
        "CodeableConcept",
        "CodeableReference",
        "Coding",
        "ContactDetail",
        "ContactPoint",
        "Count",
        "DataRequirement",
        "Distance",
        "Dosage",
        "Duration",
        "Expression",
        "HumanName",
        "Identifier",
        "Meta",
        "Money",
        "ParameterDefinition",
        "Period",
        "Quantity",
        "Range",
        "Ratio",
        "RatioRange",
        "Reference",
        "RelatedArtifact",
        "SampledData",
        "Signature",
        "Timing",
        "TriggerDefinition",
        "UsageContext",
    ]
    .into_iter()
    .collect()
});

const STRING_TYPES: &[&str] = &[
    "string",
    "code",
    "id",
    "uri",
    "url",
    "canonical",
    "markdown",
    "oid",
    "uuid",
    "base64Binary",
    "xhtml",
];

const INTEGER_TYPES: &[&str] = &["integer", "positiveInt", "unsignedInt"];

/// Check whether `key` is the choice-typed form of `element` (`valueQuantity` for `value`)
pub fn is_choice_key(element: &str, key: &str) -> bool {
    key.len() > element.len()
        && key.starts_with(element)
        && CHOICE_TYPE_SUFFIXES.contains(&key[element.len()..])
}

/// Strip a `System.` or `FHIR.` namespace from a type specifier
pub fn strip_namespace(type_name: &str) -> &str {
    type_name
        .strip_prefix("System.")
        .or_else(|| type_name.strip_prefix("FHIR."))
        .unwrap_or(type_name)
}

/// Choice key suffix for a type specifier: `string` → `String`, `Quantity` → `Quantity`
pub fn choice_suffix(type_name: &str) -> String {
    let name = strip_namespace(type_name);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_primitive_type_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "boolean" | "integer" | "integer64" | "decimal" | "date" | "datetime" | "instant" | "time"
    ) || STRING_TYPES.iter().any(|t| t.eq_ignore_ascii_case(name))
        || INTEGER_TYPES.iter().any(|t| t.eq_ignore_ascii_case(name))
}

fn looks_like_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    matches!(bytes.len(), 4 | 7 | 10)
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() })
}

fn looks_like_date_time(value: &str) -> bool {
    match value.split_once('T') {
        Some((date, _)) => looks_like_date(date),
        None => looks_like_date(value),
    }
}

/// Test a value against a type specifier as used by `is`, `as` and `ofType`
pub fn matches_type(value: &FhirPathValue, type_name: &str) -> bool {
    let name = strip_namespace(type_name);
    match value {
        FhirPathValue::Boolean(_) => name.eq_ignore_ascii_case("boolean"),
        FhirPathValue::Integer(_) => {
            name == "Integer" || INTEGER_TYPES.contains(&name) || name == "integer64"
        }
        FhirPathValue::Decimal(_) => name.eq_ignore_ascii_case("decimal"),
        FhirPathValue::String(s) => match name {
            "String" => true,
            "date" | "Date" => looks_like_date(s),
            "dateTime" | "DateTime" | "instant" => looks_like_date_time(s),
            other => STRING_TYPES.contains(&other),
        },
        FhirPathValue::Date(_) => name == "Date" || name == "date",
        FhirPathValue::DateTime(_) => matches!(name, "DateTime" | "dateTime" | "instant"),
        FhirPathValue::Time(_) => name.eq_ignore_ascii_case("time"),
        FhirPathValue::Resource(node) => match node.get("resourceType").and_then(|v| v.as_str()) {
            Some(resource_type) => {
                resource_type == name || name == "Resource" || name == "DomainResource"
            }
            None => !is_primitive_type_name(name),
        },
    }
}
