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

//! Core value types for FHIRPath expressions
//!
//! Every expression evaluates to an ordered [`Collection`]; a [`FhirPathValue`]
//! is a single item of such a collection. Complex elements and resources keep
//! their JSON representation and are navigated lazily.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

use super::json_node::JsonNode;
use super::types::is_choice_key;

/// JSON object backing a resource or complex element
pub type JsonObject = Map<String, Value>;

/// A single FHIRPath value
#[derive(Clone, PartialEq)]
pub enum FhirPathValue {
    /// Boolean value
    Boolean(bool),

    /// Integer value (64-bit signed)
    Integer(i64),

    /// Decimal value with arbitrary precision
    Decimal(Decimal),

    /// String value
    String(String),

    /// Date value (without time)
    Date(NaiveDate),

    /// DateTime value with timezone
    DateTime(DateTime<FixedOffset>),

    /// Time value (without date)
    Time(NaiveTime),

    /// FHIR resource or complex element
    Resource(JsonNode),
}

/// Ordered collection of values (the fundamental FHIRPath concept)
#[derive(Clone, PartialEq, Default)]
pub struct Collection(Vec<FhirPathValue>);

impl Collection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a collection holding exactly one value
    pub fn single(value: FhirPathValue) -> Self {
        Self(vec![value])
    }

    /// Create a collection from a vector
    pub fn from_vec(values: Vec<FhirPathValue>) -> Self {
        Self(values)
    }

    /// Convert a JSON value: `null` is empty, arrays are flattened, anything else is a singleton
    pub fn from_json(value: &Value) -> Self {
        let mut collection = Self::new();
        collection.push_json(value);
        collection
    }

    /// Append the FHIRPath view of a JSON value
    pub fn push_json(&mut self, value: &Value) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.push_json(item);
                }
            }
            other => {
                if let Some(value) = FhirPathValue::from_json(other) {
                    self.0.push(value);
                }
            }
        }
    }

    /// Append the element a shared node points at, without copying objects
    pub fn push_node(&mut self, node: JsonNode) {
        match node.value() {
            Value::Null => {}
            Value::Array(items) => {
                for index in 0..items.len() {
                    self.push_node(node.item(index));
                }
            }
            Value::Object(_) => self.0.push(FhirPathValue::Resource(node)),
            other => {
                if let Some(value) = FhirPathValue::from_json(other) {
                    self.0.push(value);
                }
            }
        }
    }

    /// Get the length of the collection
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get an iterator over the values
    pub fn iter(&self) -> std::slice::Iter<'_, FhirPathValue> {
        self.0.iter()
    }

    /// Push a value to the collection
    pub fn push(&mut self, value: FhirPathValue) {
        self.0.push(value);
    }

    /// Extend the collection with another
    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    /// Get the first value
    pub fn first(&self) -> Option<&FhirPathValue> {
        self.0.first()
    }

    /// Get the last value
    pub fn last(&self) -> Option<&FhirPathValue> {
        self.0.last()
    }

    /// Get an element by index
    pub fn get(&self, index: usize) -> Option<&FhirPathValue> {
        self.0.get(index)
    }

    /// The only value of a singleton collection
    pub fn as_single(&self) -> Option<&FhirPathValue> {
        match self.0.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }

    /// Check if the collection contains a value (FHIRPath equality)
    pub fn contains(&self, value: &FhirPathValue) -> bool {
        self.0.iter().any(|item| item.equals(value) == Some(true))
    }

    /// Take ownership of the inner vector
    pub fn into_vec(self) -> Vec<FhirPathValue> {
        self.0
    }

    /// Borrow the inner slice
    pub fn as_slice(&self) -> &[FhirPathValue] {
        &self.0
    }

    /// Navigate to a named child of every item, in order
    pub fn navigate(&self, name: &str) -> Collection {
        let mut result = Collection::new();
        for item in &self.0 {
            item.push_children(name, &mut result);
        }
        result
    }

    /// Convert to a JSON array
    pub fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(FhirPathValue::to_json).collect())
    }
}

impl From<Vec<FhirPathValue>> for Collection {
    fn from(values: Vec<FhirPathValue>) -> Self {
        Self(values)
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<I: IntoIterator<Item = FhirPathValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = FhirPathValue;
    type IntoIter = std::vec::IntoIter<FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a FhirPathValue;
    type IntoIter = std::slice::Iter<'a, FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn decimal_from_number(number: &Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
}

impl FhirPathValue {
    /// Convert a non-array JSON value; `null` and arrays have no single-value form
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Array(_) => None,
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => decimal_from_number(n).map(Self::Decimal),
            },
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Object(_) => Some(Self::Resource(JsonNode::new(value.clone()))),
        }
    }

    /// Wrap a JSON object as a resource value
    pub fn resource(object: JsonObject) -> Self {
        Self::Resource(JsonNode::new(Value::Object(object)))
    }

    /// Convert to a JSON value for row output
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Decimal(d) => d
                .to_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(d.to_string())),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            Self::Resource(node) => node.value().clone(),
        }
    }

    /// Append the children named `name`, resolving choice elements (`value` → `valueQuantity`)
    pub fn push_children(&self, name: &str, out: &mut Collection) {
        let Self::Resource(node) = self else {
            return;
        };
        let Some(object) = node.as_object() else {
            return;
        };
        if object.contains_key(name) {
            out.push_node(node.child(name));
            return;
        }
        for key in object.keys() {
            if is_choice_key(name, key) {
                out.push_node(node.child(key));
            }
        }
    }

    /// Append the field stored under exactly `key`
    pub fn push_field(&self, key: &str, out: &mut Collection) {
        if let Self::Resource(node) = self {
            if node.get(key).is_some() {
                out.push_node(node.child(key));
            }
        }
    }

    /// Get a named field of a resource or complex element
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Resource(node) => node.get(name),
            _ => None,
        }
    }

    /// The `resourceType` of a resource value
    pub fn resource_type(&self) -> Option<&str> {
        self.field("resourceType").and_then(Value::as_str)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Decimal(_) => "Decimal",
            Self::String(_) => "String",
            Self::Date(_) => "Date",
            Self::DateTime(_) => "DateTime",
            Self::Time(_) => "Time",
            Self::Resource(_) => self.resource_type().unwrap_or("Element"),
        }
    }

    /// Get the value as a boolean, if it is one
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value as a decimal, for integers and decimals
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// String form used by `toString()`, `join()` and `&`
    pub fn to_string_value(&self) -> Option<String> {
        match self {
            Self::Boolean(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Decimal(d) => Some(d.normalize().to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Date(_) | Self::DateTime(_) | Self::Time(_) => {
                self.to_json().as_str().map(str::to_string)
            }
            Self::Resource(_) => None,
        }
    }
}

impl fmt::Display for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(node) => write!(f, "{node}"),
            other => match other.to_string_value() {
                Some(s) => f.write_str(&s),
                None => Ok(()),
            },
        }
    }
}

impl fmt::Debug for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Integer(i) => write!(f, "Integer({i})"),
            Self::Decimal(d) => write!(f, "Decimal({d})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Date(d) => write!(f, "Date({d})"),
            Self::DateTime(dt) => write!(f, "DateTime({dt})"),
            Self::Time(t) => write!(f, "Time({t})"),
            Self::Resource(_) => write!(f, "Resource({self})"),
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn json_arrays_flatten_and_null_is_empty() {
        let collection = Collection::from_json(&json!([1, [2, null], "a"]));
        assert_eq!(
            collection.into_vec(),
            vec![
                FhirPathValue::Integer(1),
                FhirPathValue::Integer(2),
                FhirPathValue::String("a".into())
            ]
        );
        assert!(Collection::from_json(&Value::Null).is_empty());
    }

    #[test]
    fn navigation_resolves_choice_elements() {
        let observation = Collection::from_json(&json!({
            "resourceType": "Observation",
            "valueQuantity": {"value": 5, "unit": "mg"},
            "component": [{"valueString": "a"}, {"valueBoolean": true}]
        }));
        let value = observation.navigate("value");
        assert_eq!(value.len(), 1);
        assert_eq!(
            value.navigate("unit").into_vec(),
            vec![FhirPathValue::String("mg".into())]
        );
        assert_eq!(
            observation.navigate("component").navigate("value").into_vec(),
            vec![
                FhirPathValue::String("a".into()),
                FhirPathValue::Boolean(true)
            ]
        );
    }

    #[test]
    fn navigation_shares_the_resource_document() {
        let patient = FhirPathValue::from_json(&json!({
            "resourceType": "Patient",
            "name": [{"family": "Doe", "period": {"start": "2020"}}]
        }))
        .unwrap();
        let FhirPathValue::Resource(root) = &patient else {
            panic!("expected resource");
        };

        let period = Collection::single(patient.clone())
            .navigate("name")
            .navigate("period");
        let Some(FhirPathValue::Resource(node)) = period.first() else {
            panic!("expected element");
        };
        assert!(node.shares_document(root));
        assert_eq!(period.to_json(), json!([{"start": "2020"}]));
    }

    #[test]
    fn decimals_convert_back_to_json_numbers() {
        let value = FhirPathValue::from_json(&json!(1.5)).unwrap();
        assert_eq!(value, FhirPathValue::Decimal(Decimal::new(15, 1)));
        assert_eq!(value.to_json(), json!(1.5));
        assert_eq!(FhirPathValue::Decimal(Decimal::new(20, 1)).to_json(), json!(2.0));
    }

    #[test]
    fn date_literals_render_as_iso_strings() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(FhirPathValue::Date(date).to_json(), json!("2020-01-02"));
    }
}
