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

//! Constant substitution into path strings

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::definition::Constant;
use crate::error::{Result, SofError};

static CONSTANT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)").unwrap());

const NUMERIC_TYPES: &[&str] = &[
    "valueInteger",
    "valueInteger64",
    "valueDecimal",
    "valueUnsignedInt",
    "valuePositiveInt",
];

/// Constants rendered as FHIRPath literals, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ConstantTable {
    literals: FxHashMap<String, String>,
}

impl ConstantTable {
    /// Build the table from declared constants
    ///
    /// With `strict` set, a constant must carry exactly one `value*` field;
    /// otherwise the first one in document order is used.
    pub fn new(constants: &[Constant], strict: bool) -> Result<Self> {
        let mut literals = FxHashMap::default();
        for constant in constants {
            let values: Vec<_> = constant.values().collect();
            let (key, value) = match values.as_slice() {
                [] => {
                    return Err(invalid(constant, "no value[x] field"));
                }
                [single] => *single,
                [first, ..] if !strict => {
                    log::warn!(
                        "constant '{}' has {} value[x] fields, using {}",
                        constant.name,
                        values.len(),
                        first.0
                    );
                    *first
                }
                _ => {
                    return Err(invalid(
                        constant,
                        &format!("expected one value[x] field, found {}", values.len()),
                    ));
                }
            };
            let literal = render_literal(key, value).ok_or_else(|| {
                invalid(constant, &format!("{key} cannot be used as a path literal"))
            })?;
            log::debug!("constant %{} = {}", constant.name, literal);
            literals.insert(constant.name.clone(), literal);
        }
        Ok(Self { literals })
    }

    /// Literal for constant `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.literals.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Rewrite `path` for evaluation
    ///
    /// Every `%name` of a declared constant becomes its literal; undeclared
    /// variables are left for the engine. `$this` then becomes `identity()`.
    pub fn substitute(&self, path: &str) -> String {
        let replaced = if self.literals.is_empty() {
            path.to_string()
        } else {
            CONSTANT_TOKEN
                .replace_all(path, |caps: &Captures<'_>| match self.get(&caps[1]) {
                    Some(literal) => literal.to_string(),
                    None => caps[0].to_string(),
                })
                .into_owned()
        };
        replaced.replace("$this", "identity()")
    }
}

fn invalid(constant: &Constant, message: &str) -> SofError {
    SofError::InvalidConstant {
        name: constant.name.clone(),
        message: message.to_string(),
    }
}

fn render_literal(key: &str, value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if key == "valueBoolean" => Some(s.to_lowercase()),
        Value::String(s) if NUMERIC_TYPES.contains(&key) => Some(s.clone()),
        Value::String(s) => Some(quote(s)),
        _ => None,
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}
