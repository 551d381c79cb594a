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

//! View evaluation options

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::DEFAULT_CACHE_CAPACITY;
use crate::error::Result;

/// Configuration for view normalization and evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SofConfig {
    /// Reject constants without exactly one `value*` field
    pub strict_constants: bool,

    /// Require column names to match `^[A-Za-z][A-Za-z0-9_]*$`
    pub validate_column_names: bool,

    /// Maximum number of compiled paths cached per evaluation batch
    pub path_cache_capacity: usize,
}

impl SofConfig {
    /// Create a configuration that resolves ambiguous constants leniently
    pub fn lenient() -> Self {
        Self {
            strict_constants: false,
            ..Self::default()
        }
    }

    /// Create a configuration that also enforces portable column names
    pub fn strict() -> Self {
        Self {
            validate_column_names: true,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

impl Default for SofConfig {
    fn default() -> Self {
        Self {
            strict_constants: true,
            validate_column_names: false,
            path_cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SofConfig::default();
        assert!(config.strict_constants);
        assert!(!config.validate_column_names);
        assert_eq!(config.path_cache_capacity, 1024);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SofConfig::from_json_str(r#"{"validateColumnNames": true}"#).unwrap();
        assert_eq!(config, SofConfig::strict());
        assert!(SofConfig::from_json_str("{").is_err());
    }
}
