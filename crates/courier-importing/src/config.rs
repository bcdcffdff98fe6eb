//! Import configuration.
//!
//! Maps internal keys to file headers. Per-type constraints (allowed key
//! domains) live with the import handler; this type carries the generic
//! shape and its sanity rules.

use courier_common::CourierError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Canonical header form used for comparisons: trimmed, case-folded.
/// Original casing is preserved everywhere user-visible.
pub fn canon(s: &str) -> String {
    s.trim().to_lowercase()
}

/// What to do with file headers that are not declared in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownColumnsPolicy {
    /// Unknown header fails the job.
    Error,
    /// Unknown headers are dropped silently.
    Ignore,
    /// Unknown cells are stored into each row's extras.
    Capture,
}

impl Default for UnknownColumnsPolicy {
    fn default() -> Self {
        UnknownColumnsPolicy::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ImportConfig {
    /// internal_key -> file header
    pub required: BTreeMap<String, String>,
    /// internal_key -> file header
    pub optional: BTreeMap<String, String>,
    /// variable name -> file header (for templating)
    pub extras: BTreeMap<String, String>,

    pub unknown_columns_policy: UnknownColumnsPolicy,
    pub stop_on_row_error: bool,
    pub max_errors: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            required: BTreeMap::new(),
            optional: BTreeMap::new(),
            extras: BTreeMap::new(),
            unknown_columns_policy: UnknownColumnsPolicy::default(),
            stop_on_row_error: false,
            max_errors: 500,
        }
    }
}

impl ImportConfig {
    /// Parse the raw config object from a stage event. Unknown fields are
    /// rejected so configs cannot drift silently.
    pub fn from_value(raw: &Value) -> Result<Self, CourierError> {
        let config: ImportConfig = serde_json::from_value(raw.clone())
            .map_err(|e| CourierError::validation(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Generic sanity rules shared by all import types.
    pub fn validate(&self) -> Result<(), CourierError> {
        if self.max_errors == 0 {
            return Err(CourierError::validation("max_errors must be at least 1"));
        }

        let overlap: Vec<&String> = self
            .required
            .keys()
            .filter(|k| self.optional.contains_key(*k))
            .collect();
        if !overlap.is_empty() {
            return Err(CourierError::validation(format!(
                "Keys cannot be in both required and optional: {overlap:?}"
            )));
        }

        for (name, mapping) in [("required", &self.required), ("optional", &self.optional)] {
            for header in mapping.values() {
                if header.trim().is_empty() {
                    return Err(CourierError::validation(format!(
                        "{name} headers must be non-empty strings"
                    )));
                }
            }
        }

        Ok(())
    }

    /// All headers the config declares, in original casing.
    pub fn declared_headers(&self) -> BTreeSet<String> {
        self.required
            .values()
            .chain(self.optional.values())
            .chain(self.extras.values())
            .filter(|h| !h.is_empty())
            .cloned()
            .collect()
    }
}
