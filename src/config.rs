//! Provider-level configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MapperError;
use crate::reconcile::SubtableSort;
use crate::schema::Diagnostic;

/// Configuration applied to every call unless a resource overrides it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Default virtual domain passed with each REST call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdom: Option<String>,
    /// Ordering applied to set-semantics blocks after a refresh.
    #[serde(default)]
    pub dynamic_sort_subtable: SubtableSort,
}

impl ProviderConfig {
    /// Parse from the host's configuration value. `null` yields the defaults.
    pub fn from_value(value: &Value) -> Result<Self, MapperError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|err| MapperError::Configuration(err.to_string()))
    }

    /// Check a configuration value, returning diagnostics instead of an error.
    pub fn validate(value: &Value) -> Vec<Diagnostic> {
        match Self::from_value(value) {
            Ok(config) => config.warnings(),
            Err(err) => vec![Diagnostic::error("Invalid provider configuration")
                .with_detail(err.message())],
        }
    }

    fn warnings(&self) -> Vec<Diagnostic> {
        match &self.vdom {
            Some(vdom) if vdom.trim().is_empty() => vec![Diagnostic::warning("Empty vdom")
                .with_detail("An empty vdom is sent as-is; omit it to use the device default")
                .with_attribute("vdom")],
            _ => Vec::new(),
        }
    }
}
