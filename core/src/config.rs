//! Pipeline-wide defaults.
//!
//! Values here apply whenever a call's `RequestOptions` leaves the matching
//! field unset. A config can be built in code, parsed from JSON, or read
//! from the environment:
//!
//! | variable               | field         |
//! |------------------------|---------------|
//! | `PIPELINE_TIMEOUT_MS`  | `timeout_ms`  |
//! | `PIPELINE_RETRIES`     | `retries`     |
//! | `PIPELINE_CSRF_HEADER` | `csrf_header` |

use std::time::Duration;

use serde::Deserialize;

use crate::csrf::DEFAULT_CSRF_HEADER;
use crate::error::ApiError;
use crate::retry::Backoff;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRIES: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub csrf_header: String,
    pub backoff: Backoff,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            backoff: Backoff::None,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Defaults overridden by any `PIPELINE_*` variables that are set.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = lookup("PIPELINE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            config.timeout_ms = ms;
        }
        if let Some(retries) = lookup("PIPELINE_RETRIES").and_then(|v| v.trim().parse().ok()) {
            config.retries = retries;
        }
        if let Some(header) = lookup("PIPELINE_CSRF_HEADER").filter(|v| !v.trim().is_empty()) {
            config.csrf_header = header.trim().to_string();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.retries, 0);
        assert_eq!(config.csrf_header, "X-CSRF-Token");
        assert_eq!(config.backoff, Backoff::None);
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = PipelineConfig::from_json(r#"{"retries":2}"#).unwrap();
        assert_eq!(config.retries, 2);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);

        let config = PipelineConfig::from_json(
            r#"{"timeout_ms":500,"backoff":{"kind":"fixed","delay_ms":20}}"#,
        )
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(
            config.backoff,
            Backoff::Fixed {
                delay: Duration::from_millis(20)
            }
        );
    }

    #[test]
    fn bad_json_is_a_deserialization_error() {
        let err = PipelineConfig::from_json(r#"{"retries":"many"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("PIPELINE_TIMEOUT_MS", "2500"),
            ("PIPELINE_RETRIES", " 3 "),
            ("PIPELINE_CSRF_HEADER", "X-XSRF-Token"),
        ]
        .into_iter()
        .collect();
        let config = PipelineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.retries, 3);
        assert_eq!(config.csrf_header, "X-XSRF-Token");
    }

    #[test]
    fn unparseable_environment_values_are_ignored() {
        let config = PipelineConfig::from_lookup(|key| match key {
            "PIPELINE_TIMEOUT_MS" => Some("soon".to_string()),
            "PIPELINE_CSRF_HEADER" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config, PipelineConfig::default());
    }
}
