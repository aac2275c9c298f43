//! Engine Configuration
//!
//! Configuration is plain data with serde derives so hosts can ship it as
//! JSON next to their application. Every field has a default, so an empty
//! object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on flushes performed by `run_until_idle` / `settle`
    /// before giving up with `EngineError::Unsettled`.
    pub max_flush_rounds: usize,

    /// Label given to instances whose description carries no tag.
    pub anonymous_label: String,

    /// Catch panics at task and cleanup boundaries. Turning this off lets a
    /// failing callback unwind through `flush`, which is handy under a
    /// debugger.
    pub contain_panics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: 1024,
            anonymous_label: "anonymous".to_string(),
            contain_panics: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = EngineConfig::from_json(r#"{"max_flush_rounds": 8}"#).unwrap();
        assert_eq!(config.max_flush_rounds, 8);
        assert_eq!(config.anonymous_label, "anonymous");
        assert!(config.contain_panics);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
