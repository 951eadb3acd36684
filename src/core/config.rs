//! Engine configuration with documented limits
//!
//! The config is created once by the embedding application and passed by
//! reference to the scripting service. There is no global instance.

use serde::Deserialize;
use std::path::Path;

use crate::core::error::{EngineError, Result};
use crate::templating::ImportPolicy;

/// Limits and defaults for the scripting engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest script source accepted by the parser (bytes)
    pub max_script_length: usize,

    /// Deepest list nesting accepted by the parser
    ///
    /// The reader and compiler are recursive; this bounds their stack use.
    pub max_nesting_depth: usize,

    /// Maximum number of pending signal callbacks
    ///
    /// Bounds non-cyclic callback chains; cycles are rejected separately.
    pub callback_queue_limit: usize,

    /// Policy used by `RuleBook::import_text` when the caller has no preference
    pub import_policy: ImportPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_script_length: 4096,
            max_nesting_depth: 32,
            callback_queue_limit: 256,
            import_policy: ImportPolicy::Strict,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate().map_err(EngineError::Config)?;
        Ok(config)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_script_length == 0 {
            return Err("max_script_length must be positive".into());
        }
        if self.max_nesting_depth == 0 {
            return Err("max_nesting_depth must be positive".into());
        }
        if self.callback_queue_limit == 0 {
            return Err("callback_queue_limit must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
max_nesting_depth = 8
import_policy = "skip_invalid"
"#,
        )
        .unwrap();

        assert_eq!(config.max_nesting_depth, 8);
        assert_eq!(config.import_policy, ImportPolicy::SkipInvalid);
        assert_eq!(config.max_script_length, 4096);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = EngineConfig::from_toml_str("callback_queue_limit = 0");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = EngineConfig::from_toml_str("max_script_length = 'lots'");
        assert!(matches!(result, Err(EngineError::TomlError(_))));
    }
}
