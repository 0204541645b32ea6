//! Engine configuration
//!
//! Loaded from TOML; every key is optional:
//!
//! ```toml
//! super_user = "administrator"
//! cache_capacity = 200
//! rule_id_prefix = "SYSTEMRULE"
//! rule_id_width = 10
//! creator = "system"
//! ```

use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Principal granted by the no-rule fallback
    pub super_user: String,

    /// Maximum decisions cached per session
    pub cache_capacity: usize,

    /// Prefix of allocated rule ids
    pub rule_id_prefix: String,

    /// Zero-padded width of the numeric part of rule ids
    pub rule_id_width: usize,

    /// Creator recorded when the caller supplies none
    pub creator: String,
}

impl AccessConfig {
    pub const MAX_ID_WIDTH: usize = 20;

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AccessConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.super_user.trim().is_empty() {
            return Err(AccessError::InvalidConfig(
                "super_user cannot be empty".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(AccessError::InvalidConfig(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.rule_id_prefix.is_empty()
            || !self
                .rule_id_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AccessError::InvalidConfig(format!(
                "rule_id_prefix '{}' must be non-empty ASCII letters, digits or underscores",
                self.rule_id_prefix
            )));
        }
        if self.rule_id_width == 0 || self.rule_id_width > Self::MAX_ID_WIDTH {
            return Err(AccessError::InvalidConfig(format!(
                "rule_id_width must be between 1 and {}",
                Self::MAX_ID_WIDTH
            )));
        }
        Ok(())
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig {
            super_user: "administrator".to_string(),
            cache_capacity: 200,
            rule_id_prefix: "SYSTEMRULE".to_string(),
            rule_id_width: 10,
            creator: "system".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AccessConfig::from_toml_str("").unwrap();
        assert_eq!(config, AccessConfig::default());
        assert_eq!(config.super_user, "administrator");
        assert_eq!(config.rule_id_width, 10);
    }

    #[test]
    fn test_partial_override() {
        let config = AccessConfig::from_toml_str(
            r#"
            super_user = "root"
            cache_capacity = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.super_user, "root");
        assert_eq!(config.cache_capacity, 16);
        assert_eq!(config.rule_id_prefix, "SYSTEMRULE");
    }

    #[test]
    fn test_validation_failures() {
        for text in [
            "cache_capacity = 0",
            "super_user = \"  \"",
            "rule_id_prefix = \"\"",
            "rule_id_prefix = \"RULE-\"",
            "rule_id_width = 0",
            "rule_id_width = 21",
        ] {
            assert!(
                matches!(
                    AccessConfig::from_toml_str(text),
                    Err(AccessError::InvalidConfig(_))
                ),
                "expected rejection of {}",
                text
            );
        }
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            AccessConfig::from_toml_str("cache_capacity = \"many\""),
            Err(AccessError::ConfigFormat(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rule_id_prefix = \"ACL\"").unwrap();
        writeln!(file, "rule_id_width = 6").unwrap();

        let config = AccessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rule_id_prefix, "ACL");
        assert_eq!(config.rule_id_width, 6);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AccessConfig::from_file("/nonexistent/access.toml"),
            Err(AccessError::Io(_))
        ));
    }
}
