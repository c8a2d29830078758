//! core::config::schema
//!
//! Binding configuration schema.
//!
//! # Validation
//!
//! Values are validated after parsing: the column name must be usable as a
//! plain identifier in the host's storage schema.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::codec::{JsonCodec, OutputFormat};

/// Default persisted column name.
pub const DEFAULT_COLUMN: &str = "meta";

/// Configuration for one metadata binding.
///
/// # Example
///
/// ```toml
/// column = "meta"
/// format = "compact"
/// accept_legacy = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BindingConfig {
    /// Persisted column holding the encoded tree
    pub column: String,

    /// Layout of encoded text
    pub format: OutputFormat,

    /// Decode bare JSON objects written without the envelope
    pub accept_legacy: bool,
}

/// Check that `column` is usable as a persisted column name.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the name is empty, starts with a
/// digit, or contains characters other than ASCII letters, digits and `_`.
pub fn validate_column(column: &str) -> Result<(), ConfigError> {
    if column.is_empty() {
        return Err(ConfigError::InvalidValue("column cannot be empty".into()));
    }
    if column.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ConfigError::InvalidValue(format!(
            "column '{}' cannot start with a digit",
            column
        )));
    }
    if !column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidValue(format!(
            "column '{}' may only contain ASCII letters, digits and '_'",
            column
        )));
    }
    Ok(())
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            column: DEFAULT_COLUMN.to_string(),
            format: OutputFormat::Compact,
            accept_legacy: false,
        }
    }
}

impl BindingConfig {
    /// Use a different column name.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the column name is empty,
    /// starts with a digit, or contains characters other than ASCII
    /// letters, digits and `_`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_column(&self.column)
    }

    /// Build the codec this configuration describes.
    pub fn codec(&self) -> JsonCodec {
        JsonCodec::new(self.format, self.accept_legacy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BindingConfig::default();
        assert_eq!(config.column, "meta");
        assert_eq!(config.format, OutputFormat::Compact);
        assert!(!config.accept_legacy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: BindingConfig = toml::from_str("format = \"pretty\"").unwrap();
        assert_eq!(config.column, "meta");
        assert_eq!(config.format, OutputFormat::Pretty);
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<BindingConfig, _> = toml::from_str("colum = \"meta\"");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_format_rejected() {
        let result: Result<BindingConfig, _> = toml::from_str("format = \"yaml\"");
        assert!(result.is_err());
    }

    #[test]
    fn column_validation() {
        assert!(BindingConfig::default().with_column("").validate().is_err());
        assert!(BindingConfig::default().with_column("1meta").validate().is_err());
        assert!(BindingConfig::default().with_column("me-ta").validate().is_err());
        assert!(BindingConfig::default().with_column("me ta").validate().is_err());
        assert!(BindingConfig::default().with_column("_meta_2").validate().is_ok());
        assert!(validate_column("extra").is_ok());
        assert!(validate_column("ex.tra").is_err());
    }

    #[test]
    fn codec_follows_config() {
        let config = BindingConfig {
            format: OutputFormat::Pretty,
            accept_legacy: true,
            ..Default::default()
        };
        let codec = config.codec();
        assert_eq!(codec.format(), OutputFormat::Pretty);
        assert!(codec.accepts_legacy());
    }
}
