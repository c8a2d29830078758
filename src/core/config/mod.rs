//! core::config
//!
//! Binding configuration loading.
//!
//! # Overview
//!
//! A binding reads its settings from a TOML file. Missing files are not an
//! error: every field has a default. Present files are parsed strictly
//! (unknown keys rejected) and validated.
//!
//! # Example
//!
//! ```no_run
//! use metalchemy::core::config::BindingConfig;
//! use std::path::Path;
//!
//! let config = BindingConfig::load(Path::new("metalchemy.toml")).unwrap();
//! println!("Column: {}", config.column);
//! ```

pub mod schema;

pub use schema::{validate_column, BindingConfig, DEFAULT_COLUMN};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {message}")]
    ParseError { message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

impl BindingConfig {
    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for invalid TOML or unknown keys,
    /// and `ConfigError::InvalidValue` if validation fails.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: BindingConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// Returns defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no binding config, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::ParseError { message } => ConfigError::ParseError {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Write configuration atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames over `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::OutputFormat;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = BindingConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, BindingConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metalchemy.toml");
        fs::write(&path, "column = \"attrs\"\naccept_legacy = true\n").unwrap();

        let config = BindingConfig::load(&path).unwrap();
        assert_eq!(config.column, "attrs");
        assert!(config.accept_legacy);
        assert_eq!(config.format, OutputFormat::Compact);
    }

    #[test]
    fn load_rejects_invalid_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metalchemy.toml");
        fs::write(&path, "column = \"bad column\"\n").unwrap();

        assert!(matches!(
            BindingConfig::load(&path),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn load_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "column = ").unwrap();

        let err = BindingConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/metalchemy.toml");
        let config = BindingConfig {
            column: "attributes".into(),
            format: OutputFormat::Pretty,
            accept_legacy: true,
        };

        config.save(&path).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(BindingConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn save_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metalchemy.toml");
        let config = BindingConfig::default().with_column("");
        assert!(config.save(&path).is_err());
        assert!(!path.exists());
    }
}
