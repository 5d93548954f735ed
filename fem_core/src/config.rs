//! # Application Configuration
//!
//! Tool-level settings read from a TOML file. Every section and field is
//! optional; anything missing takes its default.
//!
//! ```toml
//! [export]
//! dialect = "python"
//! significant_digits = 14
//! header_comment = false
//!
//! [results]
//! sync_appends = true
//!
//! [logging]
//! filter = "fem_core=debug"
//! ```
//!
//! Project-specific settings do not live here; they travel inside the
//! project file as `app_settings`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codegen::{CodeGenerator, Dialect};
use crate::errors::{ModelError, ModelResult};
use crate::file_io::read_to_string;

/// Default file name looked up next to the working directory
pub const CONFIG_FILE: &str = "trellis.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub export: ExportConfig,
    pub results: ResultsConfig,
    pub logging: LoggingConfig,
}

/// Script generation defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dialect: Dialect,
    /// Overrides the dialect's own digit count when set
    pub significant_digits: Option<usize>,
    pub header_comment: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            dialect: Dialect::Tcl,
            significant_digits: None,
            header_comment: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// fsync every appended record
    pub sync_appends: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "fem_core=info,fem_cli=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parse TOML text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> ModelResult<Self> {
        toml::from_str(text).map_err(|e| ModelError::SerializationError {
            reason: format!("Invalid configuration: {}", e),
        })
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> ModelResult<Self> {
        let config = Self::from_str(&read_to_string(path)?)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Read `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> ModelResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> ModelResult<String> {
        toml::to_string_pretty(self).map_err(ModelError::serialization)
    }

    /// Code generator set up with the export section.
    pub fn code_generator(&self) -> CodeGenerator {
        CodeGenerator::new()
            .with_significant_digits(self.export.significant_digits)
            .with_header(self.export.header_comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.export.dialect, Dialect::Tcl);
        assert!(config.export.header_comment);
        assert!(!config.results.sync_appends);
        assert_eq!(config.logging.filter, "fem_core=info,fem_cli=info");
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_str(
            r#"
            [export]
            dialect = "python"
            significant_digits = 6

            [results]
            sync_appends = true
            "#,
        )
        .unwrap();
        assert_eq!(config.export.dialect, Dialect::Python);
        assert_eq!(config.export.significant_digits, Some(6));
        assert!(config.export.header_comment);
        assert!(config.results.sync_appends);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = AppConfig::from_str("[export]\ndialect = \"fortran\"").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = AppConfig::default();
        config.export.significant_digits = Some(8);
        config.logging.filter = "debug".to_string();
        let text = config.to_toml().unwrap();
        assert_eq!(AppConfig::from_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join(format!("trellis_test_missing_{}.toml", std::process::id()));
        assert_eq!(AppConfig::load_or_default(&path).unwrap(), AppConfig::default());
    }
}
