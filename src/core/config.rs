//! TOML configuration with environment overrides.
//!
//! ```toml
//! data_dir = ".scout"
//! embedding_model = "htp-384"
//! schema_source = "exports/oracle_schema.json"
//! top_k = 5
//! log_level = "warn"
//! ```
//!
//! Every key can be overridden by `SCOUT_<KEY>` (e.g. `SCOUT_DATA_DIR`).
//! `SCOUT_CONFIG` points at an alternative config file.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::paths::DataPaths;
use crate::search::engine::DEFAULT_TOP_K;

pub const CONFIG_FILE: &str = "scout.toml";
pub const DEFAULT_EMBEDDING_MODEL: &str = "htp-384";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the cached schema and the persisted index
    pub data_dir: PathBuf,

    /// Embedding model name resolved through the embedder registry
    pub embedding_model: String,

    /// Exported metadata file used when no cached schema exists
    pub schema_source: Option<PathBuf>,

    /// Default number of tables returned per search
    pub top_k: usize,

    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".scout"),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            schema_source: None,
            top_k: DEFAULT_TOP_K,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings for a working directory.
    ///
    /// Order: `SCOUT_CONFIG` file, then `<dir>/scout.toml`, then defaults;
    /// `SCOUT_*` environment variables are applied on top.
    pub fn load(dir: &Path) -> Result<Self, SettingsError> {
        let mut settings = if let Ok(path) = env::var("SCOUT_CONFIG") {
            Self::from_file(path)?
        } else {
            let local = dir.join(CONFIG_FILE);
            if local.exists() {
                Self::from_file(&local)?
            } else {
                Self::default()
            }
        };

        settings.apply_overrides(|key| env::var(key).ok());

        if settings.data_dir.is_relative() {
            settings.data_dir = dir.join(&settings.data_dir);
        }
        if let Some(source) = settings.schema_source.as_mut() {
            if source.is_relative() {
                *source = dir.join(&*source);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Apply `SCOUT_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("SCOUT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("SCOUT_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(source) = lookup("SCOUT_SCHEMA_SOURCE") {
            self.schema_source = (!source.is_empty()).then(|| PathBuf::from(source));
        }
        if let Some(top_k) = lookup("SCOUT_TOP_K").and_then(|v| v.parse().ok()) {
            self.top_k = top_k;
        }
        if let Some(level) = lookup("SCOUT_LOG") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.embedding_model.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "embedding_model must not be empty".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(SettingsError::InvalidConfig(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::from_root(self.data_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(settings.top_k, DEFAULT_TOP_K);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: Settings = toml::from_str("top_k = 3\nschema_source = \"dump.json\"").unwrap();
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.schema_source, Some(PathBuf::from("dump.json")));
        assert_eq!(settings.data_dir, PathBuf::from(".scout"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SCOUT_DATA_DIR", "/var/scout"),
            ("SCOUT_TOP_K", "8"),
            ("SCOUT_EMBEDDING_MODEL", "htp"),
            ("SCOUT_SCHEMA_SOURCE", ""),
        ]);
        let mut settings = Settings {
            schema_source: Some(PathBuf::from("old.json")),
            ..Settings::default()
        };
        settings.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.data_dir, PathBuf::from("/var/scout"));
        assert_eq!(settings.top_k, 8);
        assert_eq!(settings.embedding_model, "htp");
        assert_eq!(settings.schema_source, None);
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let settings = Settings {
            top_k: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Settings::from_file("/nonexistent/scout.toml"),
            Err(SettingsError::FileNotFound(_))
        ));
    }
}
