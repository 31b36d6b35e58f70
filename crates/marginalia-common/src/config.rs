//! File-backed configuration.
//!
//! Configuration types live with the crates that use them; this module only
//! moves them in and out of files. The format follows the file extension.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load<C: DeserializeOwned + Send>(
        &self,
    ) -> impl Future<Output = Result<C, ConfigError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save<C: Serialize + Sync>(
        &self,
        config: &C,
    ) -> impl Future<Output = Result<(), ConfigError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// Data is serialized according to the file extension: `.json` or `.toml`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the file if it exists, or fall back to `C::default()`.
    pub async fn load_or_default<C: DeserializeOwned + Default + Send>(
        &self,
    ) -> Result<C, ConfigError> {
        if !self.exists() {
            tracing::debug!(target: "marginalia::config", path = %self.path.display(), "no config file, using defaults");
            return Ok(C::default());
        }
        self.load().await
    }

    fn format(&self) -> Result<Format, ConfigError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: self.path.clone(),
            }),
        }
    }

    fn io(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Loader for FileStore {
    async fn load<C: DeserializeOwned + Send>(&self) -> Result<C, ConfigError> {
        let format = self.format()?;
        let text = std::fs::read_to_string(&self.path).map_err(|e| self.io(e))?;
        let config = match format {
            Format::Json => serde_json::from_str(&text)?,
            Format::Toml => toml::from_str(&text)?,
        };
        tracing::debug!(target: "marginalia::config", path = %self.path.display(), "loaded config");
        Ok(config)
    }
}

impl Saver for FileStore {
    async fn save<C: Serialize + Sync>(&self, config: &C) -> Result<(), ConfigError> {
        let text = match self.format()? {
            Format::Json => serde_json::to_string_pretty(config)?,
            Format::Toml => toml::to_string_pretty(config)?,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        std::fs::write(&self.path, text).map_err(|e| self.io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "kebab-case")]
    struct Sample {
        name: String,
        debounce_ms: u64,
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("marginalia-common-{}", std::process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn test_round_trip_by_extension() {
        let sample = Sample {
            name: "notes".into(),
            debounce_ms: 250,
        };
        for file in ["config.json", "config.toml"] {
            let store = FileStore::new(scratch(file));
            store.save(&sample).await.unwrap();
            let loaded: Sample = store.load().await.unwrap();
            assert_eq!(loaded, sample);
        }
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let store = FileStore::new(scratch("absent.toml"));
        let loaded: Sample = store.load_or_default().await.unwrap();
        assert_eq!(loaded, Sample::default());
        assert!(matches!(
            store.load::<Sample>().await,
            Err(ConfigError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let store = FileStore::new(scratch("config.yaml"));
        assert!(matches!(
            store.load::<Sample>().await,
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }
}
