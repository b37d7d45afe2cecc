//! Settings and Runtime Configuration
//!
//! `Config` describes where this process writes and whom it talks to.
//! `Settings` are the user's preferences, read fresh for every run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_PUSH_ADDRESS: &str = "127.0.0.1:39999";
pub const DEFAULT_DATA_URL: &str = "http://127.0.0.1:5000/api/tts/data";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_push_address")]
    pub push_address: String,
    #[serde(default = "default_data_url")]
    pub data_url: String,
}

fn default_results_dir() -> PathBuf { PathBuf::from("results") }
fn default_push_address() -> String { DEFAULT_PUSH_ADDRESS.to_string() }
fn default_data_url() -> String { DEFAULT_DATA_URL.to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            push_address: default_push_address(),
            data_url: default_data_url(),
        }
    }
}

impl Config {
    /// Load from a JSON file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        read_json_or_default(path)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardSize {
    pub scale_x: f64,
    pub scale_y: f64,
    pub scale_z: f64,
}

impl Default for CardSize {
    fn default() -> Self {
        Self { scale_x: 1.0, scale_y: 1.0, scale_z: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_true")]
    pub enable_back_shadow: bool,
    #[serde(default)]
    pub card_size: CardSize,
}

fn default_lang() -> String { "en".to_string() }
fn default_true() -> bool { true }

impl Default for Settings {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            enable_back_shadow: true,
            card_size: CardSize::default(),
        }
    }
}

/// Read-only access to the current settings
pub trait SettingsSource: Send + Sync {
    fn settings(&self) -> Result<Settings, SettingsError>;
}

impl SettingsSource for Settings {
    fn settings(&self) -> Result<Settings, SettingsError> {
        Ok(self.clone())
    }
}

/// Settings persisted as JSON, re-read on every call
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsSource for SettingsFile {
    fn settings(&self) -> Result<Settings, SettingsError> {
        read_json_or_default(&self.path)
    }
}

fn read_json_or_default<T>(path: &Path) -> Result<T, SettingsError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => return Err(SettingsError::Io { path: path.to_path_buf(), source }),
    };
    serde_json::from_str(&content).map_err(|source| SettingsError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());

        let settings = SettingsFile::new(dir.path().join("settings.json")).settings().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.enable_back_shadow);
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"enableBackShadow": false, "cardSize": {"scaleX": 2.0, "scaleY": 1.0, "scaleZ": 2.0}}"#).unwrap();

        let settings = SettingsFile::new(&path).settings().unwrap();
        assert!(!settings.enable_back_shadow);
        assert_eq!(settings.lang, "en");
        assert_eq!(settings.card_size.scale_x, 2.0);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }
}
