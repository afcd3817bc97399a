use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model artifact filename
pub const MODEL_FILENAME: &str = "cry_model.json";

/// Default label set filename
pub const LABELS_FILENAME: &str = "labels.json";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub schema_version: u32,
    pub input_device_id: Option<String>,

    // Recording
    pub record_duration_ms: u32,
    pub recording_path: PathBuf,

    // Model artifacts
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            input_device_id: None,
            record_duration_ms: 5000,
            recording_path: PathBuf::from("recorded_audio.wav"),
            model_path: None,
            labels_path: None,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".crymood"))
    }

    /// Get the default models directory
    pub fn default_models_dir() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("models"))
    }

    /// Get the classifier artifact path
    pub fn get_model_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.model_path {
            Ok(path.clone())
        } else {
            Ok(Self::default_models_dir()?.join(MODEL_FILENAME))
        }
    }

    /// Get the label set path
    pub fn get_labels_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.labels_path {
            Ok(path.clone())
        } else {
            Ok(Self::default_models_dir()?.join(LABELS_FILENAME))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.record_duration_ms, 5000);
        assert_eq!(config.recording_path, PathBuf::from("recorded_audio.wav"));
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = Config {
            model_path: Some(PathBuf::from("/tmp/model.json")),
            labels_path: Some(PathBuf::from("/tmp/labels.json")),
            ..Config::default()
        };
        assert_eq!(config.get_model_path().unwrap(), PathBuf::from("/tmp/model.json"));
        assert_eq!(config.get_labels_path().unwrap(), PathBuf::from("/tmp/labels.json"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.record_duration_ms = 8000;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.record_duration_ms, 8000);
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(loaded.schema_version, 1);
    }
}
