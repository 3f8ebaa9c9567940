//! Configuration loading for the facewatch daemon

use crate::worker::CaptureConfig;
use anyhow::{Context, Result};
use facewatch_core::DEFAULT_TOLERANCE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub camera: Option<CameraConfig>,
    pub recognition: Option<RecognitionConfig>,
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CameraConfig {
    pub device_index: Option<u32>,
    pub frame_skip: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RecognitionConfig {
    pub tolerance: Option<f32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

impl Config {
    pub fn tolerance(&self) -> f32 {
        self.recognition
            .as_ref()
            .and_then(|r| r.tolerance)
            .unwrap_or(DEFAULT_TOLERANCE)
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.storage.as_ref().and_then(|s| s.db_path.clone())
    }

    /// Capture settings with defaults filled in
    pub fn capture_config(&self) -> CaptureConfig {
        let mut config = CaptureConfig {
            tolerance: self.tolerance(),
            ..CaptureConfig::default()
        };
        if let Some(camera) = &self.camera {
            if let Some(index) = camera.device_index {
                config.device_index = index;
            }
            if let Some(skip) = camera.frame_skip {
                config.frame_skip = skip.max(1);
            }
            if let Some(secs) = camera.cooldown_secs {
                config.cooldown = Duration::from_secs(secs);
            }
            if let Some(ms) = camera.frame_interval_ms {
                config.frame_interval = Duration::from_millis(ms);
            }
        }
        config
    }
}

/// Load configuration from a TOML file; a missing file means defaults
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.tolerance(), DEFAULT_TOLERANCE);
        assert!(config.db_path().is_none());

        let capture = config.capture_config();
        assert_eq!(capture.device_index, 0);
        assert_eq!(capture.frame_skip, 2);
        assert_eq!(capture.cooldown, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [camera]
            device_index = 1
            frame_skip = 3
            cooldown_secs = 10
            frame_interval_ms = 50

            [recognition]
            tolerance = 0.5

            [storage]
            db_path = "/var/lib/facewatch/faces.db"
            "#,
        )
        .unwrap();

        let capture = config.capture_config();
        assert_eq!(capture.device_index, 1);
        assert_eq!(capture.frame_skip, 3);
        assert_eq!(capture.cooldown, Duration::from_secs(10));
        assert_eq!(capture.frame_interval, Duration::from_millis(50));
        assert_eq!(capture.tolerance, 0.5);
        assert_eq!(
            config.db_path().unwrap(),
            PathBuf::from("/var/lib/facewatch/faces.db")
        );
    }

    #[test]
    fn test_frame_skip_zero_is_clamped() {
        let config: Config = toml::from_str("[camera]\nframe_skip = 0\n").unwrap();
        assert_eq!(config.capture_config().frame_skip, 1);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.tolerance(), DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [ valid").unwrap();
        assert!(load_config(&path).is_err());
    }
}
