use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use telemetry_upload::TelemetryConfig;
use tracing::debug;

use crate::error::Result;

const APP_DIR: &str = "telemetry-upload";
const CONFIG_FILE: &str = "config.toml";

/// CLI configuration, read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub upload: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut upload = TelemetryConfig::default();
        if let Some(data_dir) = dirs::data_dir() {
            upload.data_dir = data_dir.join(APP_DIR);
        }
        Self { upload }
    }
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap();

        assert_eq!(config.upload.max_uploads_per_day, 100);
        assert_eq!(config.upload.timeout_secs, 60);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[upload]
server_endpoint = "http://localhost:8080"
max_uploads_per_day = 5
data_dir = "/tmp/pings"

[upload.max_uploads_per_day_by_category]
events = 20
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.upload.server_endpoint, "http://localhost:8080");
        assert_eq!(config.upload.max_uploads_for("core"), 5);
        assert_eq!(config.upload.max_uploads_for("events"), 20);
        assert_eq!(config.upload.max_files_per_category, 40);
        assert_eq!(config.upload.data_dir, PathBuf::from("/tmp/pings"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upload]\nmax_uploads_per_day = \"many\"\n").unwrap();

        assert!(AppConfig::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_show_reloads() {
        let mut config = AppConfig::default();
        config.upload.max_uploads_per_day = 7;

        let shown = config.show().unwrap();
        let reloaded: AppConfig = toml::from_str(&shown).unwrap();
        assert_eq!(reloaded.upload.max_uploads_per_day, 7);
    }
}
