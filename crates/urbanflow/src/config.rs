//! Configuration management for urbanflow.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then `URBANFLOW_`-prefixed environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "urbanflow";

/// Default local store file name.
const DATABASE_FILE_NAME: &str = "local.db";

/// Highest zoom level the tile layer serves.
pub const MAX_ZOOM: u8 = 19;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `URBANFLOW_`)
/// 2. TOML config file at `~/.config/urbanflow/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local store configuration.
    pub storage: StorageConfig,
    /// Baseline dataset configuration.
    pub baseline: BaselineConfig,
    /// Cross-tab notification configuration.
    pub notify: NotifyConfig,
    /// Map view configuration.
    pub map: MapConfig,
    /// Signed-in identity, if any.
    pub identity: IdentityConfig,
}

/// Local store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/urbanflow/local.db`
    pub database_path: Option<PathBuf>,
}

/// Where the server-provided traffic dataset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// File path or `http(s)://` URL of the baseline JSON array.
    pub source: String,
    /// Request timeout for URL sources, in seconds.
    pub timeout_secs: u64,
}

/// Cross-tab notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// How often a watching tab checks the signal keys, in milliseconds.
    pub poll_interval_ms: u64,
}

/// Initial map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Latitude of the initial view centre.
    pub center_lat: f64,
    /// Longitude of the initial view centre.
    pub center_lng: f64,
    /// Initial zoom level.
    pub zoom: u8,
    /// Zoom level used when a tab is asked to focus on a point.
    pub focus_zoom: u8,
}

/// The signed-in identity used to tag stored documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Stable user id.
    pub uid: Option<String>,
    /// Email shown alongside stored documents.
    pub email: Option<String>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            source: "assets/data/traffic.json".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 40.395,
            center_lng: 49.85,
            zoom: 12,
            focus_zoom: 15,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("URBANFLOW_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.baseline.source.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "baseline.source must not be empty".to_string(),
            });
        }

        if self.baseline.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "baseline.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.notify.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "notify.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if !self.map.center_lat.is_finite() || !self.map.center_lng.is_finite() {
            return Err(Error::ConfigValidation {
                message: "map centre coordinates must be finite numbers".to_string(),
            });
        }

        if self.map.zoom > MAX_ZOOM || self.map.focus_zoom > MAX_ZOOM {
            return Err(Error::ConfigValidation {
                message: format!("map zoom levels cannot exceed {MAX_ZOOM}"),
            });
        }

        if self.map.focus_zoom < self.map.zoom {
            return Err(Error::ConfigValidation {
                message: format!(
                    "map.focus_zoom ({}) cannot be lower than map.zoom ({})",
                    self.map.focus_zoom, self.map.zoom
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the baseline request timeout as a Duration.
    #[must_use]
    pub fn baseline_timeout(&self) -> Duration {
        Duration::from_secs(self.baseline.timeout_secs)
    }

    /// Get the signal poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.notify.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.baseline.source, "assets/data/traffic.json");
        assert_eq!(config.notify.poll_interval_ms, 500);
        assert_eq!(config.map.zoom, 12);
        assert_eq!(config.map.focus_zoom, 15);
        assert!(config.identity.uid.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_baseline_source() {
        let mut config = Config::default();
        config.baseline.source = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("baseline.source"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.baseline.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.notify.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_non_finite_centre() {
        let mut config = Config::default();
        config.map.center_lat = f64::NAN;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("finite"));
    }

    #[test]
    fn test_validate_zoom_too_high() {
        let mut config = Config::default();
        config.map.focus_zoom = 25;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cannot exceed"));
    }

    #[test]
    fn test_validate_focus_zoom_below_zoom() {
        let mut config = Config::default();
        config.map.zoom = 16;
        config.map.focus_zoom = 14;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("focus_zoom"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("local.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.baseline_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("urbanflow"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "urbanflow_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[baseline]\nsource = \"https://example.test/traffic.json\"\n\n[map]\nzoom = 10\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.baseline.source, "https://example.test/traffic.json");
        assert_eq!(config.map.zoom, 10);
        assert_eq!(config.map.focus_zoom, 15);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_toml_sections_reach_every_table() {
        let path = std::env::temp_dir().join(format!(
            "urbanflow_config_sections_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[storage]\ndatabase_path = \"/srv/urbanflow/local.db\"\n\n\
             [notify]\npoll_interval_ms = 250\n\n\
             [identity]\nuid = \"u123\"\nemail = \"someone@example.org\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/srv/urbanflow/local.db"));
        assert_eq!(config.notify.poll_interval_ms, 250);
        assert_eq!(config.identity.uid.as_deref(), Some("u123"));
        assert_eq!(config.identity.email.as_deref(), Some("someone@example.org"));
        assert_eq!(config.baseline, BaselineConfig::default());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_toml_value_rejected() {
        let path = std::env::temp_dir().join(format!(
            "urbanflow_config_invalid_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[notify]\npoll_interval_ms = 0\n").unwrap();

        let err = Config::load_from(Some(path.clone())).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_map_config_deserialize_partial() {
        let json = r#"{"center_lat": 41.0}"#;
        let map: MapConfig = serde_json::from_str(json).unwrap();
        assert!((map.center_lat - 41.0).abs() < f64::EPSILON);
        assert!((map.center_lng - 49.85).abs() < f64::EPSILON);
    }
}
