//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dewdrop_core::AlertThresholds;

use crate::weather::GridPoint;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Weather API settings.
    pub weather: WeatherConfig,
    /// Notification webhooks.
    pub webhooks: WebhooksConfig,
    /// Alert thresholds.
    pub alerts: AlertsConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Server bind address is `host:port` with a non-zero port
    /// - Storage path is not empty
    /// - A weather location is given, either as an office grid or as a
    ///   latitude/longitude pair
    /// - Webhook URLs, when set, are http(s)
    /// - Alert thresholds are in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.weather.validate());
        errors.extend(self.webhooks.validate());
        errors.extend(self.alerts.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
            },
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: dewdrop_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Minimum outdoor refresh interval in seconds (1 minute).
pub const MIN_REFRESH_INTERVAL: u64 = 60;
/// Maximum outdoor refresh interval in seconds (1 day).
pub const MAX_REFRESH_INTERVAL: u64 = 24 * 60 * 60;

/// Weather API configuration.
///
/// The location is either a forecast office grid (`office`, `grid_x`,
/// `grid_y`) or a `latitude`/`longitude` pair that is resolved to a grid at
/// startup. The grid wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Forecast office identifier, e.g. "LOX".
    pub office: Option<String>,
    pub grid_x: Option<u32>,
    pub grid_y: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// User-Agent sent to the weather API, which rejects anonymous clients.
    pub user_agent: String,
    /// Weather API base URL.
    pub base_url: String,
    /// Seconds between outdoor dew point refreshes.
    pub refresh_interval_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            office: None,
            grid_x: None,
            grid_y: None,
            latitude: None,
            longitude: None,
            user_agent: concat!("dewdrop-service/", env!("CARGO_PKG_VERSION")).to_string(),
            base_url: crate::weather::DEFAULT_BASE_URL.to_string(),
            refresh_interval_secs: 30 * 60,
        }
    }
}

impl WeatherConfig {
    /// The configured office grid, if complete.
    pub fn grid(&self) -> Option<GridPoint> {
        match (&self.office, self.grid_x, self.grid_y) {
            (Some(office), Some(x), Some(y)) if !office.is_empty() => Some(GridPoint {
                office: office.clone(),
                x,
                y,
            }),
            _ => None,
        }
    }

    /// The configured coordinates, if both are set.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Refresh interval as a duration.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Validate weather configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.grid().is_none() && self.coordinates().is_none() {
            errors.push(ValidationError::new(
                "weather",
                "must provide either office/grid_x/grid_y or latitude/longitude",
            ));
        }

        if let Some(lat) = self.latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            errors.push(ValidationError::new(
                "weather.latitude",
                format!("latitude {} is out of range (-90 to 90)", lat),
            ));
        }
        if let Some(lon) = self.longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            errors.push(ValidationError::new(
                "weather.longitude",
                format!("longitude {} is out of range (-180 to 180)", lon),
            ));
        }

        if self.user_agent.trim().is_empty() {
            errors.push(ValidationError::new(
                "weather.user_agent",
                "user agent cannot be empty",
            ));
        }

        if !is_http_url(&self.base_url) {
            errors.push(ValidationError::new(
                "weather.base_url",
                format!("'{}' is not an http(s) URL", self.base_url),
            ));
        }

        if self.refresh_interval_secs < MIN_REFRESH_INTERVAL {
            errors.push(ValidationError::new(
                "weather.refresh_interval_secs",
                format!(
                    "refresh interval {} is too short (minimum {} seconds)",
                    self.refresh_interval_secs, MIN_REFRESH_INTERVAL
                ),
            ));
        } else if self.refresh_interval_secs > MAX_REFRESH_INTERVAL {
            errors.push(ValidationError::new(
                "weather.refresh_interval_secs",
                format!(
                    "refresh interval {} is too long (maximum {} seconds)",
                    self.refresh_interval_secs, MAX_REFRESH_INTERVAL
                ),
            ));
        }

        errors
    }
}

/// Webhook URL per notification channel. Unset channels are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    pub sensor_feed: Option<String>,
    pub window_alert: Option<String>,
    pub humidity_alert: Option<String>,
}

impl WebhooksConfig {
    /// Validate webhook configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        [
            ("webhooks.sensor_feed", &self.sensor_feed),
            ("webhooks.window_alert", &self.window_alert),
            ("webhooks.humidity_alert", &self.humidity_alert),
        ]
        .into_iter()
        .filter_map(|(field, url)| match url {
            Some(url) if !is_http_url(url) => Some(ValidationError::new(
                field,
                format!("'{}' is not an http(s) URL", url),
            )),
            _ => None,
        })
        .collect()
    }
}

/// Alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Indoor humidity (%) above which a humidity alert is raised.
    pub humidity_threshold: f64,
    /// Indoor minus outdoor dew point (degC) above which windows should open.
    pub window_delta_threshold: f64,
    /// Seconds a humidity alert suppresses the next one.
    pub humidity_alert_window_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let defaults = AlertThresholds::default();
        Self {
            humidity_threshold: defaults.humidity,
            window_delta_threshold: defaults.window_delta,
            humidity_alert_window_secs: defaults.humidity_alert_window.as_secs(),
        }
    }
}

impl AlertsConfig {
    /// Thresholds for the decision engine.
    pub fn thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            humidity: self.humidity_threshold,
            window_delta: self.window_delta_threshold,
            humidity_alert_window: Duration::from_secs(self.humidity_alert_window_secs),
        }
    }

    /// Validate alert configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        match self.thresholds().validate() {
            Ok(()) => Vec::new(),
            Err(e) => vec![ValidationError::new("alerts", e.to_string())],
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `weather.latitude`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dewdrop")
        .join("server.toml")
}
