//! Outdoor dew point cache and alerting service for dewdrop pollers.
//!
//! This crate provides a service that:
//! - Keeps the outdoor dew point for a configured location fresh from the
//!   National Weather Service
//! - Accepts sensor feeds from pollers, decides which alerts to send and
//!   stores every feed
//! - Posts alerts to chat webhooks
//!
//! # REST API Endpoints
//!
//! - `GET /weather/outdoor-dewpoint` - Cached outdoor dew point (degC)
//! - `POST /arduino/sensor-feed` - Submit a sensor feed
//! - `GET /api/health` - Service health check
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/dewdrop/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [weather]
//! latitude = 34.05
//! longitude = -118.25
//! user_agent = "dewdrop (you@example.com)"
//!
//! [webhooks]
//! sensor_feed = "https://discord.com/api/webhooks/..."
//! window_alert = "https://discord.com/api/webhooks/..."
//! humidity_alert = "https://discord.com/api/webhooks/..."
//! ```

pub mod api;
pub mod config;
pub mod feed_store;
pub mod notifier;
pub mod state;
pub mod weather;

pub use config::{
    AlertsConfig, Config, ConfigError, ServerConfig, StorageConfig, WeatherConfig, WebhooksConfig,
};
pub use feed_store::SqliteFeedStore;
pub use notifier::WebhookNotifier;
pub use state::AppState;
pub use weather::{GridPoint, NwsClient};
