//! Collaborator abstractions consumed by the pipeline.
//!
//! The core never talks to a weather service, a database or a webhook
//! directly. It goes through these traits so the service and the poller can
//! plug in real clients while tests plug in [`crate::mock`] types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use dewdrop_types::SensorFeed;

use crate::error::Result;

/// Something that can produce the current outdoor dew point.
///
/// The service implements this against the weather API; the poller
/// implements it against the service's cached endpoint.
#[async_trait]
pub trait DewPointSource: Send + Sync {
    /// Fetch the outdoor dew point in degrees Celsius.
    async fn fetch_dewpoint(&self) -> Result<f64>;
}

/// Persisted decision state.
///
/// Values are always read fresh from storage and never cached by the
/// pipeline, so decisions survive process restarts.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Whether no feed row has ever been stored.
    async fn is_empty(&self) -> Result<bool>;

    /// The `open_windows` value of the most recent row.
    async fn last_open_windows(&self) -> Result<bool>;

    /// Whether a row with a raised humidity alert exists within `window`.
    async fn has_recent_humidity_alert(&self, window: Duration) -> Result<bool>;

    /// Append a feed row.
    async fn insert_feed(&self, feed: &SensorFeed) -> Result<()>;
}

/// Notification destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Periodic sensor feed.
    Feed,
    /// Open/closed recommendation changes.
    WindowAlert,
    /// High indoor humidity.
    HumidityAlert,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Feed => "sensor feed",
            Channel::WindowAlert => "window alert",
            Channel::HumidityAlert => "humidity alert",
        };
        f.write_str(name)
    }
}

/// Outbound notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message` to `channel`.
    async fn send(&self, channel: Channel, message: &str) -> Result<()>;
}

/// Where the orchestrator hands a finished feed.
#[async_trait]
pub trait FeedSink: Send + Sync {
    /// Submit one feed.
    async fn submit(&self, feed: &SensorFeed) -> Result<()>;
}
