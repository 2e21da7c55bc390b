//! Alert decisions.
//!
//! [`DecisionEngine::evaluate`] is a pure function: the caller supplies the
//! readings, the persisted prior state and the wall-clock time, and gets back
//! the set of notifications to send plus the values to persist. Nothing here
//! touches the network or the database.
//!
//! # Example
//!
//! ```
//! use dewdrop_core::{Action, DecisionEngine, DecisionInput};
//! use time::macros::datetime;
//!
//! let engine = DecisionEngine::default();
//! let input = DecisionInput {
//!     indoor_humidity: 55.0,
//!     indoor_dewpoint: 12.0,
//!     outdoor_dewpoint: 9.0,
//!     last_open_windows: false,
//!     recent_humidity_alert: false,
//! };
//!
//! let decision = engine.evaluate(&input, datetime!(2024-06-01 12:15 UTC));
//! assert!(decision.open_windows);
//! assert!(decision.contains(Action::SendWindowAlert));
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use time::OffsetDateTime;

use dewdrop_types::SensorFeed;

use crate::error::{Error, Result};
use crate::traits::Channel;

/// Thresholds shared by the poller and the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Indoor humidity (%) above which a humidity alert is raised.
    pub humidity: f64,
    /// Windows are recommended open when indoor minus outdoor dew point
    /// exceeds this value (degC).
    pub window_delta: f64,
    /// How long a raised humidity alert suppresses the next one.
    pub humidity_alert_window: Duration,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            humidity: 60.0,
            window_delta: -1.0,
            humidity_alert_window: Duration::from_secs(60 * 60),
        }
    }
}

impl AlertThresholds {
    /// Open-windows recommendation for a pair of dew points.
    pub fn open_windows(&self, indoor_dewpoint: f64, outdoor_dewpoint: f64) -> bool {
        indoor_dewpoint - outdoor_dewpoint > self.window_delta
    }

    /// Whether indoor humidity warrants an alert.
    pub fn humidity_alert(&self, humidity: f64) -> bool {
        humidity > self.humidity
    }

    /// Validate the thresholds.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(Error::invalid_config(
                "humidity threshold must be between 0 and 100",
            ));
        }
        if !self.window_delta.is_finite() {
            return Err(Error::invalid_config("window delta must be finite"));
        }
        if self.humidity_alert_window.is_zero() {
            return Err(Error::invalid_config("humidity alert window must be > 0"));
        }
        Ok(())
    }
}

/// A notification the caller should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    SendFeed,
    SendWindowAlert,
    SendHumidityAlert,
}

impl Action {
    /// Destination channel.
    pub fn channel(&self) -> Channel {
        match self {
            Action::SendFeed => Channel::Feed,
            Action::SendWindowAlert => Channel::WindowAlert,
            Action::SendHumidityAlert => Channel::HumidityAlert,
        }
    }

    /// Render the message for this action.
    pub fn message(&self, feed: &SensorFeed, at: OffsetDateTime) -> String {
        match self {
            Action::SendFeed => feed.feed_message(at),
            Action::SendWindowAlert => feed.window_alert_message(at),
            Action::SendHumidityAlert => feed.humidity_alert_message(at),
        }
    }
}

/// Everything the engine needs, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInput {
    pub indoor_humidity: f64,
    pub indoor_dewpoint: f64,
    pub outdoor_dewpoint: f64,
    /// `open_windows` of the most recent persisted row.
    pub last_open_windows: bool,
    /// Whether a humidity alert was persisted within the alert window.
    pub recent_humidity_alert: bool,
}

impl DecisionInput {
    /// Build an input from a received feed payload.
    pub fn from_feed(feed: &SensorFeed, last_open_windows: bool, recent_humidity_alert: bool) -> Self {
        Self {
            indoor_humidity: feed.indoor_humidity,
            indoor_dewpoint: feed.indoor_dewpoint,
            outdoor_dewpoint: feed.outdoor_dewpoint,
            last_open_windows,
            recent_humidity_alert,
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    /// Actions to perform; each appears at most once.
    pub actions: BTreeSet<Action>,
    /// Recommendation to persist.
    pub open_windows: bool,
    /// Humidity alert flag to persist.
    pub humidity_alert: bool,
}

impl Decision {
    /// Whether `action` was decided.
    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    /// Whether nothing needs to be sent.
    pub fn is_quiet(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Decides which notifications fire for a reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    thresholds: AlertThresholds,
}

impl DecisionEngine {
    /// Create an engine with the given thresholds.
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// The thresholds in use.
    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Evaluate the rules for one reading at wall-clock time `at`.
    ///
    /// 1. Windows open when the dew point delta exceeds the window threshold.
    /// 2. Humidity alert when humidity exceeds the humidity threshold.
    /// 3. At minute zero of every hour the feed is sent.
    /// 4. A change in the open/closed recommendation sends the feed and a
    ///    window alert.
    /// 5. A humidity alert with no recent one on record sends the feed and a
    ///    humidity alert.
    pub fn evaluate(&self, input: &DecisionInput, at: OffsetDateTime) -> Decision {
        let open_windows = self
            .thresholds
            .open_windows(input.indoor_dewpoint, input.outdoor_dewpoint);
        let humidity_alert = self.thresholds.humidity_alert(input.indoor_humidity);

        let mut actions = BTreeSet::new();

        if at.minute() == 0 {
            actions.insert(Action::SendFeed);
        }

        if open_windows != input.last_open_windows {
            actions.insert(Action::SendFeed);
            actions.insert(Action::SendWindowAlert);
        }

        if humidity_alert && !input.recent_humidity_alert {
            actions.insert(Action::SendFeed);
            actions.insert(Action::SendHumidityAlert);
        }

        Decision {
            actions,
            open_windows,
            humidity_alert,
        }
    }
}
