//! Error types for dewdrop-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Raised by | Strategy |
//! |------------|-----------|----------|
//! | [`Error::InvalidInput`] | dew point math | Do not retry, the sample is unusable |
//! | [`Error::Computation`] | dew point math | Do not retry, the sample is unusable |
//! | [`Error::InvalidDataFormat`] | device link | Caller may poll again |
//! | [`Error::InvalidLedState`] | device link | Caller may poll again |
//! | [`Error::DeviceNotResponding`] | serial link | Abort the cycle |
//! | [`Error::Http`] / [`Error::HttpStatus`] | network link, collaborators | Abort the cycle |
//! | [`Error::Serial`] / [`Error::Io`] | serial link | Abort the cycle |
//! | [`Error::Cancelled`] | any wait | Stop, shutdown in progress |
//!
//! A stale outdoor dew point is not an error: the cache reports it through
//! [`crate::cache::Freshness`].

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the telemetry pipeline.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A dew point input violated its precondition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The dew point formula produced an unusable result.
    #[error("Computation error: {0}")]
    Computation(String),

    /// A device reply was structurally short or had an unparseable number.
    #[error("Invalid data format: {0}")]
    InvalidDataFormat(String),

    /// A device reply carried an LED flag other than `0` or `1`.
    #[error("Invalid LED state value: {0:?}")]
    InvalidLedState(String),

    /// The device did not produce a valid reply within the polling budget.
    #[error("Device not responding to command '{command}' after {waited:?}")]
    DeviceNotResponding {
        /// Wire form of the command that went unanswered.
        command: String,
        /// How long the link waited.
        waited: Duration,
    },

    /// HTTP transport failure (connection refused, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An HTTP endpoint answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The status code returned.
        status: u16,
    },

    /// Serial port failure.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The weather collaborator returned unusable data.
    #[error("Weather data error: {0}")]
    Weather(String),

    /// The persisted-state collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A notification could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a device-not-responding error for a command.
    pub fn not_responding(command: impl Into<String>, waited: Duration) -> Self {
        Self::DeviceNotResponding {
            command: command.into(),
            waited,
        }
    }

    /// Create an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Create a storage error from any displayable cause.
    pub fn storage(cause: impl std::fmt::Display) -> Self {
        Self::Storage(cause.to_string())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error comes from moving bytes rather than from their content.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::HttpStatus { .. } | Self::Serial(_) | Self::Io(_)
        )
    }
}

impl From<dewdrop_types::ParseError> for Error {
    fn from(err: dewdrop_types::ParseError) -> Self {
        match err {
            dewdrop_types::ParseError::InvalidDataFormat(msg) => Error::InvalidDataFormat(msg),
            dewdrop_types::ParseError::InvalidLedState(value) => Error::InvalidLedState(value),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidDataFormat(err.to_string()),
        }
    }
}

/// Result type alias using dewdrop-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
