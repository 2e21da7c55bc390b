//! Error types for data parsing in dewdrop-types.

use thiserror::Error;

/// Errors that can occur when parsing a reply from the sensor device.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The reply is structurally short or a numeric field does not parse.
    #[error("Invalid data format: {0}")]
    InvalidDataFormat(String),

    /// The LED flag is neither `0` nor `1`.
    #[error("Invalid LED state value: {0:?}")]
    InvalidLedState(String),
}

/// Result type alias using dewdrop-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
