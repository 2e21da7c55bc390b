//! Core types for dewdrop sensor data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ParseError;

/// Bare acknowledgement token sent by the device.
pub const ACK: &str = "a";

/// Maximum number of digits in a device identifier.
pub const MAX_DEVICE_ID_DIGITS: usize = 20;

/// One reading produced by a successful exchange with the sensor device.
///
/// Immutable once constructed; produced by parsing a data line of the form
/// `deviceId,temperature,humidity,ledFlag`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSample {
    /// Device identifier (up to 20 decimal digits).
    pub device_id: u64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage (0-100).
    pub humidity: f64,
    /// Whether the warning light is currently lit.
    pub led_state: bool,
}

impl SensorSample {
    /// Parse a sample from a device data line.
    ///
    /// Surrounding whitespace and whitespace around fields is ignored. This is
    /// more lenient than [`is_valid_data_line`]: it checks structure and field
    /// values, not the fixed-point formatting of the numbers.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidDataFormat`] if the line has fewer than four
    /// fields or a numeric field does not parse, and
    /// [`ParseError::InvalidLedState`] if the LED flag is not `0` or `1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dewdrop_types::SensorSample;
    ///
    /// let sample = SensorSample::parse_line("123,25.55,60.01,1").unwrap();
    /// assert_eq!(sample.device_id, 123);
    /// assert!(sample.led_state);
    /// ```
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if parts.len() < 4 {
            return Err(ParseError::InvalidDataFormat(format!(
                "expected 4 fields, got {} in {:?}",
                parts.len(),
                line.trim()
            )));
        }

        let device_id = parts[0].parse::<u64>().map_err(|_| {
            ParseError::InvalidDataFormat(format!("invalid device id {:?}", parts[0]))
        })?;
        let temperature = parse_float(parts[1], "temperature")?;
        let humidity = parse_float(parts[2], "humidity")?;
        let led_state = match parts[3] {
            "1" => true,
            "0" => false,
            other => return Err(ParseError::InvalidLedState(other.to_string())),
        };

        Ok(Self {
            device_id,
            temperature,
            humidity,
            led_state,
        })
    }
}

impl FromStr for SensorSample {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

fn parse_float(field: &str, name: &str) -> Result<f64, ParseError> {
    field
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidDataFormat(format!("invalid {} {:?}", name, field)))
}

/// Check whether a reply matches the device data-line grammar.
///
/// The grammar is `^\d{1,20},\d{2}\.\d{2},\d{2}\.\d{2},[01]$`: a device id,
/// temperature and humidity as two-digit fixed point with two decimals, and
/// an LED flag. The id must also fit in a `u64`, so every accepted line
/// parses with [`SensorSample::parse_line`].
#[must_use]
pub fn is_valid_data_line(line: &str) -> bool {
    let mut fields = line.split(',');
    let (Some(id), Some(temp), Some(hum), Some(led), None) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return false;
    };

    let id_ok = (1..=MAX_DEVICE_ID_DIGITS).contains(&id.len())
        && id.bytes().all(|b| b.is_ascii_digit())
        && id.parse::<u64>().is_ok();

    id_ok && is_fixed_point(temp) && is_fixed_point(hum) && (led == "0" || led == "1")
}

/// Check whether a reply is acceptable for any command: either a data line
/// or the bare acknowledgement token.
#[must_use]
pub fn is_valid_response(response: &str) -> bool {
    !response.is_empty() && (response == ACK || is_valid_data_line(response))
}

// `dd.dd`
fn is_fixed_point(field: &str) -> bool {
    let b = field.as_bytes();
    b.len() == 5
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2] == b'.'
        && b[3].is_ascii_digit()
        && b[4].is_ascii_digit()
}

/// Round half away from zero to two decimal places.
///
/// Applied only when values leave the process (payloads, messages, storage),
/// never inside the dew point computation.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Last-known outdoor dew point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutdoorDewPoint {
    /// Dew point in degrees Celsius.
    pub value: f64,
    /// When the value was fetched.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_update: OffsetDateTime,
}

impl OutdoorDewPoint {
    /// Create a snapshot.
    pub fn new(value: f64, last_update: OffsetDateTime) -> Self {
        Self { value, last_update }
    }

    /// Age of the snapshot relative to `now`. Never negative.
    pub fn age(&self, now: OffsetDateTime) -> time::Duration {
        (now - self.last_update).max(time::Duration::ZERO)
    }
}

/// Sensor feed payload exchanged between the poller and the service.
///
/// All floating point fields are rounded to two decimals on construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorFeed {
    pub device_id: u64,
    pub indoor_temperature: f64,
    pub indoor_humidity: f64,
    pub indoor_dewpoint: f64,
    pub outdoor_dewpoint: f64,
    pub dewpoint_delta: f64,
    pub open_windows: bool,
    pub humidity_alert: bool,
}

impl SensorFeed {
    /// Build a payload from a sample and the computed values.
    pub fn new(
        sample: &SensorSample,
        indoor_dewpoint: f64,
        outdoor_dewpoint: f64,
        open_windows: bool,
        humidity_alert: bool,
    ) -> Self {
        Self {
            device_id: sample.device_id,
            indoor_temperature: round2(sample.temperature),
            indoor_humidity: round2(sample.humidity),
            indoor_dewpoint: round2(indoor_dewpoint),
            outdoor_dewpoint: round2(outdoor_dewpoint),
            dewpoint_delta: round2(indoor_dewpoint - outdoor_dewpoint),
            open_windows,
            humidity_alert,
        }
    }

    /// Window recommendation as shown to people.
    pub fn windows_label(&self) -> &'static str {
        if self.open_windows { "Open" } else { "Closed" }
    }

    /// Message for the periodic sensor feed channel.
    pub fn feed_message(&self, at: OffsetDateTime) -> String {
        format!(
            "{}\n\
             Sent from: {}\n\
             Indoor Temperature: {:.2} C\n\
             Indoor Humidity: {:.2} %\n\
             Indoor Dewpoint: {:.2} C\n\
             Outdoor Dewpoint: {:.2} C\n\
             Dewpoint Delta: {:.2} C\n\
             Open Windows: {}\n\
             Humidity Alert: {}",
            timestamp(at),
            self.device_id,
            self.indoor_temperature,
            self.indoor_humidity,
            self.indoor_dewpoint,
            self.outdoor_dewpoint,
            self.dewpoint_delta,
            self.windows_label(),
            self.humidity_alert,
        )
    }

    /// Message for the window alert channel.
    pub fn window_alert_message(&self, at: OffsetDateTime) -> String {
        format!(
            "{}\n@everyone\n\
             Sent from {}\n\
             Indoor Dewpoint: {:.2} C\n\
             Outdoor Dewpoint: {:.2} C\n\
             Dewpoint Delta: {:.2} C\n\
             Open Windows: {}",
            timestamp(at),
            self.device_id,
            self.indoor_dewpoint,
            self.outdoor_dewpoint,
            self.dewpoint_delta,
            self.windows_label(),
        )
    }

    /// Message for the humidity alert channel.
    pub fn humidity_alert_message(&self, at: OffsetDateTime) -> String {
        format!(
            "{}\n@everyone\n\
             Sent from {}\n\
             Indoor Humidity: {:.2} %\n\
             Humidity Alert: {}",
            timestamp(at),
            self.device_id,
            self.indoor_humidity,
            self.humidity_alert,
        )
    }
}

impl fmt::Display for SensorFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {}: {:.2} C, {:.2} %, dew point {:.2} C (outdoor {:.2} C, delta {:.2} C), windows {}",
            self.device_id,
            self.indoor_temperature,
            self.indoor_humidity,
            self.indoor_dewpoint,
            self.outdoor_dewpoint,
            self.dewpoint_delta,
            self.windows_label(),
        )
    }
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}
