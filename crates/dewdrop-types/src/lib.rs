//! Platform-agnostic types for the dewdrop dew point monitor.
//!
//! This crate provides the data shared by the device poller (dewdrop-cli),
//! the telemetry pipeline (dewdrop-core) and the HTTP service
//! (dewdrop-service).
//!
//! # Features
//!
//! - Sensor samples and the device data-line grammar
//! - The outdoor dew point snapshot
//! - The sensor feed payload and its notification messages
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use dewdrop_types::{SensorSample, is_valid_data_line};
//!
//! assert!(is_valid_data_line("42,21.50,48.20,0"));
//! let sample: SensorSample = "42,21.50,48.20,0".parse().unwrap();
//! assert_eq!(sample.device_id, 42);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    ACK, OutdoorDewPoint, SensorFeed, SensorSample, is_valid_data_line, is_valid_response, round2,
};
