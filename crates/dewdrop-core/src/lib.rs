//! Sensor telemetry pipeline for the dewdrop dew point monitor.
//!
//! This crate holds the parts of dewdrop with real timing and failure
//! handling. Everything that talks to the outside world beyond the sensor
//! device (weather API, database, webhooks) is reached through the traits in
//! [`traits`].
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`dewpoint`] | Magnus-Tetens dew point with strict input checks |
//! | [`link`] | Command/acknowledge protocol with bounded polling |
//! | [`serial`], [`http`] | The two device transports |
//! | [`backoff`] | Delay schedule and budget shared by link and cache |
//! | [`cache`] | Last-known-good outdoor dew point with scheduled refresh |
//! | [`decision`] | Pure alert rules |
//! | [`pipeline`] | Service side: decide, notify, persist |
//! | [`orchestrator`] | Poller side: read, compute, light, submit |
//!
//! # Quick Start
//!
//! ```no_run
//! use dewdrop_core::{DeviceLink, SerialTransport, dewpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyACM0", 115_200)?;
//!     let mut link = DeviceLink::new(transport);
//!
//!     let sample = link.read_sample().await?;
//!     let td = dewpoint::compute(sample.temperature, sample.humidity)?;
//!     println!("Indoor dew point: {:.2} C", td);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod cache;
pub mod decision;
pub mod dewpoint;
pub mod error;
pub mod http;
pub mod link;
pub mod mock;
pub mod orchestrator;
pub mod pipeline;
pub mod serial;
pub mod traits;
pub mod transport;

pub use backoff::{Backoff, Deadline};
pub use cache::{CachedRead, Freshness, OutdoorCache};
pub use decision::{Action, AlertThresholds, Decision, DecisionEngine, DecisionInput};
pub use error::{Error, Result};
pub use http::HttpTransport;
pub use link::DeviceLink;
pub use orchestrator::{CycleReport, Orchestrator};
pub use pipeline::{AlertPipeline, PipelineOutcome};
pub use serial::{SerialStream, SerialTransport};
pub use traits::{Channel, DecisionStore, DewPointSource, FeedSink, Notifier};
pub use transport::{Command, Exhaustion, Transport};

// Re-export types from dewdrop-types
pub use dewdrop_types;
pub use dewdrop_types::{OutdoorDewPoint, SensorFeed, SensorSample};
