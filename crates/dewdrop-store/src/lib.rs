//! Local persistence for dewdrop sensor feeds.
//!
//! Every feed accepted by the service becomes one row. The rows double as
//! the persisted decision state: the last `open_windows` value and recent
//! humidity alerts are read back from them on every request, so alert
//! de-duplication survives restarts.
//!
//! # Example
//!
//! ```no_run
//! use dewdrop_store::{Store, default_db_path};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open(default_db_path())?;
//! let last = store.last_open_windows()?;
//! let recent = store.has_humidity_alert_since(OffsetDateTime::now_utc() - Duration::hours(1))?;
//! println!("last open_windows = {:?}, recent humidity alert = {}", last, recent);
//! # Ok::<(), dewdrop_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredFeed;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/dewdrop/feeds.db`
/// - macOS: `~/Library/Application Support/dewdrop/feeds.db`
/// - Windows: `C:\Users\<user>\AppData\Local\dewdrop\feeds.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("dewdrop")
        .join("feeds.db")
}
