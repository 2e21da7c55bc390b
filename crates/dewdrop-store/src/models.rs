//! Data models for stored data.

use time::OffsetDateTime;

use dewdrop_types::SensorFeed;

/// A feed row as stored in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFeed {
    /// Database row ID.
    pub id: i64,
    /// When the service received the feed.
    pub received_at: OffsetDateTime,
    /// The persisted payload.
    pub feed: SensorFeed,
}
