//! [`DecisionStore`] over the shared SQLite store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use dewdrop_core::{DecisionStore, Error, Result};
use dewdrop_store::Store;
use dewdrop_types::SensorFeed;

/// Decision state read from and written to the feeds table.
///
/// Shares the store handle with the HTTP handlers; every call takes the lock
/// for one query only.
#[derive(Debug, Clone)]
pub struct SqliteFeedStore {
    store: Arc<Mutex<Store>>,
}

impl SqliteFeedStore {
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DecisionStore for SqliteFeedStore {
    async fn is_empty(&self) -> Result<bool> {
        self.store.lock().await.is_empty().map_err(Error::storage)
    }

    async fn last_open_windows(&self) -> Result<bool> {
        let last = self
            .store
            .lock()
            .await
            .last_open_windows()
            .map_err(Error::storage)?;
        Ok(last.unwrap_or(false))
    }

    async fn has_recent_humidity_alert(&self, window: Duration) -> Result<bool> {
        let since = OffsetDateTime::now_utc() - window;
        self.store
            .lock()
            .await
            .has_humidity_alert_since(since)
            .map_err(Error::storage)
    }

    async fn insert_feed(&self, feed: &SensorFeed) -> Result<()> {
        self.store
            .lock()
            .await
            .insert_feed(feed)
            .map(|_| ())
            .map_err(Error::storage)
    }
}
