//! Application state shared across handlers.
//!
//! The store sits behind a `tokio::sync::Mutex` shared between the handlers
//! and the alert pipeline. The outdoor cache needs no lock; readers copy its
//! current snapshot.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use dewdrop_core::{AlertPipeline, DecisionEngine, DewPointSource, Notifier, OutdoorCache};
use dewdrop_store::Store;

use crate::config::Config;
use crate::feed_store::SqliteFeedStore;

/// Shared application state.
pub struct AppState {
    /// The data store.
    pub store: Arc<Mutex<Store>>,
    /// Configuration as loaded at startup.
    pub config: Config,
    /// Last-known-good outdoor dew point.
    pub outdoor: OutdoorCache,
    /// Decision, notification and persistence for incoming feeds.
    pub pipeline: AlertPipeline,
    /// Cancelled on shutdown. Lazy refreshes and the refresher observe it.
    pub cancel: CancellationToken,
    /// When the service started.
    pub started_at: OffsetDateTime,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        store: Store,
        config: Config,
        weather: Arc<dyn DewPointSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let store = Arc::new(Mutex::new(store));
        let pipeline = AlertPipeline::new(
            Arc::new(SqliteFeedStore::new(Arc::clone(&store))),
            notifier,
            DecisionEngine::new(config.alerts.thresholds()),
        );
        let outdoor = OutdoorCache::new(weather, config.weather.refresh_interval());

        Arc::new(Self {
            store,
            config,
            outdoor,
            pipeline,
            cancel: CancellationToken::new(),
            started_at: OffsetDateTime::now_utc(),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("outdoor", &self.outdoor)
            .field("pipeline", &self.pipeline)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
