//! Server-side handling of one received feed.
//!
//! The pipeline reads the persisted decision state, asks the
//! [`DecisionEngine`] what to do, sends the resulting notifications
//! concurrently and finally persists the row. Notification failures are
//! logged and reported but never stop sibling notifications or the insert.
//!
//! Two overlapping calls are not serialised against each other: both may read
//! the same prior state and both may send the same window alert. The row is
//! always written after the notifications it informed.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use dewdrop_types::SensorFeed;

use crate::decision::{Action, Decision, DecisionEngine, DecisionInput};
use crate::error::Result;
use crate::traits::{Channel, DecisionStore, FeedSink, Notifier};

/// What the pipeline did with a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// The row that was persisted.
    pub stored: SensorFeed,
    /// `None` when this was the first row and no rules were evaluated.
    pub decision: Option<Decision>,
    /// Channels whose notification could not be delivered.
    pub failed: Vec<Channel>,
}

impl PipelineOutcome {
    /// Whether this feed initialised an empty store.
    pub fn initialized(&self) -> bool {
        self.decision.is_none()
    }
}

/// Decision, notification and persistence for incoming feeds.
pub struct AlertPipeline {
    store: Arc<dyn DecisionStore>,
    notifier: Arc<dyn Notifier>,
    engine: DecisionEngine,
}

impl std::fmt::Debug for AlertPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertPipeline")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl AlertPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        store: Arc<dyn DecisionStore>,
        notifier: Arc<dyn Notifier>,
        engine: DecisionEngine,
    ) -> Self {
        Self {
            store,
            notifier,
            engine,
        }
    }

    /// Process a feed at the current time.
    pub async fn process(&self, feed: SensorFeed) -> Result<PipelineOutcome> {
        self.process_at(feed, OffsetDateTime::now_utc()).await
    }

    /// Process a feed as if received at `at`.
    ///
    /// # Errors
    ///
    /// Storage failures are returned. Notification failures are not; they
    /// are listed in [`PipelineOutcome::failed`].
    pub async fn process_at(&self, feed: SensorFeed, at: OffsetDateTime) -> Result<PipelineOutcome> {
        if self.store.is_empty().await? {
            self.store.insert_feed(&feed).await?;
            info!("Stored first feed from device {}", feed.device_id);
            return Ok(PipelineOutcome {
                stored: feed,
                decision: None,
                failed: Vec::new(),
            });
        }

        let last_open_windows = self.store.last_open_windows().await?;
        let recent_humidity_alert = self
            .store
            .has_recent_humidity_alert(self.engine.thresholds().humidity_alert_window)
            .await?;

        let input = DecisionInput::from_feed(&feed, last_open_windows, recent_humidity_alert);
        let decision = self.engine.evaluate(&input, at);

        let mut stored = feed;
        if stored.open_windows != decision.open_windows
            || stored.humidity_alert != decision.humidity_alert
        {
            debug!(
                "Device {} reported open_windows={} humidity_alert={}, storing {} / {}",
                stored.device_id,
                stored.open_windows,
                stored.humidity_alert,
                decision.open_windows,
                decision.humidity_alert
            );
            stored.open_windows = decision.open_windows;
            stored.humidity_alert = decision.humidity_alert;
        }

        let failed = self.notify(&decision, &stored, at).await;

        self.store.insert_feed(&stored).await?;

        Ok(PipelineOutcome {
            stored,
            decision: Some(decision),
            failed,
        })
    }

    /// Send every decided notification concurrently and wait for all of them.
    async fn notify(&self, decision: &Decision, feed: &SensorFeed, at: OffsetDateTime) -> Vec<Channel> {
        if decision.is_quiet() {
            return Vec::new();
        }

        let mut tasks = JoinSet::new();
        for action in &decision.actions {
            let channel = action.channel();
            let message = action.message(feed, at);
            let notifier = Arc::clone(&self.notifier);
            tasks.spawn(async move {
                let result = notifier.send(channel, &message).await;
                (channel, result)
            });
        }

        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((channel, Ok(()))) => debug!("Sent {} notification", channel),
                Ok((channel, Err(e))) => {
                    warn!("Failed to send {} notification: {}", channel, e);
                    failed.push(channel);
                }
                Err(e) => error!("Notification task failed: {}", e),
            }
        }
        failed.sort();

        if decision.contains(Action::SendWindowAlert) {
            info!("Window recommendation changed to {}", feed.windows_label());
        }
        failed
    }
}

#[async_trait]
impl FeedSink for AlertPipeline {
    async fn submit(&self, feed: &SensorFeed) -> Result<()> {
        self.process(feed.clone()).await.map(|_| ())
    }
}
