//! Last-known-good outdoor dew point cache.
//!
//! The cache starts empty. The first successful refresh populates it and
//! every later success replaces the snapshot whole; a failed refresh leaves
//! the previous snapshot in place. Readers copy the current snapshot out of a
//! `watch` channel and never wait on a refresh in progress.
//!
//! Refreshes happen either on a fixed schedule ([`OutdoorCache::spawn_refresher`])
//! or lazily when a request finds the value older than the interval
//! ([`OutdoorCache::read_or_refresh`]), in which case the stale value is served
//! immediately and marked [`Freshness::Stale`]. At most one refresh of
//! either kind is in flight at a time; a scheduled tick that finds one
//! running is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dewdrop_types::OutdoorDewPoint;

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::traits::DewPointSource;

/// Default refresh interval (30 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Whether a cached read is within the refresh interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the refresh interval.
    Fresh,
    /// Older than the refresh interval; a refresh has been requested.
    Stale,
}

/// A snapshot together with its freshness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRead {
    pub value: OutdoorDewPoint,
    pub freshness: Freshness,
}

struct Inner {
    source: Arc<dyn DewPointSource>,
    policy: Backoff,
    interval: Duration,
    snapshot: watch::Sender<Option<OutdoorDewPoint>>,
    refreshing: AtomicBool,
}

/// Clears the in-flight flag when dropped.
struct RefreshGuard(Arc<Inner>);

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.0.refreshing.store(false, Ordering::Release);
    }
}

/// Shared handle to the outdoor dew point cache.
///
/// Cloning is cheap; all clones see the same snapshot.
#[derive(Clone)]
pub struct OutdoorCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for OutdoorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutdoorCache")
            .field("interval", &self.inner.interval)
            .field("snapshot", &self.read())
            .finish()
    }
}

impl OutdoorCache {
    /// Create an empty cache backed by `source`.
    pub fn new(source: Arc<dyn DewPointSource>, interval: Duration) -> Self {
        Self::with_policy(source, interval, Backoff::outdoor_refresh())
    }

    /// Create an empty cache with a custom refresh backoff.
    pub fn with_policy(source: Arc<dyn DewPointSource>, interval: Duration, policy: Backoff) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                source,
                policy,
                interval,
                snapshot,
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    /// Refresh interval.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Current snapshot, `None` until the first successful refresh.
    pub fn read(&self) -> Option<OutdoorDewPoint> {
        *self.inner.snapshot.borrow()
    }

    /// Receiver notified on every snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<Option<OutdoorDewPoint>> {
        self.inner.snapshot.subscribe()
    }

    /// Fetch a new value, retrying with backoff.
    ///
    /// On success the snapshot is replaced and returned. When the retry
    /// budget is exhausted the snapshot is left untouched and the last error
    /// is returned. Cancellation is honoured between attempts.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<OutdoorDewPoint> {
        let source = &self.inner.source;
        let value = self
            .inner
            .policy
            .retry("outdoor dew point refresh", cancel, || async move {
                let value = source.fetch_dewpoint().await?;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(Error::Weather(format!("non-finite dew point {}", value)))
                }
            })
            .await?;

        let snapshot = self.store(value, OffsetDateTime::now_utc());
        debug!("Outdoor dew point refreshed: {:.2} C", snapshot.value);
        Ok(snapshot)
    }

    /// Replace the snapshot. `last_update` never moves backwards.
    fn store(&self, value: f64, now: OffsetDateTime) -> OutdoorDewPoint {
        let mut stored = OutdoorDewPoint::new(value, now);
        self.inner.snapshot.send_modify(|slot| {
            if let Some(previous) = slot {
                stored.last_update = stored.last_update.max(previous.last_update);
            }
            *slot = Some(stored);
        });
        stored
    }

    /// Serve the cached value, kicking off a background refresh when it is
    /// older than the interval or missing.
    ///
    /// Returns `None` only if no refresh has ever succeeded. Callers must
    /// accept values up to roughly twice the interval old.
    pub fn read_or_refresh(&self, cancel: &CancellationToken) -> Option<CachedRead> {
        self.read_or_refresh_at(OffsetDateTime::now_utc(), cancel)
    }

    fn read_or_refresh_at(
        &self,
        now: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Option<CachedRead> {
        let snapshot = self.read();
        let stale = snapshot
            .map(|s| s.age(now).unsigned_abs() > self.inner.interval)
            .unwrap_or(true);

        if stale {
            self.spawn_refresh(cancel.clone());
        }

        snapshot.map(|value| CachedRead {
            value,
            freshness: if stale {
                Freshness::Stale
            } else {
                Freshness::Fresh
            },
        })
    }

    /// Claim the in-flight slot, `None` if a refresh is already running.
    fn try_begin_refresh(&self) -> Option<RefreshGuard> {
        self.inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard(Arc::clone(&self.inner)))
    }

    /// Start one asynchronous refresh unless one is already running.
    fn spawn_refresh(&self, cancel: CancellationToken) {
        let Some(guard) = self.try_begin_refresh() else {
            return;
        };

        let cache = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = cache.refresh(&cancel).await {
                warn!("Lazy outdoor dew point refresh failed: {}", e);
            }
        });
    }

    /// Refresh now and then on every interval until `cancel` fires.
    pub fn spawn_refresher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            info!(
                "Outdoor dew point refresher started (every {:?})",
                cache.inner.interval
            );
            let mut ticker = interval(cache.inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(_guard) = cache.try_begin_refresh() else {
                    debug!("Outdoor dew point refresh already in flight, skipping tick");
                    continue;
                };
                match cache.refresh(&cancel).await {
                    Ok(_) => {}
                    Err(Error::Cancelled) => break,
                    Err(e) => match cache.read() {
                        Some(kept) => warn!(
                            "Outdoor dew point refresh failed, keeping {:.2} C: {}",
                            kept.value, e
                        ),
                        None => error!("Outdoor dew point refresh failed, cache empty: {}", e),
                    },
                }
            }
            info!("Outdoor dew point refresher stopped");
        })
    }
}
