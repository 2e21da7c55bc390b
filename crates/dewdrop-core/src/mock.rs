//! Mock collaborators for testing.
//!
//! These stand in for the device, the weather service, the database and the
//! webhook so the pipeline can be exercised without hardware or network.
//!
//! # Features
//!
//! - **Scripted replies**: queue exact device replies or errors
//! - **Failure injection**: fail a number of calls, or fail specific channels
//! - **Latency simulation**: delay replies to exercise cancellation
//! - **Call recording**: inspect what was sent after the fact

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use dewdrop_types::SensorFeed;

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::traits::{Channel, DecisionStore, DewPointSource, FeedSink, Notifier};
use crate::transport::{Command, Exhaustion, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ==================== MockTransport ====================

/// Scripted device transport.
///
/// Replies are consumed in order; once the script runs out every exchange
/// returns the fallback reply (empty by default, like a read timeout).
///
/// ```
/// use dewdrop_core::mock::MockTransport;
/// use dewdrop_core::{DeviceLink, Exhaustion};
///
/// # async fn example() {
/// let transport = MockTransport::new(Exhaustion::Fatal)
///     .reply("a")
///     .reply("42,21.50,48.20,0");
/// let mut link = DeviceLink::new(transport);
/// let sample = link.read_sample().await.unwrap();
/// assert_eq!(sample.device_id, 42);
/// # }
/// ```
pub struct MockTransport {
    script: VecDeque<Result<String>>,
    fallback: String,
    exhaustion: Exhaustion,
    policy: Backoff,
    latency: Duration,
    sent: Arc<Mutex<Vec<Command>>>,
}

impl MockTransport {
    /// Create a transport with the given exhaustion rule and a 50 ms / 1 s
    /// polling policy.
    pub fn new(exhaustion: Exhaustion) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: String::new(),
            exhaustion,
            policy: Backoff::serial_poll(),
            latency: Duration::ZERO,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a reply.
    #[must_use]
    pub fn reply(mut self, reply: &str) -> Self {
        self.script.push_back(Ok(reply.to_string()));
        self
    }

    /// Queue a transport error.
    #[must_use]
    pub fn fail(mut self, error: Error) -> Self {
        self.script.push_back(Err(error));
        self
    }

    /// Reply used once the script is exhausted.
    #[must_use]
    pub fn otherwise(mut self, reply: &str) -> Self {
        self.fallback = reply.to_string();
        self
    }

    /// Override the polling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Backoff) -> Self {
        self.policy = policy;
        self
    }

    /// Delay every exchange.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handle to the commands sent so far, usable after the transport has
    /// been moved into a link.
    pub fn sent(&self) -> Arc<Mutex<Vec<Command>>> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn exchange(&mut self, command: Command) -> Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        lock(&self.sent).push(command);
        match self.script.pop_front() {
            Some(reply) => reply,
            None => Ok(self.fallback.clone()),
        }
    }

    fn policy(&self) -> Backoff {
        self.policy
    }

    fn exhaustion(&self) -> Exhaustion {
        self.exhaustion
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

// ==================== MockDewPointSource ====================

/// Outdoor dew point source with scripted values and failure injection.
#[derive(Debug)]
pub struct MockDewPointSource {
    value: Mutex<f64>,
    remaining_failures: AtomicU32,
    should_fail: AtomicBool,
    latency: Mutex<Duration>,
    calls: AtomicU32,
}

impl MockDewPointSource {
    /// Source that always returns `value`.
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(value),
            remaining_failures: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicU32::new(0),
        }
    }

    /// Change the value returned by later fetches.
    pub fn set_value(&self, value: f64) {
        *lock(&self.value) = value;
    }

    /// Fail every fetch until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` fetches, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every fetch.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Number of fetches attempted.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DewPointSource for MockDewPointSource {
    async fn fetch_dewpoint(&self) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::Weather("mock transient failure".to_string()));
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Weather("mock failure".to_string()));
        }
        Ok(*lock(&self.value))
    }
}

// ==================== MockNotifier ====================

/// Notifier that records messages and can fail chosen channels.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(Channel, String)>>,
    failing: Mutex<HashSet<Channel>>,
}

impl MockNotifier {
    /// Create a notifier that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to `channel` fail.
    pub fn fail_channel(&self, channel: Channel) {
        lock(&self.failing).insert(channel);
    }

    /// Successfully delivered messages, in delivery order.
    pub fn sent(&self) -> Vec<(Channel, String)> {
        lock(&self.sent).clone()
    }

    /// Channels that received a message.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = lock(&self.sent).iter().map(|(c, _)| *c).collect();
        channels.sort();
        channels
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, channel: Channel, message: &str) -> Result<()> {
        if lock(&self.failing).contains(&channel) {
            return Err(Error::Notification(format!("mock {} failure", channel)));
        }
        lock(&self.sent).push((channel, message.to_string()));
        Ok(())
    }
}

// ==================== MemoryStore ====================

/// In-memory decision store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<(OffsetDateTime, SensorFeed)>>,
    should_fail: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row with an explicit timestamp.
    pub fn push_at(&self, at: OffsetDateTime, feed: SensorFeed) {
        lock(&self.rows).push((at, feed));
    }

    /// Fail every operation until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// All stored feeds, oldest first.
    pub fn feeds(&self) -> Vec<SensorFeed> {
        lock(&self.rows).iter().map(|(_, f)| f.clone()).collect()
    }

    fn check(&self) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::storage("mock store unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn is_empty(&self) -> Result<bool> {
        self.check()?;
        Ok(lock(&self.rows).is_empty())
    }

    async fn last_open_windows(&self) -> Result<bool> {
        self.check()?;
        lock(&self.rows)
            .last()
            .map(|(_, f)| f.open_windows)
            .ok_or_else(|| Error::storage("no rows"))
    }

    async fn has_recent_humidity_alert(&self, window: Duration) -> Result<bool> {
        self.check()?;
        let since = OffsetDateTime::now_utc() - window;
        Ok(lock(&self.rows)
            .iter()
            .any(|(at, f)| *at >= since && f.humidity_alert))
    }

    async fn insert_feed(&self, feed: &SensorFeed) -> Result<()> {
        self.check()?;
        self.push_at(OffsetDateTime::now_utc(), feed.clone());
        Ok(())
    }
}

// ==================== RecordingSink ====================

/// Feed sink that records submissions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    feeds: Mutex<Vec<SensorFeed>>,
    should_fail: AtomicBool,
}

impl RecordingSink {
    /// Create a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every submission until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Submitted feeds.
    pub fn feeds(&self) -> Vec<SensorFeed> {
        lock(&self.feeds).clone()
    }
}

#[async_trait]
impl FeedSink for RecordingSink {
    async fn submit(&self, feed: &SensorFeed) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::http_status("mock://sensor-feed", 500));
        }
        lock(&self.feeds).push(feed.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dewdrop_types::SensorSample;

    fn feed(open_windows: bool, humidity_alert: bool) -> SensorFeed {
        let sample = SensorSample {
            device_id: 1,
            temperature: 20.0,
            humidity: 50.0,
            led_state: false,
        };
        SensorFeed::new(&sample, 9.0, 8.0, open_windows, humidity_alert)
    }

    #[tokio::test]
    async fn test_mock_transport_script_then_fallback() {
        let mut transport = MockTransport::new(Exhaustion::Fatal)
            .reply("a")
            .fail(Error::http_status("x", 500))
            .otherwise("zz");
        let sent = transport.sent();

        assert_eq!(transport.exchange(Command::ReadData).await.unwrap(), "a");
        assert!(transport.exchange(Command::ReadData).await.is_err());
        assert_eq!(transport.exchange(Command::light(true)).await.unwrap(), "zz");
        assert_eq!(
            *sent.lock().unwrap(),
            vec![Command::ReadData, Command::ReadData, Command::light(true)]
        );
    }

    #[tokio::test]
    async fn test_mock_source_transient_failures() {
        let source = MockDewPointSource::new(10.5);
        source.set_transient_failures(2);

        assert!(source.fetch_dewpoint().await.is_err());
        assert!(source.fetch_dewpoint().await.is_err());
        assert_eq!(source.fetch_dewpoint().await.unwrap(), 10.5);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_notifier_failing_channel() {
        let notifier = MockNotifier::new();
        notifier.fail_channel(Channel::WindowAlert);

        assert!(notifier.send(Channel::Feed, "hello").await.is_ok());
        assert!(notifier.send(Channel::WindowAlert, "alert").await.is_err());
        assert_eq!(notifier.channels(), vec![Channel::Feed]);
    }

    #[tokio::test]
    async fn test_memory_store_queries() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await.unwrap());
        assert!(store.last_open_windows().await.is_err());

        store.push_at(
            OffsetDateTime::now_utc() - time::Duration::hours(2),
            feed(false, true),
        );
        store.insert_feed(&feed(true, false)).await.unwrap();

        assert!(!store.is_empty().await.unwrap());
        assert!(store.last_open_windows().await.unwrap());
        assert!(
            !store
                .has_recent_humidity_alert(Duration::from_secs(3600))
                .await
                .unwrap()
        );
        assert!(
            store
                .has_recent_humidity_alert(Duration::from_secs(3 * 3600))
                .await
                .unwrap()
        );
    }
}
