//! One poller cycle: read, compute, act.
//!
//! The indoor sample and the outdoor dew point are fetched concurrently and
//! joined before anything is computed. Device and transport failures abort
//! the cycle. After the join, the light update and the feed submission run
//! concurrently and fail independently.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use dewdrop_types::{SensorFeed, SensorSample};

use crate::decision::AlertThresholds;
use crate::dewpoint;
use crate::error::Result;
use crate::link::DeviceLink;
use crate::traits::{DewPointSource, FeedSink};

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub sample: SensorSample,
    pub feed: SensorFeed,
    /// Whether the light command was sent.
    pub light_toggled: bool,
    /// Light command failure, if any.
    pub light_error: Option<String>,
    /// Feed submission failure, if any.
    pub submit_error: Option<String>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Whether every side effect succeeded.
    pub fn is_clean(&self) -> bool {
        self.light_error.is_none() && self.submit_error.is_none()
    }
}

/// Whether the light shows the wrong state for the recommendation.
///
/// A lit light means "keep windows closed", so the light needs changing
/// exactly when it is lit while windows should open, or dark while they
/// should stay closed.
pub fn light_needs_toggle(open_windows: bool, led_state: bool) -> bool {
    open_windows == led_state
}

/// Poller-side orchestrator.
pub struct Orchestrator {
    link: DeviceLink,
    outdoor: Arc<dyn DewPointSource>,
    sink: Arc<dyn FeedSink>,
    thresholds: AlertThresholds,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("link", &self.link)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        link: DeviceLink,
        outdoor: Arc<dyn DewPointSource>,
        sink: Arc<dyn FeedSink>,
    ) -> Self {
        Self {
            link,
            outdoor,
            sink,
            thresholds: AlertThresholds::default(),
        }
    }

    /// Use custom thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Returns the device, transport, outdoor fetch or dew point error that
    /// aborted the cycle. Light and submission failures are not errors; they
    /// are recorded in the report.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();

        let (sample, outdoor) =
            tokio::join!(self.link.read_sample(), self.outdoor.fetch_dewpoint());
        let sample = sample?;
        let outdoor = outdoor?;
        debug!("Sample {:?}, outdoor dew point {:.2} C", sample, outdoor);

        let indoor = dewpoint::compute(sample.temperature, sample.humidity)?;
        let open_windows = self.thresholds.open_windows(indoor, outdoor);
        let humidity_alert = self.thresholds.humidity_alert(sample.humidity);
        let feed = SensorFeed::new(&sample, indoor, outdoor, open_windows, humidity_alert);
        info!("{}", feed);

        let light_toggled = light_needs_toggle(open_windows, sample.led_state);
        let link = &mut self.link;
        let sink = &self.sink;
        let (light, submitted) = tokio::join!(
            async move {
                if light_toggled {
                    Some(link.toggle_light(open_windows).await)
                } else {
                    None
                }
            },
            sink.submit(&feed),
        );

        let light_error = match light {
            Some(Err(e)) => {
                warn!("Failed to update warning light: {}", e);
                Some(e.to_string())
            }
            _ => None,
        };
        let submit_error = submitted.err().map(|e| {
            warn!("Failed to submit sensor feed: {}", e);
            e.to_string()
        });

        Ok(CycleReport {
            sample,
            feed,
            light_toggled,
            light_error,
            submit_error,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::{MockDewPointSource, MockTransport, RecordingSink};
    use crate::transport::{Command, Exhaustion};

    fn orchestrator(
        transport: MockTransport,
        outdoor: &Arc<MockDewPointSource>,
        sink: &Arc<RecordingSink>,
    ) -> Orchestrator {
        Orchestrator::new(DeviceLink::new(transport), outdoor.clone(), sink.clone())
    }

    #[test]
    fn test_light_rule() {
        assert!(light_needs_toggle(true, true));
        assert!(light_needs_toggle(false, false));
        assert!(!light_needs_toggle(true, false));
        assert!(!light_needs_toggle(false, true));
    }

    #[tokio::test]
    async fn test_cycle_builds_feed() {
        // 20 C / 60 % gives a dew point just under 12 C.
        let transport = MockTransport::new(Exhaustion::Fatal).reply("7,20.00,60.00,0");
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        let sink = Arc::new(RecordingSink::new());

        let report = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(report.feed.device_id, 7);
        assert_eq!(report.feed.indoor_dewpoint, 12.0);
        assert_eq!(report.feed.outdoor_dewpoint, 9.0);
        assert_eq!(report.feed.dewpoint_delta, 3.0);
        assert!(report.feed.open_windows);
        assert!(!report.feed.humidity_alert);
        assert!(report.is_clean());
        assert_eq!(sink.feeds(), vec![report.feed.clone()]);
    }

    #[tokio::test]
    async fn test_cycle_toggles_light_when_wrong() {
        // Light lit (1) while windows should open: send "0".
        let transport = MockTransport::new(Exhaustion::Fatal)
            .reply("7,20.00,60.00,1")
            .reply("a");
        let sent = transport.sent();
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        let sink = Arc::new(RecordingSink::new());

        let report = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap();

        assert!(report.light_toggled);
        assert_eq!(
            *sent.lock().unwrap(),
            vec![Command::ReadData, Command::light(true)]
        );
    }

    #[tokio::test]
    async fn test_cycle_leaves_correct_light() {
        let transport = MockTransport::new(Exhaustion::Fatal).reply("7,20.00,60.00,0");
        let sent = transport.sent();
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        let sink = Arc::new(RecordingSink::new());

        let report = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap();

        assert!(!report.light_toggled);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outdoor_failure_aborts_cycle() {
        let transport = MockTransport::new(Exhaustion::Fatal).reply("7,20.00,60.00,0");
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        outdoor.set_should_fail(true);
        let sink = Arc::new(RecordingSink::new());

        let err = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Weather(_)));
        assert!(sink.feeds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_silence_aborts_cycle() {
        let transport = MockTransport::new(Exhaustion::Fatal);
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        let sink = Arc::new(RecordingSink::new());

        let err = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DeviceNotResponding { .. }));
        assert!(sink.feeds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_failure_does_not_block_submit() {
        let transport = MockTransport::new(Exhaustion::Fatal).reply("7,20.00,60.00,1");
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        let sink = Arc::new(RecordingSink::new());

        let report = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap();

        assert!(report.light_error.is_some());
        assert!(report.submit_error.is_none());
        assert_eq!(sink.feeds().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_failure_is_reported() {
        let transport = MockTransport::new(Exhaustion::Fatal).reply("7,20.00,70.00,0");
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        let sink = Arc::new(RecordingSink::new());
        sink.set_should_fail(true);

        let report = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap();

        assert!(report.feed.humidity_alert);
        assert!(report.submit_error.is_some());
        assert!(!report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_run_concurrently() {
        let transport = MockTransport::new(Exhaustion::Fatal)
            .with_latency(Duration::from_millis(300))
            .reply("7,20.00,60.00,0");
        let outdoor = Arc::new(MockDewPointSource::new(9.0));
        outdoor.set_latency(Duration::from_millis(300));
        let sink = Arc::new(RecordingSink::new());

        let report = orchestrator(transport, &outdoor, &sink)
            .run_cycle()
            .await
            .unwrap();

        assert!(report.elapsed < Duration::from_millis(500));
    }
}
