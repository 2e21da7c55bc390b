//! Fixed-interval cycle loop.
//!
//! A failed cycle is logged and the loop waits for the next tick. The first
//! cycle runs immediately; a cycle that overruns the interval delays the next
//! tick instead of bunching ticks up.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dewdrop_core::{CycleReport, Orchestrator, Result};

use crate::stats::CycleStats;

pub struct Poller {
    orchestrator: Orchestrator,
    interval: Duration,
    stats: CycleStats,
}

impl Poller {
    pub fn new(orchestrator: Orchestrator, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            stats: CycleStats::new(),
        }
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run one cycle and record its duration.
    pub async fn cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let result = self.orchestrator.run_cycle().await;
        self.stats.record(started.elapsed());

        match &result {
            Ok(report) => {
                if let Some(e) = &report.light_error {
                    warn!("Warning light not updated: {}", e);
                }
                if let Some(e) = &report.submit_error {
                    warn!("Sensor feed not submitted: {}", e);
                }
            }
            Err(e) if e.is_transport_error() => error!("Cycle failed, link down: {}", e),
            Err(e) => error!("Cycle failed: {}", e),
        }
        info!("{}", self.stats);
        result
    }

    /// Cycle every interval until `cancel` fires.
    ///
    /// Cancellation interrupts a cycle in progress; the interrupted cycle is
    /// not recorded.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        info!("Polling every {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.cycle() => {}
            }
        }
        info!("Poller stopped after {} cycles", self.stats.count());
    }
}
