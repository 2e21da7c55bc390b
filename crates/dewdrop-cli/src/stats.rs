//! Running cycle timing statistics.

use std::fmt;
use std::time::Duration;

/// Count, last, min, max and mean of cycle durations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    count: u32,
    last: Option<Duration>,
    min: Option<Duration>,
    max: Option<Duration>,
    total: Duration,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished cycle, successful or not.
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.last = Some(elapsed);
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
        self.total += elapsed;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last(&self) -> Option<Duration> {
        self.last
    }

    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    pub fn mean(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.total / self.count)
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.last(), self.mean(), self.min(), self.max()) {
            (Some(last), Some(mean), Some(min), Some(max)) => write!(
                f,
                "{} Execution time: {:.2?} Average: {:.2?} Min: {:.2?} Max: {:.2?}",
                self.count, last, mean, min, max
            ),
            _ => write!(f, "no cycles yet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let stats = CycleStats::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.to_string(), "no cycles yet");
    }

    #[test]
    fn test_record() {
        let mut stats = CycleStats::new();
        stats.record(Duration::from_millis(300));
        stats.record(Duration::from_millis(100));
        stats.record(Duration::from_millis(200));

        assert_eq!(stats.count(), 3);
        assert_eq!(stats.last(), Some(Duration::from_millis(200)));
        assert_eq!(stats.min(), Some(Duration::from_millis(100)));
        assert_eq!(stats.max(), Some(Duration::from_millis(300)));
        assert_eq!(stats.mean(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_display() {
        let mut stats = CycleStats::new();
        stats.record(Duration::from_millis(250));
        let line = stats.to_string();
        assert!(line.starts_with("1 Execution time: 250.00ms"));
        assert!(line.contains("Max: 250.00ms"));
    }
}
