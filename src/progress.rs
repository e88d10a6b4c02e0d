//! Rate-limited progress reporting.
//!
//! A [`ProgressReporter`] is owned by the caller and lent to an engine call. The engine
//! only offers reports on the designated reporting process (rank 0) when verbose; the
//! reporter decides whether enough time has passed since its last line to emit another one.

use std::time::{Duration, Instant};

/// Default minimum time between two progress lines.
pub const DEFAULT_PRINT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ProgressReporter {
    interval: Duration,
    last_report: Option<Instant>,
    emitted: usize,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PRINT_INTERVAL)
    }
}

impl ProgressReporter {
    /// Creates a reporter that emits at most one line per `interval`.
    /// The first report is always emitted.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: None,
            emitted: 0,
        }
    }

    /// Logs `percent` complete together with `detail`, if the interval has elapsed.
    ///
    /// Returns `true` if a line was emitted.
    pub fn report(&mut self, percent: f64, detail: &str) -> bool {
        let now = Instant::now();
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if !due {
            return false;
        }
        log::info!("Completed {percent:.1}% of {detail}");
        self.last_report = Some(now);
        self.emitted += 1;
        true
    }

    /// Number of lines emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_report_is_always_emitted_then_throttled() {
        let mut reporter = ProgressReporter::new(Duration::from_secs(3600));
        assert!(reporter.report(10.0, "inner products"));
        assert!(!reporter.report(20.0, "inner products"));
        assert_eq!(reporter.emitted(), 1);
    }

    #[test]
    fn test_zero_interval_reports_every_time() {
        let mut reporter = ProgressReporter::new(Duration::ZERO);
        for step in 0..4 {
            assert!(reporter.report(step as f64 * 25.0, "sum vecs"));
        }
        assert_eq!(reporter.emitted(), 4);
    }
}
