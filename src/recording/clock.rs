use std::time::Duration;
use tokio::time::Instant;

/// Recorded duration as a sum of closed capture spans.
///
/// Never a wall-clock difference across a pause: time between `close` and
/// the next `open` is not counted.
#[derive(Debug, Clone, Default)]
pub struct DurationClock {
    closed: Duration,
    open_since: Option<Instant>,
}

impl DurationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously persisted total, with no open span
    pub fn restored(seconds: f64) -> Self {
        Self {
            closed: Duration::from_secs_f64(seconds.max(0.0)),
            open_since: None,
        }
    }

    pub fn open(&mut self, now: Instant) {
        if self.open_since.is_none() {
            self.open_since = Some(now);
        }
    }

    pub fn close(&mut self, now: Instant) {
        if let Some(since) = self.open_since.take() {
            self.closed += now.saturating_duration_since(since);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open_since.is_some()
    }

    pub fn total(&self, now: Instant) -> Duration {
        self.closed
            + self
                .open_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paused_interval_not_counted() {
        let t0 = Instant::now();
        let mut clock = DurationClock::new();

        clock.open(t0);
        clock.close(t0 + Duration::from_secs(5));
        // 60s paused
        clock.open(t0 + Duration::from_secs(65));
        clock.close(t0 + Duration::from_secs(68));

        assert_eq!(clock.total(t0 + Duration::from_secs(500)), Duration::from_secs(8));
    }

    #[test]
    fn test_open_span_counts_until_now() {
        let t0 = Instant::now();
        let mut clock = DurationClock::restored(10.0);
        clock.open(t0);
        assert_eq!(clock.total(t0 + Duration::from_secs(2)), Duration::from_secs(12));
    }

    #[test]
    fn test_double_open_keeps_first_start() {
        let t0 = Instant::now();
        let mut clock = DurationClock::new();
        clock.open(t0);
        clock.open(t0 + Duration::from_secs(3));
        clock.close(t0 + Duration::from_secs(4));
        assert_eq!(clock.total(t0 + Duration::from_secs(4)), Duration::from_secs(4));
    }
}
