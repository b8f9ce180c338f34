//! Adaptive polling interval for the supervisor loop.

use std::time::Duration;

/// Bounds and backoff for the loop's sleep interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub min: Duration,
    pub max: Duration,
    /// Multiplier applied after `idle_passes` consecutive unchanged passes
    pub backoff_factor: f64,
    pub idle_passes: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(2),
            max: Duration::from_secs(60),
            backoff_factor: 2.0,
            idle_passes: 3,
        }
    }
}

/// Current sleep interval, always within `[min, max]`.
#[derive(Debug, Clone)]
pub struct PollInterval {
    config: PollConfig,
    current: Duration,
    idle: u32,
}

impl PollInterval {
    pub fn new(config: PollConfig) -> Self {
        Self {
            current: config.min,
            config,
            idle: 0,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Something changed: poll at the fastest rate again.
    pub fn reset(&mut self) {
        self.current = self.config.min;
        self.idle = 0;
    }

    /// Nothing changed this pass. Backs off once enough idle passes pile up.
    pub fn record_idle(&mut self) {
        self.idle += 1;
        if self.idle >= self.config.idle_passes.max(1) {
            self.idle = 0;
            self.current = self
                .current
                .mul_f64(self.config.backoff_factor)
                .clamp(self.config.min, self.config.max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PollConfig {
        PollConfig {
            min: Duration::from_secs(2),
            max: Duration::from_secs(10),
            backoff_factor: 2.0,
            idle_passes: 3,
        }
    }

    #[test]
    fn test_starts_at_min() {
        assert_eq!(PollInterval::new(config()).current(), Duration::from_secs(2));
    }

    #[test]
    fn test_backs_off_after_idle_passes() {
        let mut poll = PollInterval::new(config());

        poll.record_idle();
        poll.record_idle();
        assert_eq!(poll.current(), Duration::from_secs(2));

        poll.record_idle();
        assert_eq!(poll.current(), Duration::from_secs(4));

        for _ in 0..3 {
            poll.record_idle();
        }
        assert_eq!(poll.current(), Duration::from_secs(8));
    }

    #[test]
    fn test_capped_at_max() {
        let mut poll = PollInterval::new(config());
        for _ in 0..30 {
            poll.record_idle();
        }
        assert_eq!(poll.current(), Duration::from_secs(10));
    }

    #[test]
    fn test_reset_returns_to_min_and_clears_idle_count() {
        let mut poll = PollInterval::new(config());
        for _ in 0..5 {
            poll.record_idle();
        }
        assert_eq!(poll.current(), Duration::from_secs(4));

        poll.reset();
        assert_eq!(poll.current(), Duration::from_secs(2));

        // Two idle passes after the reset are not enough to back off
        poll.record_idle();
        poll.record_idle();
        assert_eq!(poll.current(), Duration::from_secs(2));
    }

    #[test]
    fn test_factor_of_one_never_backs_off() {
        let mut poll = PollInterval::new(PollConfig {
            backoff_factor: 1.0,
            ..config()
        });
        for _ in 0..10 {
            poll.record_idle();
        }
        assert_eq!(poll.current(), Duration::from_secs(2));
    }
}
