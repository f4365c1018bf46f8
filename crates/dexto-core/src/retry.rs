//! Exponential backoff schedules for connection retries.

use rand::Rng;
use std::time::Duration;

/// Configuration for an exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Jitter applied to each delay as a fraction of the delay (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Deterministic delay for the given attempt (0-based), before jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let factor = 2u64.saturating_pow(exp);
        let millis = u64::try_from(self.base.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(factor);
        Duration::from_millis(millis).min(self.cap)
    }

    /// Delay for the given attempt with jitter applied.
    #[must_use]
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }

    /// Iterator over jittered delays, one per attempt.
    #[must_use]
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            config: *self,
            attempt: 0,
        }
    }
}

/// Infinite iterator of jittered backoff delays.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    config: RetryConfig,
    attempt: u32,
}

impl BackoffSchedule {
    /// The number of delays already produced.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Reset the schedule to attempt zero (after a successful reconnect).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.config.jittered_delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_cap() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(500));
        assert_eq!(config.delay_for(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for(10), Duration::from_secs(30));
        assert_eq!(config.delay_for(31), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig::default();
        for attempt in 0..8 {
            let raw = config.delay_for(attempt).as_secs_f64();
            for _ in 0..100 {
                let jittered = config.jittered_delay_for(attempt).as_secs_f64();
                assert!(jittered >= raw * 0.8 - f64::EPSILON);
                assert!(jittered <= raw * 1.2 + f64::EPSILON);
            }
        }
    }

    #[test]
    fn test_schedule_reset() {
        let config = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        };
        let mut schedule = config.schedule();
        let _ = schedule.next();
        let _ = schedule.next();
        assert_eq!(schedule.attempts(), 2);
        schedule.reset();
        assert_eq!(schedule.next(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_no_overflow_at_large_attempts() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(30));
    }
}
