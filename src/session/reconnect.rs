//! Bounded exponential backoff for reconnecting a degraded session.

use std::time::Duration;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Attempts before giving up. Always at least one.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Attempt counter producing the delay before each reconnect attempt.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_attempt: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.config.max_attempts {
            return None;
        }

        let base_ms = self.config.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(self.current_attempt).unwrap_or(i32::MAX);
        let grown = base_ms * self.config.multiplier.powi(exponent);
        let capped = grown.min(self.config.max_delay.as_millis() as f64);

        self.current_attempt += 1;
        Some(Duration::from_millis(capped as u64))
    }

    /// Attempts handed out so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_attempts,
        })
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut policy = policy(6);
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_backoff())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500, 500]);
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let mut policy = policy(2);
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
        assert_eq!(policy.current_attempt(), 2);

        policy.reset();
        assert_eq!(policy.current_attempt(), 0);
        assert!(policy.next_backoff().is_some());
    }

    #[test]
    fn test_multiplier_of_one_is_constant() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 1.0,
            max_attempts: 3,
        });
        for _ in 0..3 {
            assert_eq!(policy.next_backoff(), Some(Duration::from_millis(250)));
        }
    }
}
