//! Retry bookkeeping and backoff delays.

use std::time::Duration;

use serde::Deserialize;

/// Delay applied between a retryable failure and the next attempt.
///
/// The default is no delay: retries fire back to back unless a caller or the
/// pipeline config asks for something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    #[default]
    None,
    Fixed {
        #[serde(rename = "delay_ms", with = "millis")]
        delay: Duration,
    },
    /// `base * 2^retry`, capped at `max`.
    Exponential {
        #[serde(rename = "base_ms", with = "millis")]
        base: Duration,
        #[serde(rename = "max_ms", with = "millis")]
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { base, max } => {
                let multiplier = 2_u32.saturating_pow(retry);
                base.saturating_mul(multiplier).min(max)
            }
        }
    }
}

/// Attempt counter for one `fetch_with_retry` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Zero-based index of the attempt in progress.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryState {
    /// `retries` extra attempts on top of the first one.
    pub fn new(retries: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: retries.saturating_add(1),
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }

    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_is_zero() {
        assert_eq!(Backoff::default().delay(0), Duration::ZERO);
        assert_eq!(Backoff::default().delay(7), Duration::ZERO);
    }

    #[test]
    fn fixed_backoff_ignores_retry_number() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(250),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(250));
        assert_eq!(backoff.delay(3), Duration::from_millis(250));
    }

    #[test]
    fn exponential_backoff_doubles_then_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn retry_state_allows_retries_plus_one_attempts() {
        let mut state = RetryState::new(2);
        let mut attempts = 1;
        while state.has_remaining() {
            state.advance();
            attempts += 1;
        }
        assert_eq!(attempts, 3);
        assert_eq!(state.attempt, 2);
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let state = RetryState::new(0);
        assert_eq!(state.max_attempts, 1);
        assert!(!state.has_remaining());
    }

    #[test]
    fn backoff_deserializes_from_millis() {
        let backoff: Backoff =
            serde_json::from_str(r#"{"kind":"exponential","base_ms":50,"max_ms":1000}"#).unwrap();
        assert_eq!(
            backoff,
            Backoff::Exponential {
                base: Duration::from_millis(50),
                max: Duration::from_millis(1000),
            }
        );
        let none: Backoff = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(none, Backoff::None);
    }
}
