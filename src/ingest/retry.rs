// src/ingest/retry.rs
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::ConfigLookup;
use crate::error::IngestionError;

/// Bounded exponential backoff without jitter.
///
/// The wait before retry `k` (0-based) is `base_delay * multiplier^k`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    pub fn from_config(config: &dyn ConfigLookup) -> Result<Self, IngestionError> {
        const DELAY: &str = "ingestion.sources.api.retry_delay_seconds";
        let max_attempts = config.get_i64("ingestion.sources.api.max_retries", 3).max(1);
        let delay = config
            .get_seconds(DELAY, 5.0)
            .ok_or_else(|| IngestionError::InvalidConfig(format!("{DELAY} is out of range")))?;
        Ok(Self::new(
            u32::try_from(max_attempts).unwrap_or(u32::MAX),
            delay,
        ))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base_delay.mul_f64(self.multiplier.powi(exp))
    }

    /// Attempts the call; `0` and `1` both mean a single attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Runs `op(attempt)` until it succeeds or the attempts are spent.
    pub async fn run<T, E, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T, IngestionError>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts();
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt + 1 < attempts => {
                    let wait = self.delay_for(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt = attempt + 1,
                        of = attempts,
                        wait_s = wait.as_secs_f64(),
                        error = %e,
                        "request failed; retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(IngestionError::RetriesExhausted {
                        endpoint: endpoint.to_string(),
                        attempts,
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[test]
    fn delays_double_from_base() {
        let p = RetryPolicy::new(4, Duration::from_secs(5));
        assert_eq!(p.delay_for(0), Duration::from_secs(5));
        assert_eq!(p.delay_for(1), Duration::from_secs(10));
        assert_eq!(p.delay_for(2), Duration::from_secs(20));
    }

    #[test]
    fn config_values_and_floor() {
        let p = RetryPolicy::from_config(&json!({
            "ingestion": {"sources": {"api": {"max_retries": 0, "retry_delay_seconds": 0.5}}}
        }))
        .unwrap();
        assert_eq!(p.attempts(), 1);
        assert_eq!(p.base_delay, Duration::from_millis(500));
        assert_eq!(RetryPolicy::from_config(&json!({})).unwrap(), RetryPolicy::default());
    }

    #[test]
    fn negative_retries_mean_one_attempt() {
        let p = RetryPolicy::from_config(&json!({
            "ingestion": {"sources": {"api": {"max_retries": -1}}}
        }))
        .unwrap();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.attempts(), 1);
    }

    #[test]
    fn oversized_delay_is_a_config_error() {
        let err = RetryPolicy::from_config(&json!({
            "ingestion": {"sources": {"api": {"retry_delay_seconds": 1e300}}}
        }))
        .unwrap_err();
        assert!(matches!(err, IngestionError::InvalidConfig(ref m) if m.contains("retry_delay_seconds")));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let p = RetryPolicy::new(3, Duration::from_secs(5));
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let out = p
            .run("https://example.test", |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 2 {
                        Err("503")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.get(), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(15), "waited {waited:?}");
        assert!(waited < Duration::from_secs(16), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_names_endpoint_and_attempts() {
        let p = RetryPolicy::new(2, Duration::from_secs(1));
        let calls = Cell::new(0u32);
        let err = p
            .run("https://example.test/items", |_| {
                calls.set(calls.get() + 1);
                async { Err::<(), _>("connection reset") }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 2);
        match err {
            IngestionError::RetriesExhausted {
                endpoint, attempts, ..
            } => {
                assert_eq!(endpoint, "https://example.test/items");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
