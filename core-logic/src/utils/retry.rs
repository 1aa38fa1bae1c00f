#![allow(dead_code)]

use anyhow::{Context, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: base_delay_ms * 30,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let delay_ms = if self.jitter {
            let rng_factor = rand::thread_rng().gen_range(0.5..=1.5);
            delay_ms * rng_factor
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt == config.max_retries {
                    debug!(
                        "{} failed after {} retries",
                        operation_name, config.max_retries
                    );
                    let error_msg = format!("{}", e);
                    return Err(e).context(format!(
                        "{} failed after {} attempts. Last error: {}",
                        operation_name, config.max_retries, error_msg
                    ));
                }

                let delay = config.calculate_delay(attempt);
                debug!(
                    "{} failed (attempt {}/{}). Retrying in {:?}: {}",
                    operation_name,
                    attempt + 1,
                    config.max_retries,
                    delay,
                    e
                );

                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!()
}

/// Legacy text-pattern check for transient node errors.
///
/// Structured classification happens at the gateway boundary; this helper
/// backs the compatibility shim for nodes that only return free-form text.
pub fn is_transient_error(error: &anyhow::Error) -> bool {
    let error_msg = format!("{:?}", error).to_lowercase();

    let transient_patterns = [
        "timeout",
        "connection refused",
        "connection reset",
        "network error",
        "temporary failure",
        "service unavailable",
        "rate limited",
        "too many requests",
        "busy",
    ];

    transient_patterns
        .iter()
        .any(|pattern| error_msg.contains(pattern))
}
