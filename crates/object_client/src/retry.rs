//! Exponential backoff for object store operations.
//!
//! [`retry_notify`] keeps re-running an operation while its errors classify
//! as retryable, sleeping a randomized, exponentially growing interval
//! between attempts, until an elapsed-time budget runs out. Non-retryable
//! errors bubble out immediately.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Backoff parameters. All object store retries in the tier use the single
/// [`RetryConfig::exponential`] factory.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Each sleep is drawn uniformly from
    /// `interval * [1 - randomization_factor, 1 + randomization_factor]`.
    pub randomization_factor: f64,
    pub max_interval: Duration,
    /// Total budget; once an attempt's sleep would cross it, the last error
    /// is returned instead.
    pub max_elapsed: Duration,
}

impl RetryConfig {
    pub fn exponential() -> Self {
        RetryConfig {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(300),
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        std::cmp::min(current.mul_f64(self.multiplier), self.max_interval)
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }
        let factor = rand::thread_rng()
            .gen_range(1.0 - self.randomization_factor..=1.0 + self.randomization_factor);
        interval.mul_f64(factor)
    }
}

/// Retry `op` until it succeeds, returns a non-retryable error, or the
/// elapsed budget is exhausted.
///
/// `notify` is invoked before each sleep with the current error and the
/// time until the next attempt; callers log it as a structured
/// `{error, time_till_next_retry}` record.
pub async fn retry_notify<T, E, F, Fut, R, N>(
    config: &RetryConfig,
    mut op: F,
    mut is_retryable: R,
    mut notify: N,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    N: FnMut(&E, Duration),
{
    let started = Instant::now();
    let mut interval = config.initial_interval;

    loop {
        match op().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                let delay = config.randomize(interval);
                if started.elapsed() + delay > config.max_elapsed {
                    return Err(err);
                }
                notify(&err, delay);
                tokio::time::sleep(delay).await;
                interval = config.next_interval(interval);
            }
        }
    }
}
