//!
//! src/retry.rs  
//!
//! Backoff and pacing primitives wrapped around every provider request 
//!

use std::time::Duration;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::config::RetryConfig;
use crate::errors::ResolverError;

/// Enforces a minimum interval between consecutive calls (MusicBrainz allows 
/// one request per second per client) 
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration, 
    state: tokio::sync::Mutex<Option<Instant>> 
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { 
            min_interval, 
            state: tokio::sync::Mutex::new(None)
        }
    }

    pub async fn wait(&self) {
        let mut last = self.state.lock().await; 
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval { 
                sleep(self.min_interval - elapsed).await; 
            }
        }
        *last = Some(Instant::now());
    }
}

/// Exponential wait with optional jitter for execute_with_retry
fn generate_backoff(base: Duration, attempt: u32, jitter: bool, rng: &mut SmallRng) -> Duration {
    let exp = base.saturating_mul(1_u32 << attempt.min(6));
    if jitter {
        exp + Duration::from_millis(rng.gen_range(50..=200))
    } else {
        exp 
    }
}

/// Sends `request`, retrying retryable statuses and transport errors. 
/// Failures surface as errors, never as sentinel values. 
pub async fn execute_with_retry(
    request: reqwest::RequestBuilder, 
    retry: &RetryConfig, 
    operation_id: &str
) -> Result<serde_json::Value, ResolverError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_u32; 
    let max_retries = u32::from(retry.max_attempts);
    loop {
        let response = request.try_clone()
            .ok_or_else(|| ResolverError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                let status = resp.status(); 
                if status.is_success() {
                    let v = resp.json::<serde_json::Value>().await
                        .map_err(|e| ResolverError::Parse(format!("{operation_id}: {e}")))?; 
                    return Ok(v);
                }
                let retryable = retry.retryable_statuses.contains(&status.as_u16()); 
                if !retryable || attempt >= max_retries {
                    return Err(match status.as_u16() {
                        404 => ResolverError::NotFound(operation_id.to_string()),
                        429 => ResolverError::RateLimited(operation_id.to_string()),
                        _ => ResolverError::Http(
                            format!("{operation_id}: status {status} after {attempt} retries")
                        )
                    });
                }
                let backoff = generate_backoff(retry.base_backoff, attempt, retry.jitter, &mut rng);
                warn!(op = operation_id, status = %status, backoff = ?backoff.as_millis(), 
                    "http.retry");
                sleep(backoff).await; 
                attempt += 1;
            },
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e.into());
                }
                let backoff = generate_backoff(retry.base_backoff, attempt, retry.jitter, &mut rng);
                warn!(op = operation_id, error = %e, backoff = ?backoff.as_millis(), 
                    "http.retry.error");
                sleep(backoff).await; 
                attempt += 1; 
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let mut rng = SmallRng::seed_from_u64(7);
        let base = Duration::from_millis(100);
        assert_eq!(generate_backoff(base, 0, false, &mut rng), Duration::from_millis(100));
        assert_eq!(generate_backoff(base, 3, false, &mut rng), Duration::from_millis(800));
        assert_eq!(generate_backoff(base, 20, false, &mut rng), Duration::from_millis(6400));

        let jittered = generate_backoff(base, 1, true, &mut rng);
        assert!(jittered >= Duration::from_millis(250) && jittered <= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_gate_spaces_calls() {
        let gate = RateGate::new(Duration::from_millis(1100));
        let start = tokio::time::Instant::now();
        gate.wait().await; 
        gate.wait().await; 
        gate.wait().await; 
        assert!(start.elapsed() >= Duration::from_millis(2200));
    }
}
