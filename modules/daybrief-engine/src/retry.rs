//! Retry and timeout policy for provider and store calls.
//!
//! Every external call runs under a per-call timeout; a timeout counts as
//! a transient failure. Transient failures back off exponentially with
//! ±25% jitter, up to the configured retry budget. Fatal errors return
//! immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use daybrief_common::error::{DaybriefError, Result};
use daybrief_common::Config;

const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// What kind of call the policy guards. Decides which transient error a
/// timeout maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Provider,
    Store,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub kind: CallKind,
    pub max_retries: u32,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn provider(config: &Config) -> Self {
        Self {
            kind: CallKind::Provider,
            max_retries: config.max_retries,
            call_timeout: Duration::from_secs(config.provider_call_timeout_seconds),
        }
    }

    pub fn store(config: &Config) -> Self {
        Self {
            kind: CallKind::Store,
            max_retries: config.max_retries,
            call_timeout: Duration::from_secs(config.store_operation_timeout_seconds),
        }
    }

    fn timeout_error(&self, label: &str) -> DaybriefError {
        let message = format!("{label}: call timed out after {:?}", self.call_timeout);
        match self.kind {
            CallKind::Provider => DaybriefError::ProviderTransient(message),
            CallKind::Store => DaybriefError::StoreTransient(message),
        }
    }
}

/// Run `op` under the policy: per-call timeout, exponential backoff with
/// jitter on transient failures, immediate return on fatal ones.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(policy.timeout_error(label)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = backoff_delay(attempt);
                warn!(label, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Transient failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Base 1 s, factor 2, jitter ±25%.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE.as_millis() as f64 * 2f64.powi(attempt as i32);
    let jitter = rand::rng().random_range(0.75..=1.25);
    Duration::from_millis((base * jitter) as u64)
}
