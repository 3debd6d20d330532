//! Retry scheduling
//!
//! Exponential backoff with a ceiling, evaluated against classified
//! [`ErrorRecord`]s. The same [`RetryProfile`] type drives transport-level
//! retries in the gateway, query-level retries in the cache and mutation
//! retries in the catalog facade.

use crate::error_code::{ApiResult, ErrorKind, ErrorRecord};
use std::future::Future;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Retry and backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryProfile {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Number of retries after the first failure.
    pub max_retries: u32,
    /// Kinds that are never retried at this layer, whatever their retryability.
    pub never_retry: Vec<ErrorKind>,
}

impl RetryProfile {
    /// Gateway profile: 1s base, 8s ceiling, 3 retries.
    pub fn transport() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(8_000),
            max_retries: 3,
            never_retry: Vec::new(),
        }
    }

    /// Cache read profile: 1s base, 30s ceiling, 3 retries, never on 404.
    pub fn query() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_retries: 3,
            never_retry: vec![ErrorKind::NotFound],
        }
    }

    /// Mutation profile: like [`RetryProfile::query`] with 2 retries.
    pub fn mutation() -> Self {
        Self {
            max_retries: 2,
            ..Self::query()
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::transport()
        }
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// `attempt` is 0-based: the first failure is judged with `attempt == 0`.
    pub fn should_retry(&self, record: &ErrorRecord, attempt: u32) -> bool {
        record.retryable && attempt < self.max_retries && !self.never_retry.contains(&record.kind)
    }

    /// `min(base * 2^attempt, max_delay)`, saturating.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let cap = self.max_delay.as_millis().min(u64::MAX as u128) as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(cap))
    }

    pub fn decide(&self, record: &ErrorRecord, attempt: u32) -> Decision {
        if self.should_retry(record, attempt) {
            Decision::Retry {
                delay: self.next_delay(attempt),
            }
        } else {
            Decision::Fail
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when cancelled.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = token.cancelled() => false,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

/// Run `op` until it succeeds or `profile` says stop.
///
/// `op` receives the 0-based attempt index. `on_retry(attempt, error, delay)` is
/// called before each backoff sleep. If `cancel` fires during a sleep the loop
/// ends with a cancellation record.
pub async fn retry_with<T, F, Fut, R>(
    profile: &RetryProfile,
    cancel: Option<&CancellationToken>,
    mut on_retry: R,
    mut op: F,
) -> ApiResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ApiResult<T>>,
    R: FnMut(u32, &ErrorRecord, Duration),
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        match profile.decide(&err, attempt) {
            Decision::Fail => return Err(err),
            Decision::Retry { delay } => {
                on_retry(attempt, &err, delay);
                debug!(
                    attempt,
                    kind = err.code(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling retry"
                );
                if !sleep_or_cancel(delay, cancel).await {
                    return Err(ErrorRecord::cancelled());
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// User-triggered retry with backoff, for "try again" actions.
///
/// Each call waits `next_delay(retry_count)` before running the action. A
/// success resets the counter; a failure increments it until the profile's
/// retry budget is spent.
pub struct ManualRetry {
    profile: RetryProfile,
    retry_count: u32,
    next_retry_in: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for ManualRetry {
    fn default() -> Self {
        Self::new(RetryProfile::query())
    }
}

impl ManualRetry {
    pub fn new(profile: RetryProfile) -> Self {
        Self {
            profile,
            retry_count: 0,
            next_retry_in: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.profile.max_retries
    }

    pub fn retries_remaining(&self) -> u32 {
        self.profile.max_retries.saturating_sub(self.retry_count)
    }

    /// Delay of the wait currently in progress, if any.
    pub fn next_retry_in(&self) -> Option<Duration> {
        self.next_retry_in
    }

    pub fn is_retrying(&self) -> bool {
        self.next_retry_in.is_some()
    }

    /// Manual retry is only offered for retryable errors.
    pub fn allowed_for(&self, record: &ErrorRecord) -> bool {
        record.retryable && self.can_retry()
    }

    /// Token that aborts the pending wait when cancelled from elsewhere.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.retry_count = 0;
        self.next_retry_in = None;
    }

    /// Wait out the backoff and run `action` once. Returns `None` when the budget
    /// is spent, the wait was cancelled, or the action failed.
    pub async fn retry<T, F, Fut>(&mut self, action: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        if !self.can_retry() {
            return None;
        }
        let delay = self.profile.next_delay(self.retry_count);
        self.next_retry_in = Some(delay);
        let token = self.cancel.clone();
        let waited = sleep_or_cancel(delay, Some(&token)).await;
        self.next_retry_in = None;
        if !waited {
            return None;
        }
        match action().await {
            Ok(v) => {
                self.retry_count = 0;
                Some(v)
            }
            Err(e) => {
                debug!(kind = e.code(), retry_count = self.retry_count + 1, "manual retry failed");
                self.retry_count += 1;
                None
            }
        }
    }
}
