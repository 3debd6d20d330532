//! Cache entry state.

use crate::error_code::{ApiResult, ErrorKind, ErrorRecord};
use crate::resilience::RetryProfile;
use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Never fetched, or disabled.
    Idle,
    /// A fetch is running. Earlier data, if any, is still served.
    Pending,
    Success,
    /// Retries exhausted. Earlier data, if any, is kept.
    Error,
}

/// Snapshot of one query as seen by readers and observers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<ErrorRecord>,
    /// Failures recorded during the current or last fetch.
    pub failure_count: u32,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

impl<T> QueryState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            failure_count: 0,
            is_fetching: false,
            is_stale: true,
            updated_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_idle(&self) -> bool {
        self.status == QueryStatus::Idle
    }

    /// Error state that still carries earlier data: show the data with a warning.
    pub fn has_stale_data_with_error(&self) -> bool {
        self.is_error() && self.data.is_some()
    }

    /// Error state with nothing to show: render the full error view.
    pub fn is_error_without_data(&self) -> bool {
        self.is_error() && self.data.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        QueryState {
            data: self.data.map(f),
            status: self.status,
            error: self.error,
            failure_count: self.failure_count,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
            updated_at: self.updated_at,
        }
    }
}

impl QueryState<Value> {
    /// Decode the JSON payload. A payload that no longer matches `T` reads as
    /// an invalid-response error without data.
    pub fn decode<T: DeserializeOwned>(self) -> QueryState<T> {
        let QueryState {
            data,
            status,
            error,
            failure_count,
            is_fetching,
            is_stale,
            updated_at,
        } = self;
        let (data, status, error) = match data.map(serde_json::from_value::<T>) {
            None => (None, status, error),
            Some(Ok(v)) => (Some(v), status, error),
            Some(Err(e)) => (
                None,
                QueryStatus::Error,
                Some(
                    ErrorRecord::new(ErrorKind::InvalidResponse)
                        .with_message(format!("cached data has an unexpected shape: {}", e)),
                ),
            ),
        };
        QueryState {
            data,
            status,
            error,
            failure_count,
            is_fetching,
            is_stale,
            updated_at,
        }
    }
}

pub(crate) type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<Value>> + Send + Sync>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, ApiResult<Value>>>;

pub(crate) struct InFlight {
    pub seq: u64,
    pub fut: SharedFetch,
    pub abort: AbortHandle,
    /// At least one attempt failed; the task is in a backoff sleep or a retry.
    pub retrying: bool,
}

pub(crate) struct Entry {
    pub data: Option<Value>,
    pub status: QueryStatus,
    pub error: Option<ErrorRecord>,
    pub failure_count: u32,
    pub updated_at: Option<Instant>,
    pub stale_time: Duration,
    pub invalidated: bool,
    pub observers: usize,
    pub evict_at: Option<Instant>,
    /// The one eviction timer armed for this entry.
    pub gc_timer: Option<AbortHandle>,
    /// Bumped whenever a fetch starts or is cancelled; results carrying an
    /// older sequence are discarded.
    pub seq: u64,
    pub in_flight: Option<InFlight>,
    pub fetcher: Option<Fetcher>,
    pub retry: RetryProfile,
    pub watch: watch::Sender<QueryState<Value>>,
}

impl Entry {
    pub fn new(stale_time: Duration, retry: RetryProfile) -> Self {
        let (watch, _) = watch::channel(QueryState::idle());
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            failure_count: 0,
            updated_at: None,
            stale_time,
            invalidated: false,
            observers: 0,
            evict_at: None,
            gc_timer: None,
            seq: 0,
            in_flight: None,
            fetcher: None,
            retry,
            watch,
        }
    }

    /// Fresh data is served without a fetch.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.data.is_some()
            && self.status == QueryStatus::Success
            && !self.invalidated
            && self
                .updated_at
                .map(|at| now < at + self.stale_time)
                .unwrap_or(false)
    }

    pub fn state(&self, now: Instant) -> QueryState<Value> {
        QueryState {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            failure_count: self.failure_count,
            is_fetching: self.in_flight.is_some(),
            is_stale: !self.is_fresh(now),
            updated_at: self.updated_at,
        }
    }

    pub fn publish(&self) {
        self.watch.send_replace(self.state(Instant::now()));
    }

    /// Store data written locally (optimistic updates, seeding).
    pub fn write(&mut self, data: Value, now: Instant) {
        self.data = Some(data);
        self.status = if self.in_flight.is_some() {
            QueryStatus::Pending
        } else {
            QueryStatus::Success
        };
        self.error = None;
        self.updated_at = Some(now);
    }

    /// Status to fall back to once no fetch is running.
    pub fn settled_status(&self) -> QueryStatus {
        if self.error.is_some() {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Idle
        }
    }

    /// Abort the running fetch, if any. Its result will be discarded.
    pub fn abort_fetch(&mut self) -> bool {
        match self.in_flight.take() {
            Some(f) => {
                f.abort.abort();
                self.seq += 1;
                self.status = self.settled_status();
                true
            }
            None => false,
        }
    }

    /// Disarm the eviction timer, if any.
    pub fn cancel_gc(&mut self) {
        self.evict_at = None;
        if let Some(timer) = self.gc_timer.take() {
            timer.abort();
        }
    }

    pub fn is_evictable(&self, now: Instant) -> bool {
        self.observers == 0
            && self.in_flight.is_none()
            && self.evict_at.map(|at| at <= now).unwrap_or(false)
    }
}
