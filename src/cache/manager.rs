//! Query cache manager.

use super::entry::{Entry, Fetcher, InFlight, QueryState, QueryStatus, SharedFetch};
use super::key::{Fingerprint, QueryFilter};
use crate::error_code::{ApiResult, ErrorKind, ErrorRecord};
use crate::resilience::retry::{retry_with, RetryProfile};
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long fetched data is served without refetching.
    pub stale_time: Duration,
    /// How long an unobserved entry survives before eviction.
    pub gc_time: Duration,
    pub retry: RetryProfile,
    pub refetch_on_window_focus: bool,
    pub refetch_on_reconnect: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            retry: RetryProfile::query(),
            refetch_on_window_focus: false,
            refetch_on_reconnect: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_stale_time(mut self, d: Duration) -> Self {
        self.stale_time = d;
        self
    }
    pub fn with_gc_time(mut self, d: Duration) -> Self {
        self.gc_time = d;
        self
    }
    pub fn with_retry(mut self, retry: RetryProfile) -> Self {
        self.retry = retry;
        self
    }
    pub fn with_refetch_on_window_focus(mut self, on: bool) -> Self {
        self.refetch_on_window_focus = on;
        self
    }
    pub fn with_refetch_on_reconnect(mut self, on: bool) -> Self {
        self.refetch_on_reconnect = on;
        self
    }
}

/// Per-read overrides of [`CacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub stale_time: Option<Duration>,
    pub retry: Option<RetryProfile>,
}

impl ReadOptions {
    pub fn stale_time(mut self, d: Duration) -> Self {
        self.stale_time = Some(d);
        self
    }
    pub fn retry(mut self, retry: RetryProfile) -> Self {
        self.retry = Some(retry);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Fetches started, whatever triggered them.
    pub fetches: u64,
    /// Reads that joined a fetch already in flight.
    pub deduplicated: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    deduplicated: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Entries written by an optimistic update, with their previous data.
#[derive(Debug, Clone, Default)]
#[must_use = "keep the snapshot to roll back if the mutation fails"]
pub struct OptimisticSnapshot {
    previous: Vec<(Fingerprint, Value)>,
}

impl OptimisticSnapshot {
    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Fingerprint> {
        self.previous.iter().map(|(k, _)| k)
    }
}

struct Inner {
    config: CacheConfig,
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    stats: AtomicStats,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Entry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn new_entry(&self) -> Entry {
        Entry::new(self.config.stale_time, self.config.retry.clone())
    }

    fn record_failure(&self, key: &Fingerprint, seq: u64, err: &ErrorRecord) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key).filter(|e| e.seq == seq) {
            entry.failure_count += 1;
            if let Some(f) = entry.in_flight.as_mut() {
                f.retrying = true;
            }
            debug!(key = %key, kind = err.code(), failures = entry.failure_count, "query attempt failed");
            entry.publish();
        }
    }

    fn settle(self: &Arc<Self>, key: &Fingerprint, seq: u64, result: &ApiResult<Value>) {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = match entries.get_mut(key) {
            Some(e) if e.seq == seq => e,
            Some(_) => {
                debug!(key = %key, seq, "superseded fetch result discarded");
                return;
            }
            None => {
                debug!(key = %key, "fetch result for evicted entry discarded");
                return;
            }
        };
        entry.in_flight = None;
        match result {
            Ok(v) => {
                entry.data = Some(v.clone());
                entry.status = QueryStatus::Success;
                entry.error = None;
                entry.failure_count = 0;
                entry.updated_at = Some(now);
                entry.invalidated = false;
            }
            Err(e) => {
                entry.status = QueryStatus::Error;
                entry.error = Some(e.clone());
                entry.failure_count += 1;
                info!(
                    key = %key,
                    kind = e.code(),
                    failures = entry.failure_count,
                    has_data = entry.data.is_some(),
                    "query failed"
                );
            }
        }
        if entry.observers == 0 {
            schedule_eviction(self, key, entry, now + self.config.gc_time);
        }
        entry.publish();
    }

    fn evict_if_idle(&self, key: &Fingerprint) {
        let now = Instant::now();
        let mut entries = self.lock();
        if entries.get(key).map(|e| e.is_evictable(now)).unwrap_or(false) {
            entries.remove(key);
            AtomicStats::bump(&self.stats.evictions);
            debug!(key = %key, "unobserved query evicted");
        }
    }

    fn release_observer(self: &Arc<Self>, key: &Fingerprint) {
        let now = Instant::now();
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.observers = entry.observers.saturating_sub(1);
        if entry.observers > 0 {
            return;
        }
        // a retry loop no reader is waiting on stops with its last observer
        let unawaited_retry = entry
            .in_flight
            .as_ref()
            .map(|f| f.retrying && f.fut.strong_count().map_or(true, |n| n <= 1))
            .unwrap_or(false);
        if unawaited_retry && entry.abort_fetch() {
            debug!(key = %key, "retry abandoned after last observer left");
            entry.publish();
        }
        schedule_eviction(self, key, entry, now + self.config.gc_time);
    }
}

/// Arm the entry's eviction timer for `at`, replacing any earlier one.
fn schedule_eviction(inner: &Arc<Inner>, key: &Fingerprint, entry: &mut Entry, at: Instant) {
    entry.cancel_gc();
    entry.evict_at = Some(at);
    let Ok(handle) = Handle::try_current() else {
        return;
    };
    let weak = Arc::downgrade(inner);
    let key = key.clone();
    let timer = handle.spawn(async move {
        tokio::time::sleep_until(at).await;
        if let Some(inner) = weak.upgrade() {
            inner.evict_if_idle(&key);
        }
    });
    entry.gc_timer = Some(timer.abort_handle());
}

async fn run_fetch(
    inner: Weak<Inner>,
    key: Fingerprint,
    seq: u64,
    fetcher: Fetcher,
    retry: RetryProfile,
) -> ApiResult<Value> {
    let result = retry_with(
        &retry,
        None,
        |_, err, _| {
            if let Some(inner) = inner.upgrade() {
                inner.record_failure(&key, seq, err);
            }
        },
        |_| (*fetcher)(),
    )
    .await;
    if let Some(inner) = inner.upgrade() {
        inner.settle(&key, seq, &result);
    }
    result
}

/// Start a fetch for `entry`, aborting any fetch it already runs.
///
/// Returns `None` when the entry has no fetcher or no runtime is available.
fn start_fetch(inner: &Arc<Inner>, key: &Fingerprint, entry: &mut Entry) -> Option<SharedFetch> {
    let fetcher = entry.fetcher.clone()?;
    let handle = Handle::try_current().ok()?;
    entry.abort_fetch();
    entry.seq += 1;
    let seq = entry.seq;
    let task = handle.spawn(run_fetch(
        Arc::downgrade(inner),
        key.clone(),
        seq,
        fetcher,
        entry.retry.clone(),
    ));
    let abort = task.abort_handle();
    let fut = async move {
        task.await.unwrap_or_else(|e| {
            if e.is_cancelled() {
                Err(ErrorRecord::cancelled())
            } else {
                Err(ErrorRecord::new(ErrorKind::Unknown).with_message(format!("fetch task failed: {}", e)))
            }
        })
    }
    .boxed()
    .shared();
    entry.in_flight = Some(InFlight {
        seq,
        fut: fut.clone(),
        abort,
        retrying: false,
    });
    entry.status = QueryStatus::Pending;
    entry.failure_count = 0;
    entry.cancel_gc();
    AtomicStats::bump(&inner.stats.fetches);
    entry.publish();
    debug!(key = %key, seq, "query fetch started");
    Some(fut)
}

fn into_fetcher<T, F, Fut>(fetch: F) -> Fetcher
where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
{
    Arc::new(move || {
        let fut = fetch();
        async move {
            let value = fut.await?;
            serde_json::to_value(&value).map_err(|e| {
                ErrorRecord::new(ErrorKind::InvalidResponse)
                    .with_message(format!("response could not be cached: {}", e))
            })
        }
        .boxed()
    })
}

fn outcome_state(outcome: ApiResult<Value>) -> QueryState<Value> {
    let mut state = QueryState::idle();
    match outcome {
        Ok(v) => {
            state.data = Some(v);
            state.status = QueryStatus::Success;
            state.updated_at = Some(Instant::now());
        }
        Err(e) => {
            state.status = QueryStatus::Error;
            state.error = Some(e);
            state.failure_count = 1;
        }
    }
    state
}

/// Keyed store of server state with request de-duplication, staleness,
/// retries, observers and garbage collection.
///
/// Cloning is cheap and every clone shares the same entries. Fetches run as
/// Tokio tasks, so reads and invalidations need a runtime.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(HashMap::new()),
                stats: AtomicStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub async fn read<T, F, Fut>(&self, key: &Fingerprint, fetch: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        self.read_with(key, ReadOptions::default(), fetch).await
    }

    /// Serve fresh data from the cache, or wait for a fetch.
    ///
    /// Concurrent readers of a key share a single fetch. If the key is
    /// invalidated while its fetch runs, readers wait for the newer fetch.
    pub async fn read_with<T, F, Fut>(
        &self,
        key: &Fingerprint,
        options: ReadOptions,
        fetch: F,
    ) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let fetcher = into_fetcher(fetch);
        let (seq, fut) = {
            let now = Instant::now();
            let mut entries = self.inner.lock();
            let entry = self.prepare(&mut entries, key, &options, fetcher);
            if entry.is_fresh(now) {
                AtomicStats::bump(&self.inner.stats.hits);
                debug!(key = %key, "query cache hit");
                return entry.state(now).decode();
            }
            match entry.in_flight.as_ref().map(|f| (f.seq, f.fut.clone())) {
                Some(joined) => {
                    AtomicStats::bump(&self.inner.stats.deduplicated);
                    joined
                }
                None => {
                    AtomicStats::bump(&self.inner.stats.misses);
                    match start_fetch(&self.inner, key, entry) {
                        Some(fut) => (entry.seq, fut),
                        None => return entry.state(now).decode(),
                    }
                }
            }
        };
        self.await_settled(key, seq, fut).await
    }

    /// Return the cached state now and refetch in the background when it is
    /// stale (stale-while-revalidate).
    pub fn read_cached<T, F, Fut>(&self, key: &Fingerprint, options: ReadOptions, fetch: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let fetcher = into_fetcher(fetch);
        let now = Instant::now();
        let mut entries = self.inner.lock();
        let entry = self.prepare(&mut entries, key, &options, fetcher);
        if entry.is_fresh(now) {
            AtomicStats::bump(&self.inner.stats.hits);
        } else if entry.in_flight.is_none() {
            AtomicStats::bump(&self.inner.stats.misses);
            start_fetch(&self.inner, key, entry);
        }
        entry.state(now).decode()
    }

    /// Warm the cache for `key`; a no-op when its data is fresh.
    pub async fn prefetch<T, F, Fut>(&self, key: &Fingerprint, options: ReadOptions, fetch: F)
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let _: QueryState<T> = self.read_with(key, options, fetch).await;
    }

    fn prepare<'a>(
        &self,
        entries: &'a mut HashMap<Fingerprint, Entry>,
        key: &Fingerprint,
        options: &ReadOptions,
        fetcher: Fetcher,
    ) -> &'a mut Entry {
        let config = &self.inner.config;
        let entry = entries.entry(key.clone()).or_insert_with(|| self.inner.new_entry());
        entry.stale_time = options.stale_time.unwrap_or(config.stale_time);
        entry.retry = options.retry.clone().unwrap_or_else(|| config.retry.clone());
        entry.fetcher = Some(fetcher);
        entry
    }

    async fn await_settled<T: DeserializeOwned>(
        &self,
        key: &Fingerprint,
        mut seq: u64,
        mut fut: SharedFetch,
    ) -> QueryState<T> {
        loop {
            let outcome = fut.await;
            let next = {
                let now = Instant::now();
                let mut entries = self.inner.lock();
                let Some(entry) = entries.get_mut(key) else {
                    return outcome_state(outcome).decode();
                };
                match entry.in_flight.as_ref().map(|f| (f.seq, f.fut.clone())) {
                    Some((s, f)) if s != seq => (s, f),
                    Some(_) => {
                        // the task died before it could settle
                        entry.in_flight = None;
                        entry.error = outcome.err();
                        entry.status = entry.settled_status();
                        entry.publish();
                        return entry.state(now).decode();
                    }
                    None => return entry.state(now).decode(),
                }
            };
            seq = next.0;
            fut = next.1;
        }
    }

    /// Snapshot of `key` without fetching.
    pub fn state<T: DeserializeOwned>(&self, key: &Fingerprint) -> QueryState<T> {
        let entries = self.inner.lock();
        match entries.get(key) {
            Some(entry) => entry.state(Instant::now()).decode(),
            None => QueryState::idle(),
        }
    }

    /// Decoded data of `key`, if any.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        self.state(key).data
    }

    /// Mark matching entries stale. Observed or in-flight entries refetch
    /// at once; the rest refetch on their next read.
    pub fn invalidate(&self, filter: impl Into<QueryFilter>) -> usize {
        let filter = filter.into();
        let mut entries = self.inner.lock();
        let mut matched = 0;
        for (key, entry) in entries.iter_mut().filter(|(k, _)| filter.matches(k)) {
            matched += 1;
            entry.invalidated = true;
            let active = entry.observers > 0 || entry.in_flight.is_some();
            if !(active && start_fetch(&self.inner, key, entry).is_some()) {
                entry.publish();
            }
        }
        debug!(?filter, matched, "queries invalidated");
        matched
    }

    /// Refetch every matching entry that has a fetcher and wait for all of
    /// them. Returns how many fetches ran.
    pub async fn refetch(&self, filter: impl Into<QueryFilter>) -> usize {
        let fetches = self.start_refetch(&filter.into(), false);
        let n = fetches.len();
        futures::future::join_all(fetches).await;
        n
    }

    fn start_refetch(&self, filter: &QueryFilter, stale_active_only: bool) -> Vec<SharedFetch> {
        let now = Instant::now();
        let mut entries = self.inner.lock();
        entries
            .iter_mut()
            .filter(|(k, e)| {
                filter.matches(k)
                    && (!stale_active_only
                        || (e.observers > 0 && e.in_flight.is_none() && !e.is_fresh(now)))
            })
            .filter_map(|(k, e)| start_fetch(&self.inner, k, e))
            .collect()
    }

    /// Window regained focus. Refetches stale observed entries when
    /// `refetch_on_window_focus` is on.
    pub fn notify_focus(&self) -> usize {
        if !self.inner.config.refetch_on_window_focus {
            return 0;
        }
        self.start_refetch(&QueryFilter::All, true).len()
    }

    /// Network came back. Refetches stale observed entries when
    /// `refetch_on_reconnect` is on.
    pub fn notify_reconnect(&self) -> usize {
        if !self.inner.config.refetch_on_reconnect {
            return 0;
        }
        self.start_refetch(&QueryFilter::All, true).len()
    }

    /// Abort running fetches of matching entries, including pending retry
    /// waits. Entries fall back to their previous data.
    pub fn cancel(&self, filter: impl Into<QueryFilter>) -> usize {
        let filter = filter.into();
        let mut entries = self.inner.lock();
        let mut cancelled = 0;
        for (key, entry) in entries.iter_mut().filter(|(k, _)| filter.matches(k)) {
            if entry.abort_fetch() {
                cancelled += 1;
                debug!(key = %key, "query fetch cancelled");
                entry.publish();
            }
        }
        cancelled
    }

    /// Rewrite the data of every matching entry that has data.
    ///
    /// Entries whose data does not decode as `T` are skipped. `update` runs
    /// without the cache lock held, so it may read the cache; an entry whose
    /// data changes meanwhile is left alone. The returned snapshot restores
    /// the previous data through [`QueryCache::rollback`].
    pub fn apply_optimistic_mutation<T, F>(&self, filter: impl Into<QueryFilter>, mut update: F) -> OptimisticSnapshot
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> T,
    {
        let filter = filter.into();
        let current: Vec<(Fingerprint, Value)> = self
            .inner
            .lock()
            .iter()
            .filter(|(k, _)| filter.matches(k))
            .filter_map(|(k, e)| e.data.clone().map(|d| (k.clone(), d)))
            .collect();

        let mut updates = Vec::with_capacity(current.len());
        for (key, before) in current {
            let typed: T = match serde_json::from_value(before.clone()) {
                Ok(v) => v,
                Err(e) => {
                    debug!(key = %key, error = %e, "optimistic update skipped entry");
                    continue;
                }
            };
            match serde_json::to_value(update(typed)) {
                Ok(next) => updates.push((key, before, next)),
                Err(e) => {
                    warn!(key = %key, error = %e, "optimistic update produced unserializable data");
                }
            }
        }

        let now = Instant::now();
        let mut entries = self.inner.lock();
        let mut previous = Vec::with_capacity(updates.len());
        for (key, before, next) in updates {
            let Some(entry) = entries.get_mut(&key) else {
                continue;
            };
            if entry.data.as_ref() != Some(&before) {
                debug!(key = %key, "entry changed during optimistic update, skipped");
                continue;
            }
            entry.write(next, now);
            entry.publish();
            previous.push((key, before));
        }
        debug!(?filter, updated = previous.len(), "optimistic update applied");
        OptimisticSnapshot { previous }
    }

    /// Restore data captured by [`QueryCache::apply_optimistic_mutation`].
    pub fn rollback(&self, snapshot: OptimisticSnapshot) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.lock();
        let mut restored = 0;
        for (key, data) in snapshot.previous {
            if let Some(entry) = entries.get_mut(&key) {
                entry.write(data, now);
                entry.publish();
                restored += 1;
            }
        }
        info!(restored, "optimistic update rolled back");
        restored
    }

    /// Write data for one key. `update` receives the current data and returns
    /// the replacement, or `None` to leave the entry untouched.
    ///
    /// `update` runs without the cache lock held. If the entry's data changes
    /// while it runs, nothing is written and `false` is returned.
    pub fn set_query_data<T, F>(&self, key: &Fingerprint, update: F) -> bool
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        let before = self.inner.lock().get(key).and_then(|e| e.data.clone());
        let current = before.clone().and_then(|v| serde_json::from_value(v).ok());
        let Some(next) = update(current) else {
            return false;
        };
        let value = match serde_json::to_value(next) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "query data could not be stored");
                return false;
            }
        };

        let now = Instant::now();
        let mut entries = self.inner.lock();
        if before.is_some() && !entries.contains_key(key) {
            debug!(key = %key, "entry evicted while its data was being updated");
            return false;
        }
        let entry = entries.entry(key.clone()).or_insert_with(|| self.inner.new_entry());
        if entry.data != before {
            debug!(key = %key, "entry changed while its data was being updated");
            return false;
        }
        entry.write(value, now);
        entry.invalidated = false;
        entry.publish();
        if entry.observers == 0 && entry.in_flight.is_none() {
            schedule_eviction(&self.inner, key, entry, now + self.inner.config.gc_time);
        }
        true
    }

    /// Subscribe to `key`. The entry is kept alive while any observer exists
    /// and refetched on subscription when stale.
    pub fn observe(&self, key: &Fingerprint) -> QueryObserver {
        let now = Instant::now();
        let mut entries = self.inner.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| self.inner.new_entry());
        entry.observers += 1;
        entry.cancel_gc();
        let rx = entry.watch.subscribe();
        if !entry.is_fresh(now) && entry.in_flight.is_none() {
            start_fetch(&self.inner, key, entry);
        }
        QueryObserver {
            cache: Arc::downgrade(&self.inner),
            key: key.clone(),
            rx,
        }
    }

    /// Refetch matching entries every `interval` until the handle is
    /// stopped or dropped.
    pub fn start_polling(&self, filter: impl Into<QueryFilter>, interval: Duration) -> PollHandle {
        let token = CancellationToken::new();
        let handle = PollHandle {
            token: token.clone(),
        };
        if interval.is_zero() {
            warn!("polling interval must be positive");
            token.cancel();
            return handle;
        }
        let Ok(rt) = Handle::try_current() else {
            warn!("polling needs a Tokio runtime");
            token.cancel();
            return handle;
        };
        let filter = filter.into();
        let weak = Arc::downgrade(&self.inner);
        debug!(?filter, interval_ms = interval.as_millis() as u64, "polling started");
        rt.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match weak.upgrade() {
                    Some(inner) => {
                        QueryCache { inner }.start_refetch(&filter, false);
                    }
                    None => break,
                }
            }
        });
        handle
    }

    /// Drop matching entries, aborting their fetches.
    pub fn remove(&self, filter: impl Into<QueryFilter>) -> usize {
        let filter = filter.into();
        let mut entries = self.inner.lock();
        let before = entries.len();
        entries.retain(|k, e| {
            if filter.matches(k) {
                e.abort_fetch();
                e.cancel_gc();
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    pub fn clear(&self) {
        self.remove(QueryFilter::All);
    }

    /// Evict unobserved entries whose garbage-collection deadline passed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.lock();
        let before = entries.len();
        entries.retain(|_, e| {
            if e.is_evictable(now) {
                e.cancel_gc();
                false
            } else {
                true
            }
        });
        let purged = before - entries.len();
        self.inner
            .stats
            .evictions
            .fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Fingerprint> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.to_stats()
    }
}

/// Live view of one cache entry. Dropping the last observer starts the
/// entry's garbage-collection timer.
pub struct QueryObserver {
    cache: Weak<Inner>,
    key: Fingerprint,
    rx: watch::Receiver<QueryState<Value>>,
}

impl QueryObserver {
    pub fn key(&self) -> &Fingerprint {
        &self.key
    }

    pub fn state<T: DeserializeOwned>(&self) -> QueryState<T> {
        match self.cache.upgrade() {
            Some(inner) => match inner.lock().get(&self.key) {
                Some(entry) => entry.state(Instant::now()).decode(),
                None => self.rx.borrow().clone().decode(),
            },
            None => self.rx.borrow().clone().decode(),
        }
    }

    /// Wait for the next published change. Returns `false` once the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the published state satisfies `pred`.
    pub async fn wait_for<T, P>(&mut self, mut pred: P) -> Option<QueryState<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&QueryState<Value>) -> bool,
    {
        loop {
            {
                let current = self.rx.borrow_and_update();
                if pred(&current) {
                    return Some(current.clone().decode());
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        if let Some(inner) = self.cache.upgrade() {
            inner.release_observer(&self.key);
        }
    }
}

/// Stops a poller started by [`QueryCache::start_polling`] when stopped or dropped.
#[must_use = "polling stops when the handle is dropped"]
pub struct PollHandle {
    token: CancellationToken,
}

impl PollHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
