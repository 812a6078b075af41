//! Keyed query cache with observer-driven refetch
//!
//! Each key owns one entry holding the last result as JSON, the query
//! function registered by its enabled observers and a `watch` channel that
//! observers subscribe to. Fetches run as spawned tasks; a generation counter
//! makes the newest fetch win when several overlap.

use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{CacheStats, QueryError, QueryFilter, QueryKey, QueryMetrics, QueryResult, StatsCollector};

/// Type-erased query function; output is the JSON form of the typed result
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, QueryResult<Value>> + Send + Sync>;

/// Default time an entry without observers stays cached
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    /// No result yet
    Pending,
    Success,
    /// Last fetch failed; previous data, if any, is kept
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Idle,
    Fetching,
}

#[derive(Debug, Clone)]
pub struct QueryState {
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub is_invalidated: bool,
    pub data_updated_at: Option<Instant>,
    /// Completed fetches applied to this entry
    pub fetch_count: u64,
}

impl QueryState {
    fn new() -> Self {
        Self {
            status: QueryStatus::Pending,
            fetch_status: FetchStatus::Idle,
            data: None,
            error: None,
            is_invalidated: false,
            data_updated_at: None,
            fetch_count: 0,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_status == FetchStatus::Fetching
    }

    pub fn is_stale(&self, stale_time: Duration) -> bool {
        if self.is_invalidated {
            return true;
        }
        match self.data_updated_at {
            Some(updated) => updated.elapsed() >= stale_time,
            None => true,
        }
    }

    fn apply(&mut self, result: QueryResult<Value>) {
        self.fetch_status = FetchStatus::Idle;
        self.fetch_count += 1;
        match result {
            Ok(value) => {
                self.status = QueryStatus::Success;
                self.data = Some(value);
                self.error = None;
                self.is_invalidated = false;
                self.data_updated_at = Some(Instant::now());
            }
            Err(err) => {
                self.status = QueryStatus::Error;
                self.error = Some(err.to_string());
            }
        }
    }
}

/// Per-observer query options
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Disabled observers never trigger fetches
    pub enabled: bool,
    /// Age after which cached data is refetched on mount
    pub stale_time: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::ZERO,
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

#[derive(Debug, Clone)]
pub struct QueryClientConfig {
    pub gc_time: Duration,
}

impl Default for QueryClientConfig {
    fn default() -> Self {
        Self {
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

struct QueryEntry {
    key: QueryKey,
    state: watch::Sender<QueryState>,
    query_fn: Mutex<Option<QueryFn>>,
    observers: AtomicUsize,
    active_observers: AtomicUsize,
    generation: AtomicU64,
    inactive_since: Mutex<Option<Instant>>,
}

impl QueryEntry {
    fn new(key: QueryKey) -> Self {
        let (state, _) = watch::channel(QueryState::new());
        Self {
            key,
            state,
            query_fn: Mutex::new(None),
            observers: AtomicUsize::new(0),
            active_observers: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            inactive_since: Mutex::new(Some(Instant::now())),
        }
    }

    fn is_expired(&self, gc_time: Duration) -> bool {
        if self.observers.load(Ordering::SeqCst) > 0 {
            return false;
        }
        lock(&self.inactive_since)
            .map(|since| since.elapsed() >= gc_time)
            .unwrap_or(false)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn erase<T, F, Fut, E>(fetcher: F) -> QueryFn
where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move {
            let value = fut.await.map_err(|e| QueryError::Fetch(e.to_string()))?;
            Ok(serde_json::to_value(value)?)
        }
        .boxed()
    })
}

struct ClientInner {
    entries: DashMap<QueryKey, Arc<QueryEntry>>,
    config: QueryClientConfig,
    metrics: QueryMetrics,
    stats: StatsCollector,
}

/// Shared cache of server state, cheap to clone
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    pub fn new() -> Self {
        Self::with_config(QueryClientConfig::default())
    }

    pub fn with_config(config: QueryClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                entries: DashMap::new(),
                config,
                metrics: QueryMetrics::new(),
                stats: StatsCollector::new(),
            }),
        }
    }

    fn entry(&self, key: &QueryKey) -> Arc<QueryEntry> {
        self.inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(QueryEntry::new(key.clone())))
            .clone()
    }

    /// Subscribe to `key`, fetching when there is no fresh data.
    ///
    /// The observer keeps the entry alive; dropping it starts the gc timer
    /// once no observers remain.
    pub fn observe<T, F, Fut, E>(
        &self,
        key: QueryKey,
        options: QueryOptions,
        fetcher: F,
    ) -> QueryObserver<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.collect_garbage();

        let entry = self.entry(&key);
        entry.observers.fetch_add(1, Ordering::SeqCst);
        *lock(&entry.inactive_since) = None;

        if options.enabled {
            entry.active_observers.fetch_add(1, Ordering::SeqCst);
            *lock(&entry.query_fn) = Some(erase(fetcher));

            let (fetching, stale) = {
                let state = entry.state.borrow();
                (state.is_fetching(), state.is_stale(options.stale_time))
            };
            if !fetching && stale {
                self.spawn_fetch(&entry);
            } else if !stale {
                self.inner.metrics.record_hit(key.root_name());
            }
        }

        let rx = entry.state.subscribe();
        QueryObserver {
            client: self.clone(),
            entry,
            rx,
            enabled: options.enabled,
            _marker: PhantomData,
        }
    }

    /// Start a background fetch for `entry`, superseding any in flight
    fn spawn_fetch(&self, entry: &Arc<QueryEntry>) -> bool {
        let Some(query_fn) = lock(&entry.query_fn).clone() else {
            return false;
        };

        let generation = entry.generation.fetch_add(1, Ordering::SeqCst) + 1;
        entry
            .state
            .send_modify(|s| s.fetch_status = FetchStatus::Fetching);

        debug!(key = %entry.key, generation, "Query fetch started");

        let entry = Arc::clone(entry);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = query_fn().await;
            let elapsed = started.elapsed();

            let ok = result.is_ok();
            inner
                .metrics
                .record_fetch(entry.key.root_name(), elapsed.as_secs_f64(), ok);
            inner.stats.record_fetch(elapsed.as_secs_f64() * 1000.0, ok);

            if entry.generation.load(Ordering::SeqCst) != generation {
                inner.stats.record_superseded();
                debug!(key = %entry.key, generation, "Query result superseded");
                return;
            }

            if let Err(err) = &result {
                warn!(key = %entry.key, error = %err, "Query fetch failed");
            }
            entry.state.send_modify(|s| s.apply(result));
        });

        true
    }

    /// Run `fetcher` now, store the result under `key` and return it
    pub async fn fetch_query<T, F, Fut, E>(&self, key: QueryKey, fetcher: F) -> QueryResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let entry = self.entry(&key);
        let query_fn = erase(fetcher);
        // the generation is claimed once the fetch completes
        let seen = entry.generation.load(Ordering::SeqCst);

        let started = Instant::now();
        let result = query_fn().await;
        let ok = result.is_ok();
        self.inner
            .metrics
            .record_fetch(key.root_name(), started.elapsed().as_secs_f64(), ok);
        self.inner
            .stats
            .record_fetch(started.elapsed().as_secs_f64() * 1000.0, ok);

        if entry
            .generation
            .compare_exchange(seen, seen + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            entry.state.send_modify(|s| s.apply(result.clone()));
        } else {
            self.inner.stats.record_superseded();
        }

        Ok(serde_json::from_value(result?)?)
    }

    /// Cached data for `key`, if any
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entry = self.inner.entries.get(key)?;
        let data = entry.state.borrow().data.clone()?;
        serde_json::from_value(data).ok()
    }

    /// Replace cached data for `key` without fetching
    pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, data: &T) -> QueryResult<()> {
        let value = serde_json::to_value(data)?;
        let entry = self.entry(key);
        // a manual write wins over fetches already in flight
        entry.generation.fetch_add(1, Ordering::SeqCst);
        entry.state.send_modify(|s| {
            s.status = QueryStatus::Success;
            s.fetch_status = FetchStatus::Idle;
            s.data = Some(value);
            s.error = None;
            s.is_invalidated = false;
            s.data_updated_at = Some(Instant::now());
        });
        Ok(())
    }

    pub fn get_query_state(&self, key: &QueryKey) -> Option<QueryState> {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.state.borrow().clone())
    }

    /// Mark matching queries stale and refetch those with enabled observers.
    ///
    /// Returns the number of entries invalidated.
    pub fn invalidate_queries(&self, filter: &QueryFilter) -> usize {
        self.collect_garbage();

        let matched: Vec<Arc<QueryEntry>> = self
            .inner
            .entries
            .iter()
            .filter(|e| filter.matches(e.key()))
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut refetched = 0;
        for entry in &matched {
            entry.state.send_modify(|s| s.is_invalidated = true);
            self.inner.metrics.record_invalidation(entry.key.root_name());
            self.inner.stats.record_invalidation();

            if entry.active_observers.load(Ordering::SeqCst) > 0 && self.spawn_fetch(entry) {
                refetched += 1;
            }
        }

        info!(
            filter = ?filter,
            invalidated = matched.len(),
            refetched,
            "Queries invalidated"
        );
        matched.len()
    }

    /// Drop matching entries regardless of observers
    pub fn remove_queries(&self, filter: &QueryFilter) -> usize {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|key, entry| {
            let keep = !filter.matches(key);
            if !keep {
                entry.generation.fetch_add(1, Ordering::SeqCst);
            }
            keep
        });
        before - self.inner.entries.len()
    }

    /// Evict entries that have had no observers for longer than `gc_time`
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time;
        let mut evicted = 0;
        self.inner.entries.retain(|key, entry| {
            if entry.is_expired(gc_time) {
                entry.generation.fetch_add(1, Ordering::SeqCst);
                self.inner.metrics.record_eviction(key.root_name());
                self.inner.stats.record_eviction();
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            debug!(evicted, "Inactive queries evicted");
        }
        evicted
    }

    /// Periodic eviction; the task ends when the last client clone is dropped
    pub fn spawn_gc(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => {
                        QueryClient { inner }.collect_garbage();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

/// Typed view of one query entry at a point in time
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub status: QueryStatus,
    pub is_fetching: bool,
    pub is_invalidated: bool,
    pub fetch_count: u64,
}

impl<T> QuerySnapshot<T> {
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

impl<T: DeserializeOwned> QuerySnapshot<T> {
    fn from_state(state: &QueryState) -> Self {
        let (data, decode_error) = match state.data.clone().map(serde_json::from_value::<T>) {
            Some(Ok(data)) => (Some(data), None),
            Some(Err(err)) => (None, Some(QueryError::from(err).to_string())),
            None => (None, None),
        };

        Self {
            data,
            error: state.error.clone().or(decode_error),
            status: state.status,
            is_fetching: state.is_fetching(),
            is_invalidated: state.is_invalidated,
            fetch_count: state.fetch_count,
        }
    }
}

/// Subscription to one query key
pub struct QueryObserver<T> {
    client: QueryClient,
    entry: Arc<QueryEntry>,
    rx: watch::Receiver<QueryState>,
    enabled: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> QueryObserver<T> {
    pub fn key(&self) -> &QueryKey {
        &self.entry.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> QueryState {
        self.rx.borrow().clone()
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        QuerySnapshot::from_state(&self.rx.borrow())
    }

    /// Wait for the next state change
    pub async fn changed(&mut self) -> QueryResult<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| QueryError::Closed(self.entry.key.to_string()))
    }

    /// Wait until no fetch is in flight and a result (or error) is present
    pub async fn wait_settled(&mut self) -> QueryResult<QuerySnapshot<T>> {
        if !self.enabled && self.rx.borrow().status == QueryStatus::Pending {
            return Err(QueryError::Disabled(self.entry.key.to_string()));
        }

        let state = self
            .rx
            .wait_for(|s| !s.is_fetching() && s.status != QueryStatus::Pending)
            .await
            .map_err(|_| QueryError::Closed(self.entry.key.to_string()))?
            .clone();
        Ok(QuerySnapshot::from_state(&state))
    }

    /// Wait until at least `count` fetches completed and none is in flight
    pub async fn wait_for_fetch_count(&mut self, count: u64) -> QueryResult<QuerySnapshot<T>> {
        let state = self
            .rx
            .wait_for(|s| !s.is_fetching() && s.fetch_count >= count)
            .await
            .map_err(|_| QueryError::Closed(self.entry.key.to_string()))?
            .clone();
        Ok(QuerySnapshot::from_state(&state))
    }

    /// Force a fetch; no-op for disabled observers
    pub fn refetch(&self) -> bool {
        self.enabled && self.client.spawn_fetch(&self.entry)
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if self.enabled {
            self.entry.active_observers.fetch_sub(1, Ordering::SeqCst);
        }
        if self.entry.observers.fetch_sub(1, Ordering::SeqCst) == 1 {
            *lock(&self.entry.inactive_since) = Some(Instant::now());
            debug!(key = %self.entry.key, "Query has no observers");
        }
    }
}
