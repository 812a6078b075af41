//! Query cache metrics for observability

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<QueryMetricsInner> = OnceLock::new();

struct QueryMetricsInner {
    hits: CounterVec,
    fetches: CounterVec,
    fetch_errors: CounterVec,
    fetch_duration: HistogramVec,
    invalidations: CounterVec,
    evictions: CounterVec,
    mutations: CounterVec,
}

impl QueryMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("query_cache_hits_total", "Observers served from fresh cache"),
                &["query"],
            )
            .expect("valid metric definition"),
            fetches: CounterVec::new(
                Opts::new("query_cache_fetches_total", "Total query function runs"),
                &["query"],
            )
            .expect("valid metric definition"),
            fetch_errors: CounterVec::new(
                Opts::new("query_cache_fetch_errors_total", "Total failed query runs"),
                &["query"],
            )
            .expect("valid metric definition"),
            fetch_duration: HistogramVec::new(
                HistogramOpts::new(
                    "query_cache_fetch_duration_seconds",
                    "Query function latency",
                ),
                &["query"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "query_cache_invalidations_total",
                    "Total cache entries marked stale",
                ),
                &["query"],
            )
            .expect("valid metric definition"),
            evictions: CounterVec::new(
                Opts::new("query_cache_evictions_total", "Total inactive entries dropped"),
                &["query"],
            )
            .expect("valid metric definition"),
            mutations: CounterVec::new(
                Opts::new("query_cache_mutations_total", "Mutation outcomes"),
                &["mutation", "outcome"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.fetches.clone()))?;
        registry.register(Box::new(self.fetch_errors.clone()))?;
        registry.register(Box::new(self.fetch_duration.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.evictions.clone()))?;
        registry.register(Box::new(self.mutations.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static QueryMetricsInner {
    METRICS.get_or_init(QueryMetricsInner::new)
}

/// Query cache metrics wrapper
#[derive(Clone, Default)]
pub struct QueryMetrics;

impl QueryMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, query: &str) {
        get_metrics().hits.with_label_values(&[query]).inc();
    }

    pub fn record_fetch(&self, query: &str, seconds: f64, ok: bool) {
        let metrics = get_metrics();
        metrics.fetches.with_label_values(&[query]).inc();
        metrics
            .fetch_duration
            .with_label_values(&[query])
            .observe(seconds);
        if !ok {
            metrics.fetch_errors.with_label_values(&[query]).inc();
        }
    }

    pub fn record_invalidation(&self, query: &str) {
        get_metrics().invalidations.with_label_values(&[query]).inc();
    }

    pub fn record_eviction(&self, query: &str) {
        get_metrics().evictions.with_label_values(&[query]).inc();
    }

    pub fn record_mutation(&self, mutation: &str, outcome: &str) {
        get_metrics()
            .mutations
            .with_label_values(&[mutation, outcome])
            .inc();
    }
}
