//! In-process statistics for a query client

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time counters of one `QueryClient`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub fetches: u64,
    pub fetch_errors: u64,
    /// Fetch results dropped because a newer fetch superseded them
    pub superseded: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub fetch_p50_ms: f64,
    pub fetch_p99_ms: f64,
}

/// Thread-safe statistics collector
#[derive(Clone)]
pub struct StatsCollector {
    fetches: Arc<AtomicU64>,
    fetch_errors: Arc<AtomicU64>,
    superseded: Arc<AtomicU64>,
    invalidations: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    latencies: Arc<std::sync::Mutex<Vec<f64>>>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            fetches: Arc::new(AtomicU64::new(0)),
            fetch_errors: Arc::new(AtomicU64::new(0)),
            superseded: Arc::new(AtomicU64::new(0)),
            invalidations: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
            latencies: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn record_fetch(&self, latency_ms: f64, ok: bool) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.fetch_errors.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(latency_ms);
            // Keep only the most recent samples
            if latencies.len() > 1000 {
                latencies.drain(0..500);
            }
        }
    }

    pub fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let (p50, p99) = match self.latencies.lock() {
            Ok(latencies) if !latencies.is_empty() => {
                let mut sorted = latencies.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let p50_idx = (sorted.len() as f64 * 0.50) as usize;
                let p99_idx = (sorted.len() as f64 * 0.99) as usize;
                (
                    sorted[p50_idx.min(sorted.len() - 1)],
                    sorted[p99_idx.min(sorted.len() - 1)],
                )
            }
            _ => (0.0, 0.0),
        };

        CacheStats {
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            fetch_p50_ms: p50,
            fetch_p99_ms: p99,
        }
    }

    pub fn reset(&self) {
        self.fetches.store(0, Ordering::Relaxed);
        self.fetch_errors.store(0, Ordering::Relaxed);
        self.superseded.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = StatsCollector::new();
        stats.record_fetch(5.0, true);
        stats.record_fetch(7.0, false);
        stats.record_invalidation();
        stats.record_eviction();
        stats.record_superseded();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.fetches, 2);
        assert_eq!(snapshot.fetch_errors, 1);
        assert_eq!(snapshot.invalidations, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.superseded, 1);
    }

    #[test]
    fn test_latency_percentiles() {
        let stats = StatsCollector::new();
        for i in 1..=100 {
            stats.record_fetch(i as f64, true);
        }

        let snapshot = stats.snapshot();
        assert!(snapshot.fetch_p50_ms >= 50.0 && snapshot.fetch_p50_ms <= 51.0);
        assert!(snapshot.fetch_p99_ms >= 99.0);
    }

    #[test]
    fn test_reset() {
        let stats = StatsCollector::new();
        stats.record_fetch(1.0, true);
        stats.reset();
        assert_eq!(stats.snapshot(), CacheStats::default());
    }
}
