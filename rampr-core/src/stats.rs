use dashmap::DashMap;
use hdrhistogram::Histogram;
use std::collections::HashMap;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::checks::{CheckCounter, CheckRegistry, CheckSummary};
use crate::error::*;

fn new_histogram() -> Result<Histogram<u64>> {
    Ok(Histogram::new(3)?)
}

/// Run-wide aggregate shared by every VU.
#[derive(Debug)]
pub struct Stats {
    pub active_vus: AtomicU64,
    pub iterations: AtomicU64,
    pub total_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub total_bytes_received: AtomicU64,
    pub errors_map: DashMap<String, u64>,
    pub status_counts: DashMap<u16, u64>,
    pub checks: CheckRegistry,
    pub latency_histogram: Mutex<Histogram<u64>>,
}

impl Stats {
    pub fn new() -> Result<Self> {
        Ok(Self {
            active_vus: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_bytes_received: AtomicU64::new(0),
            errors_map: DashMap::new(),
            status_counts: DashMap::new(),
            checks: CheckRegistry::new(),
            latency_histogram: Mutex::new(new_histogram()?),
        })
    }

    pub fn inc_vus(&self) {
        self.active_vus.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_vus(&self) {
        self.active_vus.fetch_sub(1, Ordering::Relaxed);
    }

    /// Marks one VU active until the returned guard is dropped.
    pub fn active_vu(self: &Arc<Self>) -> ActiveVu {
        self.inc_vus();
        ActiveVu {
            stats: Arc::clone(self),
        }
    }

    pub fn record_error(&self, error: String) {
        *self.errors_map.entry(error).or_insert(0) += 1;
    }

    fn merge(&self, local: &mut LocalCounters) {
        self.iterations.fetch_add(local.iterations, Ordering::Relaxed);
        self.total_requests.fetch_add(local.requests, Ordering::Relaxed);
        self.failed_requests.fetch_add(local.failed, Ordering::Relaxed);
        self.total_bytes_received.fetch_add(local.bytes_received, Ordering::Relaxed);

        for (k, v) in local.errors.drain() {
            *self.errors_map.entry(k).or_insert(0) += v;
        }
        for (k, v) in local.status_counts.drain() {
            *self.status_counts.entry(k).or_insert(0) += v;
        }
        for (name, counter) in local.checks.drain() {
            self.checks.add(name, counter);
        }

        if !local.histogram.is_empty() {
            let mut h = self.latency_histogram.lock().unwrap_or_else(|e| e.into_inner());
            let _ = h.add(&local.histogram);
            local.histogram.reset();
        }

        local.iterations = 0;
        local.requests = 0;
        local.failed = 0;
        local.bytes_received = 0;
    }

    pub fn snapshot(&self, elapsed: Duration) -> StatsSnapshot {
        let latency_histogram = self
            .latency_histogram
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        StatsSnapshot {
            elapsed,
            active_vus: self.active_vus.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
            errors: self
                .errors_map
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
            status_counts: self
                .status_counts
                .iter()
                .map(|r| (*r.key(), *r.value()))
                .collect(),
            checks: self.checks.summaries(),
            latency_histogram,
        }
    }
}

#[derive(Debug)]
struct LocalCounters {
    iterations: u64,
    requests: u64,
    failed: u64,
    bytes_received: u64,
    errors: HashMap<String, u64>,
    status_counts: HashMap<u16, u64>,
    checks: HashMap<&'static str, CheckCounter>,
    histogram: Histogram<u64>,
}

/// Keeps the active-VU gauge raised while a VU task is alive. Dropped on
/// normal exit as well as on panic or abort.
#[derive(Debug)]
pub struct ActiveVu {
    stats: Arc<Stats>,
}

impl Drop for ActiveVu {
    fn drop(&mut self) {
        self.stats.dec_vus();
    }
}

/// Per-VU buffer, merged into [`Stats`] on [`LocalStats::flush`] to keep the
/// shared histogram lock off the request path.
#[derive(Debug)]
pub struct LocalStats {
    inner: Mutex<LocalCounters>,
}

impl LocalStats {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(LocalCounters {
                iterations: 0,
                requests: 0,
                failed: 0,
                bytes_received: 0,
                errors: HashMap::new(),
                status_counts: HashMap::new(),
                checks: HashMap::new(),
                histogram: new_histogram()?,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalCounters> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records one completed request. `status` is `None` for transport failures.
    pub fn record_request(&self, latency: Duration, bytes: u64, status: Option<u16>) {
        let mut local = self.lock();
        local.requests += 1;
        local.bytes_received += bytes;
        if status.is_none_or(|s| s >= 400) {
            local.failed += 1;
        }
        if let Some(status) = status {
            *local.status_counts.entry(status).or_insert(0) += 1;
            let _ = local.histogram.record(latency.as_micros() as u64);
        }
    }

    pub fn record_error(&self, error: String) {
        *self.lock().errors.entry(error).or_insert(0) += 1;
    }

    pub fn record_check(&self, name: &'static str, ok: bool) {
        self.lock().checks.entry(name).or_default().record(ok);
    }

    pub fn record_iteration(&self) {
        self.lock().iterations += 1;
    }

    pub fn flush(&self, stats: &Stats) {
        stats.merge(&mut self.lock());
    }
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub active_vus: u64,
    pub iterations: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_bytes_received: u64,
    pub errors: HashMap<String, u64>,
    pub status_counts: HashMap<u16, u64>,
    pub checks: Vec<CheckSummary>,
    /// Request latencies in microseconds.
    pub latency_histogram: Histogram<u64>,
}

impl StatsSnapshot {
    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }
}
