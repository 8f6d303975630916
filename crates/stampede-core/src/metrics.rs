//! Streaming aggregation of per-request outcomes.
//!
//! `RunMetrics` is the single piece of state shared across virtual users.
//! Recording is an append-only, commutative reduction: atomic counter
//! increments plus a histogram bucket increment, so concurrent recording
//! from arbitrarily many VUs neither loses nor double-counts outcomes.
//! Individual outcomes are not retained after aggregation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of a single request, produced by a virtual user and consumed
/// only by [`RunMetrics`].
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// Name of the step that issued the request
    pub step: String,

    /// Response status, `None` on transport error
    pub status: Option<u16>,

    /// Wall-clock latency of the request
    pub latency: Duration,

    /// Transport error description, if any
    pub error: Option<String>,

    /// Per-check results, in the step's declared check order
    pub checks: Vec<(String, bool)>,
}

impl RequestOutcome {
    /// A request failed if it hit a transport error or returned a status
    /// outside 2xx/3xx. Redirects are acceptable answers.
    pub fn failed(&self) -> bool {
        match self.status {
            Some(code) => !(200..400).contains(&code),
            None => true,
        }
    }
}

/// Pass/fail counters for one named check
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CheckStat {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckStat {
    /// Fraction of evaluations that passed, 1.0 when never evaluated
    pub fn pass_rate(&self) -> f64 {
        let total = self.passes + self.fails;
        if total == 0 {
            1.0
        } else {
            self.passes as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CheckCounter {
    passes: u64,
    fails: u64,
}

/// Shared run aggregates
#[derive(Debug)]
pub struct RunMetrics {
    /// Total requests issued
    total_requests: AtomicU64,

    /// Requests with a transport error or non-2xx/3xx status
    failed_requests: AtomicU64,

    /// Check evaluations that passed, across all checks
    check_passes: AtomicU64,

    /// Check evaluations that failed, across all checks
    check_fails: AtomicU64,

    /// Latency histogram in microseconds
    latency_histogram: RwLock<Histogram<u64>>,

    /// Per-check pass/fail table
    checks: RwLock<HashMap<String, CheckCounter>>,

    /// Transport error counts keyed by error kind
    error_counts: RwLock<HashMap<String, u64>>,

    /// Run start, set once by the runner
    start_time: RwLock<Option<Instant>>,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            check_passes: AtomicU64::new(0),
            check_fails: AtomicU64::new(0),
            // 1µs to 60s at 3 significant figures
            latency_histogram: RwLock::new(
                Histogram::new_with_bounds(1, 60_000_000, 3).expect("static histogram bounds"),
            ),
            checks: RwLock::new(HashMap::new()),
            error_counts: RwLock::new(HashMap::new()),
            start_time: RwLock::new(None),
        }
    }

    /// Mark the start of the run, for throughput accounting
    pub fn mark_started(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Fold one outcome into the aggregates
    pub fn record(&self, outcome: &RequestOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if outcome.failed() {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(error) = &outcome.error {
            let kind = error.split(':').next().unwrap_or("unknown").trim();
            *self
                .error_counts
                .write()
                .entry(kind.to_string())
                .or_insert(0) += 1;
        }

        let latency_us = (outcome.latency.as_micros().min(u64::MAX as u128) as u64).max(1);
        if let Err(e) = self.latency_histogram.write().record(latency_us) {
            warn!(step = %outcome.step, "Failed to record latency: {}", e);
        }

        if !outcome.checks.is_empty() {
            let mut checks = self.checks.write();
            for (name, passed) in &outcome.checks {
                let counter = checks.entry(name.clone()).or_default();
                if *passed {
                    counter.passes += 1;
                    self.check_passes.fetch_add(1, Ordering::Relaxed);
                } else {
                    counter.fails += 1;
                    self.check_fails.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    /// Fraction of requests that failed, 0.0 before any request
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.failed() as f64 / total as f64
        }
    }

    /// Fraction of check evaluations that passed, 1.0 before any evaluation
    pub fn check_pass_rate(&self) -> f64 {
        let passes = self.check_passes.load(Ordering::Relaxed);
        let fails = self.check_fails.load(Ordering::Relaxed);
        if passes + fails == 0 {
            1.0
        } else {
            passes as f64 / (passes + fails) as f64
        }
    }

    /// Latency at the given quantile (0.0..=1.0), in milliseconds
    pub fn latency_quantile_ms(&self, quantile: f64) -> f64 {
        self.latency_histogram.read().value_at_quantile(quantile) as f64 / 1000.0
    }

    pub fn latency_mean_ms(&self) -> f64 {
        self.latency_histogram.read().mean() / 1000.0
    }

    pub fn latency_min_ms(&self) -> f64 {
        let hist = self.latency_histogram.read();
        if hist.is_empty() {
            0.0
        } else {
            hist.min() as f64 / 1000.0
        }
    }

    pub fn latency_max_ms(&self) -> f64 {
        self.latency_histogram.read().max() as f64 / 1000.0
    }

    /// Seconds since `mark_started`, 0.0 if never started
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Per-check statistics, sorted by check name
    pub fn check_stats(&self) -> Vec<CheckStat> {
        let mut stats: Vec<CheckStat> = self
            .checks
            .read()
            .iter()
            .map(|(name, counter)| CheckStat {
                name: name.clone(),
                passes: counter.passes,
                fails: counter.fails,
            })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Snapshot the aggregates for reporting
    pub fn summary(&self) -> MetricsSummary {
        let duration_secs = self.elapsed_secs();
        let total = self.total();

        MetricsSummary {
            total_requests: total,
            failed_requests: self.failed(),
            failure_rate: self.failure_rate(),
            avg_rps: if duration_secs > 0.0 {
                total as f64 / duration_secs
            } else {
                0.0
            },
            duration_secs,
            latency_min_ms: self.latency_min_ms(),
            latency_mean_ms: self.latency_mean_ms(),
            latency_med_ms: self.latency_quantile_ms(0.50),
            latency_p90_ms: self.latency_quantile_ms(0.90),
            latency_p95_ms: self.latency_quantile_ms(0.95),
            latency_p99_ms: self.latency_quantile_ms(0.99),
            latency_max_ms: self.latency_max_ms(),
            error_counts: self.error_counts.read().clone(),
        }
    }
}

/// Final aggregate snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub failure_rate: f64,
    pub avg_rps: f64,
    pub duration_secs: f64,
    pub latency_min_ms: f64,
    pub latency_mean_ms: f64,
    pub latency_med_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_max_ms: f64,
    pub error_counts: HashMap<String, u64>,
}
