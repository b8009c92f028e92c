//! Metrics collection and aggregation.
//!
//! Tracks running totals per failure category, rolling sample windows of
//! completion latency and per-tier waits, the per-tick [`MetricsSample`]
//! series, and the end-of-run [`RunSummary`] with fairness statistics.

use crate::request::{FailureCategory, FailureReason, Request};
use crate::ring::RingBuffer;
use crate::state::SimulationState;
use serde::{Deserialize, Serialize};

/// Percentile values for a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Failure tallies, one counter per [`FailureReason`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub admission_queue_full: u64,
    pub no_active_balancer: u64,
    pub no_routable_server: u64,
    pub server_unavailable: u64,
    pub server_queue_full: u64,
}

impl FailureCounts {
    fn slot(&mut self, reason: FailureReason) -> &mut u64 {
        match reason {
            FailureReason::AdmissionQueueFull => &mut self.admission_queue_full,
            FailureReason::NoActiveBalancer => &mut self.no_active_balancer,
            FailureReason::NoRoutableServer => &mut self.no_routable_server,
            FailureReason::ServerUnavailable => &mut self.server_unavailable,
            FailureReason::ServerQueueFull => &mut self.server_queue_full,
        }
    }

    pub fn get(&self, reason: FailureReason) -> u64 {
        match reason {
            FailureReason::AdmissionQueueFull => self.admission_queue_full,
            FailureReason::NoActiveBalancer => self.no_active_balancer,
            FailureReason::NoRoutableServer => self.no_routable_server,
            FailureReason::ServerUnavailable => self.server_unavailable,
            FailureReason::ServerQueueFull => self.server_queue_full,
        }
    }

    pub fn total(&self) -> u64 {
        FailureReason::ALL.iter().map(|r| self.get(*r)).sum()
    }
}

/// Running request totals since the start of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub started: u64,
    pub completed: u64,
    /// Routing and dispatch failures.
    pub failed: u64,
    /// Admission failures at the load balancer.
    pub dropped_by_lb: u64,
    /// Capacity failures at a server.
    pub dropped_by_server: u64,
    pub by_reason: FailureCounts,
}

impl Totals {
    pub fn record_failure(&mut self, reason: FailureReason) {
        *self.by_reason.slot(reason) += 1;
        match reason.category() {
            FailureCategory::Admission => self.dropped_by_lb += 1,
            FailureCategory::Capacity => self.dropped_by_server += 1,
            FailureCategory::Routing | FailureCategory::Dispatch => self.failed += 1,
        }
    }

    /// Every terminal failure regardless of category.
    pub fn all_failures(&self) -> u64 {
        self.failed + self.dropped_by_lb + self.dropped_by_server
    }

    /// Share of started requests that failed, in `[0, 1]`.
    pub fn failure_rate(&self) -> f64 {
        if self.started == 0 {
            return 0.0;
        }
        self.all_failures() as f64 / self.started as f64
    }
}

/// Rolling windows of per-request samples taken at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleWindows {
    pub latency_ms: RingBuffer<f64>,
    pub lb_wait_ms: RingBuffer<f64>,
    pub server_wait_ms: RingBuffer<f64>,
}

impl SampleWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            latency_ms: RingBuffer::new(capacity),
            lb_wait_ms: RingBuffer::new(capacity),
            server_wait_ms: RingBuffer::new(capacity),
        }
    }

    pub fn record(&mut self, request: &Request) {
        if let Some(latency) = request.total_latency_ms() {
            self.latency_ms.push(latency as f64);
        }
        if let Some(wait) = request.lb_wait_ms() {
            self.lb_wait_ms.push(wait as f64);
        }
        self.server_wait_ms.push(request.server_wait_ms() as f64);
    }
}

/// One point of the per-tick metrics series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub time_ms: u64,
    pub arrival_rate: f64,
    pub mean_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub lb_queue_depth: usize,
    pub server_queue_depth: usize,
    pub inflight: usize,
    pub failure_rate: f64,
    pub completed: u64,
    pub failed: u64,
    pub dropped_by_lb: u64,
    pub dropped_by_server: u64,
    pub mean_lb_wait_ms: f64,
    pub mean_server_wait_ms: f64,
}

impl MetricsSample {
    /// Sample the state as it stands at the end of a tick.
    pub fn capture(state: &SimulationState, arrival_rate: f64) -> Self {
        let latency = Percentiles::from_values(&state.windows.latency_ms.to_vec());
        Self {
            time_ms: state.clock.now_ms(),
            arrival_rate,
            mean_latency_ms: latency.mean,
            p95_latency_ms: latency.p95,
            lb_queue_depth: state.balancers.iter().map(|lb| lb.queue.len()).sum(),
            server_queue_depth: state.servers.iter().map(|s| s.queue.len()).sum(),
            inflight: state.servers.iter().map(|s| s.inflight.len()).sum(),
            failure_rate: state.totals.failure_rate(),
            completed: state.totals.completed,
            failed: state.totals.failed,
            dropped_by_lb: state.totals.dropped_by_lb,
            dropped_by_server: state.totals.dropped_by_server,
            mean_lb_wait_ms: state.windows.lb_wait_ms.mean(),
            mean_server_wait_ms: state.windows.server_wait_ms.mean(),
        }
    }
}

/// Aggregated view of a finished (or paused) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub algorithm: String,
    pub workload: String,
    pub duration_ms: u64,
    pub totals: Totals,
    /// Requests still queued or in flight.
    pub live: u64,
    /// Latency distribution over the rolling window.
    pub latency: Percentiles,
    pub mean_lb_wait_ms: f64,
    pub mean_server_wait_ms: f64,
    pub throughput_per_sec: f64,
    pub per_server_processed: Vec<u64>,
    pub per_server_mean_processing_ms: Vec<f64>,
    pub load_cv: f64,
    pub jains_fairness_index: f64,
}

impl RunSummary {
    pub fn from_state(state: &SimulationState) -> Self {
        let duration_ms = state.clock.now_ms();
        let per_server_processed: Vec<u64> = state.servers.iter().map(|s| s.processed).collect();
        let duration_sec = duration_ms as f64 / 1000.0;

        Self {
            algorithm: state.active_algorithm().name().to_string(),
            workload: state.workload.label(),
            duration_ms,
            totals: state.totals.clone(),
            live: state.live_requests() as u64,
            latency: Percentiles::from_values(&state.windows.latency_ms.to_vec()),
            mean_lb_wait_ms: state.windows.lb_wait_ms.mean(),
            mean_server_wait_ms: state.windows.server_wait_ms.mean(),
            throughput_per_sec: if duration_sec > 0.0 {
                state.totals.completed as f64 / duration_sec
            } else {
                0.0
            },
            load_cv: coefficient_of_variation(&per_server_processed),
            jains_fairness_index: jains_fairness_index(&per_server_processed),
            per_server_mean_processing_ms: state
                .servers
                .iter()
                .map(|s| s.mean_processing_ms())
                .collect(),
            per_server_processed,
        }
    }
}

/// Coefficient of variation (std / mean).
pub fn coefficient_of_variation(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Jain's fairness index: (sum(x_i))^2 / (n * sum(x_i^2)).
pub fn jains_fairness_index(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let sum_sq: f64 = values.iter().map(|&v| (v as f64).powi(2)).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n * sum_sq)
}

/// Format a summary as a pretty-printed table string.
pub fn format_table(summary: &RunSummary) -> String {
    let t = &summary.totals;
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} Results  ", summary.algorithm)
    ));
    out.push_str(&format!(
        "  Duration: {:.1}s | Workload: {}\n",
        summary.duration_ms as f64 / 1000.0,
        summary.workload
    ));
    out.push_str(&format!("{:-<70}\n", "  Requests  "));
    out.push_str(&format!(
        "  Started: {}  Completed: {}  Live: {}\n",
        t.started, t.completed, summary.live
    ));
    out.push_str(&format!(
        "  Failed: {}  Dropped (LB): {}  Dropped (server): {}  Failure rate: {:.1}%\n",
        t.failed,
        t.dropped_by_lb,
        t.dropped_by_server,
        t.failure_rate() * 100.0
    ));
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    out.push_str(&format!(
        "  E2E (ms)        P50={:>8.1}  P95={:>8.1}  P99={:>8.1}\n",
        summary.latency.p50, summary.latency.p95, summary.latency.p99
    ));
    out.push_str(&format!(
        "  Wait (ms)       LB={:>8.1}  Server={:>8.1}\n",
        summary.mean_lb_wait_ms, summary.mean_server_wait_ms
    ));
    out.push_str(&format!("{:-<70}\n", "  Throughput  "));
    out.push_str(&format!(
        "  Completed/sec: {:.1}\n",
        summary.throughput_per_sec
    ));
    out.push_str(&format!("{:-<70}\n", "  Fairness  "));
    out.push_str(&format!(
        "  Load CV: {:.3}  Jain's index: {:.4}  Per server: {:?}\n",
        summary.load_cv, summary.jains_fairness_index, summary.per_server_processed
    ));
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple algorithm results.
pub fn format_comparison_table(results: &[RunSummary]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Algorithm Comparison  "));
    out.push_str(&format!(
        "{:<22} {:>8} {:>8} {:>8} {:>9} {:>9} {:>8}\n",
        "Algorithm", "E2E p50", "E2E p95", "Done/s", "Failed", "Dropped", "Jain's"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for s in results {
        out.push_str(&format!(
            "{:<22} {:>8.1} {:>8.1} {:>8.1} {:>9} {:>9} {:>8.4}\n",
            s.algorithm,
            s.latency.p50,
            s.latency.p95,
            s.throughput_per_sec,
            s.totals.failed,
            s.totals.dropped_by_lb + s.totals.dropped_by_server,
            s.jains_fairness_index,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
