//! Request model.
//!
//! Each [`Request`] is created on arrival, moves between the load balancer
//! queue, a server queue and a server's in-flight list, and is dropped from
//! every live container once it reaches a terminal status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Arrived,
    LbQueued,
    ServerQueued,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

/// Why a request failed. Every variant is terminal; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The leader's admission queue was at capacity.
    AdmissionQueueFull,
    /// No load balancer was up to accept the arrival.
    NoActiveBalancer,
    /// The routing algorithm found no server in the available set.
    NoRoutableServer,
    /// The selected server was DOWN or circuit-broken at dispatch time.
    ServerUnavailable,
    /// The selected server had neither a free slot nor queue space.
    ServerQueueFull,
}

/// Coarse failure buckets used for the running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Admission,
    Routing,
    Dispatch,
    Capacity,
}

impl FailureReason {
    pub const ALL: [FailureReason; 5] = [
        FailureReason::AdmissionQueueFull,
        FailureReason::NoActiveBalancer,
        FailureReason::NoRoutableServer,
        FailureReason::ServerUnavailable,
        FailureReason::ServerQueueFull,
    ];

    pub fn category(self) -> FailureCategory {
        match self {
            FailureReason::AdmissionQueueFull | FailureReason::NoActiveBalancer => {
                FailureCategory::Admission
            }
            FailureReason::NoRoutableServer => FailureCategory::Routing,
            FailureReason::ServerUnavailable => FailureCategory::Dispatch,
            FailureReason::ServerQueueFull => FailureCategory::Capacity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::AdmissionQueueFull => "admission queue full",
            FailureReason::NoActiveBalancer => "no active load balancer",
            FailureReason::NoRoutableServer => "no routable server",
            FailureReason::ServerUnavailable => "server unavailable at dispatch",
            FailureReason::ServerQueueFull => "server queue full",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request flowing through the simulated system.
///
/// Stage timestamps are simulation milliseconds and stay `None` until the
/// request reaches that stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique, strictly increasing identifier.
    pub id: u64,
    pub arrival_ms: u64,
    pub lb_enter_ms: Option<u64>,
    pub lb_exit_ms: Option<u64>,
    pub server_queue_enter_ms: Option<u64>,
    pub server_queue_exit_ms: Option<u64>,
    pub processing_start_ms: Option<u64>,
    pub processing_end_ms: Option<u64>,
    /// Processing time still owed, in milliseconds.
    pub remaining_ms: f64,
    pub server_id: Option<u32>,
    pub lb_id: Option<u32>,
    /// Justification text from the routing algorithm.
    pub routing_decision: Option<String>,
    pub status: RequestStatus,
    pub failure: Option<FailureReason>,
}

impl Request {
    pub fn new(id: u64, arrival_ms: u64) -> Self {
        Self {
            id,
            arrival_ms,
            lb_enter_ms: None,
            lb_exit_ms: None,
            server_queue_enter_ms: None,
            server_queue_exit_ms: None,
            processing_start_ms: None,
            processing_end_ms: None,
            remaining_ms: 0.0,
            server_id: None,
            lb_id: None,
            routing_decision: None,
            status: RequestStatus::Arrived,
            failure: None,
        }
    }

    /// Mark the request failed. Callers must not fail a request twice.
    pub fn fail(&mut self, reason: FailureReason) {
        debug_assert!(!self.status.is_terminal(), "request {} already terminal", self.id);
        self.status = RequestStatus::Failed;
        self.failure = Some(reason);
    }

    /// End-to-end latency, once processing has ended.
    pub fn total_latency_ms(&self) -> Option<u64> {
        self.processing_end_ms
            .map(|end| end.saturating_sub(self.arrival_ms))
    }

    /// Measured processing duration, once processing has ended.
    pub fn processing_ms(&self) -> Option<u64> {
        match (self.processing_start_ms, self.processing_end_ms) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }

    /// Time spent in the load balancer's admission queue.
    pub fn lb_wait_ms(&self) -> Option<u64> {
        match (self.lb_enter_ms, self.lb_exit_ms) {
            (Some(enter), Some(exit)) => Some(exit.saturating_sub(enter)),
            _ => None,
        }
    }

    /// Time spent in a server queue; zero if the request never queued there.
    pub fn server_wait_ms(&self) -> u64 {
        match (self.server_queue_enter_ms, self.server_queue_exit_ms) {
            (Some(enter), Some(exit)) => exit.saturating_sub(enter),
            _ => 0,
        }
    }
}
