//! Load balancer model: FIFO admission queue, throughput and concurrency
//! budgets, and the cached health snapshot used for routing.

use crate::request::{Request, RequestStatus};
use crate::server::ServerState;
use lbsim_algorithms::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// A simulated load balancer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerState {
    pub id: u32,
    pub up: bool,
    pub max_admissions_per_sec: f64,
    pub max_concurrent_connections: u32,
    pub queue_capacity: usize,
    /// Arrivals refused by this balancer.
    pub dropped: u64,
    pub queue: VecDeque<Request>,
    /// Dispatched requests not yet completed.
    pub active_connections: u32,
    pub algorithm: Algorithm,
    pub health_check_interval_ms: u64,
    pub last_check_ms: u64,
    /// Server id -> available, as of `last_check_ms`.
    pub health_snapshot: BTreeMap<u32, bool>,
}

impl LoadBalancerState {
    pub fn new(
        id: u32,
        max_admissions_per_sec: f64,
        max_concurrent_connections: u32,
        queue_capacity: usize,
        health_check_interval_ms: u64,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            id,
            up: true,
            max_admissions_per_sec,
            max_concurrent_connections,
            queue_capacity,
            dropped: 0,
            queue: VecDeque::new(),
            active_connections: 0,
            algorithm,
            health_check_interval_ms,
            last_check_ms: 0,
            health_snapshot: BTreeMap::new(),
        }
    }

    /// Enqueue an arrival, or hand it back if the queue is full.
    pub fn admit(&mut self, mut request: Request, now_ms: u64) -> Result<(), Request> {
        request.lb_id = Some(self.id);
        if self.queue.len() < self.queue_capacity {
            request.lb_enter_ms = Some(now_ms);
            request.status = RequestStatus::LbQueued;
            self.queue.push_back(request);
            Ok(())
        } else {
            self.dropped += 1;
            Err(request)
        }
    }

    /// How many requests may leave the queue during a tick of `dt_ms`:
    /// `floor(rate × dt / 1000)`, capped by free connection slots.
    pub fn drain_budget(&self, dt_ms: u64) -> usize {
        let by_rate = (self.max_admissions_per_sec * dt_ms as f64 / 1000.0).floor();
        let by_rate = if by_rate.is_finite() && by_rate > 0.0 {
            by_rate as u64
        } else {
            0
        };
        let by_connections = self
            .max_concurrent_connections
            .saturating_sub(self.active_connections) as u64;
        by_rate.min(by_connections) as usize
    }

    /// Whether the snapshot is due for a refresh at `now_ms`.
    pub fn health_check_due(&self, now_ms: u64) -> bool {
        now_ms >= self.last_check_ms.saturating_add(self.health_check_interval_ms)
    }

    /// Capture every server's availability and align `last_check_ms` to the
    /// interval grid.
    pub fn refresh_health(&mut self, servers: &[ServerState], now_ms: u64) {
        self.health_snapshot = servers
            .iter()
            .map(|s| (s.id, s.is_available(now_ms)))
            .collect();
        self.last_check_ms = match self.health_check_interval_ms {
            0 => now_ms,
            interval => now_ms - now_ms % interval,
        };
    }

    /// Availability according to the cached snapshot. Unknown servers are
    /// treated as unavailable.
    pub fn believes_available(&self, server_id: u32) -> bool {
        self.health_snapshot.get(&server_id).copied().unwrap_or(false)
    }

    pub fn release_connection(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }
}
