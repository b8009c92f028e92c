//! Simulated server with bounded concurrency, a bounded queue, a health state
//! machine, a circuit breaker, and a load-dependent latency model.
//!
//! Each [`ServerState`] owns the requests it is working on. Requests only
//! leave a server by completing; dispatch failures never enter it.

use crate::request::{Request, RequestStatus};
use lbsim_algorithms::ServerSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Server health.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Up,
    /// Serving, but every request takes `slow_multiplier` times longer.
    Slow,
    /// Accepts nothing new. Existing work keeps draining.
    Down,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Health::Up => "UP",
            Health::Slow => "SLOW",
            Health::Down => "DOWN",
        })
    }
}

/// Where a dispatched request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Processing,
    Queued,
}

/// A simulated server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub id: u32,
    pub health: Health,
    /// Processing time of one request on an idle, healthy server.
    pub base_latency_ms: f64,
    pub slow_multiplier: f64,
    pub weight: u32,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    pub inflight: Vec<Request>,
    pub queue: VecDeque<Request>,
    // --- Counters ---
    pub processed: u64,
    pub failed: u64,
    /// Sum of measured processing durations of completed requests.
    pub total_processing_ms: u64,
    /// Smoothed latency estimate, seeded with `base_latency_ms`.
    pub ewma_latency_ms: f64,
    /// The breaker is open while `now < circuit_open_until_ms`.
    pub circuit_open_until_ms: Option<u64>,
    pub last_transition_ms: u64,
}

impl ServerState {
    pub fn new(
        id: u32,
        base_latency_ms: f64,
        weight: u32,
        max_concurrent: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            id,
            health: Health::Up,
            base_latency_ms,
            slow_multiplier: 1.0,
            weight,
            max_concurrent,
            queue_capacity,
            inflight: Vec::new(),
            queue: VecDeque::new(),
            processed: 0,
            failed: 0,
            total_processing_ms: 0,
            ewma_latency_ms: base_latency_ms,
            circuit_open_until_ms: None,
            last_transition_ms: 0,
        }
    }

    pub fn with_slow_multiplier(mut self, multiplier: f64) -> Self {
        self.slow_multiplier = multiplier;
        self
    }

    pub fn with_health(mut self, health: Health) -> Self {
        self.health = health;
        self
    }

    pub fn is_circuit_open(&self, now_ms: u64) -> bool {
        self.circuit_open_until_ms
            .map_or(false, |until| now_ms < until)
    }

    /// Not DOWN and not inside a breaker cooldown. This is what a health
    /// check observes.
    pub fn is_available(&self, now_ms: u64) -> bool {
        self.health != Health::Down && !self.is_circuit_open(now_ms)
    }

    pub fn has_free_slot(&self) -> bool {
        self.inflight.len() < self.max_concurrent
    }

    pub fn has_queue_space(&self) -> bool {
        self.queue.len() < self.queue_capacity
    }

    /// Room for one more request, either in flight or queued.
    pub fn has_spare_capacity(&self) -> bool {
        self.has_free_slot() || self.has_queue_space()
    }

    /// In-flight share of concurrency capacity, in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 1.0;
        }
        self.inflight.len() as f64 / self.max_concurrent as f64
    }

    /// Processing time for a request starting now:
    /// `base × (slow_multiplier if SLOW) × (1 + α × utilization²)`.
    pub fn service_time_ms(&self, congestion_alpha: f64) -> f64 {
        let health_factor = if self.health == Health::Slow {
            self.slow_multiplier
        } else {
            1.0
        };
        let u = self.utilization();
        self.base_latency_ms * health_factor * (1.0 + congestion_alpha * u * u)
    }

    /// Move to `health`, stamping the transition time. Returns false when
    /// the server was already in that state.
    pub fn transition(&mut self, health: Health, now_ms: u64) -> bool {
        if self.health == health {
            return false;
        }
        self.health = health;
        self.last_transition_ms = now_ms;
        true
    }

    /// DOWN long enough to come back. Only meaningful at health-check time.
    pub fn should_recover(&self, now_ms: u64, recovery_delay_ms: u64) -> bool {
        self.health == Health::Down
            && now_ms.saturating_sub(self.last_transition_ms) >= recovery_delay_ms
    }

    pub fn trip_breaker(&mut self, now_ms: u64, cooldown_ms: u64) {
        self.circuit_open_until_ms = Some(now_ms.saturating_add(cooldown_ms));
    }

    /// Start processing `request` with the given service time.
    fn start(&mut self, mut request: Request, service_ms: f64, now_ms: u64) {
        request.processing_start_ms = Some(now_ms);
        request.remaining_ms = service_ms;
        request.status = RequestStatus::Processing;
        self.inflight.push(request);
    }

    /// Place `request` in flight if a slot is free, else in the queue.
    /// Hands the request back when neither has room.
    pub fn accept(
        &mut self,
        mut request: Request,
        service_ms: f64,
        now_ms: u64,
    ) -> Result<Placement, Request> {
        request.server_id = Some(self.id);
        if self.has_free_slot() {
            self.start(request, service_ms, now_ms);
            Ok(Placement::Processing)
        } else if self.has_queue_space() {
            request.server_queue_enter_ms = Some(now_ms);
            request.status = RequestStatus::ServerQueued;
            self.queue.push_back(request);
            Ok(Placement::Queued)
        } else {
            Err(request)
        }
    }

    /// Pop the oldest queued request if a processing slot is free.
    pub fn next_promotable(&mut self) -> Option<Request> {
        if self.has_free_slot() {
            self.queue.pop_front()
        } else {
            None
        }
    }

    /// Promote a request popped by [`next_promotable`](Self::next_promotable).
    pub fn promote(&mut self, mut request: Request, service_ms: f64, now_ms: u64) {
        request.server_queue_exit_ms = Some(now_ms);
        self.start(request, service_ms, now_ms);
    }

    /// Advance every in-flight request by `dt_ms` and return those that
    /// finished, stamped with `end_ms`, in their in-flight order.
    pub fn progress(&mut self, dt_ms: u64, end_ms: u64) -> Vec<Request> {
        let mut finished = Vec::new();
        let mut still_running = Vec::with_capacity(self.inflight.len());
        for mut request in self.inflight.drain(..) {
            request.remaining_ms -= dt_ms as f64;
            if request.remaining_ms <= 0.0 {
                request.remaining_ms = 0.0;
                request.processing_end_ms = Some(end_ms);
                request.status = RequestStatus::Completed;
                finished.push(request);
            } else {
                still_running.push(request);
            }
        }
        self.inflight = still_running;
        finished
    }

    /// Book a completion: counters plus `ewma = α × sample + (1-α) × ewma`.
    pub fn record_completion(&mut self, processing_ms: u64, ewma_alpha: f64) {
        self.processed += 1;
        self.total_processing_ms += processing_ms;
        self.ewma_latency_ms =
            ewma_alpha * processing_ms as f64 + (1.0 - ewma_alpha) * self.ewma_latency_ms;
    }

    /// Mean measured processing duration of completed requests.
    pub fn mean_processing_ms(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.total_processing_ms as f64 / self.processed as f64
    }

    /// Read-only view for routing algorithms.
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            id: self.id,
            weight: self.weight,
            inflight: self.inflight.len() as u32,
            queued: self.queue.len() as u32,
            ewma_latency_ms: self.ewma_latency_ms,
        }
    }
}
