//! The simulation root: every entity, counter and history the engine owns.
//!
//! A [`SimulationState`] is a plain serializable value. The engine consumes
//! it by value and hands back the next one, so a caller can keep any
//! earlier snapshot around (by cloning) and replay from it.

use crate::balancer::LoadBalancerState;
use crate::clock::SimClock;
use crate::config::{ChaosSection, ConfigError, SimConfig};
use crate::events::{EventLog, LogEntry};
use crate::metrics::{MetricsSample, SampleWindows, Totals};
use crate::ring::RingBuffer;
use crate::server::ServerState;
use crate::workload::Workload;
use lbsim_algorithms::Algorithm;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub clock: SimClock,
    /// Tick size used by [`crate::engine::tick`].
    pub tick_ms: u64,
    pub next_request_id: u64,
    /// Fractional arrivals carried into the next tick.
    pub arrival_remainder: f64,
    /// Shared routing cursor for cursor-driven algorithms.
    pub cursor: u64,
    pub ewma_alpha: f64,
    pub congestion_alpha: f64,
    pub recovery_delay_ms: u64,
    pub breaker_cooldown_ms: u64,
    pub capacity_aware_routing: bool,
    /// Algorithm used when no balancer is leading.
    pub algorithm: Algorithm,
    pub workload: Workload,
    pub balancers: Vec<LoadBalancerState>,
    pub servers: Vec<ServerState>,
    pub leader: Option<u32>,
    pub log: EventLog,
    pub metrics: RingBuffer<MetricsSample>,
    pub totals: Totals,
    pub windows: SampleWindows,
    pub chaos: ChaosSection,
    pub rng: ChaCha8Rng,
}

impl SimulationState {
    /// Build the initial state at t=0 from a validated configuration.
    ///
    /// The first up balancer leads, and every balancer holds a health
    /// snapshot taken at t=0.
    pub fn from_config(config: &SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let servers: Vec<ServerState> = config
            .servers
            .iter()
            .map(|s| {
                ServerState::new(
                    s.id,
                    s.base_latency_ms,
                    s.weight,
                    s.max_concurrent,
                    s.queue_capacity,
                )
                .with_slow_multiplier(s.slow_multiplier)
                .with_health(s.health)
            })
            .collect();

        let balancers: Vec<LoadBalancerState> = config
            .balancers
            .iter()
            .map(|b| {
                let mut lb = LoadBalancerState::new(
                    b.id,
                    b.max_admissions_per_sec,
                    b.max_concurrent_connections,
                    b.queue_capacity,
                    config.check_interval_for(b),
                    b.algorithm.unwrap_or(config.routing.algorithm),
                );
                lb.up = b.up;
                lb.refresh_health(&servers, 0);
                lb
            })
            .collect();

        let leader = balancers.iter().find(|lb| lb.up).map(|lb| lb.id);

        Ok(Self {
            clock: SimClock::new(),
            tick_ms: config.simulation.tick_ms,
            next_request_id: 1,
            arrival_remainder: 0.0,
            cursor: 0,
            ewma_alpha: config.simulation.ewma_alpha,
            congestion_alpha: config.simulation.congestion_alpha,
            recovery_delay_ms: config.health.recovery_delay_ms,
            breaker_cooldown_ms: config.health.breaker_cooldown_ms,
            capacity_aware_routing: config.routing.capacity_aware,
            algorithm: config.routing.algorithm,
            workload: config.workload.clone(),
            balancers,
            servers,
            leader,
            log: EventLog::new(config.limits.log_capacity),
            metrics: RingBuffer::new(config.limits.metrics_capacity),
            totals: Totals::default(),
            windows: SampleWindows::new(config.limits.window_capacity),
            chaos: config.chaos.clone(),
            rng: ChaCha8Rng::seed_from_u64(config.simulation.seed),
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn server(&self, id: u32) -> Option<&ServerState> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn balancer(&self, id: u32) -> Option<&LoadBalancerState> {
        self.balancers.iter().find(|lb| lb.id == id)
    }

    pub(crate) fn server_index(&self, id: u32) -> Option<usize> {
        self.servers.iter().position(|s| s.id == id)
    }

    pub(crate) fn balancer_index(&self, id: u32) -> Option<usize> {
        self.balancers.iter().position(|lb| lb.id == id)
    }

    pub fn leader_balancer(&self) -> Option<&LoadBalancerState> {
        self.leader.and_then(|id| self.balancer(id))
    }

    /// The algorithm the leader routes with.
    pub fn active_algorithm(&self) -> Algorithm {
        self.leader_balancer()
            .map_or(self.algorithm, |lb| lb.algorithm)
    }

    /// Requests queued at a balancer, queued at a server, or in flight.
    pub fn live_requests(&self) -> usize {
        let at_balancers: usize = self.balancers.iter().map(|lb| lb.queue.len()).sum();
        let at_servers: usize = self
            .servers
            .iter()
            .map(|s| s.queue.len() + s.inflight.len())
            .sum();
        at_balancers + at_servers
    }

    /// `started == completed + failures + live`.
    pub fn is_conserved(&self) -> bool {
        let t = &self.totals;
        t.started == t.completed + t.all_failures() + self.live_requests() as u64
    }

    pub(crate) fn record(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }
}
