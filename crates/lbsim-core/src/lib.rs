//! LBSim — discrete-time simulator for load-balanced request routing.
//!
//! This crate provides the core simulation engine that models load
//! balancers, servers, their queues and health, and the requests flowing
//! between them. Routing algorithms from `lbsim-algorithms` pick a server
//! for each request the leading balancer drains.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Workload │────▶│  Engine   │────▶│   Metrics    │
//! │  (rate)  │     │  (ticks)  │     │  + Event log │
//! └──────────┘     └─────┬─────┘     └──────────────┘
//!                        │
//!                ┌───────┴───────┐
//!                │ Leader LB     │
//!                │ queue, health │
//!                │ snapshot, algo│
//!                └───────┬───────┘
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ Server 0 │  │ Server 1 │  │ Server N │
//!    │ inflight │  │ inflight │  │ inflight │
//!    │  queue   │  │  queue   │  │  queue   │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```

pub mod balancer;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod request;
pub mod ring;
pub mod server;
pub mod state;
pub mod workload;

// Re-export key types for convenience.
pub use balancer::LoadBalancerState;
pub use clock::SimClock;
pub use config::{ConfigError, SimConfig};
pub use engine::{
    run_for, set_algorithm, set_balancer_up, set_server_health, set_workload, step, tick,
};
pub use events::{EventKind, EventLog, LogEntry};
pub use metrics::{MetricsSample, Percentiles, RunSummary, Totals};
pub use request::{FailureCategory, FailureReason, Request, RequestStatus};
pub use ring::RingBuffer;
pub use server::{Health, ServerState};
pub use state::SimulationState;
pub use workload::{available_workloads, workload_by_name, Workload};

/// Run a complete simulation of `duration_ms` and summarize it.
pub fn run_simulation(config: &SimConfig, duration_ms: u64) -> Result<RunSummary, ConfigError> {
    let state = SimulationState::from_config(config)?;
    let state = run_for(state, duration_ms);
    Ok(RunSummary::from_state(&state))
}

/// Run the same config once per named algorithm. Unknown names are skipped.
pub fn compare_algorithms(
    config: &SimConfig,
    duration_ms: u64,
    algorithm_names: &[&str],
) -> Result<Vec<RunSummary>, ConfigError> {
    algorithm_names
        .iter()
        .filter_map(|name| lbsim_algorithms::algorithm_by_name(name))
        .map(|algorithm| {
            let mut cfg = config.clone();
            cfg.routing.algorithm = algorithm;
            for lb in &mut cfg.balancers {
                lb.algorithm = None;
            }
            run_simulation(&cfg, duration_ms)
        })
        .collect()
}
