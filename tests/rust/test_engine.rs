/// Integration tests for the simulation engine.
use lbsim_algorithms::Algorithm;
use lbsim_core::config::{BalancerConfig, ServerConfig, SimConfig};
use lbsim_core::engine::{self, step};
use lbsim_core::{EventKind, Health, RequestStatus, SimulationState, Workload};
use std::collections::BTreeSet;

fn production_config() -> SimConfig {
    SimConfig::from_str(
        r#"
[simulation]
name = "integration-test"
seed = 42
tick_ms = 100

[routing]
algorithm = "least_connections"

[health]
check_interval_ms = 1000
recovery_delay_ms = 3000
breaker_cooldown_ms = 1500

[workload]
kind = "burst"
base_rate = 30
burst_rate = 120
cycle_ms = 5000
burst_ms = 1500

[limits]
log_capacity = 100000
metrics_capacity = 1000
window_capacity = 500

[[servers]]
id = 0
base_latency_ms = 80
max_concurrent = 4
queue_capacity = 6

[[servers]]
id = 1
base_latency_ms = 120
max_concurrent = 4
queue_capacity = 6

[[servers]]
id = 2
base_latency_ms = 200
health = "slow"
slow_multiplier = 1.5
max_concurrent = 2
queue_capacity = 4

[[balancers]]
id = 0
max_admissions_per_sec = 400
max_concurrent_connections = 16
queue_capacity = 40

[[balancers]]
id = 1
max_admissions_per_sec = 200
queue_capacity = 20
"#,
    )
    .unwrap()
}

fn initial(config: &SimConfig) -> SimulationState {
    SimulationState::from_config(config).unwrap()
}

fn assert_capacity_bounds(state: &SimulationState) {
    for server in &state.servers {
        assert!(
            server.inflight.len() <= server.max_concurrent,
            "server {} over concurrency at {}ms",
            server.id,
            state.now_ms()
        );
        assert!(
            server.queue.len() <= server.queue_capacity,
            "server {} queue overflow at {}ms",
            server.id,
            state.now_ms()
        );
    }
    for lb in &state.balancers {
        assert!(lb.queue.len() <= lb.queue_capacity);
        assert!(lb.active_connections <= lb.max_concurrent_connections);
    }
}

#[test]
fn test_conservation_every_tick() {
    let mut state = initial(&production_config());
    for _ in 0..300 {
        state = engine::tick(state);
        assert!(
            state.is_conserved(),
            "conservation broken at {}ms: {:?}, live {}",
            state.now_ms(),
            state.totals,
            state.live_requests()
        );
        assert_capacity_bounds(&state);
    }
    assert!(state.totals.started > 0);
    assert!(state.totals.completed > 0);
}

#[test]
fn test_conservation_under_failures() {
    let mut config = production_config();
    config.routing.capacity_aware = false;
    config.workload = Workload::Steady { rate: 400.0 };
    let mut state = initial(&config);
    for t in 0..200 {
        if t == 50 {
            state = engine::set_server_health(state, 1, Health::Down);
        }
        if t == 80 {
            state = engine::set_balancer_up(state, 0, false);
        }
        state = engine::tick(state);
        assert!(state.is_conserved());
        assert_capacity_bounds(&state);
    }
    let reasons = &state.totals.by_reason;
    assert!(reasons.server_queue_full > 0);
    assert!(reasons.server_unavailable > 0);
    assert!(reasons.admission_queue_full > 0);
}

#[test]
fn test_request_ids_unique_and_logged_once() {
    let mut state = initial(&production_config());
    state = engine::run_for(state, 20_000);
    assert_eq!(state.next_request_id, state.totals.started + 1);

    let terminal: Vec<u64> = state
        .log
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                EventKind::Request(RequestStatus::Completed)
                    | EventKind::Request(RequestStatus::Failed)
            )
        })
        .filter_map(|e| e.request_id)
        .collect();
    let unique: BTreeSet<u64> = terminal.iter().copied().collect();
    assert_eq!(unique.len(), terminal.len(), "a request reached two terminal states");
    assert_eq!(
        terminal.len() as u64,
        state.totals.completed + state.totals.all_failures()
    );
    assert!(unique.iter().all(|id| *id >= 1 && *id < state.next_request_id));
}

#[test]
fn test_arrival_ids_strictly_increase() {
    let mut state = initial(&production_config());
    let mut last_seen = state.next_request_id;
    for _ in 0..100 {
        state = engine::tick(state);
        assert!(state.next_request_id >= last_seen);
        last_seen = state.next_request_id;
        for lb in &state.balancers {
            let ids: Vec<u64> = lb.queue.iter().map(|r| r.id).collect();
            assert!(ids.windows(2).all(|w| w[0] < w[1]), "LB queue out of order");
        }
    }
}

#[test]
fn test_leader_failover_and_total_outage() {
    let mut state = initial(&production_config());
    state = engine::run_for(state, 1_000);
    assert_eq!(state.leader, Some(0));

    state = engine::set_balancer_up(state, 0, false);
    state = engine::tick(state);
    assert_eq!(state.leader, Some(1));
    assert_eq!(state.active_algorithm(), Algorithm::LeastConnections);

    state = engine::set_balancer_up(state, 1, false);
    let before = state.totals.by_reason.no_active_balancer;
    state = engine::run_for(state, 1_000);
    assert_eq!(state.leader, None);
    assert!(state.totals.by_reason.no_active_balancer > before);
    assert!(state.is_conserved());

    state = engine::set_balancer_up(state, 0, true);
    state = engine::tick(state);
    assert_eq!(state.leader, Some(0));
}

#[test]
fn test_idle_balancer_queue_is_preserved() {
    let mut config = production_config();
    config.balancers[0].max_admissions_per_sec = 0.0;
    let mut state = initial(&config);
    state = engine::run_for(state, 500);
    let queued = state.balancers[0].queue.len();
    assert!(queued > 0);

    // The standby takes over; the old leader's backlog stays put.
    state = engine::set_balancer_up(state, 0, false);
    state = engine::run_for(state, 500);
    assert_eq!(state.balancers[0].queue.len(), queued);
    assert!(state.is_conserved());
}

#[test]
fn test_down_server_drains_existing_work() {
    let mut config = SimConfig::default();
    config.servers = vec![ServerConfig {
        max_concurrent: 2,
        queue_capacity: 4,
        ..ServerConfig::new(0, 500.0)
    }];
    config.balancers = vec![BalancerConfig::new(0)];
    config.workload = Workload::Steady { rate: 40.0 };
    let mut state = initial(&config);
    state = step(state, 100);
    let holding = state.servers[0].inflight.len() + state.servers[0].queue.len();
    assert_eq!(holding, 4);

    state = engine::set_server_health(state, 0, Health::Down);
    state = engine::set_workload(state, Workload::Idle);
    state = engine::run_for(state, 2_000);
    assert_eq!(state.servers[0].processed, 4);
    assert_eq!(state.live_requests(), 0);
}

#[test]
fn test_histories_are_bounded() {
    let mut config = production_config();
    config.limits.log_capacity = 50;
    config.limits.metrics_capacity = 20;
    config.limits.window_capacity = 10;
    let state = engine::run_for(initial(&config), 10_000);
    assert_eq!(state.log.len(), 50);
    assert_eq!(state.metrics.len(), 20);
    assert_eq!(state.windows.latency_ms.len(), 10);
    let times: Vec<u64> = state.metrics.iter().map(|m| m.time_ms).collect();
    assert_eq!(times.first(), Some(&8_100));
    assert_eq!(times.last(), Some(&10_000));
}

#[test]
fn test_metrics_sample_fields() {
    let state = engine::run_for(initial(&production_config()), 5_000);
    let sample = state.metrics.latest().unwrap();
    assert_eq!(sample.time_ms, 5_000);
    assert_eq!(sample.completed, state.totals.completed);
    assert!(sample.mean_latency_ms > 0.0);
    assert!(sample.p95_latency_ms >= sample.mean_latency_ms * 0.5);
    assert!((0.0..=1.0).contains(&sample.failure_rate));
    let inflight: usize = state.servers.iter().map(|s| s.inflight.len()).sum();
    assert_eq!(sample.inflight, inflight);
}

#[test]
fn test_state_snapshot_serializes() {
    let state = engine::run_for(initial(&production_config()), 2_000);
    let json = serde_json::to_string(&state).unwrap();
    let restored: SimulationState = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.now_ms(), state.now_ms());
    assert_eq!(restored.totals, state.totals);
    assert_eq!(restored.live_requests(), state.live_requests());
}

#[test]
fn test_run_simulation_summary() {
    let summary = lbsim_core::run_simulation(&production_config(), 30_000).unwrap();
    assert_eq!(summary.algorithm, "least_connections");
    assert_eq!(summary.duration_ms, 30_000);
    assert_eq!(summary.per_server_processed.len(), 3);
    assert_eq!(
        summary.totals.started,
        summary.totals.completed + summary.totals.all_failures() + summary.live
    );
    assert!(summary.jains_fairness_index > 0.0 && summary.jains_fairness_index <= 1.0);
    let table = lbsim_core::metrics::format_table(&summary);
    assert!(table.contains("least_connections"));
}

#[test]
fn test_compare_skips_unknown_algorithms() {
    let results = lbsim_core::compare_algorithms(
        &production_config(),
        5_000,
        &["round_robin", "not_an_algorithm", "power_of_two"],
    )
    .unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.algorithm.as_str()).collect();
    assert_eq!(names, vec!["round_robin", "power_of_two"]);
}
