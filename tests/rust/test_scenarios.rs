/// End-to-end scenarios with exact expected outcomes.
use lbsim_algorithms::Algorithm;
use lbsim_core::config::{BalancerConfig, ServerConfig, SimConfig};
use lbsim_core::{engine, EventKind, FailureReason, Health, RequestStatus, SimulationState, Workload};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn base_config(servers: Vec<ServerConfig>, rate: f64) -> SimConfig {
    let mut config = SimConfig::default();
    config.simulation.tick_ms = 100;
    config.workload = Workload::Steady { rate };
    config.servers = servers;
    config.balancers = vec![BalancerConfig {
        max_admissions_per_sec: 1000.0,
        ..BalancerConfig::new(0)
    }];
    config
}

fn start(config: &SimConfig) -> SimulationState {
    SimulationState::from_config(config).unwrap()
}

#[test]
fn test_balanced_steady_state() {
    let servers = (0..3)
        .map(|id| ServerConfig {
            max_concurrent: 4,
            ..ServerConfig::new(id, 100.0)
        })
        .collect();
    let config = base_config(servers, 30.0);
    let state = engine::run_for(start(&config), 10_000);

    let processed: Vec<u64> = state.servers.iter().map(|s| s.processed).collect();
    assert_eq!(processed, vec![100, 100, 100]);
    for server in &state.servers {
        assert!(server.queue.is_empty());
        assert_eq!(server.mean_processing_ms(), 100.0);
    }
    assert!(state.balancers[0].queue.is_empty());
    assert_eq!(state.totals.all_failures(), 0);
}

#[test]
fn test_admission_queue_overflow() {
    let mut config = base_config(vec![ServerConfig::new(0, 100.0)], 20.0);
    config.balancers[0].queue_capacity = 1;
    config.balancers[0].max_admissions_per_sec = 0.0;
    let state = engine::step(start(&config), 100);

    assert_eq!(state.totals.started, 2);
    assert_eq!(state.totals.dropped_by_lb, 1);
    assert_eq!(state.balancers[0].dropped, 1);
    assert_eq!(state.balancers[0].queue.len(), 1);
    let entry = state
        .log
        .iter()
        .find(|e| e.kind == EventKind::Request(RequestStatus::Failed))
        .unwrap();
    assert_eq!(entry.message, "admission queue full");
    assert_eq!(entry.request_id, Some(2));
}

#[test]
fn test_slow_server_under_load() {
    let servers = vec![ServerConfig {
        health: Health::Slow,
        slow_multiplier: 1.8,
        max_concurrent: 4,
        ..ServerConfig::new(0, 100.0)
    }];
    let mut config = base_config(servers, 18.0);
    // 1ms ticks so measured durations are not rounded up to 100ms.
    config.simulation.tick_ms = 1;

    config.simulation.congestion_alpha = 0.0;
    let uncongested = engine::run_for(start(&config), 10_000);
    config.simulation.congestion_alpha = 0.2;
    let congested = engine::run_for(start(&config), 10_000);

    let plain = &uncongested.servers[0];
    let loaded = &congested.servers[0];
    assert!(plain.processed > 0 && loaded.processed > 0);
    assert_eq!(plain.mean_processing_ms(), 180.0);
    assert!(
        loaded.mean_processing_ms() > 185.0,
        "mean processing {}",
        loaded.mean_processing_ms()
    );
    assert!(congested.is_conserved());
}

#[test]
fn test_stale_health_window() {
    let servers = (0..2).map(|id| ServerConfig::new(id, 50.0)).collect();
    let mut config = base_config(servers, 20.0);
    config.health.check_interval_ms = 1000;
    let mut state = engine::run_for(start(&config), 500);
    state = engine::set_server_health(state, 1, Health::Down);

    // Ticks at 500..=900 still route to server 1 from the t=0 snapshot.
    state = engine::run_for(state, 500);
    assert_eq!(state.totals.by_reason.server_unavailable, 5);
    assert_eq!(state.servers[1].failed, 5);
    let stale_failures = state
        .log
        .iter()
        .filter(|e| e.kind == EventKind::Request(RequestStatus::Failed))
        .filter(|e| e.server_id == Some(1))
        .count();
    assert_eq!(stale_failures, 5);
    assert!(state
        .log
        .iter()
        .filter(|e| e.server_id == Some(1) && e.kind == EventKind::Request(RequestStatus::Failed))
        .all(|e| e.message == FailureReason::ServerUnavailable.as_str()));

    // The check at 1000 sees the outage.
    state = engine::run_for(state, 2_000);
    assert_eq!(state.totals.by_reason.server_unavailable, 5);
    assert!(!state.balancers[0].believes_available(1));
    assert_eq!(state.totals.failed, 5);
    assert!(state.is_conserved());
}

#[test]
fn test_circuit_breaker_cooldown() {
    let servers = vec![ServerConfig {
        max_concurrent: 1,
        queue_capacity: 0,
        ..ServerConfig::new(0, 1000.0)
    }];
    let mut config = base_config(servers, 20.0);
    config.routing.capacity_aware = false;
    config.health.breaker_cooldown_ms = 1500;
    let mut state = engine::step(start(&config), 100);
    let reasons = &state.totals.by_reason;
    assert_eq!(reasons.server_queue_full, 1);
    assert_eq!(state.servers[0].circuit_open_until_ms, Some(1500));

    // Snapshot from t=0 still says available; dispatch sees the open breaker.
    state = engine::run_for(state, 900);
    assert_eq!(state.totals.by_reason.server_unavailable, 18);
    assert_eq!(state.servers[0].failed, 19);

    // The check at 1000 captures the open breaker.
    state = engine::run_for(state, 1_000);
    assert_eq!(state.totals.by_reason.no_routable_server, 20);

    // At 2000 the breaker has closed and the server is back in rotation.
    state = engine::step(state, 100);
    assert!(state.balancers[0].believes_available(0));
    assert_eq!(state.totals.by_reason.server_queue_full, 2);
    assert_eq!(state.servers[0].inflight.len(), 1);
    assert!(state.is_conserved());
}

#[test]
fn test_ewma_convergence_bound() {
    let servers = vec![ServerConfig::new(0, 50.0)];
    let mut config = base_config(servers, 10.0);
    config.simulation.ewma_alpha = 0.2;
    let mut state = start(&config);

    // Every request takes exactly one 100ms tick.
    for _ in 0..40 {
        state = engine::tick(state);
        let server = &state.servers[0];
        let n = server.processed as i32;
        let bound = 0.8f64.powi(n) * 50.0;
        let error = (server.ewma_latency_ms - 100.0).abs();
        assert!(error <= bound + 1e-9, "n={} error={} bound={}", n, error, bound);
    }
    assert_eq!(state.servers[0].processed, 40);
}

#[test]
fn test_recovery_after_delay() {
    let servers = (0..2).map(|id| ServerConfig::new(id, 50.0)).collect();
    let mut config = base_config(servers, 20.0);
    config.health.recovery_delay_ms = 2500;
    let mut state = engine::set_server_health(start(&config), 1, Health::Down);
    // Checks at 1000 and 2000 are too early; the one at 3000 recovers it.
    state = engine::run_for(state, 3_000);
    assert_eq!(state.servers[1].health, Health::Down);
    state = engine::step(state, 100);
    assert_eq!(state.servers[1].health, Health::Up);
    assert_eq!(state.servers[1].last_transition_ms, 3000);
    assert!(state
        .log
        .iter()
        .any(|e| e.kind == EventKind::HealthChanged && e.message.contains("recovered")));

    let before = state.servers[1].processed;
    state = engine::run_for(state, 1_000);
    assert!(state.servers[1].processed > before);
}

#[test]
fn test_deterministic_with_chaos() {
    let mut config = base_config((0..4).map(|id| ServerConfig::new(id, 120.0)).collect(), 40.0);
    config.routing.algorithm = Algorithm::PowerOfTwoChoices;
    config.simulation.seed = 7;
    config.chaos.latency_jitter = 0.3;
    config.chaos.server_down_probability = 0.002;
    config.health.recovery_delay_ms = 1000;

    let a = engine::run_for(start(&config), 30_000);
    let b = engine::run_for(start(&config), 30_000);
    assert_eq!(a, b);
    assert!(a.is_conserved());

    config.simulation.seed = 8;
    let c = engine::run_for(start(&config), 30_000);
    assert_ne!(a, c);
}

#[test]
fn test_canonical_run_leaves_rng_untouched() {
    let config = base_config((0..3).map(|id| ServerConfig::new(id, 80.0)).collect(), 25.0);
    let state = engine::run_for(start(&config), 5_000);
    assert_eq!(
        state.rng,
        ChaCha8Rng::seed_from_u64(config.simulation.seed)
    );
}

#[test]
fn test_burst_workload_drives_arrivals() {
    let mut config = base_config((0..3).map(|id| ServerConfig::new(id, 50.0)).collect(), 0.0);
    config.workload = Workload::Burst {
        base_rate: 10.0,
        burst_rate: 50.0,
        cycle_ms: 2000,
        burst_ms: 1000,
        offset_ms: 1000,
    };
    let state = engine::run_for(start(&config), 2_000);
    // 1s at 10 req/s then 1s at 50 req/s.
    assert_eq!(state.totals.started, 60);
    let rates: Vec<f64> = state.metrics.iter().map(|m| m.arrival_rate).collect();
    assert_eq!(rates[9], 10.0);
    assert_eq!(rates[10], 50.0);
}
