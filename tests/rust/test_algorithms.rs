/// Integration tests for routing algorithms in a simulation context.
use lbsim_algorithms::*;
use lbsim_core::config::{BalancerConfig, ServerConfig, SimConfig};
use lbsim_core::{engine, SimulationState, Workload};

fn small_config(algorithm: Algorithm, servers: Vec<ServerConfig>, rate: f64) -> SimConfig {
    let mut config = SimConfig::default();
    config.routing.algorithm = algorithm;
    config.workload = Workload::Steady { rate };
    config.servers = servers;
    config.balancers = vec![BalancerConfig::new(0)];
    config
}

fn identical_servers(n: u32, base_latency_ms: f64) -> Vec<ServerConfig> {
    (0..n).map(|id| ServerConfig::new(id, base_latency_ms)).collect()
}

fn run(config: &SimConfig, duration_ms: u64) -> SimulationState {
    let state = SimulationState::from_config(config).unwrap();
    engine::run_for(state, duration_ms)
}

fn processed(state: &SimulationState) -> Vec<u64> {
    state.servers.iter().map(|s| s.processed).collect()
}

#[test]
fn test_round_robin_fairness() {
    // 4 servers, 40 req/s, 100ms ticks: 4 arrivals per tick, 40 ticks.
    let config = small_config(Algorithm::RoundRobin, identical_servers(4, 50.0), 40.0);
    let state = run(&config, 4_000);
    assert_eq!(state.totals.started, 160);
    assert_eq!(processed(&state), vec![40, 40, 40, 40]);
}

#[test]
fn test_weighted_round_robin_proportional() {
    let servers = (0..3)
        .map(|id| ServerConfig {
            weight: id + 1,
            ..ServerConfig::new(id, 10.0)
        })
        .collect();
    let config = small_config(Algorithm::WeightedRoundRobin, servers, 60.0);
    let state = run(&config, 10_000);
    assert_eq!(processed(&state), vec![100, 200, 300]);
}

#[test]
fn test_least_connections_spreads_slow_work() {
    // Long requests pile up; least connections keeps in-flight counts level.
    let config = small_config(
        Algorithm::LeastConnections,
        identical_servers(3, 1_000.0),
        20.0,
    );
    let mut state = SimulationState::from_config(&config).unwrap();
    for _ in 0..5 {
        state = engine::tick(state);
        let inflight: Vec<usize> = state.servers.iter().map(|s| s.inflight.len()).collect();
        let max = inflight.iter().max().copied().unwrap_or(0);
        let min = inflight.iter().min().copied().unwrap_or(0);
        assert!(max - min <= 1, "unbalanced in-flight: {:?}", inflight);
    }
}

#[test]
fn test_ewma_latency_prefers_fast_server() {
    let servers = vec![ServerConfig::new(0, 50.0), ServerConfig::new(1, 200.0)];
    let config = small_config(Algorithm::EwmaLatency, servers, 10.0);
    let state = run(&config, 10_000);
    assert_eq!(state.servers[0].processed, 100);
    assert_eq!(state.servers[1].processed, 0);
    // Measured durations are tick-granular, so the estimate climbs toward 100.
    assert!(state.servers[0].ewma_latency_ms > 99.0);
    assert_eq!(state.servers[1].ewma_latency_ms, 200.0);
}

#[test]
fn test_power_of_two_uses_every_server() {
    let config = small_config(
        Algorithm::PowerOfTwoChoices,
        identical_servers(4, 150.0),
        50.0,
    );
    let state = run(&config, 20_000);
    for server in &state.servers {
        assert!(server.processed > 0, "server {} never chosen", server.id);
    }
    let summary = lbsim_core::RunSummary::from_state(&state);
    assert!(summary.jains_fairness_index > 0.9);
}

#[test]
fn test_power_of_two_is_reproducible() {
    let config = small_config(
        Algorithm::PowerOfTwoChoices,
        identical_servers(5, 120.0),
        45.0,
    );
    let a = run(&config, 8_000);
    let b = run(&config, 8_000);
    assert_eq!(processed(&a), processed(&b));
    assert_eq!(a, b);
}

#[test]
fn test_cursor_only_advances_for_cursor_algorithms() {
    let config = small_config(Algorithm::LeastConnections, identical_servers(3, 50.0), 30.0);
    let state = run(&config, 2_000);
    assert_eq!(state.cursor, 0);

    let config = small_config(Algorithm::RoundRobin, identical_servers(3, 50.0), 30.0);
    let state = run(&config, 2_000);
    assert_eq!(state.cursor, 60);
}

#[test]
fn test_switching_algorithm_mid_run() {
    let config = small_config(Algorithm::RoundRobin, identical_servers(2, 50.0), 20.0);
    let mut state = run(&config, 1_000);
    assert_eq!(processed(&state), vec![10, 10]);

    state = engine::set_algorithm(state, Algorithm::EwmaLatency);
    state = engine::run_for(state, 1_000);
    let counts = processed(&state);
    assert_eq!(counts[0] + counts[1], 40);
    assert_eq!(state.active_algorithm(), Algorithm::EwmaLatency);
}

#[test]
fn test_every_algorithm_survives_total_outage() {
    for algorithm in Algorithm::ALL {
        let mut servers = identical_servers(3, 80.0);
        for server in &mut servers {
            server.health = lbsim_core::Health::Down;
        }
        let config = small_config(algorithm, servers, 30.0);
        let state = run(&config, 1_000);
        assert_eq!(state.totals.completed, 0, "{}", algorithm);
        assert_eq!(state.totals.by_reason.no_routable_server, 30, "{}", algorithm);
    }
}
