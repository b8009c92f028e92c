//! Discrete-time simulation engine.
//!
//! [`step`] consumes a [`SimulationState`] and returns the state one tick
//! later. Every tick runs the same fixed pipeline, with `now` being the clock
//! at tick start:
//!
//! 1. fault injection (chaos only), leader election, due health checks
//!    (recovering eligible DOWN servers first)
//! 2. arrivals from the workload plus the carried remainder
//! 3. admission into the leader's queue
//! 4. drain within the leader's budget, route, dispatch
//! 5. promotion of server-queued requests, oldest first
//! 6. progress of in-flight work; completions land at `now + Δt`
//! 7. clock advance and one metrics sample
//!
//! Nothing in a tick can abort. Infeasible paths become classified failures
//! that are counted, logged and traced.

use crate::config::ChaosSection;
use crate::events::{EventKind, LogEntry};
use crate::metrics::MetricsSample;
use crate::request::{FailureReason, Request, RequestStatus};
use crate::server::{Health, Placement, ServerState};
use crate::state::SimulationState;
use crate::workload::{arrivals_for_tick, Workload};
use lbsim_algorithms::{Algorithm, RoutingContext, RoutingDecision, ServerSnapshot};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

/// Advance the simulation by `dt_ms`.
pub fn step(mut state: SimulationState, dt_ms: u64) -> SimulationState {
    let now = state.clock.now_ms();

    inject_server_faults(&mut state, now);
    elect_leader(&mut state, now);
    run_health_checks(&mut state, now);

    let rate = state.workload.rate(now);
    let arrivals = generate_arrivals(&mut state, rate, now, dt_ms);
    admit_arrivals(&mut state, arrivals, now);

    drain_leader_queue(&mut state, now, dt_ms);
    promote_queued(&mut state, now);
    progress_inflight(&mut state, now, dt_ms);

    state.clock.advance_by_ms(dt_ms);
    let sample = MetricsSample::capture(&state, rate);
    state.metrics.push(sample);
    state
}

/// Advance by the configured tick size.
pub fn tick(state: SimulationState) -> SimulationState {
    let dt_ms = state.tick_ms;
    step(state, dt_ms)
}

/// Tick until `duration_ms` of simulated time has passed. The last tick is
/// shortened if the duration is not a multiple of the tick size.
pub fn run_for(mut state: SimulationState, duration_ms: u64) -> SimulationState {
    let tick_ms = state.tick_ms.max(1);
    let mut elapsed = 0;
    while elapsed < duration_ms {
        let dt_ms = tick_ms.min(duration_ms - elapsed);
        state = step(state, dt_ms);
        elapsed += dt_ms;
    }
    state
}

// --- External controls ---

/// Force a server into `health`. Unknown ids leave the state unchanged.
pub fn set_server_health(
    mut state: SimulationState,
    server_id: u32,
    health: Health,
) -> SimulationState {
    let now = state.now_ms();
    let Some(idx) = state.server_index(server_id) else {
        warn!(server_id, "set_server_health: unknown server");
        return state;
    };
    if state.servers[idx].transition(health, now) {
        info!(server_id, %health, "server health changed");
        state.record(
            LogEntry::system(
                now,
                EventKind::HealthChanged,
                format!("server {} is now {}", server_id, health),
            )
            .with_server(server_id),
        );
    }
    state
}

/// Bring a balancer up or take it down. Leadership is re-evaluated at the
/// start of the next tick.
pub fn set_balancer_up(mut state: SimulationState, lb_id: u32, up: bool) -> SimulationState {
    let now = state.now_ms();
    let Some(idx) = state.balancer_index(lb_id) else {
        warn!(lb_id, "set_balancer_up: unknown balancer");
        return state;
    };
    if state.balancers[idx].up != up {
        state.balancers[idx].up = up;
        let verb = if up { "up" } else { "down" };
        info!(lb_id, up, "balancer toggled");
        state.record(
            LogEntry::system(
                now,
                EventKind::BalancerToggled,
                format!("balancer {} is {}", lb_id, verb),
            )
            .with_lb(lb_id),
        );
    }
    state
}

/// Switch every balancer to `algorithm`.
pub fn set_algorithm(mut state: SimulationState, algorithm: Algorithm) -> SimulationState {
    let now = state.now_ms();
    state.algorithm = algorithm;
    for lb in &mut state.balancers {
        lb.algorithm = algorithm;
    }
    info!(%algorithm, "routing algorithm changed");
    state.record(LogEntry::system(
        now,
        EventKind::ConfigChanged,
        format!("routing algorithm set to {}", algorithm),
    ));
    state
}

/// Replace the arrival profile. The carried arrival remainder is kept.
pub fn set_workload(mut state: SimulationState, workload: Workload) -> SimulationState {
    let now = state.now_ms();
    let label = workload.label();
    state.workload = workload;
    info!(workload = %label, "workload changed");
    state.record(LogEntry::system(
        now,
        EventKind::ConfigChanged,
        format!("workload set to {}", label),
    ));
    state
}

// --- Tick phases ---

fn inject_server_faults(state: &mut SimulationState, now: u64) {
    let p = state.chaos.server_down_probability;
    if p <= 0.0 {
        return;
    }
    let mut downed = Vec::new();
    for server in state.servers.iter_mut() {
        if server.health != Health::Down && state.rng.gen::<f64>() < p {
            server.transition(Health::Down, now);
            downed.push(server.id);
        }
    }
    for server_id in downed {
        info!(server_id, "chaos: server forced down");
        state.record(
            LogEntry::system(
                now,
                EventKind::HealthChanged,
                format!("server {} failed", server_id),
            )
            .with_server(server_id),
        );
    }
}

/// Keep the current leader while it is up, else promote the first up
/// balancer in configuration order.
fn elect_leader(state: &mut SimulationState, now: u64) {
    let leader_up = state.leader_balancer().map_or(false, |lb| lb.up);
    let next = if leader_up {
        state.leader
    } else {
        state.balancers.iter().find(|lb| lb.up).map(|lb| lb.id)
    };
    if next == state.leader {
        return;
    }

    let entry = match next {
        Some(lb_id) => {
            info!(lb_id, previous = ?state.leader, "leader elected");
            LogEntry::system(
                now,
                EventKind::LeaderChanged,
                format!("balancer {} is now leader", lb_id),
            )
            .with_lb(lb_id)
        }
        None => {
            warn!(previous = ?state.leader, "no balancer is up");
            LogEntry::system(
                now,
                EventKind::LeaderChanged,
                "no balancer is up".to_string(),
            )
        }
    };
    state.leader = next;
    state.record(entry);
}

fn run_health_checks(state: &mut SimulationState, now: u64) {
    let due: Vec<usize> = state
        .balancers
        .iter()
        .enumerate()
        .filter(|(_, lb)| lb.up && lb.health_check_due(now))
        .map(|(i, _)| i)
        .collect();
    if due.is_empty() {
        return;
    }

    let delay = state.recovery_delay_ms;
    let recovered: Vec<u32> = state
        .servers
        .iter_mut()
        .filter(|s| s.should_recover(now, delay))
        .map(|s| {
            s.transition(Health::Up, now);
            s.id
        })
        .collect();
    for server_id in recovered {
        info!(server_id, "server recovered");
        state.record(
            LogEntry::system(
                now,
                EventKind::HealthChanged,
                format!("server {} recovered", server_id),
            )
            .with_server(server_id),
        );
    }

    for idx in due {
        state.balancers[idx].refresh_health(&state.servers, now);
    }
}

fn generate_arrivals(
    state: &mut SimulationState,
    rate: f64,
    now: u64,
    dt_ms: u64,
) -> Vec<Request> {
    let (count, remainder) = arrivals_for_tick(rate, dt_ms, state.arrival_remainder);
    state.arrival_remainder = remainder;
    (0..count)
        .map(|_| {
            let id = state.next_request_id;
            state.next_request_id += 1;
            state.totals.started += 1;
            Request::new(id, now)
        })
        .collect()
}

fn admit_arrivals(state: &mut SimulationState, arrivals: Vec<Request>, now: u64) {
    let leader_idx = state.leader.and_then(|id| state.balancer_index(id));
    for request in arrivals {
        let Some(idx) = leader_idx else {
            fail_request(state, request, FailureReason::NoActiveBalancer, now);
            continue;
        };
        if let Err(request) = state.balancers[idx].admit(request, now) {
            fail_request(state, request, FailureReason::AdmissionQueueFull, now);
        }
    }
}

fn drain_leader_queue(state: &mut SimulationState, now: u64, dt_ms: u64) {
    let Some(lb_idx) = state.leader.and_then(|id| state.balancer_index(id)) else {
        return;
    };
    let budget = state.balancers[lb_idx].drain_budget(dt_ms);
    for _ in 0..budget {
        let Some(mut request) = state.balancers[lb_idx].queue.pop_front() else {
            break;
        };
        request.lb_exit_ms = Some(now);

        match route(state, lb_idx, request.id) {
            RoutingDecision::Route {
                server_id,
                cursor,
                reason,
            } => {
                state.cursor = cursor;
                request.routing_decision = Some(reason);
                dispatch(state, lb_idx, request, server_id, now);
            }
            RoutingDecision::Reject { reason } => {
                request.routing_decision = Some(reason);
                fail_request(state, request, FailureReason::NoRoutableServer, now);
            }
        }
    }
}

/// Ask the balancer's algorithm for a server among those its snapshot
/// believes available (and, if capacity-aware, that have room).
fn route(state: &SimulationState, lb_idx: usize, request_id: u64) -> RoutingDecision {
    let lb = &state.balancers[lb_idx];
    let snapshots: Vec<ServerSnapshot> = state.servers.iter().map(ServerState::snapshot).collect();
    let available: Vec<u32> = state
        .servers
        .iter()
        .filter(|s| {
            lb.believes_available(s.id)
                && (!state.capacity_aware_routing || s.has_spare_capacity())
        })
        .map(|s| s.id)
        .collect();

    let ctx = RoutingContext {
        servers: &snapshots,
        available: &available,
        cursor: state.cursor,
        request_id,
    };
    lb.algorithm.select(&ctx)
}

fn dispatch(
    state: &mut SimulationState,
    lb_idx: usize,
    mut request: Request,
    server_id: u32,
    now: u64,
) {
    request.server_id = Some(server_id);
    let Some(idx) = state.server_index(server_id) else {
        fail_request(state, request, FailureReason::ServerUnavailable, now);
        return;
    };

    let server = &mut state.servers[idx];
    if !server.is_available(now) {
        server.failed += 1;
        fail_request(state, request, FailureReason::ServerUnavailable, now);
        return;
    }

    // Queued requests get their service time at promotion.
    let service_ms = if server.has_free_slot() {
        service_time(server, state.congestion_alpha, &state.chaos, &mut state.rng)
    } else {
        0.0
    };
    let request_id = request.id;
    let decision = request.routing_decision.clone().unwrap_or_default();

    match server.accept(request, service_ms, now) {
        Ok(placement) => {
            let lb = &mut state.balancers[lb_idx];
            lb.active_connections += 1;
            let lb_id = lb.id;
            let status = match placement {
                Placement::Processing => RequestStatus::Processing,
                Placement::Queued => RequestStatus::ServerQueued,
            };
            state.record(LogEntry {
                time_ms: now,
                request_id: Some(request_id),
                kind: EventKind::Request(status),
                message: decision,
                server_id: Some(server_id),
                lb_id: Some(lb_id),
            });
        }
        Err(request) => {
            server.failed += 1;
            server.trip_breaker(now, state.breaker_cooldown_ms);
            let until = now.saturating_add(state.breaker_cooldown_ms);
            fail_request(state, request, FailureReason::ServerQueueFull, now);
            info!(server_id, until_ms = until, "circuit breaker opened");
            state.record(
                LogEntry::system(
                    now,
                    EventKind::CircuitOpened,
                    format!("server {} circuit open until {}ms", server_id, until),
                )
                .with_server(server_id),
            );
        }
    }
}

fn promote_queued(state: &mut SimulationState, now: u64) {
    let alpha = state.congestion_alpha;
    for server in state.servers.iter_mut() {
        while let Some(request) = server.next_promotable() {
            let service_ms = service_time(server, alpha, &state.chaos, &mut state.rng);
            server.promote(request, service_ms, now);
        }
    }
}

fn progress_inflight(state: &mut SimulationState, now: u64, dt_ms: u64) {
    let end_ms = now.saturating_add(dt_ms);
    let ewma_alpha = state.ewma_alpha;
    let mut completed = Vec::new();
    for server in state.servers.iter_mut() {
        for request in server.progress(dt_ms, end_ms) {
            server.record_completion(request.processing_ms().unwrap_or(0), ewma_alpha);
            completed.push(request);
        }
    }

    for request in completed {
        state.totals.completed += 1;
        state.windows.record(&request);
        if let Some(idx) = request.lb_id.and_then(|id| state.balancer_index(id)) {
            state.balancers[idx].release_connection();
        }
        let message = format!(
            "completed in {}ms",
            request.total_latency_ms().unwrap_or_default()
        );
        state.record(LogEntry::for_request(&request, end_ms, message));
    }
}

/// Service time for a request about to start on `server`, with jitter
/// applied when chaos enables it.
fn service_time(
    server: &ServerState,
    congestion_alpha: f64,
    chaos: &ChaosSection,
    rng: &mut ChaCha8Rng,
) -> f64 {
    let base = server.service_time_ms(congestion_alpha);
    if chaos.latency_jitter > 0.0 {
        let u: f64 = rng.gen_range(-1.0..1.0);
        (base * (1.0 + chaos.latency_jitter * u)).max(0.0)
    } else {
        base
    }
}

fn fail_request(state: &mut SimulationState, mut request: Request, reason: FailureReason, now: u64) {
    request.fail(reason);
    state.totals.record_failure(reason);
    debug!(
        request_id = request.id,
        server_id = ?request.server_id,
        lb_id = ?request.lb_id,
        %reason,
        "request failed"
    );
    let entry = LogEntry::for_request(&request, now, reason.to_string());
    state.record(entry);
}
