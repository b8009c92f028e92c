//! Least-connections routing algorithm.
//!
//! Routes each request to the available server with the fewest in-flight
//! requests. Queued work is not counted.

use crate::traits::*;

/// Least in-flight connections router.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingAlgorithm for LeastConnections {
    fn select(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        // min_by_key keeps the first of equal minima, which is the tie-break.
        match ctx.candidates().into_iter().min_by_key(|s| s.inflight) {
            Some(best) => RoutingDecision::Route {
                server_id: best.id,
                cursor: ctx.cursor,
                reason: format!(
                    "least connections: server {} has {} in flight",
                    best.id, best.inflight
                ),
            },
            None => RoutingDecision::no_candidates(),
        }
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}
