//! Lowest-EWMA-latency routing algorithm.

use crate::traits::*;
use std::cmp::Ordering;

/// Routes to the available server with the lowest smoothed latency estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EwmaLatency;

impl EwmaLatency {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingAlgorithm for EwmaLatency {
    fn select(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        let best = ctx.candidates().into_iter().min_by(|a, b| {
            a.ewma_latency_ms
                .partial_cmp(&b.ewma_latency_ms)
                .unwrap_or(Ordering::Equal)
        });

        match best {
            Some(best) => RoutingDecision::Route {
                server_id: best.id,
                cursor: ctx.cursor,
                reason: format!(
                    "ewma latency: server {} estimate {:.1}ms",
                    best.id, best.ewma_latency_ms
                ),
            },
            None => RoutingDecision::no_candidates(),
        }
    }

    fn name(&self) -> &'static str {
        "ewma_latency"
    }
}
