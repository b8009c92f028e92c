//! Weighted round-robin routing algorithm.
//!
//! Each server owns a contiguous range of slots proportional to its weight.
//! The cursor walks the slot space `0..Σweights`, so over one full cycle
//! every server is picked exactly `weight` times.

use crate::traits::*;

/// Weighted round-robin router. Weights below 1 count as 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingAlgorithm for WeightedRoundRobin {
    fn select(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        let candidates = ctx.candidates();
        if candidates.is_empty() {
            return RoutingDecision::no_candidates();
        }

        let total: u64 = candidates.iter().map(|s| s.weight.max(1) as u64).sum();
        let slot = ctx.cursor % total;

        let mut upper = 0u64;
        let mut chosen = candidates[candidates.len() - 1];
        for server in candidates.iter().copied() {
            upper += server.weight.max(1) as u64;
            if slot < upper {
                chosen = server;
                break;
            }
        }

        RoutingDecision::Route {
            server_id: chosen.id,
            cursor: ctx.cursor.wrapping_add(1),
            reason: format!(
                "weighted round robin: slot {} of {} -> server {} (weight {})",
                slot,
                total,
                chosen.id,
                chosen.weight.max(1)
            ),
        }
    }

    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }
}
