//! Round-robin routing algorithm.
//!
//! The simplest routing strategy: distributes requests evenly across the
//! available servers in a circular fashion. Ignores server load entirely.

use crate::traits::*;

/// Round-robin router.
///
/// Indexes the available set positionally with `cursor mod |available|`.
/// The cursor advances on every successful selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl RoutingAlgorithm for RoundRobin {
    fn select(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        let candidates = ctx.candidates();
        if candidates.is_empty() {
            return RoutingDecision::no_candidates();
        }

        let index = (ctx.cursor % candidates.len() as u64) as usize;
        let chosen = candidates[index];
        RoutingDecision::Route {
            server_id: chosen.id,
            cursor: ctx.cursor.wrapping_add(1),
            reason: format!(
                "round robin: cursor {} mod {} available -> index {} (server {})",
                ctx.cursor,
                candidates.len(),
                index,
                chosen.id
            ),
        }
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
