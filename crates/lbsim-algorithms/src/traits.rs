//! Routing algorithm trait definitions.
//!
//! All routing algorithms implement the [`RoutingAlgorithm`] trait, which
//! receives a [`RoutingContext`] (server snapshots, the pre-filtered set of
//! available ids, the shared cursor and the request id) and returns a
//! [`RoutingDecision`].

use serde::{Deserialize, Serialize};

/// Read-only snapshot of a server's state, provided to routing algorithms.
///
/// This is the algorithms crate's view of a server. It contains only the
/// information needed for routing decisions, not the full simulation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub id: u32,
    pub weight: u32,
    pub inflight: u32,
    pub queued: u32,
    pub ewma_latency_ms: f64,
}

impl ServerSnapshot {
    /// Combined in-flight and queued work.
    pub fn load(&self) -> u32 {
        self.inflight + self.queued
    }
}

/// Everything an algorithm may look at when choosing a server.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext<'a> {
    /// The full server set, in configuration order.
    pub servers: &'a [ServerSnapshot],
    /// Ids the load balancer currently considers available, in first-seen order.
    pub available: &'a [u32],
    /// Shared routing cursor carried between decisions.
    pub cursor: u64,
    /// Id of the request being routed.
    pub request_id: u64,
}

impl<'a> RoutingContext<'a> {
    /// Resolve the available ids to snapshots, preserving the order of
    /// `available`. Ids with no matching snapshot are skipped.
    pub fn candidates(&self) -> Vec<&'a ServerSnapshot> {
        let servers = self.servers;
        self.available
            .iter()
            .filter_map(|id| servers.iter().find(|s| s.id == *id))
            .collect()
    }
}

/// Decision returned by a routing algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoutingDecision {
    /// Route to a server; `cursor` is the value the caller must carry forward.
    Route {
        server_id: u32,
        cursor: u64,
        reason: String,
    },
    /// No server could be chosen.
    Reject { reason: String },
}

impl RoutingDecision {
    /// Shorthand for the empty-candidate rejection every algorithm shares.
    pub fn no_candidates() -> Self {
        RoutingDecision::Reject {
            reason: "no available servers".to_string(),
        }
    }

    pub fn server_id(&self) -> Option<u32> {
        match self {
            RoutingDecision::Route { server_id, .. } => Some(*server_id),
            RoutingDecision::Reject { .. } => None,
        }
    }
}

/// The core routing algorithm trait.
///
/// Algorithms are stateless: anything that must survive between decisions
/// (the round-robin cursor) travels through the context and the decision.
pub trait RoutingAlgorithm {
    /// Choose a server for the request described by `ctx`.
    fn select(&self, ctx: &RoutingContext<'_>) -> RoutingDecision;

    /// Stable identifier used in configuration and reports.
    fn name(&self) -> &'static str;
}
