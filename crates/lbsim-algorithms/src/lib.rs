//! Built-in routing algorithms for LBSim.
//!
//! This crate provides the [`RoutingAlgorithm`] trait, one implementation per
//! strategy, and the closed [`Algorithm`] registry the engine dispatches on:
//!
//! | Algorithm | Strategy | Tie-break |
//! |-----------|----------|-----------|
//! | [`RoundRobin`] | `cursor mod |available|` | n/a |
//! | [`WeightedRoundRobin`] | Cumulative weight slots | n/a |
//! | [`LeastConnections`] | Fewest in-flight | First seen |
//! | [`EwmaLatency`] | Lowest smoothed latency | First seen |
//! | [`PowerOfTwo`] | Lighter of an id-derived pair | First sample |

pub mod ewma_latency;
pub mod least_connections;
pub mod power_of_two;
pub mod round_robin;
pub mod traits;
pub mod weighted_round_robin;

pub use ewma_latency::EwmaLatency;
pub use least_connections::LeastConnections;
pub use power_of_two::PowerOfTwo;
pub use round_robin::RoundRobin;
pub use traits::*;
pub use weighted_round_robin::WeightedRoundRobin;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of routing strategies, keyed by their config id.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    EwmaLatency,
    #[serde(rename = "power_of_two")]
    PowerOfTwoChoices,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::RoundRobin,
        Algorithm::WeightedRoundRobin,
        Algorithm::LeastConnections,
        Algorithm::EwmaLatency,
        Algorithm::PowerOfTwoChoices,
    ];

    /// Run this strategy against `ctx`.
    pub fn select(self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        match self {
            Algorithm::RoundRobin => RoundRobin.select(ctx),
            Algorithm::WeightedRoundRobin => WeightedRoundRobin.select(ctx),
            Algorithm::LeastConnections => LeastConnections.select(ctx),
            Algorithm::EwmaLatency => EwmaLatency.select(ctx),
            Algorithm::PowerOfTwoChoices => PowerOfTwo.select(ctx),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::RoundRobin => RoundRobin.name(),
            Algorithm::WeightedRoundRobin => WeightedRoundRobin.name(),
            Algorithm::LeastConnections => LeastConnections.name(),
            Algorithm::EwmaLatency => EwmaLatency.name(),
            Algorithm::PowerOfTwoChoices => PowerOfTwo.name(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAlgorithm(pub String);

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown routing algorithm '{}' (available: {})",
            self.0,
            available_algorithms().join(", ")
        )
    }
}

impl std::error::Error for UnknownAlgorithm {}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        algorithm_by_name(s).ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// Look up a routing algorithm by its id.
pub fn algorithm_by_name(name: &str) -> Option<Algorithm> {
    Algorithm::ALL.into_iter().find(|a| a.name() == name)
}

/// List all available built-in algorithm ids.
pub fn available_algorithms() -> Vec<&'static str> {
    Algorithm::ALL.iter().map(|a| a.name()).collect()
}
