//! TOML configuration parsing for LBSim.
//!
//! Defines the complete configuration schema for a simulation run: tick and
//! model parameters, routing, health checking, workload, buffer limits, the
//! opt-in chaos knobs, and the server and load balancer descriptors.

use crate::server::Health;
use crate::workload::Workload;
use lbsim_algorithms::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Largest accepted capacity for any bounded history.
pub const MAX_HISTORY_CAPACITY: usize = 1_000_000;
/// Largest accepted arrival rate, in requests/second.
pub const MAX_ARRIVAL_RATE: f64 = 1_000_000.0;
/// Largest number of arrivals one configured tick may produce at peak rate.
pub const MAX_ARRIVALS_PER_TICK: f64 = 100_000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub workload: Workload,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub chaos: ChaosSection,
    pub servers: Vec<ServerConfig>,
    pub balancers: Vec<BalancerConfig>,
}

/// General simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Seed for the chaos RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Default tick size in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Smoothing constant of the per-server latency estimate.
    #[serde(default = "default_alpha")]
    pub ewma_alpha: f64,
    /// Strength of the quadratic congestion penalty on service time.
    #[serde(default = "default_alpha")]
    pub congestion_alpha: f64,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}
fn default_seed() -> u64 {
    42
}
fn default_tick_ms() -> u64 {
    100
}
fn default_alpha() -> f64 {
    0.2
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
            tick_ms: default_tick_ms(),
            ewma_alpha: default_alpha(),
            congestion_alpha: default_alpha(),
        }
    }
}

/// Routing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSection {
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Exclude servers with neither a free slot nor queue space from
    /// routing. When off, overflow fails at dispatch and opens the breaker.
    #[serde(default = "default_true")]
    pub capacity_aware: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            capacity_aware: true,
        }
    }
}

/// Health checking, recovery and circuit breaking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSection {
    /// Interval used by balancers that do not set their own.
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,
    /// How long a server stays DOWN before a health check brings it back.
    #[serde(default = "default_recovery_delay")]
    pub recovery_delay_ms: u64,
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_ms: u64,
}

fn default_check_interval() -> u64 {
    1000
}
fn default_recovery_delay() -> u64 {
    5000
}
fn default_breaker_cooldown() -> u64 {
    2000
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval(),
            recovery_delay_ms: default_recovery_delay(),
            breaker_cooldown_ms: default_breaker_cooldown(),
        }
    }
}

/// Capacities of the bounded histories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsSection {
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    #[serde(default = "default_metrics_capacity")]
    pub metrics_capacity: usize,
    /// Samples kept per rolling latency/wait window.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

fn default_log_capacity() -> usize {
    200
}
fn default_metrics_capacity() -> usize {
    600
}
fn default_window_capacity() -> usize {
    200
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            metrics_capacity: default_metrics_capacity(),
            window_capacity: default_window_capacity(),
        }
    }
}

/// Opt-in stochastic perturbations. All zero by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaosSection {
    /// Service time is scaled by `1 + latency_jitter × u`, `u ∈ [-1, 1)`.
    #[serde(default)]
    pub latency_jitter: f64,
    /// Per-tick chance that each non-DOWN server is forced DOWN.
    #[serde(default)]
    pub server_down_probability: f64,
}

/// One server descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: u32,
    #[serde(default = "default_base_latency")]
    pub base_latency_ms: f64,
    #[serde(default = "default_slow_multiplier")]
    pub slow_multiplier: f64,
    #[serde(default)]
    pub health: Health,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_server_queue")]
    pub queue_capacity: usize,
}

fn default_base_latency() -> f64 {
    100.0
}
fn default_slow_multiplier() -> f64 {
    2.0
}
fn default_weight() -> u32 {
    1
}
fn default_max_concurrent() -> usize {
    4
}
fn default_server_queue() -> usize {
    8
}

impl ServerConfig {
    /// A healthy server with default capacities.
    pub fn new(id: u32, base_latency_ms: f64) -> Self {
        Self {
            id,
            base_latency_ms,
            slow_multiplier: default_slow_multiplier(),
            health: Health::Up,
            weight: default_weight(),
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_server_queue(),
        }
    }
}

/// One load balancer descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerConfig {
    pub id: u32,
    #[serde(default = "default_admissions")]
    pub max_admissions_per_sec: f64,
    #[serde(default = "default_connections")]
    pub max_concurrent_connections: u32,
    #[serde(default = "default_lb_queue")]
    pub queue_capacity: usize,
    /// Overrides `[health].check_interval_ms`.
    #[serde(default)]
    pub health_check_interval_ms: Option<u64>,
    /// Overrides `[routing].algorithm`.
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    #[serde(default = "default_true")]
    pub up: bool,
}

fn default_admissions() -> f64 {
    1000.0
}
fn default_connections() -> u32 {
    100
}
fn default_lb_queue() -> usize {
    50
}

impl BalancerConfig {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            max_admissions_per_sec: default_admissions(),
            max_concurrent_connections: default_connections(),
            queue_capacity: default_lb_queue(),
            health_check_interval_ms: None,
            algorithm: None,
            up: true,
        }
    }
}

impl Default for SimConfig {
    /// Three identical servers behind a primary/standby balancer pair.
    fn default() -> Self {
        Self {
            simulation: SimulationSection::default(),
            routing: RoutingSection::default(),
            health: HealthSection::default(),
            workload: Workload::default(),
            limits: LimitsSection::default(),
            chaos: ChaosSection::default(),
            servers: (0..3).map(|id| ServerConfig::new(id, 100.0)).collect(),
            balancers: (0..2).map(BalancerConfig::new).collect(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_ms == 0 {
            return Err(ConfigError::Validation("tick_ms must be > 0".to_string()));
        }
        for (name, alpha) in [
            ("ewma_alpha", sim.ewma_alpha),
            ("congestion_alpha", sim.congestion_alpha),
        ] {
            if !alpha.is_finite() || alpha < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be a finite value >= 0, got {}",
                    name, alpha
                )));
            }
        }
        if sim.ewma_alpha > 1.0 {
            return Err(ConfigError::Validation(
                "ewma_alpha must be <= 1".to_string(),
            ));
        }
        if self.health.check_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "check_interval_ms must be > 0".to_string(),
            ));
        }

        for (name, capacity) in [
            ("log_capacity", self.limits.log_capacity),
            ("metrics_capacity", self.limits.metrics_capacity),
            ("window_capacity", self.limits.window_capacity),
        ] {
            if capacity > MAX_HISTORY_CAPACITY {
                return Err(ConfigError::Validation(format!(
                    "{} must be <= {}, got {}",
                    name, MAX_HISTORY_CAPACITY, capacity
                )));
            }
        }

        let mut peak_rate: f64 = 0.0;
        for rate in self.workload.configured_rates() {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "workload rates must be finite and >= 0, got {}",
                    rate
                )));
            }
            if rate > MAX_ARRIVAL_RATE {
                return Err(ConfigError::Validation(format!(
                    "workload rate {} exceeds {} req/s",
                    rate, MAX_ARRIVAL_RATE
                )));
            }
            peak_rate = peak_rate.max(rate);
        }
        if peak_rate * sim.tick_ms as f64 / 1000.0 > MAX_ARRIVALS_PER_TICK {
            return Err(ConfigError::Validation(format!(
                "workload peak of {} req/s with tick_ms {} exceeds {} arrivals per tick",
                peak_rate, sim.tick_ms, MAX_ARRIVALS_PER_TICK
            )));
        }

        let chaos = &self.chaos;
        if !(0.0..1.0).contains(&chaos.latency_jitter) {
            return Err(ConfigError::Validation(
                "latency_jitter must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&chaos.server_down_probability) {
            return Err(ConfigError::Validation(
                "server_down_probability must be in [0, 1]".to_string(),
            ));
        }

        if self.servers.is_empty() {
            return Err(ConfigError::Validation(
                "at least one server is required".to_string(),
            ));
        }
        let mut ids = BTreeSet::new();
        for server in &self.servers {
            if !ids.insert(server.id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate server id {}",
                    server.id
                )));
            }
            if !server.base_latency_ms.is_finite() || server.base_latency_ms <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "server {}: base_latency_ms must be > 0",
                    server.id
                )));
            }
            if !server.slow_multiplier.is_finite() || server.slow_multiplier <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "server {}: slow_multiplier must be > 0",
                    server.id
                )));
            }
            if server.max_concurrent == 0 {
                return Err(ConfigError::Validation(format!(
                    "server {}: max_concurrent must be > 0",
                    server.id
                )));
            }
        }

        if self.balancers.is_empty() {
            return Err(ConfigError::Validation(
                "at least one balancer is required".to_string(),
            ));
        }
        let mut ids = BTreeSet::new();
        for lb in &self.balancers {
            if !ids.insert(lb.id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate balancer id {}",
                    lb.id
                )));
            }
            if !lb.max_admissions_per_sec.is_finite() || lb.max_admissions_per_sec < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "balancer {}: max_admissions_per_sec must be >= 0",
                    lb.id
                )));
            }
            if lb.health_check_interval_ms == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "balancer {}: health_check_interval_ms must be > 0",
                    lb.id
                )));
            }
        }
        Ok(())
    }

    /// Health-check interval in effect for `lb`.
    pub fn check_interval_for(&self, lb: &BalancerConfig) -> u64 {
        lb.health_check_interval_ms
            .unwrap_or(self.health.check_interval_ms)
    }
}
