//! Arrival-rate generators.
//!
//! A [`Workload`] is a pure function of elapsed simulated time returning a
//! request rate in requests/second. The engine turns `rate × Δt` into whole
//! arrivals and carries the fractional remainder between ticks.

use serde::{Deserialize, Serialize};

/// Arrival-rate profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Workload {
    /// No arrivals.
    Idle,
    /// Constant rate.
    Steady { rate: f64 },
    /// Baseline rate with an elevated window repeating every `cycle_ms`.
    ///
    /// Time `t` is inside the burst when
    /// `offset_ms <= (t mod cycle_ms) < offset_ms + burst_ms`.
    Burst {
        base_rate: f64,
        burst_rate: f64,
        cycle_ms: u64,
        burst_ms: u64,
        #[serde(default)]
        offset_ms: u64,
    },
    /// Linear ramp from `from_rate` to `to_rate` over `duration_ms`, then holds.
    Ramp {
        from_rate: f64,
        to_rate: f64,
        duration_ms: u64,
    },
}

impl Workload {
    /// Requests per second at `time_ms`. Never negative, never NaN.
    pub fn rate(&self, time_ms: u64) -> f64 {
        let raw = match *self {
            Workload::Idle => 0.0,
            Workload::Steady { rate } => rate,
            Workload::Burst {
                base_rate,
                burst_rate,
                cycle_ms,
                burst_ms,
                offset_ms,
            } => {
                if cycle_ms == 0 {
                    base_rate
                } else {
                    let phase = time_ms % cycle_ms;
                    if phase >= offset_ms && phase < offset_ms.saturating_add(burst_ms) {
                        burst_rate
                    } else {
                        base_rate
                    }
                }
            }
            Workload::Ramp {
                from_rate,
                to_rate,
                duration_ms,
            } => {
                if duration_ms == 0 || time_ms >= duration_ms {
                    to_rate
                } else {
                    let t = time_ms as f64 / duration_ms as f64;
                    from_rate + t * (to_rate - from_rate)
                }
            }
        };
        if raw.is_finite() && raw > 0.0 {
            raw
        } else {
            0.0
        }
    }

    /// Every rate the profile can produce, unclamped.
    pub fn configured_rates(&self) -> Vec<f64> {
        match *self {
            Workload::Idle => Vec::new(),
            Workload::Steady { rate } => vec![rate],
            Workload::Burst {
                base_rate,
                burst_rate,
                ..
            } => vec![base_rate, burst_rate],
            Workload::Ramp {
                from_rate, to_rate, ..
            } => vec![from_rate, to_rate],
        }
    }

    /// Short human-readable label.
    pub fn label(&self) -> String {
        match self {
            Workload::Idle => "idle".to_string(),
            Workload::Steady { rate } => format!("steady {:.1} req/s", rate),
            Workload::Burst {
                base_rate,
                burst_rate,
                cycle_ms,
                burst_ms,
                ..
            } => format!(
                "burst {:.1}->{:.1} req/s ({}ms every {}ms)",
                base_rate, burst_rate, burst_ms, cycle_ms
            ),
            Workload::Ramp {
                from_rate,
                to_rate,
                duration_ms,
            } => format!(
                "ramp {:.1}->{:.1} req/s over {}ms",
                from_rate, to_rate, duration_ms
            ),
        }
    }
}

impl Default for Workload {
    fn default() -> Self {
        Workload::Steady { rate: 30.0 }
    }
}

/// Split `rate × dt` plus the carried remainder into whole arrivals and the
/// new remainder.
pub fn arrivals_for_tick(rate: f64, dt_ms: u64, remainder: f64) -> (u64, f64) {
    let expected = rate * dt_ms as f64 / 1000.0 + remainder;
    if !expected.is_finite() || expected <= 0.0 {
        return (0, 0.0);
    }
    let whole = expected.floor();
    (whole as u64, expected - whole)
}

/// Look up a named workload preset.
pub fn workload_by_name(name: &str) -> Option<Workload> {
    match name {
        "idle" => Some(Workload::Idle),
        "steady" => Some(Workload::Steady { rate: 30.0 }),
        "burst" => Some(Workload::Burst {
            base_rate: 20.0,
            burst_rate: 80.0,
            cycle_ms: 10_000,
            burst_ms: 2_000,
            offset_ms: 5_000,
        }),
        "ramp" => Some(Workload::Ramp {
            from_rate: 5.0,
            to_rate: 60.0,
            duration_ms: 30_000,
        }),
        _ => None,
    }
}

/// List all workload preset names.
pub fn available_workloads() -> Vec<&'static str> {
    vec!["idle", "steady", "burst", "ramp"]
}
