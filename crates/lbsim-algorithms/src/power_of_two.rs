//! Power-of-two-choices routing algorithm.
//!
//! Samples two candidates and routes to the one with less combined
//! in-flight and queued work. The pair is derived from the request id
//! through a fixed mixing function, so the same request id always samples
//! the same pair and runs replay exactly.

use crate::traits::*;

/// Power-of-two-choices router.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerOfTwo;

impl PowerOfTwo {
    pub fn new() -> Self {
        Self
    }
}

/// SplitMix64 finalizer.
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Two candidate indices for `request_id` out of `n` candidates.
///
/// The indices are distinct whenever `n >= 2`. Returns `None` for `n == 0`.
pub fn sample_pair(request_id: u64, n: usize) -> Option<(usize, usize)> {
    match n {
        0 => None,
        1 => Some((0, 0)),
        _ => {
            let n = n as u64;
            let first = mix(request_id) % n;
            let mut second = mix(request_id ^ 0xD1B5_4A32_D192_ED03) % (n - 1);
            if second >= first {
                second += 1;
            }
            Some((first as usize, second as usize))
        }
    }
}

impl RoutingAlgorithm for PowerOfTwo {
    fn select(&self, ctx: &RoutingContext<'_>) -> RoutingDecision {
        let candidates = ctx.candidates();
        let Some((i, j)) = sample_pair(ctx.request_id, candidates.len()) else {
            return RoutingDecision::no_candidates();
        };

        let a = candidates[i];
        let b = candidates[j];
        let chosen = if b.load() < a.load() { b } else { a };

        RoutingDecision::Route {
            server_id: chosen.id,
            cursor: ctx.cursor,
            reason: format!(
                "power of two: sampled server {} (load {}) vs server {} (load {}) -> server {}",
                a.id,
                a.load(),
                b.id,
                b.load(),
                chosen.id
            ),
        }
    }

    fn name(&self) -> &'static str {
        "power_of_two"
    }
}
