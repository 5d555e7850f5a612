//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through SystemRng instances derived from the
//! master seed carried in the tick inputs.
//!
//! Each system gets its own stream per tick, seeded from
//! (master_seed, tick, hash of the system's stable name). This means:
//!   - Adding a new system never changes existing systems' streams.
//!   - Re-running a tick from the same state reproduces every draw.

use crate::{types::Tick, value::Probability};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const STREAM_MIX: u64 = 0x9e37_79b9_7f4a_7c15;
const TICK_MIX:   u64 = 0xbf58_476d_1ce4_e5b9;

/// A named, deterministic RNG for a single system on a single tick.
pub struct SystemRng {
    pub name: &'static str,
    inner:    Pcg64Mcg,
}

impl SystemRng {
    pub fn derive(master_seed: u64, tick: Tick, name: &'static str) -> Self {
        let stream = fnv1a(name.as_bytes());
        let derived_seed =
            master_seed ^ stream.wrapping_mul(STREAM_MIX) ^ tick.wrapping_mul(TICK_MIX);
        Self {
            name,
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: Probability) -> bool {
        self.next_f64() < p.get()
    }
}

/// 64-bit FNV-1a. Stable across platforms and releases, unlike
/// `std::hash::DefaultHasher`.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME:  u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
