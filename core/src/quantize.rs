//! Deterministic numeric quantization.
//!
//! RULE: Every numeric value stored in world state lies on a fixed
//! decimal grid. Values are snapped at construction and again after
//! every arithmetic combination, so the same inputs produce the same
//! bits on every platform and long runs never accumulate drift.
//!
//! Rounding is half-away-from-zero (`f64::round`). Negative zero is
//! normalised to positive zero so value equality and bit equality agree.

use crate::error::ValueError;
use serde::{Deserialize, Serialize};

/// Default grid: 10⁻⁵.
pub const DEFAULT_DIGITS: u32 = 5;

// Exact powers of ten; `powi` is not guaranteed bit-stable across targets.
const SCALES: [f64; DEFAULT_DIGITS as usize + 1] = [1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0];

/// Snap `x` onto the default grid.
pub fn quantize(x: f64) -> f64 {
    Quantizer::default().snap(x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantizer {
    digits: u32,
}

impl Quantizer {
    /// Grids finer than the 10⁻⁵ value-type grid are rejected.
    pub fn new(digits: u32) -> Result<Self, ValueError> {
        if digits > DEFAULT_DIGITS {
            return Err(ValueError::Precision { digits, max: DEFAULT_DIGITS });
        }
        Ok(Self { digits })
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    pub fn grid(&self) -> f64 {
        1.0 / self.scale()
    }

    fn scale(&self) -> f64 {
        SCALES[self.digits as usize]
    }

    /// Snap onto the grid. Non-finite input is returned untouched;
    /// the value types reject it before it gets this far.
    pub fn snap(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return x;
        }
        let scale = self.scale();
        let snapped = (x * scale).round() / scale;
        snapped + 0.0
    }

    pub fn is_on_grid(&self, x: f64) -> bool {
        x.is_finite() && self.snap(x).to_bits() == x.to_bits()
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self { digits: DEFAULT_DIGITS }
    }
}

/// Re-snap every numeric field of a value onto a (possibly coarser) grid.
pub trait Quantize {
    fn quantize_with(&self, q: &Quantizer) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        let q = Quantizer::new(2).unwrap();
        assert_eq!(q.snap(0.125), 0.13);
        assert_eq!(q.snap(-0.125), -0.13);
        assert_eq!(q.snap(2.5), 2.5);
        assert_eq!(Quantizer::new(0).unwrap().snap(2.5), 3.0);
        assert_eq!(Quantizer::new(0).unwrap().snap(-2.5), -3.0);
    }

    #[test]
    fn snapping_is_idempotent() {
        let q = Quantizer::default();
        let mut x = -3.0f64;
        while x < 3.0 {
            let once = q.snap(x);
            assert_eq!(q.snap(once).to_bits(), once.to_bits(), "x={x}");
            assert!(q.is_on_grid(once));
            x += 0.000_737_3;
        }
    }

    #[test]
    fn negative_zero_is_normalised() {
        let snapped = quantize(-0.000_001);
        assert_eq!(snapped.to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn rejects_grid_finer_than_value_types() {
        assert!(Quantizer::new(DEFAULT_DIGITS + 1).is_err());
        assert_eq!(Quantizer::new(3).unwrap().grid(), 0.001);
    }

    #[test]
    fn non_finite_passes_through() {
        assert!(quantize(f64::NAN).is_nan());
        assert_eq!(quantize(f64::INFINITY), f64::INFINITY);
    }
}
