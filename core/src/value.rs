//! Range-constrained scalar value types.
//!
//! Construction rejects non-finite and out-of-range input, and every
//! stored value sits on the quantization grid. Equality, ordering and
//! hashing are by bit pattern: quantization removes `-0.0` and NaN is
//! never stored.

use crate::{
    error::ValueError,
    quantize::{quantize, Quantize, Quantizer},
};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

macro_rules! bounded_scalar {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
        #[serde(try_from = "f64", into = "f64")]
        pub struct $name(f64);

        impl $name {
            pub const MIN: f64 = $min;
            pub const MAX: f64 = $max;
            pub const ZERO: Self = Self(0.0);

            pub fn new(value: f64) -> Result<Self, ValueError> {
                if !value.is_finite() {
                    return Err(ValueError::NotFinite { kind: $kind });
                }
                let snapped = quantize(value);
                if !(Self::MIN..=Self::MAX).contains(&snapped) {
                    return Err(ValueError::OutOfRange {
                        kind:  $kind,
                        value,
                        min:   Self::MIN,
                        max:   Self::MAX,
                    });
                }
                Ok(Self(snapped))
            }

            /// Clamp into range, then snap. NaN collapses to zero.
            pub fn clamped(value: f64) -> Self {
                if value.is_nan() {
                    return Self::ZERO;
                }
                Self(quantize(value.clamp(Self::MIN, Self::MAX)))
            }

            pub fn get(self) -> f64 {
                self.0
            }
        }

        impl TryFrom<f64> for $name {
            type Error = ValueError;
            fn try_from(value: f64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for f64 {
            fn from(value: $name) -> f64 {
                value.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.to_bits() == other.0.to_bits()
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.to_bits().hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:.5}", self.0)
            }
        }

        impl Quantize for $name {
            fn quantize_with(&self, q: &Quantizer) -> Self {
                Self::clamped(q.snap(self.0))
            }
        }
    };
}

bounded_scalar!(
    /// Likelihood or share, in [0, 1].
    Probability, "probability", 0.0, 1.0
);
bounded_scalar!(
    /// Ideological alignment, in [-1, 1]. Negative is revolutionary,
    /// positive is reactionary.
    Ideology, "ideology", -1.0, 1.0
);
bounded_scalar!(
    /// Agitation, heat and similar pressures, in [0, 1].
    Intensity, "intensity", 0.0, 1.0
);
bounded_scalar!(
    /// Edge strength, cohesion and similar weights, in [0, 1].
    Coefficient, "coefficient", 0.0, 1.0
);
bounded_scalar!(
    /// Non-negative dimensionless ratio.
    Ratio, "ratio", 0.0, 1.0e6
);
bounded_scalar!(
    /// Non-negative money stock or flow.
    Currency, "currency", 0.0, 1.0e12
);

impl Probability {
    pub const ONE: Self = Self(1.0);

    pub fn complement(self) -> Self {
        Self::clamped(1.0 - self.0)
    }

    /// Joint probability of two independent outcomes.
    pub fn and(self, other: Self) -> Self {
        Self::clamped(self.0 * other.0)
    }
}

impl Ideology {
    pub fn shift(self, delta: f64) -> Self {
        Self::clamped(self.0 + delta)
    }
}

impl Intensity {
    pub fn raise(self, delta: f64) -> Self {
        Self::clamped(self.0 + delta)
    }

    /// Decay toward zero by `rate` of the current level.
    pub fn decay(self, rate: Coefficient) -> Self {
        Self::clamped(self.0 * (1.0 - rate.0))
    }
}

impl Coefficient {
    pub const ONE: Self = Self(1.0);

    pub fn scale(self, x: f64) -> f64 {
        quantize(self.0 * x)
    }

    pub fn raise(self, delta: f64) -> Self {
        Self::clamped(self.0 + delta)
    }
}

impl Currency {
    pub fn checked_add(self, other: Self) -> Result<Self, ValueError> {
        Self::new(self.0 + other.0)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self, ValueError> {
        let diff = quantize(self.0 - other.0);
        if diff < 0.0 {
            return Err(ValueError::Underflow {
                kind: "currency",
                lhs:  self.0,
                rhs:  other.0,
            });
        }
        Ok(Self(diff))
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self::clamped(self.0 + other.0)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self::clamped(self.0 - other.0)
    }

    /// Proportional share of this amount.
    pub fn scale(self, by: Coefficient) -> Self {
        Self::clamped(self.0 * by.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_snaps_to_grid() {
        let p = Probability::new(0.123_456_7).unwrap();
        assert_eq!(p.get(), 0.12346);
        let c = Currency::new(10.000_004).unwrap();
        assert_eq!(c.get(), 10.0);
    }

    #[test]
    fn construction_rejects_out_of_range_and_non_finite() {
        assert!(matches!(Probability::new(1.5), Err(ValueError::OutOfRange { .. })));
        assert!(matches!(Ideology::new(-1.01), Err(ValueError::OutOfRange { .. })));
        assert!(matches!(Currency::new(-0.01), Err(ValueError::OutOfRange { .. })));
        assert!(matches!(Intensity::new(f64::NAN), Err(ValueError::NotFinite { .. })));
    }

    #[test]
    fn values_within_half_a_grid_step_of_a_bound_are_accepted() {
        assert_eq!(Probability::new(1.000_004).unwrap(), Probability::ONE);
        assert_eq!(Currency::new(-0.000_004).unwrap(), Currency::ZERO);
    }

    #[test]
    fn clamped_never_leaves_range() {
        assert_eq!(Ideology::clamped(7.0).get(), 1.0);
        assert_eq!(Ideology::clamped(-7.0).get(), -1.0);
        assert_eq!(Intensity::clamped(f64::NAN), Intensity::ZERO);
    }

    #[test]
    fn currency_arithmetic_requantizes() {
        let a = Currency::new(0.1).unwrap();
        let b = Currency::new(0.2).unwrap();
        let sum = a.checked_add(b).unwrap();
        assert_eq!(sum.get(), 0.3);
        assert!(matches!(a.checked_sub(b), Err(ValueError::Underflow { .. })));
        assert_eq!(a.saturating_sub(b), Currency::ZERO);
        assert_eq!(b.checked_sub(a).unwrap().get(), 0.1);
    }

    #[test]
    fn probability_helpers() {
        let p = Probability::new(0.25).unwrap();
        assert_eq!(p.complement().get(), 0.75);
        assert_eq!(p.and(Probability::new(0.5).unwrap()).get(), 0.125);
    }

    #[test]
    fn serde_validates_on_the_way_in() {
        let ok: Probability = serde_json::from_str("0.5").unwrap();
        assert_eq!(ok.get(), 0.5);
        assert!(serde_json::from_str::<Probability>("1.5").is_err());
        assert_eq!(serde_json::to_string(&Currency::new(12.5).unwrap()).unwrap(), "12.5");
    }

    #[test]
    fn coarser_quantizer_resnaps() {
        let q = Quantizer::new(2).unwrap();
        let v = Coefficient::new(0.123_45).unwrap().quantize_with(&q);
        assert_eq!(v.get(), 0.12);
    }
}
