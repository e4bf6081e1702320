//! Reporting units for parasitemia.
//!
//! All internal arithmetic works on the plain fraction of infected red blood cells. A
//! [`Unit`] only rescales that fraction at the boundary, on values handed in by or returned
//! to the caller.

use serde::{Deserialize, Serialize};

/// Red blood cells per microlitre of whole blood.
///
/// The single constant relating a parasitemia fraction to a parasite density: a fraction
/// `x` corresponds to `x * RBCS_PER_MICROLITRE` parasites per µL.
pub const RBCS_PER_MICROLITRE: f64 = 5e6;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Infected cells over all red blood cells, in `[0, 1]`.
    Fraction,
    /// The fraction multiplied by 100.
    #[default]
    Percent,
    /// Parasites per microlitre of blood.
    PerMicrolitre,
}

impl Unit {
    /// Multiplier taking a fraction into this unit.
    #[must_use]
    pub const fn scale(self) -> f64 {
        match self {
            Self::Fraction => 1.0,
            Self::Percent => 100.0,
            Self::PerMicrolitre => RBCS_PER_MICROLITRE,
        }
    }

    #[must_use]
    pub fn from_fraction(self, fraction: f64) -> f64 {
        fraction * self.scale()
    }

    #[must_use]
    pub fn to_fraction(self, value: f64) -> f64 {
        value / self.scale()
    }
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    use super::{Unit, RBCS_PER_MICROLITRE};

    #[test]
    fn conversions_round_trip_through_the_fraction() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);

        for _ in 0..100 {
            let fraction: f64 = rng.gen();
            for unit in [Unit::Fraction, Unit::Percent, Unit::PerMicrolitre] {
                let value = unit.from_fraction(fraction);
                approx::assert_relative_eq!(unit.to_fraction(value), fraction);
            }
        }
    }

    #[test]
    fn density_is_percent_rescaled_by_a_fixed_constant() {
        let fraction = 0.012;
        let percent = Unit::Percent.from_fraction(fraction);
        let density = Unit::PerMicrolitre.from_fraction(fraction);

        approx::assert_relative_eq!(percent, 1.2);
        approx::assert_relative_eq!(density, 60_000.0);
        approx::assert_relative_eq!(density / RBCS_PER_MICROLITRE * 100.0, percent);
    }
}
