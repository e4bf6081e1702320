//! Linear count correction with propagated 95% confidence bounds.
//!
//! Raw class counts are corrected by right-multiplying the count row vector with a
//! transformation matrix,
//!
//! $$
//!     \hat{n}_j = \sum_i n_i M_{ij},
//! $$
//!
//! and negative results are clamped to zero. Parasitemia is the ratio of the corrected
//! parasite counts to the corrected red blood cell counts.
//!
//! The uncertainty of every corrected count is the first-order expansion of the product
//! above, assuming Poisson counting noise on each $n_i$ and independent errors
//! $\sigma_{ij}$ on each transformation term:
//!
//! $$
//!     \mathrm{Var}\left[\hat{n}_j\right] = \sum_i n_i M_{ij}^2 + \sum_i n_i^2 \sigma_{ij}^2.
//! $$
//!
//! When no parasites survive correction the bound falls back to the rule of three.

use ndarray::{Array1, Array2};

use crate::error::ConfigurationError;
use crate::math::{clamp_negative, group_sum, interval, squared};
use crate::taxonomy::check_group;
use crate::units::Unit;
use crate::Result;

/// Multiplier turning the standard deviation of the parasite count into a 95% bound.
pub const CONFIDENCE_95_FACTOR: f64 = 1.69;

/// Upper 95% bound on the number of events when none were observed.
pub const RULE_OF_THREE: f64 = 3.0;

/// A fixed correction: transformation matrix, per-term standard deviations, and the class
/// groups used for the parasitemia ratio
#[derive(Clone, Debug)]
pub struct Corrector {
    matrix: Array2<f64>,
    matrix_std: Array2<f64>,
    rbc_ids: Vec<usize>,
    parasite_ids: Vec<usize>,
}

/// Result of correcting one count vector
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    /// Corrected parasitemia, in `unit`
    pub parasitemia: f64,
    /// Half-width of the 95% confidence interval, in `unit`
    pub bound: f64,
    /// Counts after correction, in the class ordering of the corrector
    pub corrected_counts: Array1<f64>,
    /// Unit of parasitemia and bound
    pub unit: Unit,
}

impl Estimate {
    /// The 95% confidence interval `[max(0, parasitemia - bound), parasitemia + bound]`
    #[must_use]
    pub fn interval(&self) -> [f64; 2] {
        interval(self.parasitemia, self.bound)
    }

    /// Re-express the estimate in another unit
    #[must_use]
    pub fn to_unit(&self, unit: Unit) -> Self {
        let rescale = |value: f64| unit.from_fraction(self.unit.to_fraction(value));
        Self {
            parasitemia: rescale(self.parasitemia),
            bound: rescale(self.bound),
            corrected_counts: self.corrected_counts.clone(),
            unit,
        }
    }
}

impl Corrector {
    /// Build a corrector from a transformation matrix and its per-term standard deviations
    ///
    /// # Errors
    /// Returns an error if `matrix` is not square, `matrix_std` does not share its shape,
    /// either contains a non-finite entry, `matrix_std` contains a negative entry, or a class
    /// group is empty or indexes past the matrix dimension.
    pub fn new(
        matrix: Array2<f64>,
        matrix_std: Array2<f64>,
        rbc_ids: Vec<usize>,
        parasite_ids: Vec<usize>,
    ) -> Result<Self> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(ConfigurationError::NonSquareMatrix {
                name: "transformation matrix",
                rows,
                cols,
            });
        }
        if matrix_std.dim() != matrix.dim() {
            return Err(ConfigurationError::ShapeMismatch {
                name: "transformation error matrix",
                found: matrix_std.dim(),
                expected: matrix.dim(),
            });
        }
        check_finite("transformation matrix", &matrix)?;
        check_finite("transformation error matrix", &matrix_std)?;
        if let Some(((row, col), _)) = matrix_std.indexed_iter().find(|(_, std)| **std < 0.) {
            return Err(ConfigurationError::NegativeUncertainty {
                name: "transformation error matrix",
                row,
                col,
            });
        }
        check_group("denominator", &rbc_ids, rows)?;
        check_group("numerator", &parasite_ids, rows)?;

        Ok(Self {
            matrix,
            matrix_std,
            rbc_ids,
            parasite_ids,
        })
    }

    /// Number of classes in the count vectors this corrector accepts
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    #[must_use]
    pub const fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    #[must_use]
    pub const fn matrix_std(&self) -> &Array2<f64> {
        &self.matrix_std
    }

    #[must_use]
    pub fn rbc_ids(&self) -> &[usize] {
        &self.rbc_ids
    }

    #[must_use]
    pub fn parasite_ids(&self) -> &[usize] {
        &self.parasite_ids
    }

    /// Correct raw counts, rounding any negative result up to zero
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn correct(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.check_length(raw_counts);
        let mut corrected = raw_counts.dot(&self.matrix);
        clamp_negative(&mut corrected);
        corrected
    }

    /// Parasitemia of `counts` as a fraction
    ///
    /// Zero when the red blood cell total is zero, whatever the parasite total.
    ///
    /// # Panics
    /// Panics if `counts` is too short for the class groups.
    #[must_use]
    pub fn parasitemia(&self, counts: &Array1<f64>) -> f64 {
        let rbcs = group_sum(counts, &self.rbc_ids);
        if rbcs == 0. {
            0.
        } else {
            group_sum(counts, &self.parasite_ids) / rbcs
        }
    }

    /// Absolute variance of every corrected class count
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn count_variances(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.poisson_variances(raw_counts) + self.transformation_variances(raw_counts)
    }

    /// Variance contribution of Poisson noise on the raw counts
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn poisson_variances(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.check_length(raw_counts);
        raw_counts.dot(&squared(&self.matrix))
    }

    /// Variance contribution of the uncertainty in the transformation terms
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn transformation_variances(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.check_length(raw_counts);
        squared(raw_counts).dot(&squared(&self.matrix_std))
    }

    /// Absolute 95% bound on the parasitemia fraction of `corrected_counts`
    ///
    /// With parasites present the bound is `1.69 * sqrt(sum of parasite variances)` divided
    /// by the red blood cell total. With none the rule of three gives `3 / rbcs`, which is
    /// infinite when no red blood cells were counted either.
    ///
    /// # Panics
    /// Panics if either vector is too short for the class groups.
    #[must_use]
    pub fn confidence_bound(
        &self,
        corrected_counts: &Array1<f64>,
        count_variances: &Array1<f64>,
    ) -> f64 {
        let rbcs = group_sum(corrected_counts, &self.rbc_ids);
        let parasites = group_sum(corrected_counts, &self.parasite_ids);

        let parasites_bound = if parasites == 0. {
            RULE_OF_THREE
        } else {
            CONFIDENCE_95_FACTOR * group_sum(count_variances, &self.parasite_ids).sqrt()
        };

        parasites_bound / rbcs
    }

    /// Correct `raw_counts` and report parasitemia with its 95% bound in `unit`
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn estimate(&self, raw_counts: &Array1<f64>, unit: Unit) -> Estimate {
        let corrected_counts = self.correct(raw_counts);
        let count_variances = self.count_variances(raw_counts);

        let parasitemia = self.parasitemia(&corrected_counts);
        let bound = self.confidence_bound(&corrected_counts, &count_variances);

        Estimate {
            parasitemia: unit.from_fraction(parasitemia),
            bound: unit.from_fraction(bound),
            corrected_counts,
            unit,
        }
    }

    fn check_length(&self, counts: &Array1<f64>) {
        assert_eq!(
            counts.len(),
            self.dimension(),
            "count vector has {} entries but the corrector expects {}",
            counts.len(),
            self.dimension()
        );
    }
}

fn check_finite(name: &'static str, matrix: &Array2<f64>) -> Result<()> {
    match matrix.indexed_iter().find(|(_, value)| !value.is_finite()) {
        Some(((row, col), _)) => Err(ConfigurationError::NonFiniteEntry { name, row, col }),
        None => Ok(()),
    }
}
