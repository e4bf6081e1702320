//! Compensation using a `y = mx + b` fit against ground truth parasitemia.
//!
//! The slope and intercept come from comparing classifier parasitemia estimates with a
//! reference assay (PCR for clinical samples) at one confidence threshold. The fit only
//! relates the aggregate parasite fraction, so count vectors are first reduced to
//! `[healthy, parasites]` where parasites are all asexual stages.
//!
//! The 2x2 transformation matrix maps the parasite fraction `x` onto `x/m - b` while
//! preserving the total number of red blood cells:
//!
//! $$
//!     M = \begin{pmatrix} 1 + b & -b \\ 1 + b - 1/m & 1/m - b \end{pmatrix},
//! $$
//!
//! so `[h, p] × M` holds `p/m - bT` parasites out of `T = h + p` cells. The first row of the
//! error matrix carries the intercept uncertainty and the second row the slope and
//! intercept uncertainties combined in quadrature.

use ndarray::{arr1, arr2, Array1, Array2};
use tracing::{info, warn};

use crate::artifacts::{ArtifactStore, FitRow, SampleSource};
use crate::corrector::{Corrector, Estimate};
use crate::error::ConfigurationError;
use crate::math::group_sum;
use crate::taxonomy::Taxonomy;
use crate::units::Unit;
use crate::Result;

/// Slopes smaller in magnitude than this cannot be inverted
pub const MIN_SLOPE: f64 = 1e-12;

const REDUCED_RBC_IDS: [usize; 2] = [0, 1];
const REDUCED_PARASITE_IDS: [usize; 1] = [1];

/// Linear fit parameters with the intercept expressed as a parasitemia fraction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitParameters {
    pub slope: f64,
    pub intercept: f64,
    /// Standard uncertainty of `slope`
    pub slope_std: f64,
    /// Standard uncertainty of `intercept`
    pub intercept_std: f64,
}

impl FitParameters {
    /// The identity fit, `m = 1` and `b = 0` with no uncertainty
    pub const IDENTITY: Self = Self {
        slope: 1.,
        intercept: 0.,
        slope_std: 0.,
        intercept_std: 0.,
    };

    /// Convert a fit table row, rescaling the intercept from `intercept_unit` to a fraction
    #[must_use]
    pub fn from_row(row: &FitRow, intercept_unit: Unit) -> Self {
        Self {
            slope: row.fit_m,
            intercept: intercept_unit.to_fraction(row.fit_b),
            slope_std: row.cov_m,
            intercept_std: intercept_unit.to_fraction(row.cov_b),
        }
    }

    /// Treat a negative intercept as noise, zeroing it together with its uncertainty
    #[must_use]
    pub fn with_nonnegative_intercept(self) -> Self {
        if self.intercept < 0. {
            Self {
                intercept: 0.,
                intercept_std: 0.,
                ..self
            }
        } else {
            self
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("slope", self.slope),
            ("intercept", self.intercept),
            ("slope uncertainty", self.slope_std),
            ("intercept uncertainty", self.intercept_std),
        ] {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFiniteParameter { name, value });
            }
        }
        if self.slope.abs() < MIN_SLOPE {
            return Err(ConfigurationError::DegenerateSlope { slope: self.slope });
        }
        Ok(())
    }

    /// The 2x2 matrix applying the fit to `[healthy, parasites]` row vectors
    #[must_use]
    pub fn transformation_matrix(&self) -> Array2<f64> {
        let (m, b) = (self.slope, self.intercept);

        let m12 = -b;
        let m22 = 1. / m - b;
        let m11 = 1. - m12;
        let m21 = 1. - m22;

        arr2(&[[m11, m12], [m21, m22]])
    }

    /// Standard deviation of every term of [`FitParameters::transformation_matrix`]
    #[must_use]
    pub fn transformation_std(&self) -> Array2<f64> {
        let first_row = self.intercept_std;
        let second_row = self.intercept_std.hypot(self.slope_std);

        arr2(&[[first_row, first_row], [second_row, second_row]])
    }
}

/// Selects one compensation fit: threshold plus the data variant it was fit on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompensationKey {
    pub confidence_threshold: f64,
    pub source: SampleSource,
    pub heatmaps: bool,
}

impl CompensationKey {
    /// Clinical data without heatmap correction at `confidence_threshold`
    #[must_use]
    pub const fn clinical(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            source: SampleSource::Clinical,
            heatmaps: false,
        }
    }
}

/// How a fit table row is turned into [`FitParameters`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompensationOptions {
    pub clamp_negative_intercept: bool,
    /// Unit of `fit_b` and `cov_b` in the fit table
    pub intercept_unit: Unit,
}

impl Default for CompensationOptions {
    fn default() -> Self {
        Self {
            clamp_negative_intercept: true,
            intercept_unit: Unit::PerMicrolitre,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Compensator {
    corrector: Corrector,
    fit: FitParameters,
    num_classes: usize,
    healthy_id: usize,
    parasite_ids: Vec<usize>,
}

impl Compensator {
    /// Build a compensator from fit parameters already expressed as fractions
    ///
    /// # Errors
    /// Returns an error if a parameter is not finite or the slope is too close to zero.
    pub fn from_fit(fit: FitParameters, taxonomy: &Taxonomy) -> Result<Self> {
        fit.validate()?;
        let corrector = Corrector::new(
            fit.transformation_matrix(),
            fit.transformation_std(),
            REDUCED_RBC_IDS.to_vec(),
            REDUCED_PARASITE_IDS.to_vec(),
        )?;

        Ok(Self {
            corrector,
            fit,
            num_classes: taxonomy.num_classes(),
            healthy_id: taxonomy.healthy_id(),
            parasite_ids: taxonomy.parasite_ids().to_vec(),
        })
    }

    /// A compensator that leaves counts untouched, reporting Poisson error only
    ///
    /// # Errors
    /// The identity fit is always valid; the `Result` is that of [`Compensator::from_fit`].
    pub fn uncompensated(taxonomy: &Taxonomy) -> Result<Self> {
        Self::from_fit(FitParameters::IDENTITY, taxonomy)
    }

    /// Load the fit of `model_name` selected by `key` from `store`
    ///
    /// # Errors
    /// Returns an error if the fit table is missing or unreadable, has no row for the
    /// threshold, or the row holds an unusable fit.
    pub fn load(
        store: &ArtifactStore,
        model_name: &str,
        key: &CompensationKey,
        options: &CompensationOptions,
        taxonomy: &Taxonomy,
    ) -> Result<Self> {
        let row = store.fit_row(
            model_name,
            key.source,
            key.heatmaps,
            key.confidence_threshold,
        )?;
        let mut fit = FitParameters::from_row(&row, options.intercept_unit);
        if options.clamp_negative_intercept && fit.intercept < 0. {
            warn!(
                model = model_name,
                intercept = fit.intercept,
                "ignoring negative compensation intercept"
            );
            fit = fit.with_nonnegative_intercept();
        }

        let compensator = Self::from_fit(fit, taxonomy)?;
        info!(
            model = model_name,
            threshold = key.confidence_threshold,
            slope = fit.slope,
            intercept = fit.intercept,
            "built compensator"
        );
        Ok(compensator)
    }

    #[must_use]
    pub const fn corrector(&self) -> &Corrector {
        &self.corrector
    }

    #[must_use]
    pub const fn fit(&self) -> &FitParameters {
        &self.fit
    }

    /// Collapse a full class count vector to `[healthy, asexual parasites]`
    ///
    /// # Panics
    /// Panics if `counts` does not have one entry per class of the taxonomy.
    #[must_use]
    pub fn reduce(&self, counts: &Array1<f64>) -> Array1<f64> {
        assert_eq!(
            counts.len(),
            self.num_classes,
            "count vector has {} entries but the taxonomy has {} classes",
            counts.len(),
            self.num_classes
        );
        arr1(&[counts[self.healthy_id], group_sum(counts, &self.parasite_ids)])
    }

    /// Compensated `[healthy, parasites]` counts of a full class count vector
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class of the taxonomy.
    #[must_use]
    pub fn correct(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.corrector.correct(&self.reduce(raw_counts))
    }

    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class of the taxonomy.
    #[must_use]
    pub fn count_variances(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.corrector.count_variances(&self.reduce(raw_counts))
    }

    /// Parasitemia fraction of a full class count vector, without compensation
    ///
    /// # Panics
    /// Panics if `counts` does not have one entry per class of the taxonomy.
    #[must_use]
    pub fn parasitemia(&self, counts: &Array1<f64>) -> f64 {
        self.corrector.parasitemia(&self.reduce(counts))
    }

    /// Compensated parasitemia and 95% bound of a full class count vector
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class of the taxonomy.
    #[must_use]
    pub fn estimate(&self, raw_counts: &Array1<f64>, unit: Unit) -> Estimate {
        self.corrector.estimate(&self.reduce(raw_counts), unit)
    }

    /// Compensate an aggregate parasitemia estimate measured over `total_cells` red blood
    /// cells
    ///
    /// The estimate is turned back into the count pair `[T (1 - x), T x]` and run through the
    /// same pipeline as [`Compensator::estimate`]. Negative input parasitemia is read as zero.
    #[must_use]
    pub fn bound_and_estimate_from_parasitemia(
        &self,
        raw_parasitemia: f64,
        total_cells: f64,
        input_unit: Unit,
        output_unit: Unit,
    ) -> Estimate {
        let fraction = input_unit.to_fraction(raw_parasitemia.max(0.));
        let parasites = fraction * total_cells;
        let healthy = total_cells - parasites;

        self.corrector.estimate(&arr1(&[healthy, parasites]), output_unit)
    }
}
