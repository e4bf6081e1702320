//! Correction for classifier skew using the inverse confusion matrix.
//!
//! The confusion matrix `C` of a classifier maps true class counts onto predicted ones,
//! `predicted = true × C`. Multiplying the raw (predicted) counts by `C⁻¹` undoes the
//! systematic misclassification. The mean matrix is averaged over k partitions of the
//! training data and the error of every term of `C⁻¹` is the standard deviation across
//! those partitions, both computed upstream.

use ndarray::{Array1, Array2};
use ndarray_linalg::Inverse;
use tracing::info;

use crate::artifacts::ArtifactStore;
use crate::corrector::{Corrector, Estimate};
use crate::error::ConfigurationError;
use crate::taxonomy::Taxonomy;
use crate::units::Unit;
use crate::Result;

#[derive(Clone, Debug)]
pub struct Deskewer {
    corrector: Corrector,
}

impl Deskewer {
    /// Build a deskewer from a mean confusion matrix and the per-term standard deviation of
    /// its inverse
    ///
    /// # Errors
    /// Returns an error if `cmatrix_mean` is not square, does not have one row per class of
    /// `taxonomy`, is not invertible, or if `inv_cmatrix_std` is not a valid error matrix of
    /// the same shape.
    pub fn new(
        cmatrix_mean: &Array2<f64>,
        inv_cmatrix_std: Array2<f64>,
        taxonomy: &Taxonomy,
    ) -> Result<Self> {
        let (rows, cols) = cmatrix_mean.dim();
        if rows != cols {
            return Err(ConfigurationError::NonSquareMatrix {
                name: "confusion matrix mean",
                rows,
                cols,
            });
        }
        let expected = (taxonomy.num_classes(), taxonomy.num_classes());
        if cmatrix_mean.dim() != expected {
            return Err(ConfigurationError::ShapeMismatch {
                name: "confusion matrix mean",
                found: cmatrix_mean.dim(),
                expected,
            });
        }

        let inv_cmatrix = invert(cmatrix_mean)?;
        let corrector = Corrector::new(
            inv_cmatrix,
            inv_cmatrix_std,
            taxonomy.rbc_ids().to_vec(),
            taxonomy.parasite_ids().to_vec(),
        )?;

        Ok(Self { corrector })
    }

    /// Load the confusion matrix artifacts of `model_name` from `store`
    ///
    /// # Errors
    /// Returns an error if either artifact is missing or malformed, or if [`Deskewer::new`]
    /// rejects the matrices.
    pub fn load(store: &ArtifactStore, model_name: &str, taxonomy: &Taxonomy) -> Result<Self> {
        let cmatrix_mean = store.cmatrix_mean(model_name)?;
        let inv_cmatrix_std = store.inv_cmatrix_std(model_name)?;

        let deskewer = Self::new(&cmatrix_mean, inv_cmatrix_std, taxonomy)?;
        info!(
            model = model_name,
            classes = taxonomy.num_classes(),
            "built deskewer"
        );
        Ok(deskewer)
    }

    #[must_use]
    pub const fn corrector(&self) -> &Corrector {
        &self.corrector
    }

    /// Deskew a full class count vector
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn correct(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.corrector.correct(raw_counts)
    }

    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn count_variances(&self, raw_counts: &Array1<f64>) -> Array1<f64> {
        self.corrector.count_variances(raw_counts)
    }

    /// Parasitemia fraction of a class count vector, without deskewing
    ///
    /// # Panics
    /// Panics if `counts` is too short for the taxonomy's class groups.
    #[must_use]
    pub fn parasitemia(&self, counts: &Array1<f64>) -> f64 {
        self.corrector.parasitemia(counts)
    }

    /// Deskewed parasitemia and 95% bound of a raw class count vector
    ///
    /// # Panics
    /// Panics if `raw_counts` does not have one entry per class.
    #[must_use]
    pub fn estimate(&self, raw_counts: &Array1<f64>, unit: Unit) -> Estimate {
        self.corrector.estimate(raw_counts, unit)
    }
}

fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let inverse = matrix
        .inv()
        .map_err(|e| ConfigurationError::SingularMatrix {
            reason: e.to_string(),
        })?;

    // LAPACK can return an "inverse" of a numerically singular matrix with overflowed terms
    if inverse.iter().all(|value| value.is_finite()) {
        Ok(inverse)
    } else {
        Err(ConfigurationError::SingularMatrix {
            reason: "inverse has non-finite entries".to_owned(),
        })
    }
}
