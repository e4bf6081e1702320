use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::Result;

pub const CMATRIX_MEAN_SUFFIX: &str = "-cmatrix-mean.csv";
pub const INV_CMATRIX_STD_SUFFIX: &str = "-inv-cmatrix-std.csv";

const CLINICAL_COMPENSATION_SUFFIX: &str = "-clinical-compensation";
const CULTURED_COMPENSATION_SUFFIX: &str = "-cultured-compensation";
const WITH_HEATMAPS_SUFFIX: &str = "-with-heatmaps.csv";
const NO_HEATMAPS_SUFFIX: &str = "-no-heatmaps.csv";

/// Two thresholds closer than this select the same fit table row
pub const THRESHOLD_TOLERANCE: f64 = 1e-9;

/// Where the samples behind a compensation fit came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Patient samples compared against PCR
    Clinical,
    /// Laboratory cultures
    Cultured,
}

/// A single row of a compensation fit table
///
/// `cov_m` and `cov_b` hold the standard uncertainty of the slope and intercept. The
/// intercept and its uncertainty are in the unit the table was fit in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitRow {
    pub conf_val: f64,
    pub fit_m: f64,
    pub fit_b: f64,
    pub cov_m: f64,
    pub cov_b: f64,
}

/// Directory of fitted correction artifacts, one subdirectory per model
///
/// ```text
/// <root>/<model>/<model>-cmatrix-mean.csv
/// <root>/<model>/<model>-inv-cmatrix-std.csv
/// <root>/<model>/<model>-{clinical,cultured}-compensation-{with,no}-heatmaps.csv
/// ```
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn cmatrix_mean_path(&self, model_name: &str) -> PathBuf {
        self.model_file(model_name, CMATRIX_MEAN_SUFFIX)
    }

    #[must_use]
    pub fn inv_cmatrix_std_path(&self, model_name: &str) -> PathBuf {
        self.model_file(model_name, INV_CMATRIX_STD_SUFFIX)
    }

    #[must_use]
    pub fn compensation_path(
        &self,
        model_name: &str,
        source: SampleSource,
        heatmaps: bool,
    ) -> PathBuf {
        let source_suffix = match source {
            SampleSource::Clinical => CLINICAL_COMPENSATION_SUFFIX,
            SampleSource::Cultured => CULTURED_COMPENSATION_SUFFIX,
        };
        let heatmap_suffix = if heatmaps {
            WITH_HEATMAPS_SUFFIX
        } else {
            NO_HEATMAPS_SUFFIX
        };
        self.model_file(model_name, &format!("{source_suffix}{heatmap_suffix}"))
    }

    /// Load the mean confusion matrix of `model_name`
    ///
    /// # Errors
    /// Returns an error if the file is missing or is not a rectangular numeric CSV.
    pub fn cmatrix_mean(&self, model_name: &str) -> Result<Array2<f64>> {
        let path = self.cmatrix_mean_path(model_name);
        require(&path, "confusion matrix mean", model_name)?;
        read_matrix(&path)
    }

    /// Load the standard deviations of the inverse confusion matrix of `model_name`
    ///
    /// # Errors
    /// Returns an error if the file is missing or is not a rectangular numeric CSV.
    pub fn inv_cmatrix_std(&self, model_name: &str) -> Result<Array2<f64>> {
        let path = self.inv_cmatrix_std_path(model_name);
        require(&path, "inverse confusion matrix std", model_name)?;
        read_matrix(&path)
    }

    /// Find the fit parameters of `model_name` at `threshold`
    ///
    /// # Errors
    /// Returns an error if the table is missing, cannot be parsed, or has no row for
    /// `threshold`.
    pub fn fit_row(
        &self,
        model_name: &str,
        source: SampleSource,
        heatmaps: bool,
        threshold: f64,
    ) -> Result<FitRow> {
        let path = self.compensation_path(model_name, source, heatmaps);
        require(&path, "compensation metrics", model_name)?;
        let rows = read_fit_table(&path)?;
        debug!(path = %path.display(), rows = rows.len(), "read compensation table");

        rows.into_iter()
            .find(|row| (row.conf_val - threshold).abs() <= THRESHOLD_TOLERANCE)
            .ok_or(ConfigurationError::ThresholdNotFound { threshold, path })
    }

    fn model_file(&self, model_name: &str, suffix: &str) -> PathBuf {
        self.root
            .join(model_name)
            .join(format!("{model_name}{suffix}"))
    }
}

fn require(path: &Path, artifact: &'static str, model_name: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigurationError::MissingArtifact {
            artifact,
            model: model_name.to_owned(),
            path: path.to_path_buf(),
        })
    }
}

/// Read a headerless CSV of numbers into a matrix, one line per row
///
/// # Errors
/// Returns an error if the file cannot be read, holds a non-numeric field, is empty, or
/// has rows of differing length.
pub fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    let file = fs::read(path).map_err(|e| ConfigurationError::io("reading matrix", e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(&file[..]);

    let rows = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<Vec<f64>>, _>>()
        .map_err(|e| ConfigurationError::csv(path, e))?;

    let num_cols = match rows.first() {
        Some(row) => row.len(),
        None => return Err(ConfigurationError::EmptyMatrix { path: path.into() }),
    };
    if let Some((row, values)) = rows.iter().find_position(|values| values.len() != num_cols) {
        return Err(ConfigurationError::RaggedMatrix {
            path: path.into(),
            row,
            found: values.len(),
            expected: num_cols,
        });
    }

    let num_rows = rows.len();
    let matrix = Array2::from_shape_fn((num_rows, num_cols), |(ii, jj)| rows[ii][jj]);
    debug!(path = %path.display(), num_rows, num_cols, "read matrix");
    Ok(matrix)
}

/// Read every row of a compensation fit table
///
/// # Errors
/// Returns an error if the file cannot be read or a row does not hold the fit columns.
pub fn read_fit_table(path: &Path) -> Result<Vec<FitRow>> {
    let file = fs::read(path).map_err(|e| ConfigurationError::io("reading fit table", e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(&file[..]);

    rdr.deserialize()
        .collect::<std::result::Result<Vec<FitRow>, _>>()
        .map_err(|e| ConfigurationError::csv(path, e))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ndarray::arr2;
    use tempdir::TempDir;

    use crate::error::ConfigurationError;
    use crate::Result;

    use super::{read_matrix, ArtifactStore, FitRow, SampleSource};

    const MODEL: &str = "frightful-wendigo-1931";

    fn store_with_model_dir(test_name: &str) -> (TempDir, ArtifactStore) {
        let tmp_dir = TempDir::new(test_name).unwrap();
        std::fs::create_dir(tmp_dir.path().join(MODEL)).unwrap();
        let store = ArtifactStore::new(tmp_dir.path());
        (tmp_dir, store)
    }

    fn write_fit_table(path: &Path, rows: &[FitRow]) {
        let mut wtr = csv::Writer::from_path(path).unwrap();
        for row in rows {
            wtr.serialize(row).unwrap();
        }
        wtr.flush().unwrap();
    }

    #[test]
    fn artifact_paths_follow_the_model_layout() {
        let store = ArtifactStore::new("/data");
        assert_eq!(
            store.cmatrix_mean_path(MODEL),
            Path::new("/data/frightful-wendigo-1931/frightful-wendigo-1931-cmatrix-mean.csv")
        );
        assert_eq!(
            store.compensation_path(MODEL, SampleSource::Cultured, true),
            Path::new(
                "/data/frightful-wendigo-1931/frightful-wendigo-1931-cultured-compensation-with-heatmaps.csv"
            )
        );
        assert_eq!(
            store.compensation_path(MODEL, SampleSource::Clinical, false),
            Path::new(
                "/data/frightful-wendigo-1931/frightful-wendigo-1931-clinical-compensation-no-heatmaps.csv"
            )
        );
    }

    #[test]
    fn matrices_are_read_row_by_row() -> Result<()> {
        let (_tmp_dir, store) = store_with_model_dir("matrices_are_read_row_by_row");
        std::fs::write(store.cmatrix_mean_path(MODEL), "0.9, 0.1\n0.25,0.75\n").unwrap();

        let matrix = store.cmatrix_mean(MODEL)?;

        assert_eq!(matrix, arr2(&[[0.9, 0.1], [0.25, 0.75]]));
        Ok(())
    }

    #[test]
    fn ragged_matrices_are_rejected() {
        let (_tmp_dir, store) = store_with_model_dir("ragged_matrices_are_rejected");
        let path = store.cmatrix_mean_path(MODEL);
        std::fs::write(&path, "1,0,0\n0,1\n0,0,1\n").unwrap();

        let err = read_matrix(&path).unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::RaggedMatrix {
                row: 1,
                found: 2,
                expected: 3,
                ..
            }
        ));
    }

    #[test]
    fn empty_matrices_are_rejected() {
        let (_tmp_dir, store) = store_with_model_dir("empty_matrices_are_rejected");
        let path = store.inv_cmatrix_std_path(MODEL);
        std::fs::write(&path, "").unwrap();

        assert!(matches!(
            read_matrix(&path).unwrap_err(),
            ConfigurationError::EmptyMatrix { .. }
        ));
    }

    #[test]
    fn missing_artifacts_name_the_model() {
        let (_tmp_dir, store) = store_with_model_dir("missing_artifacts_name_the_model");

        let err = store.inv_cmatrix_std(MODEL).unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::MissingArtifact { model, .. } if model == MODEL
        ));
    }

    #[test]
    fn fit_rows_are_selected_by_threshold() -> Result<()> {
        let (_tmp_dir, store) = store_with_model_dir("fit_rows_are_selected_by_threshold");
        let rows = [0.8, 0.9, 0.95].map(|conf_val| FitRow {
            conf_val,
            fit_m: conf_val + 0.1,
            fit_b: 1000. * conf_val,
            cov_m: 0.01,
            cov_b: 20.,
        });
        let path = store.compensation_path(MODEL, SampleSource::Clinical, false);
        write_fit_table(&path, &rows);

        let row = store.fit_row(MODEL, SampleSource::Clinical, false, 0.9)?;
        assert_eq!(row, rows[1]);

        let err = store
            .fit_row(MODEL, SampleSource::Clinical, false, 0.85)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::ThresholdNotFound { threshold, .. } if threshold == 0.85
        ));

        let err = store
            .fit_row(MODEL, SampleSource::Clinical, true, 0.9)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingArtifact { .. }));
        Ok(())
    }
}
