use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while building a corrector.
///
/// Every variant describes a problem with the correction artifacts or the configuration
/// selecting them. Degenerate count vectors (no cells, no parasites) are never errors, they
/// are handled by the numeric routines directly.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("could not find {artifact} for {model} ({path})")]
    MissingArtifact {
        artifact: &'static str,
        model: String,
        path: PathBuf,
    },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{path} contains no rows")]
    EmptyMatrix { path: PathBuf },
    #[error("row {row} of {path} has {found} entries, expected {expected}")]
    RaggedMatrix {
        path: PathBuf,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("{name} must be square, found {rows}x{cols}")]
    NonSquareMatrix {
        name: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("{name} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        found: (usize, usize),
        expected: (usize, usize),
    },
    #[error("{name} contains a non-finite entry at ({row}, {col})")]
    NonFiniteEntry {
        name: &'static str,
        row: usize,
        col: usize,
    },
    #[error("{name} contains a negative standard deviation at ({row}, {col})")]
    NegativeUncertainty {
        name: &'static str,
        row: usize,
        col: usize,
    },
    #[error("confusion matrix is not invertible: {reason}")]
    SingularMatrix { reason: String },
    #[error("class index {index} is out of range for {classes} classes")]
    ClassIndexOutOfRange { index: usize, classes: usize },
    #[error("unknown class {0:?}")]
    UnknownClass(String),
    #[error("class {0:?} is listed more than once")]
    DuplicateClass(String),
    #[error("the {0} class group is empty")]
    EmptyClassGroup(&'static str),
    #[error("no fit parameters for confidence threshold {threshold} in {path}")]
    ThresholdNotFound { threshold: f64, path: PathBuf },
    #[error("fit slope {slope} is too close to zero to invert")]
    DegenerateSlope { slope: f64 },
    #[error("fit parameter {name} is not finite ({value})")]
    NonFiniteParameter { name: &'static str, value: f64 },
}

impl ConfigurationError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}
