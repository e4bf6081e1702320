#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

extern crate blas_src;

pub mod artifacts;
pub mod compensator;
pub mod config;
pub mod corrector;
pub mod deskewer;
pub mod error;
pub mod math;
pub mod taxonomy;
pub mod units;

pub use compensator::{CompensationKey, CompensationOptions, Compensator, FitParameters};
pub use config::CorrectionConfig;
pub use corrector::{Corrector, Estimate};
pub use deskewer::Deskewer;
pub use error::ConfigurationError;
pub use taxonomy::Taxonomy;
pub use units::Unit;

pub type Result<T> = ::std::result::Result<T, ConfigurationError>;
