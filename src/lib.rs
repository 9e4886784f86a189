//! Double/debiased machine learning with nested cross-fitting for potential quantiles.

// Modules
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod cross_fit;
pub mod data;
pub mod datasets;
pub mod engine;
pub mod errors;
pub mod inference;
pub mod learner;
pub mod pq;
pub mod resampling;
pub mod score;
pub mod solver;
pub mod trimming;
pub mod utils;

// Individual classes, and functions
pub use bootstrap::BootstrapMethod;
pub use config::{ConfigIO, PqConfig};
pub use data::{DmlData, Matrix};
pub use engine::{Aggregation, DmlProcedure};
pub use errors::DmlError;
pub use learner::{Classifier, Learner};
pub use pq::DoubleMLPQ;
