//! Errors
//!
//! Custom error types used throughout the `debiased` crate.
use thiserror::Error;

/// Errors that can occur while configuring or fitting a DML estimator.
#[derive(Debug, Error)]
pub enum DmlError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// The data container does not satisfy the requirements of the estimator.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// The requested operation is not available for this estimator.
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    /// The score has the same sign on both ends of every bracket tried.
    #[error("Could not bracket a root of the score in [{lower}, {upper}].")]
    RootNotBracketed { lower: f64, upper: f64 },
    /// Brent's method ran out of iterations.
    #[error("Root solver did not converge after {0} iterations.")]
    RootNotConverged(usize),
    /// The mean of the score derivative is zero or not finite.
    #[error("Mean of the score derivative is {0}, the variance cannot be estimated.")]
    DegenerateDerivative(f64),
    /// A nested training half contains no observation with the treatment of interest.
    #[error("Fold {fold}: no observations with treatment == {treatment} in the nested training sample.")]
    EmptyTreatmentGroup { fold: usize, treatment: u8 },
    /// Some observations never appeared in a test fold.
    #[error("{0} observations did not receive an out-of-fold prediction.")]
    UncoveredIndices(usize),
    /// An inference method was called before the required estimation step.
    #[error("{0} has not been computed yet.")]
    NotFitted(String),
    /// A learner failed to fit or predict.
    #[error("Learner error: {0}")]
    LearnerError(String),
    /// Unable to write to file.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Unable to read from file.
    #[error("Unable to read from file {0}")]
    UnableToRead(String),
}
