//! Learners
//!
//! The capability contract the estimators are polymorphic over. A [`Learner`]
//! is an immutable blueprint: every call to [`Learner::fit`] returns a new,
//! independent [`Classifier`], so no state can leak from one fold into another.
use crate::data::Matrix;
use crate::errors::DmlError;
use log::warn;
use serde::{Deserialize, Serialize};

pub mod logistic;
pub mod prior;

pub use logistic::{LogisticModel, LogisticRegression};
pub use prior::{ClassPrior, PriorModel};

/// A fitted probabilistic classifier.
pub trait Classifier: Send + Sync {
    /// Sorted class labels seen during fitting.
    fn classes(&self) -> &[f64];

    /// Class probabilities, row-major with `x.rows` rows and `classes().len()` columns.
    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError>;

    /// Most likely class label for every row.
    fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError> {
        let classes = self.classes();
        let k = classes.len();
        let proba = self.predict_proba(x)?;
        Ok(proba
            .chunks(k)
            .map(|row| {
                let mut best = 0;
                for (j, p) in row.iter().enumerate() {
                    if *p > row[best] {
                        best = j;
                    }
                }
                classes[best]
            })
            .collect())
    }
}

/// Blueprint of a classifier.
pub trait Learner: Send + Sync {
    type Model: Classifier;

    /// Display name, written to the fit log.
    fn name(&self) -> &str;

    /// Fit a fresh model on `x` and the labels `y`.
    fn fit(&self, x: &Matrix<f64>, y: &[f64]) -> Result<Self::Model, DmlError>;
}

/// Prediction method used by the cross-fitted predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictMethod {
    /// Probability of the label `1`.
    PredictProba,
    /// Hard class label.
    Predict,
}

/// Probability of the label `1` for every row of `x`.
///
/// If the model saw a single class during fitting, there is no probability
/// column to select, and the hard prediction is returned instead.
pub fn predict_zero_one_proba<C: Classifier + ?Sized>(model: &C, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError> {
    let classes = model.classes();
    match classes.iter().position(|c| *c == 1.0) {
        Some(j) if classes.len() >= 2 => {
            let k = classes.len();
            let proba = model.predict_proba(x)?;
            check_prediction_rows(proba.len(), x.rows * k)?;
            Ok(proba.chunks(k).map(|row| row[j]).collect())
        }
        _ => {
            warn!("Subsample has not common support. Results are based on adjusted propensities.");
            let preds = model.predict(x)?;
            check_prediction_rows(preds.len(), x.rows)?;
            Ok(preds)
        }
    }
}

/// A model must return exactly one prediction per requested entry.
pub(crate) fn check_prediction_rows(got: usize, expected: usize) -> Result<(), DmlError> {
    if got != expected {
        return Err(DmlError::LearnerError(format!(
            "model returned {} predictions, expected {}",
            got, expected
        )));
    }
    Ok(())
}

/// Sorted unique labels, rejecting anything that is not 0 or 1.
pub(crate) fn binary_classes(y: &[f64]) -> Result<Vec<f64>, DmlError> {
    if y.is_empty() {
        return Err(DmlError::LearnerError("cannot fit on an empty sample".to_string()));
    }
    if let Some(v) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(DmlError::LearnerError(format!(
            "labels must be 0 or 1, found {}",
            v
        )));
    }
    let mut classes = Vec::with_capacity(2);
    if y.iter().any(|v| *v == 0.0) {
        classes.push(0.0);
    }
    if y.iter().any(|v| *v == 1.0) {
        classes.push(1.0);
    }
    Ok(classes)
}
