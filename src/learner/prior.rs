//! Class prior learner: predicts the training class frequencies for every row.
use super::{binary_classes, Classifier, Learner};
use crate::data::Matrix;
use crate::errors::DmlError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassPrior {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorModel {
    classes: Vec<f64>,
    proba: Vec<f64>,
}

impl Learner for ClassPrior {
    type Model = PriorModel;

    fn name(&self) -> &str {
        "ClassPrior"
    }

    fn fit(&self, _x: &Matrix<f64>, y: &[f64]) -> Result<PriorModel, DmlError> {
        let classes = binary_classes(y)?;
        let n = y.len() as f64;
        let proba = classes
            .iter()
            .map(|c| y.iter().filter(|v| *v == c).count() as f64 / n)
            .collect();
        Ok(PriorModel { classes, proba })
    }
}

impl Classifier for PriorModel {
    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError> {
        let mut out = Vec::with_capacity(x.rows * self.proba.len());
        for _ in 0..x.rows {
            out.extend_from_slice(&self.proba);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prior_frequencies() {
        let x = vec![0.0; 4];
        let m = Matrix::new(&x, 4, 1);
        let model = ClassPrior::default().fit(&m, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let proba = model.predict_proba(&m).unwrap();
        assert_eq!(proba.len(), 8);
        assert_relative_eq!(proba[0], 0.75);
        assert_relative_eq!(proba[1], 0.25);
        assert_eq!(model.predict(&m).unwrap(), vec![0.0; 4]);
    }
}
