//! L2-penalized logistic regression fitted by Newton's method (IRLS).
//!
//! Gradient and hessian of the log loss are `p - y` and `p (1 - p)` per row.
//! The intercept is not penalized.
use super::{binary_classes, Classifier, Learner};
use crate::data::Matrix;
use crate::errors::DmlError;
use log::debug;
use serde::{Deserialize, Serialize};

/// Ridge added to the unpenalized intercept so the hessian stays positive definite.
const INTERCEPT_RIDGE: f64 = 1e-10;
const MAX_HALVINGS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// L2 penalty on the slopes.
    pub alpha: f64,
    /// Maximum number of Newton steps.
    pub max_iter: usize,
    /// Convergence tolerance on the largest coefficient update.
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        LogisticRegression {
            alpha: 1.0,
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

impl LogisticRegression {
    pub fn new(alpha: f64) -> Self {
        LogisticRegression {
            alpha,
            ..Default::default()
        }
    }

    /// Set the maximum number of Newton steps.
    pub fn set_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

/// Fitted logistic regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    classes: Vec<f64>,
    /// Intercept followed by one slope per column.
    pub coef: Vec<f64>,
}

#[inline]
fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

#[inline]
fn linear_predictor(coef: &[f64], row: &[f64]) -> f64 {
    coef[0] + row.iter().zip(&coef[1..]).map(|(x, b)| x * b).sum::<f64>()
}

fn penalized_loss(coef: &[f64], rows: &[Vec<f64>], y: &[f64], alpha: f64) -> f64 {
    let nll: f64 = rows
        .iter()
        .zip(y)
        .map(|(row, y_)| {
            let eta = linear_predictor(coef, row);
            // log(1 + exp(eta)) - y * eta, written to avoid overflow
            let softplus = if eta > 0.0 { eta + (-eta).exp().ln_1p() } else { eta.exp().ln_1p() };
            softplus - y_ * eta
        })
        .sum();
    nll + 0.5 * alpha * coef[1..].iter().map(|b| b * b).sum::<f64>()
}

/// Solve `a x = b` for a symmetric positive definite `a` (row-major, `n x n`).
fn cholesky_solve(a: &[f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * n + k] * z[k];
        }
        z[i] = sum / l[i * n + i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[k * n + i] * x[k];
        }
        x[i] = sum / l[i * n + i];
    }
    Some(x)
}

impl Learner for LogisticRegression {
    type Model = LogisticModel;

    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn fit(&self, x: &Matrix<f64>, y: &[f64]) -> Result<LogisticModel, DmlError> {
        if x.rows != y.len() {
            return Err(DmlError::LearnerError(format!(
                "x has {} rows but {} labels were passed",
                x.rows,
                y.len()
            )));
        }
        let classes = binary_classes(y)?;
        let p = x.cols + 1;
        if classes.len() < 2 {
            return Ok(LogisticModel {
                classes,
                coef: vec![0.0; p],
            });
        }

        let rows: Vec<Vec<f64>> = (0..x.rows).map(|i| x.get_row(i)).collect();
        let mut coef = vec![0.0; p];
        let mut loss = penalized_loss(&coef, &rows, y, self.alpha);

        for iteration in 0..self.max_iter {
            let mut grad = vec![0.0; p];
            let mut hess = vec![0.0; p * p];
            for (row, y_) in rows.iter().zip(y) {
                let prob = sigmoid(linear_predictor(&coef, row));
                let g = prob - y_;
                let h = prob * (1.0 - prob);
                grad[0] += g;
                hess[0] += h;
                for j in 1..p {
                    let xj = row[j - 1];
                    grad[j] += g * xj;
                    hess[j] += h * xj;
                    hess[j * p] += h * xj;
                    for k in 1..=j {
                        hess[j * p + k] += h * xj * row[k - 1];
                    }
                }
            }
            // Only the lower triangle of the slope block was accumulated.
            for j in 1..p {
                for k in (j + 1)..p {
                    hess[j * p + k] = hess[k * p + j];
                }
                grad[j] += self.alpha * coef[j];
                hess[j * p + j] += self.alpha;
            }
            hess[0] += INTERCEPT_RIDGE;

            let step = cholesky_solve(&hess, &grad, p)
                .ok_or_else(|| DmlError::LearnerError("hessian is not positive definite".to_string()))?;

            let mut scale = 1.0;
            let mut candidate: Vec<f64> = coef.iter().zip(&step).map(|(c, s)| c - s).collect();
            let mut candidate_loss = penalized_loss(&candidate, &rows, y, self.alpha);
            let mut halvings = 0;
            while !(candidate_loss <= loss) && halvings < MAX_HALVINGS {
                scale *= 0.5;
                candidate = coef.iter().zip(&step).map(|(c, s)| c - scale * s).collect();
                candidate_loss = penalized_loss(&candidate, &rows, y, self.alpha);
                halvings += 1;
            }
            let max_update = step.iter().map(|s| (scale * s).abs()).fold(0.0, f64::max);
            if candidate_loss <= loss {
                coef = candidate;
                loss = candidate_loss;
            }
            if max_update < self.tol || halvings == MAX_HALVINGS {
                debug!("logistic regression stopped after {} newton steps", iteration + 1);
                break;
            }
        }
        Ok(LogisticModel { classes, coef })
    }
}

impl Classifier for LogisticModel {
    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn predict_proba(&self, x: &Matrix<f64>) -> Result<Vec<f64>, DmlError> {
        if x.cols + 1 != self.coef.len() {
            return Err(DmlError::LearnerError(format!(
                "model was fitted on {} columns, got {}",
                self.coef.len() - 1,
                x.cols
            )));
        }
        if self.classes.len() < 2 {
            return Ok(vec![1.0; x.rows]);
        }
        let mut out = Vec::with_capacity(2 * x.rows);
        for i in 0..x.rows {
            let prob = sigmoid(linear_predictor(&self.coef, &x.get_row(i)));
            out.push(1.0 - prob);
            out.push(prob);
        }
        Ok(out)
    }
}
