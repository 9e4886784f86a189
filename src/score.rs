//! Orthogonal scores
//!
//! A [`NonLinearScore`] is a moment function `psi(W; theta, eta)` that is
//! non-linear in the parameter, together with its derivative in `theta`. The
//! estimation engine only talks to this trait; the potential-quantile score
//! is its implementation for this crate.
//!
//! # Potential quantile score
//!
//! $$\psi = \frac{1\{D = d\}\,(1\{Y \le \theta\} - g)}{m} + g - \tau$$
//!
//! where $g$ estimates $P(Y \le \theta \mid X, D = d)$, $m$ estimates
//! $P(D = d \mid X)$ and $\tau$ is the quantile.
//!
//! The derivative replaces the Dirac mass of $1\{Y \le \theta\}$ by a gaussian
//! kernel with bandwidth $h$.
use crate::utils::mean;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Per-observation statistics the potential quantile score depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreElements {
    /// `1.0` where the treatment equals the treatment of interest, `0.0` otherwise.
    pub ind_d: Vec<f64>,
    /// Conditional CDF predictions.
    pub g: Vec<f64>,
    /// Propensity predictions for the treatment of interest, trimmed.
    pub m: Vec<f64>,
    /// Outcome.
    pub y: Vec<f64>,
}

impl ScoreElements {
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }
}

/// Evaluate `f` for the selected rows, or for all `n` rows.
#[inline]
fn map_rows<F: Fn(usize) -> f64>(n: usize, inds: Option<&[usize]>, f: F) -> Vec<f64> {
    match inds {
        Some(inds) => inds.iter().map(|i| f(*i)).collect(),
        None => (0..n).map(f).collect(),
    }
}

/// A moment function that is non-linear in the causal parameter.
pub trait NonLinearScore: Sync {
    /// Bundle of nuisance predictions and data the score is evaluated on.
    type Elements: Sync;

    /// Number of observations in `elements`.
    fn n_obs(&self, elements: &Self::Elements) -> usize;

    /// Score of every selected observation at `theta`.
    fn score(&self, elements: &Self::Elements, theta: f64, inds: Option<&[usize]>) -> Vec<f64>;

    /// Derivative of the score in `theta` for every selected observation.
    fn score_deriv(&self, elements: &Self::Elements, theta: f64, inds: Option<&[usize]>) -> Vec<f64>;

    fn mean_score(&self, elements: &Self::Elements, theta: f64, inds: Option<&[usize]>) -> f64 {
        mean(&self.score(elements, theta, inds))
    }

    fn mean_score_deriv(&self, elements: &Self::Elements, theta: f64, inds: Option<&[usize]>) -> f64 {
        mean(&self.score_deriv(elements, theta, inds))
    }
}

/// Neyman-orthogonal score for the potential quantile of a binary treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotentialQuantileScore {
    /// Quantile in `(0, 1)`.
    pub quantile: f64,
    /// Treatment level of the potential outcome, 0 or 1.
    pub treatment: u8,
    /// Kernel bandwidth of the derivative.
    pub h: f64,
    /// Normalize the inverse propensity weights to mean one in the derivative.
    pub normalize: bool,
}

impl PotentialQuantileScore {
    /// Inverse probability weighting moment `1{D = d} / m * 1{Y <= theta} - tau`.
    pub fn ipw_score(&self, theta: f64, d: &[f64], y: &[f64], prop: &[f64]) -> Vec<f64> {
        let treatment = f64::from(self.treatment);
        d.iter()
            .zip(y)
            .zip(prop)
            .map(|((d_, y_), p)| {
                let ind = if *d_ == treatment { 1.0 } else { 0.0 };
                let below = if *y_ <= theta { 1.0 } else { 0.0 };
                ind / p * below - self.quantile
            })
            .collect()
    }
}

#[inline]
fn gaussian_kernel(u: f64) -> f64 {
    (-0.5 * u * u).exp() / (2.0 * PI).sqrt()
}

impl NonLinearScore for PotentialQuantileScore {
    type Elements = ScoreElements;

    fn n_obs(&self, elements: &ScoreElements) -> usize {
        elements.n_obs()
    }

    fn score(&self, elements: &ScoreElements, theta: f64, inds: Option<&[usize]>) -> Vec<f64> {
        let ScoreElements { ind_d, g, m, y } = elements;
        map_rows(elements.n_obs(), inds, |i| {
            let below = if y[i] <= theta { 1.0 } else { 0.0 };
            ind_d[i] * (below - g[i]) / m[i] + g[i] - self.quantile
        })
    }

    fn score_deriv(&self, elements: &ScoreElements, theta: f64, inds: Option<&[usize]>) -> Vec<f64> {
        let ScoreElements { ind_d, m, y, .. } = elements;
        let mut weights = map_rows(elements.n_obs(), inds, |i| ind_d[i] / m[i]);
        if self.normalize {
            let normalization = mean(&weights);
            weights.iter_mut().for_each(|w| *w /= normalization);
        }
        let kernel = map_rows(elements.n_obs(), inds, |i| gaussian_kernel((y[i] - theta) / self.h));
        weights
            .iter()
            .zip(kernel)
            .map(|(w, k)| w * k / self.h)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn elements() -> ScoreElements {
        ScoreElements {
            ind_d: vec![1.0, 0.0, 1.0, 1.0],
            g: vec![0.4, 0.5, 0.6, 0.3],
            m: vec![0.5, 0.25, 0.8, 0.4],
            y: vec![-1.0, 0.0, 1.0, 2.0],
        }
    }

    fn pq(normalize: bool) -> PotentialQuantileScore {
        PotentialQuantileScore {
            quantile: 0.5,
            treatment: 1,
            h: 0.7,
            normalize,
        }
    }

    #[test]
    fn test_score_values() {
        let psi = pq(true).score(&elements(), 0.5, None);
        let expected = [
            (1.0 - 0.4) / 0.5 + 0.4 - 0.5,
            0.5 - 0.5,
            (0.0 - 0.6) / 0.8 + 0.6 - 0.5,
            (0.0 - 0.3) / 0.4 + 0.3 - 0.5,
        ];
        for (a, b) in psi.iter().zip(expected) {
            assert_relative_eq!(*a, b, epsilon = 1e-14);
        }
        let subset = pq(true).score(&elements(), 0.5, Some(&[2, 0]));
        assert_relative_eq!(subset[0], expected[2], epsilon = 1e-14);
        assert_relative_eq!(subset[1], expected[0], epsilon = 1e-14);
    }

    #[test]
    fn test_score_deriv_normalization() {
        let el = elements();
        let raw = pq(false).score_deriv(&el, 0.3, None);
        let normed = pq(true).score_deriv(&el, 0.3, None);
        let weights: Vec<f64> = el.ind_d.iter().zip(&el.m).map(|(i, m)| i / m).collect();
        let norm = mean(&weights);
        for i in 0..4 {
            let k = gaussian_kernel((el.y[i] - 0.3) / 0.7) / 0.7;
            assert_relative_eq!(raw[i], weights[i] * k, epsilon = 1e-14);
            assert_relative_eq!(normed[i], weights[i] / norm * k, epsilon = 1e-14);
        }
        assert_eq!(raw[1], 0.0);
    }

    #[test]
    fn test_score_is_orthogonal_in_expectation() {
        // With the true g and m the score has mean zero at the true quantile.
        let n = 2000;
        let y: Vec<f64> = (0..n).map(|i| (i / 2) as f64 / (n / 2) as f64).collect();
        let ind_d: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let theta = 0.25;
        let el = ScoreElements {
            ind_d,
            g: vec![0.25; n],
            m: vec![0.5; n],
            y,
        };
        let s = pq(true);
        let s = PotentialQuantileScore { quantile: 0.25, ..s };
        assert!(s.mean_score(&el, theta - 0.01, None) < 0.0);
        assert!(s.mean_score(&el, theta + 0.01, None) > 0.0);
        assert!(s.mean_score_deriv(&el, theta, None) > 0.0);
    }

    #[test]
    fn test_ipw_score_control_treatment() {
        let s = PotentialQuantileScore {
            quantile: 0.5,
            treatment: 0,
            h: 1.0,
            normalize: true,
        };
        let res = s.ipw_score(0.0, &[0.0, 1.0, 0.0], &[-1.0, -1.0, 1.0], &[0.5, 0.5, 0.5]);
        assert_eq!(res, vec![1.5, -0.5, -0.5]);
    }
}
