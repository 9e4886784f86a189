//! Estimation engine
//!
//! Solves a [`NonLinearScore`] for the causal parameter, estimates its
//! asymptotic variance and aggregates repeated sample splits.
//!
//! # Procedures
//!
//! * `dml1` solves the score separately on every test fold and averages the roots.
//! * `dml2` solves the score once on the pooled sample.
//!
//! # Variance
//!
//! With $J = \frac{1}{n}\sum_i \partial_\theta \psi_i(\hat\theta)$ the sandwich
//! variance is $\hat\sigma^2 = \frac{1}{n} \frac{\frac{1}{n}\sum_i \psi_i^2}{J^2}$.
//!
//! # Aggregation over repetitions
//!
//! * Mean: $\bar\theta = \text{mean}(\theta_r)$, $se = \sqrt{\text{mean}(n\, se_r^2) / n}$.
//! * Median: $\tilde\theta = \text{median}(\theta_r)$,
//!   $se = \sqrt{\text{median}(n\, se_r^2 + (\theta_r - \tilde\theta)^2) / n}$.
use crate::constants::DERIV_EPS;
use crate::errors::DmlError;
use crate::resampling::SampleSplit;
use crate::score::NonLinearScore;
use crate::solver::solve_bracketed;
use crate::utils::{items_to_strings, mean, median};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Double machine learning algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DmlProcedure {
    Dml1,
    #[default]
    Dml2,
}

impl FromStr for DmlProcedure {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dml1" => Ok(DmlProcedure::Dml1),
            "dml2" => Ok(DmlProcedure::Dml2),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "DmlProcedure".to_string(),
                items_to_strings(vec!["dml1", "dml2"]),
            )),
        }
    }
}

/// Rule to combine estimates of repeated sample splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
}

impl FromStr for Aggregation {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "Aggregation".to_string(),
                items_to_strings(vec!["mean", "median"]),
            )),
        }
    }
}

/// Root of the score for one repetition.
#[derive(Debug, Clone)]
pub struct CoefEstimate {
    /// Estimate of the repetition.
    pub coef: f64,
    /// Root on every test fold, only for `dml1`.
    pub fold_coefs: Vec<f64>,
}

/// Solve the score for one repetition.
///
/// * `score` - Score to solve.
/// * `elements` - Nuisance predictions of the repetition.
/// * `splits` - Sample splits of the repetition, used by `dml1`.
/// * `procedure` - `dml1` or `dml2`.
/// * `start` - Start value of the bracket search.
/// * `bounds` - Bounds of the bracket search.
pub fn estimate_coefficient<S: NonLinearScore>(
    score: &S,
    elements: &S::Elements,
    splits: &[SampleSplit],
    procedure: DmlProcedure,
    start: f64,
    bounds: (f64, f64),
) -> Result<CoefEstimate, DmlError> {
    match procedure {
        DmlProcedure::Dml1 => {
            let fold_coefs = splits
                .iter()
                .map(|split| solve_bracketed(|theta| score.mean_score(elements, theta, Some(&split.test)), start, bounds))
                .collect::<Result<Vec<f64>, DmlError>>()?;
            Ok(CoefEstimate {
                coef: mean(&fold_coefs),
                fold_coefs,
            })
        }
        DmlProcedure::Dml2 => {
            let coef = solve_bracketed(|theta| score.mean_score(elements, theta, None), start, bounds)?;
            Ok(CoefEstimate {
                coef,
                fold_coefs: Vec::new(),
            })
        }
    }
}

/// Scores and variance of one repetition at its estimate.
#[derive(Debug, Clone)]
pub struct VarianceEstimate {
    /// Score of every observation.
    pub psi: Vec<f64>,
    /// Score derivative of every observation.
    pub psi_deriv: Vec<f64>,
    /// Mean of the score derivative.
    pub deriv_mean: f64,
    /// Asymptotic variance divided by `n`.
    pub sigma2: f64,
    /// Standard error.
    pub se: f64,
}

/// Sandwich variance of the estimate `theta`.
pub fn estimate_variance<S: NonLinearScore>(score: &S, elements: &S::Elements, theta: f64) -> Result<VarianceEstimate, DmlError> {
    let n_obs = score.n_obs(elements) as f64;
    let psi = score.score(elements, theta, None);
    let psi_deriv = score.score_deriv(elements, theta, None);
    let deriv_mean = mean(&psi_deriv);
    if !deriv_mean.is_finite() || deriv_mean.abs() < DERIV_EPS {
        warn!(
            "Mean of the score derivative is {} at theta = {}. Consider a larger bandwidth.",
            deriv_mean, theta
        );
        return Err(DmlError::DegenerateDerivative(deriv_mean));
    }
    let psi_sq_mean = psi.iter().map(|p| p * p).sum::<f64>() / n_obs;
    let sigma2 = psi_sq_mean / (deriv_mean * deriv_mean) / n_obs;
    Ok(VarianceEstimate {
        psi,
        psi_deriv,
        deriv_mean,
        sigma2,
        se: sigma2.sqrt(),
    })
}

/// Combine estimates and standard errors of repeated sample splits.
///
/// Returns the aggregated estimate and standard error.
pub fn aggregate(all_coef: &[f64], all_se: &[f64], n_obs: usize, aggregation: Aggregation) -> (f64, f64) {
    let n = n_obs as f64;
    match aggregation {
        Aggregation::Mean => {
            let coef = mean(all_coef);
            let scaled: Vec<f64> = all_se.iter().map(|se| n * se * se).collect();
            (coef, (mean(&scaled) / n).sqrt())
        }
        Aggregation::Median => {
            let coef = median(all_coef);
            let scaled: Vec<f64> = all_se
                .iter()
                .zip(all_coef)
                .map(|(se, c)| n * se * se + (c - coef).powi(2))
                .collect();
            (coef, (median(&scaled) / n).sqrt())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resampling::Resampling;
    use crate::score::{PotentialQuantileScore, ScoreElements};
    use crate::solver::solve_bracketed;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn setup() -> (PotentialQuantileScore, ScoreElements, Vec<SampleSplit>) {
        let n = 400;
        let y: Vec<f64> = (0..n).map(|i| ((i * 37) % n) as f64 / n as f64).collect();
        let ind_d: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 0.0 } else { 1.0 }).collect();
        let g: Vec<f64> = (0..n).map(|i| 0.3 + 0.4 * ((i * 11) % 17) as f64 / 17.0).collect();
        let m: Vec<f64> = (0..n).map(|i| 0.5 + 0.3 * ((i * 5) % 7) as f64 / 7.0).collect();
        let score = PotentialQuantileScore {
            quantile: 0.4,
            treatment: 1,
            h: (n as f64).powf(-0.2),
            normalize: true,
        };
        let splits = Resampling::new(4, 1, n, true).unwrap().split_samples_seeded(1).remove(0);
        (score, ScoreElements { ind_d, g, m, y }, splits)
    }

    #[test]
    fn test_dml2_solves_pooled_score() {
        let (score, el, splits) = setup();
        let est = estimate_coefficient(&score, &el, &splits, DmlProcedure::Dml2, 0.4, (0.0, 1.0)).unwrap();
        assert!(est.fold_coefs.is_empty());
        // Manual: solve the mean of the raw score array.
        let manual = solve_bracketed(
            |theta| {
                let psi: Vec<f64> = (0..el.n_obs())
                    .map(|i| {
                        let below = if el.y[i] <= theta { 1.0 } else { 0.0 };
                        el.ind_d[i] * (below - el.g[i]) / el.m[i] + el.g[i] - 0.4
                    })
                    .collect();
                mean(&psi)
            },
            0.4,
            (0.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(est.coef, manual, max_relative = 1e-9, epsilon = 1e-4);
        let s_left = score.mean_score(&el, est.coef - 0.01, None);
        let s_right = score.mean_score(&el, est.coef + 0.01, None);
        assert!(s_left <= 0.0 && s_right >= 0.0);
    }

    #[test]
    fn test_dml1_averages_fold_roots() {
        let (score, el, splits) = setup();
        let est = estimate_coefficient(&score, &el, &splits, DmlProcedure::Dml1, 0.4, (0.0, 1.0)).unwrap();
        assert_eq!(est.fold_coefs.len(), 4);
        let manual: Vec<f64> = splits
            .iter()
            .map(|split| {
                let sub = ScoreElements {
                    ind_d: split.test.iter().map(|i| el.ind_d[*i]).collect(),
                    g: split.test.iter().map(|i| el.g[*i]).collect(),
                    m: split.test.iter().map(|i| el.m[*i]).collect(),
                    y: split.test.iter().map(|i| el.y[*i]).collect(),
                };
                solve_bracketed(|theta| score.mean_score(&sub, theta, None), 0.4, (0.0, 1.0)).unwrap()
            })
            .collect();
        for (a, b) in est.fold_coefs.iter().zip(&manual) {
            assert_relative_eq!(*a, *b, max_relative = 1e-9, epsilon = 1e-4);
        }
        assert_relative_eq!(est.coef, mean(&manual), max_relative = 1e-9, epsilon = 1e-4);
    }

    #[test]
    fn test_variance_matches_sandwich() {
        let (score, el, splits) = setup();
        let est = estimate_coefficient(&score, &el, &splits, DmlProcedure::Dml2, 0.4, (0.0, 1.0)).unwrap();
        let var = estimate_variance(&score, &el, est.coef).unwrap();
        let n = el.n_obs() as f64;
        let j = mean(&score.score_deriv(&el, est.coef, None));
        let psi = score.score(&el, est.coef, None);
        let expected = psi.iter().map(|p| p * p).sum::<f64>() / n / (j * j) / n;
        assert_relative_eq!(var.sigma2, expected, max_relative = 1e-12);
        assert_relative_eq!(var.se, expected.sqrt(), max_relative = 1e-12);
        assert_eq!(var.psi.len(), el.n_obs());
    }

    #[test]
    fn test_degenerate_derivative() {
        let (mut score, el, _) = setup();
        // Kernel mass vanishes far away from every outcome.
        score.h = 1e-3;
        let res = estimate_variance(&score, &el, 50.0);
        assert!(matches!(res, Err(DmlError::DegenerateDerivative(_))));
    }

    #[test]
    fn test_aggregate() {
        let coefs = [1.0, 2.0, 4.0];
        let ses = [0.1, 0.2, 0.3];
        let n = 100;
        let (c, se) = aggregate(&coefs, &ses, n, Aggregation::Mean);
        assert_relative_eq!(c, 7.0 / 3.0);
        assert_relative_eq!(se, ((0.01 + 0.04 + 0.09) / 3.0_f64).sqrt(), max_relative = 1e-12);

        let (c, se) = aggregate(&coefs, &ses, n, Aggregation::Median);
        assert_relative_eq!(c, 2.0);
        // n * se^2 + (c_r - 2)^2 = [2.0, 4.0, 13.0], median 4.0
        assert_relative_eq!(se, (4.0_f64 / 100.0).sqrt(), max_relative = 1e-12);

        let (c, se) = aggregate(&[1.5], &[0.2], n, Aggregation::Median);
        assert_abs_diff_eq!(c, 1.5);
        assert_relative_eq!(se, 0.2, max_relative = 1e-12);
    }

    #[test]
    fn test_parse_procedure() {
        assert_eq!(DmlProcedure::from_str("dml1").unwrap(), DmlProcedure::Dml1);
        assert!(DmlProcedure::from_str("dml3").is_err());
        assert_eq!(Aggregation::from_str("median").unwrap(), Aggregation::Median);
        assert!(Aggregation::from_str("mode").is_err());
    }
}
