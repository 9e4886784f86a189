//! Multiplier bootstrap
//!
//! Perturbs the per-observation scores with i.i.d. weights to approximate the
//! sampling distribution of the studentized estimate:
//!
//! $$t^*_b = \frac{\frac{1}{n}\sum_i w_{bi}\,\psi_i}{J \cdot se}$$
use crate::errors::DmlError;
use crate::utils::{items_to_strings, validate_min_usize};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Distribution of the bootstrap weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapMethod {
    /// Centered exponential weights `Exp(1) - 1`.
    Bayes,
    /// Standard normal weights.
    Normal,
    /// Rademacher weights, `-1` or `1` with equal probability.
    Wild,
}

impl FromStr for BootstrapMethod {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bayes" => Ok(BootstrapMethod::Bayes),
            "normal" => Ok(BootstrapMethod::Normal),
            "wild" => Ok(BootstrapMethod::Wild),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "BootstrapMethod".to_string(),
                items_to_strings(vec!["Bayes", "normal", "wild"]),
            )),
        }
    }
}

/// Draw an `n_boot_rep x n_obs` weight matrix, one row per bootstrap draw.
pub fn draw_weights(method: BootstrapMethod, n_boot_rep: usize, n_obs: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    (0..n_boot_rep)
        .map(|_| {
            (0..n_obs)
                .map(|_| match method {
                    BootstrapMethod::Bayes => {
                        let e: f64 = Exp1.sample(rng);
                        e - 1.0
                    }
                    BootstrapMethod::Normal => StandardNormal.sample(rng),
                    BootstrapMethod::Wild => {
                        if rng.gen_bool(0.5) {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                })
                .collect()
        })
        .collect()
}

/// Bootstrap draws for every repetition of the sample splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub method: BootstrapMethod,
    pub n_boot_rep: usize,
    /// `boot_coef[r][b]`: deviation of the estimate in draw `b` of repetition `r`.
    pub boot_coef: Vec<Vec<f64>>,
    /// `boot_t_stat[r][b]`: studentized deviation.
    pub boot_t_stat: Vec<Vec<f64>>,
}

impl BootstrapResult {
    /// All t-statistics of all repetitions in one slice.
    pub fn pooled_t_stats(&self) -> Vec<f64> {
        self.boot_t_stat.iter().flatten().copied().collect()
    }
}

/// Multiplier bootstrap of the studentized estimate.
///
/// * `psi` - Scores per repetition, `psi[r][i]`.
/// * `deriv_mean` - Mean score derivative per repetition.
/// * `se` - Standard error per repetition.
/// * `method` - Weight distribution.
/// * `n_boot_rep` - Number of draws per repetition.
/// * `seed` - Seed of the weight generator. Weights of repetition `r` are drawn
///   after those of repetition `r - 1` from the same stream.
pub fn multiplier_bootstrap(
    psi: &[Vec<f64>],
    deriv_mean: &[f64],
    se: &[f64],
    method: BootstrapMethod,
    n_boot_rep: usize,
    seed: u64,
) -> Result<BootstrapResult, DmlError> {
    validate_min_usize(n_boot_rep, 1, "n_boot_rep")?;
    if psi.len() != deriv_mean.len() || psi.len() != se.len() {
        return Err(DmlError::InvalidData(format!(
            "got scores for {} repetitions, {} derivative means and {} standard errors",
            psi.len(),
            deriv_mean.len(),
            se.len()
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut boot_coef = Vec::with_capacity(psi.len());
    let mut boot_t_stat = Vec::with_capacity(psi.len());
    for ((psi_r, j), se_r) in psi.iter().zip(deriv_mean).zip(se) {
        let n_obs = psi_r.len() as f64;
        let weights = draw_weights(method, n_boot_rep, psi_r.len(), &mut rng);
        let coefs: Vec<f64> = weights
            .iter()
            .map(|w| w.iter().zip(psi_r).map(|(w_, p)| w_ * p).sum::<f64>() / (n_obs * j))
            .collect();
        boot_t_stat.push(coefs.iter().map(|c| c / se_r).collect());
        boot_coef.push(coefs);
    }
    Ok(BootstrapResult {
        method,
        n_boot_rep,
        boot_coef,
        boot_t_stat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scores() -> Vec<Vec<f64>> {
        vec![(0..50).map(|i| ((i * 13) % 11) as f64 / 11.0 - 0.45).collect()]
    }

    #[test]
    fn test_same_seed_same_draws() {
        for method in [BootstrapMethod::Bayes, BootstrapMethod::Normal, BootstrapMethod::Wild] {
            let a = multiplier_bootstrap(&scores(), &[0.8], &[0.1], method, 200, 11).unwrap();
            let b = multiplier_bootstrap(&scores(), &[0.8], &[0.1], method, 200, 11).unwrap();
            let c = multiplier_bootstrap(&scores(), &[0.8], &[0.1], method, 200, 12).unwrap();
            assert_eq!(a.boot_t_stat, b.boot_t_stat);
            assert_ne!(a.boot_t_stat, c.boot_t_stat);
        }
    }

    #[test]
    fn test_manual_draws_match() {
        let psi = scores();
        let (j, se) = (0.8, 0.1);
        for method in [BootstrapMethod::Bayes, BootstrapMethod::Normal, BootstrapMethod::Wild] {
            let res = multiplier_bootstrap(&psi, &[j], &[se], method, 100, 3).unwrap();
            let mut rng = StdRng::seed_from_u64(3);
            let weights = draw_weights(method, 100, psi[0].len(), &mut rng);
            for (b, w) in weights.iter().enumerate() {
                let mean_wpsi = w.iter().zip(&psi[0]).map(|(a, p)| a * p).sum::<f64>() / psi[0].len() as f64;
                assert_relative_eq!(res.boot_t_stat[0][b], mean_wpsi / (j * se), max_relative = 1e-9, epsilon = 1e-4);
                assert_relative_eq!(res.boot_coef[0][b], mean_wpsi / j, max_relative = 1e-9, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_weight_distributions() {
        let mut rng = StdRng::seed_from_u64(0);
        let wild = draw_weights(BootstrapMethod::Wild, 10, 100, &mut rng);
        assert!(wild.iter().flatten().all(|w| *w == 1.0 || *w == -1.0));
        let bayes = draw_weights(BootstrapMethod::Bayes, 100, 100, &mut rng);
        assert!(bayes.iter().flatten().all(|w| *w >= -1.0));
        let m: f64 = bayes.iter().flatten().sum::<f64>() / 10_000.0;
        assert!(m.abs() < 0.05);
        let normal = draw_weights(BootstrapMethod::Normal, 100, 100, &mut rng);
        let var: f64 = normal.iter().flatten().map(|w| w * w).sum::<f64>() / 10_000.0;
        assert!((var - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_invalid_input() {
        assert!(multiplier_bootstrap(&scores(), &[0.8], &[0.1], BootstrapMethod::Normal, 0, 0).is_err());
        assert!(multiplier_bootstrap(&scores(), &[0.8, 0.1], &[0.1], BootstrapMethod::Normal, 10, 0).is_err());
        assert_eq!(BootstrapMethod::from_str("wild").unwrap(), BootstrapMethod::Wild);
        assert!(BootstrapMethod::from_str("Wild").is_err());
    }
}
