//! Synthetic data
//!
//! Interactive regression model with a binary treatment:
//!
//! $$d_i = 1\left\{\frac{\exp(c_d\, x_i'\beta)}{1 + \exp(c_d\, x_i'\beta)} > v_i\right\}, \qquad
//! y_i = \theta d_i + d_i\, c_y\, x_i'\beta + \zeta_i$$
//!
//! with $v_i \sim U(0, 1)$, $\zeta_i \sim N(0, 1)$, $\beta_j = 1/j^2$ and
//! $x_i \sim N(0, \Sigma)$, $\Sigma_{kj} = 0.5^{|j-k|}$. The constants
//!
//! $$c_y = \sqrt{\frac{R_y^2}{(1 - R_y^2)\,\beta'\Sigma\beta}}, \qquad
//! c_d = \sqrt{\frac{(\pi^2/3)\, R_d^2}{(1 - R_d^2)\,\beta'\Sigma\beta}}$$
//!
//! control the strength of confounding. The potential outcome $Y(1)$ is
//! symmetric around $\theta$, so its median is $\theta$.
use crate::data::DmlData;
use crate::errors::DmlError;
use crate::utils::{validate_min_usize, validate_open_interval};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

const TOEPLITZ_RHO: f64 = 0.5;

/// `beta' Sigma beta` for `beta_j = 1/j^2` and `Sigma_kj = rho^|j-k|`.
fn beta_sigma_beta(beta: &[f64]) -> f64 {
    let mut total = 0.0;
    for (j, bj) in beta.iter().enumerate() {
        for (k, bk) in beta.iter().enumerate() {
            total += bj * bk * TOEPLITZ_RHO.powi((j as i32 - k as i32).abs());
        }
    }
    total
}

/// Draw a sample of the interactive regression model.
///
/// * `theta` - Treatment effect, the median of `Y(1)`.
/// * `n_obs` - Number of observations.
/// * `dim_x` - Number of covariates.
/// * `r2_d` - Share of treatment variation explained by the covariates, in `(0, 1)`.
/// * `r2_y` - Share of outcome variation explained by the covariates, in `(0, 1)`.
/// * `rng` - Random number generator.
pub fn make_irm_data(
    theta: f64,
    n_obs: usize,
    dim_x: usize,
    r2_d: f64,
    r2_y: f64,
    rng: &mut StdRng,
) -> Result<DmlData, DmlError> {
    validate_min_usize(n_obs, 1, "n_obs")?;
    validate_min_usize(dim_x, 1, "dim_x")?;
    validate_open_interval(r2_d, 0.0, 1.0, "r2_d")?;
    validate_open_interval(r2_y, 0.0, 1.0, "r2_y")?;

    let beta: Vec<f64> = (1..=dim_x).map(|j| 1.0 / (j * j) as f64).collect();
    let b_sigma_b = beta_sigma_beta(&beta);
    let c_y = (r2_y / ((1.0 - r2_y) * b_sigma_b)).sqrt();
    let c_d = (PI * PI / 3.0 * r2_d / ((1.0 - r2_d) * b_sigma_b)).sqrt();

    // AR(1) recursion over the columns has the Toeplitz covariance.
    let innovation_sd = (1.0 - TOEPLITZ_RHO * TOEPLITZ_RHO).sqrt();
    let mut x = vec![0.0; n_obs * dim_x];
    let mut y = Vec::with_capacity(n_obs);
    let mut d = Vec::with_capacity(n_obs);
    for i in 0..n_obs {
        let mut prev: f64 = StandardNormal.sample(rng);
        x[i] = prev;
        for j in 1..dim_x {
            let e: f64 = StandardNormal.sample(rng);
            prev = TOEPLITZ_RHO * prev + innovation_sd * e;
            x[j * n_obs + i] = prev;
        }
        let index: f64 = (0..dim_x).map(|j| x[j * n_obs + i] * beta[j]).sum();
        let prop = 1.0 / (1.0 + (-c_d * index).exp());
        let v: f64 = rng.gen();
        let d_i = if prop > v { 1.0 } else { 0.0 };
        let zeta: f64 = StandardNormal.sample(rng);
        y.push(theta * d_i + d_i * c_y * index + zeta);
        d.push(d_i);
    }
    DmlData::new(x, dim_x, y, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{mean, median};
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn test_shapes_and_treatment() {
        let mut rng = StdRng::seed_from_u64(0);
        let data = make_irm_data(0.5, 300, 7, 0.5, 0.5, &mut rng).unwrap();
        assert_eq!(data.n_obs(), 300);
        assert_eq!(data.n_cols, 7);
        assert!(data.is_binary_treatment());
        let share = mean(&data.d);
        assert!(share > 0.3 && share < 0.7);
    }

    #[test]
    fn test_covariate_correlation() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 20_000;
        let data = make_irm_data(0.0, n, 3, 0.5, 0.5, &mut rng).unwrap();
        let x = data.x_matrix();
        let (c0, c1, c2) = (x.get_col(0), x.get_col(1), x.get_col(2));
        let cov = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(u, v)| u * v).sum::<f64>() / n as f64;
        assert!((cov(c0, c0) - 1.0).abs() < 0.05);
        assert!((cov(c0, c1) - 0.5).abs() < 0.05);
        assert!((cov(c0, c2) - 0.25).abs() < 0.05);
    }

    #[test]
    fn test_median_of_treated_potential_outcome() {
        let mut rng = StdRng::seed_from_u64(2);
        let data = make_irm_data(0.5, 20_000, 5, 0.5, 0.5, &mut rng).unwrap();
        // Y(1) = theta + c_y x'beta + zeta is observed for every treated row, but
        // selection on x shifts the treated sample upwards.
        let treated: Vec<f64> = data.y.iter().zip(&data.d).filter(|(_, d)| **d == 1.0).map(|(y, _)| *y).collect();
        assert!(median(&treated) > 0.5);
        let control: Vec<f64> = data.y.iter().zip(&data.d).filter(|(_, d)| **d == 0.0).map(|(y, _)| *y).collect();
        assert!(median(&control).abs() < 0.1);
    }

    #[test]
    fn test_beta_sigma_beta() {
        assert_relative_eq!(beta_sigma_beta(&[1.0]), 1.0);
        assert_relative_eq!(beta_sigma_beta(&[1.0, 0.25]), 1.0 + 0.0625 + 2.0 * 0.25 * 0.5);
        assert!(make_irm_data(0.5, 10, 2, 1.0, 0.5, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
