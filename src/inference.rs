//! Inference
//!
//! t-statistics, p-values and confidence intervals from an estimate and its
//! standard error, with bootstrap-based joint intervals.
use crate::errors::DmlError;
use crate::utils::{quantile_linear, validate_open_interval};
use statrs::distribution::{ContinuousCDF, Normal};

fn standard_normal() -> Result<Normal, DmlError> {
    Normal::new(0.0, 1.0).map_err(|e| DmlError::InvalidParameter("normal".to_string(), "N(0, 1)".to_string(), e.to_string()))
}

#[inline]
pub fn t_stat(coef: f64, se: f64) -> f64 {
    coef / se
}

/// Two-sided p-value of a standard normal statistic.
pub fn p_value(t: f64) -> Result<f64, DmlError> {
    Ok(2.0 * (1.0 - standard_normal()?.cdf(t.abs())))
}

/// Pointwise confidence interval `coef -/+ z * se` at `level`.
pub fn confint(coef: f64, se: f64, level: f64) -> Result<(f64, f64), DmlError> {
    validate_open_interval(level, 0.0, 1.0, "level")?;
    let z = standard_normal()?.inverse_cdf(1.0 - (1.0 - level) / 2.0);
    Ok((coef - z * se, coef + z * se))
}

/// Critical value of a joint interval: the `level` quantile of `|t*|`.
pub fn joint_critical_value(boot_t_stats: &[f64], level: f64) -> Result<f64, DmlError> {
    validate_open_interval(level, 0.0, 1.0, "level")?;
    if boot_t_stats.is_empty() {
        return Err(DmlError::NotFitted("bootstrap".to_string()));
    }
    let abs: Vec<f64> = boot_t_stats.iter().map(|t| t.abs()).collect();
    Ok(quantile_linear(&abs, level))
}

/// Joint confidence interval based on bootstrapped t-statistics.
pub fn joint_confint(coef: f64, se: f64, boot_t_stats: &[f64], level: f64) -> Result<(f64, f64), DmlError> {
    let crit = joint_critical_value(boot_t_stats, level)?;
    Ok((coef - crit * se, coef + crit * se))
}
