/// Name of the conditional CDF nuisance learner.
pub const ML_G: &str = "ml_g";
/// Name of the propensity nuisance learner.
pub const ML_M: &str = "ml_m";
/// Only score available for potential quantiles.
pub const SCORE_PQ: &str = "PQ";
/// Seed of the nested half-split used before this was configurable.
pub const NESTED_SPLIT_SEED: u64 = 42;
/// Default trimming threshold for propensities.
pub const TRIMMING_THRESHOLD: f64 = 1e-12;
/// Exponent of the default bandwidth `n_obs^BANDWIDTH_EXPONENT`.
pub const BANDWIDTH_EXPONENT: f64 = -0.2;
/// Step by which the root bracket grows, as a share of the bounds.
pub const BRACKET_STEP: f64 = 0.1;
/// Absolute tolerance of Brent's method.
pub const BRENT_XTOL: f64 = 2e-12;
/// Relative tolerance of Brent's method.
pub const BRENT_RTOL: f64 = 4.0 * f64::EPSILON;
/// Iteration limit of Brent's method.
pub const BRENT_MAXITER: usize = 100;
/// Smallest admissible absolute mean of the score derivative.
pub const DERIV_EPS: f64 = 1e-12;
