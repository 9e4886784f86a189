//! Potential quantiles
//!
//! Double machine learning estimator of the `tau`-quantile of the potential
//! outcome `Y(d)` under a binary treatment.
//!
//! # Example
//!
//! ```ignore
//! let data = make_irm_data(0.5, 500, 20, 0.5, 0.5, &mut StdRng::seed_from_u64(0))?;
//! let config = PqConfig::default().set_quantile(0.5);
//! let mut pq = DoubleMLPQ::new(data, LogisticRegression::default(), LogisticRegression::default(), config)?;
//! pq.fit()?;
//! println!("{}", pq.summary()?);
//! ```
use crate::bootstrap::{multiplier_bootstrap, BootstrapMethod, BootstrapResult};
use crate::config::PqConfig;
use crate::constants::{BANDWIDTH_EXPONENT, ML_G, ML_M, SCORE_PQ};
use crate::data::DmlData;
use crate::engine::{aggregate, estimate_coefficient, estimate_variance};
use crate::errors::DmlError;
use crate::inference;
use crate::learner::Learner;
use crate::resampling::{check_sample_splitting, Resampling, SampleSplit};
use crate::score::PotentialQuantileScore;
use crate::trimming::check_trimming;
use crate::utils::{fmt_vec_output, min_max, quantile_linear, validate_min_usize, validate_open_interval, validate_positive_float_parameter};
use hashbrown::HashMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod nuisance;

use nuisance::{estimate_pq_nuisance, NuisanceSettings};

/// Hyperparameter grid of one learner, parameter name to candidate values.
pub type ParamGrid = HashMap<String, Vec<f64>>;
/// Grids keyed by the learner key, `"ml_g"` or `"ml_m"`.
pub type ParamGrids = HashMap<String, ParamGrid>;

/// Estimates of every repetition and their aggregate.
#[derive(Debug, Clone)]
struct PqFit {
    coef: f64,
    se: f64,
    all_coef: Vec<f64>,
    all_se: Vec<f64>,
    all_dml1_coef: Vec<Vec<f64>>,
    psi: Vec<Vec<f64>>,
    psi_deriv: Vec<Vec<f64>>,
    deriv_mean: Vec<f64>,
    ipw_estimates: Vec<Vec<f64>>,
}

/// Fitted nuisance models, indexed `[repetition][fold]`.
pub struct PqModels<GM, MM> {
    pub ml_g: Vec<Vec<GM>>,
    pub ml_m: Vec<Vec<MM>>,
}

type FitOutput<G, M> = (
    PqFit,
    HashMap<String, Vec<Vec<f64>>>,
    Option<PqModels<<G as Learner>::Model, <M as Learner>::Model>>,
);

/// Summary of a fitted estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqSummary {
    pub coef: f64,
    pub std_err: f64,
    pub t_stat: f64,
    pub p_value: f64,
    pub level: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

impl fmt::Display for PqSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = format!("{:.1} %", (1.0 - self.level) / 2.0 * 100.0);
        let upper = format!("{:.1} %", (1.0 + self.level) / 2.0 * 100.0);
        writeln!(
            f,
            "{:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "coef", "std err", "t", "P>|t|", lower, upper
        )?;
        write!(
            f,
            "{:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10.6}",
            self.coef, self.std_err, self.t_stat, self.p_value, self.ci_lower, self.ci_upper
        )
    }
}

/// Double machine learning for potential quantiles.
pub struct DoubleMLPQ<G: Learner, M: Learner> {
    data: DmlData,
    ml_g: G,
    ml_m: M,
    config: PqConfig,
    score: PotentialQuantileScore,
    coef_start: f64,
    coef_bounds: (f64, f64),
    smpls: Option<Vec<Vec<SampleSplit>>>,
    fit: Option<PqFit>,
    predictions: Option<HashMap<String, Vec<Vec<f64>>>>,
    models: Option<PqModels<G::Model, M::Model>>,
    boot: Option<BootstrapResult>,
}

impl<G: Learner, M: Learner> DoubleMLPQ<G, M> {
    /// Create a new estimator.
    ///
    /// * `data` - Outcome, binary treatment and covariates.
    /// * `ml_g` - Classifier blueprint for `P(Y <= theta | X, D = d)`.
    /// * `ml_m` - Classifier blueprint for `P(D = d | X)`.
    /// * `config` - Estimator settings.
    pub fn new(data: DmlData, ml_g: G, ml_m: M, config: PqConfig) -> Result<Self, DmlError> {
        if data.is_cluster_data() {
            return Err(DmlError::NotImplemented(
                "Estimation with clustering not implemented.".to_string(),
            ));
        }
        if data.n_instruments() > 0 {
            return Err(DmlError::NotImplemented(
                "Incompatible data. Instrumental variables are not supported for potential quantiles.".to_string(),
            ));
        }
        if !data.is_binary_treatment() {
            return Err(DmlError::InvalidData(
                "Incompatible data. The treatment variable must be binary with values 0 and 1.".to_string(),
            ));
        }
        if !data.d.iter().any(|d| *d == 0.0) || !data.d.iter().any(|d| *d == 1.0) {
            return Err(DmlError::InvalidData(
                "Incompatible data. Both treatment levels must be observed.".to_string(),
            ));
        }
        if data.y.iter().any(|y| !y.is_finite()) {
            return Err(DmlError::InvalidData("The outcome contains missing or infinite values.".to_string()));
        }
        if config.score != SCORE_PQ {
            return Err(DmlError::InvalidParameter(
                "score".to_string(),
                SCORE_PQ.to_string(),
                config.score.clone(),
            ));
        }
        validate_open_interval(config.quantile, 0.0, 1.0, "quantile")?;
        if config.treatment > 1 {
            return Err(DmlError::InvalidParameter(
                "treatment".to_string(),
                "0 or 1".to_string(),
                config.treatment.to_string(),
            ));
        }
        check_trimming(config.trimming_threshold)?;
        validate_min_usize(config.n_folds, 2, "n_folds")?;
        validate_min_usize(config.n_rep, 1, "n_rep")?;
        if !config.apply_cross_fitting {
            return Err(DmlError::NotImplemented(
                "Estimation without cross-fitting not implemented for potential quantiles.".to_string(),
            ));
        }
        let h = config
            .h
            .unwrap_or_else(|| (data.n_obs() as f64).powf(BANDWIDTH_EXPONENT));
        validate_positive_float_parameter(h, "h")?;

        let score = PotentialQuantileScore {
            quantile: config.quantile,
            treatment: config.treatment,
            h,
            normalize: config.normalize,
        };
        let coef_start = quantile_linear(&data.y, config.quantile);
        let coef_bounds = min_max(&data.y);
        let draw = config.draw_sample_splitting;
        let mut pq = DoubleMLPQ {
            data,
            ml_g,
            ml_m,
            config,
            score,
            coef_start,
            coef_bounds,
            smpls: None,
            fit: None,
            predictions: None,
            models: None,
            boot: None,
        };
        if draw {
            pq.draw_sample_splitting()?;
        }
        Ok(pq)
    }

    pub fn config(&self) -> &PqConfig {
        &self.config
    }

    pub fn data(&self) -> &DmlData {
        &self.data
    }

    /// Kernel bandwidth of the score derivative.
    pub fn h(&self) -> f64 {
        self.score.h
    }

    /// Start value and bounds of the root searches.
    pub fn coef_start(&self) -> (f64, (f64, f64)) {
        (self.coef_start, self.coef_bounds)
    }

    /// Current sample splitting, `[repetition][fold]`.
    pub fn smpls(&self) -> Option<&[Vec<SampleSplit>]> {
        self.smpls.as_deref()
    }

    fn reset_results(&mut self) {
        self.fit = None;
        self.predictions = None;
        self.models = None;
        self.boot = None;
    }

    /// Draw a new stratified sample splitting from the configured seed.
    pub fn draw_sample_splitting(&mut self) -> Result<&[Vec<SampleSplit>], DmlError> {
        let resampling = Resampling::new(
            self.config.n_folds,
            self.config.n_rep,
            self.data.n_obs(),
            self.config.apply_cross_fitting,
        )?
        .with_stratify(&self.data.d)?;
        self.reset_results();
        Ok(self.smpls.insert(resampling.split_samples_seeded(self.config.seed)))
    }

    /// Use a caller supplied sample splitting, `[repetition][fold]`.
    ///
    /// The number of repetitions and folds is taken from `smpls`.
    pub fn set_sample_splitting(&mut self, smpls: Vec<Vec<SampleSplit>>) -> Result<(), DmlError> {
        check_sample_splitting(&smpls, self.data.n_obs(), self.config.apply_cross_fitting)?;
        let n_folds = smpls[0].len();
        if smpls.iter().any(|rep| rep.len() != n_folds) {
            return Err(DmlError::InvalidData(
                "every repetition must have the same number of folds".to_string(),
            ));
        }
        validate_min_usize(n_folds, 2, "n_folds")?;
        self.config.n_folds = n_folds;
        self.config.n_rep = smpls.len();
        self.reset_results();
        self.smpls = Some(smpls);
        Ok(())
    }

    /// Estimate with the default storage options: predictions are kept, models are not.
    pub fn fit(&mut self) -> Result<(), DmlError> {
        self.fit_with(true, false)
    }

    /// Estimate the potential quantile.
    ///
    /// * `store_predictions` - Keep the nuisance predictions of every repetition.
    /// * `store_models` - Keep the fitted nuisance models of every repetition and fold.
    pub fn fit_with(&mut self, store_predictions: bool, store_models: bool) -> Result<(), DmlError> {
        let smpls = self
            .smpls
            .as_deref()
            .ok_or_else(|| DmlError::NotFitted("The sample splitting".to_string()))?;
        let (fit, predictions, models) = if self.config.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.num_threads.unwrap_or(0))
                .build()
                .map_err(|e| {
                    DmlError::InvalidParameter("num_threads".to_string(), "a valid thread count".to_string(), e.to_string())
                })?;
            pool.install(|| self.fit_repetitions(smpls, store_models))?
        } else {
            self.fit_repetitions(smpls, store_models)?
        };

        self.boot = None;
        self.fit = Some(fit);
        self.predictions = if store_predictions { Some(predictions) } else { None };
        self.models = models;
        Ok(())
    }

    fn fit_repetitions(&self, smpls: &[Vec<SampleSplit>], store_models: bool) -> Result<FitOutput<G, M>, DmlError> {
        let settings = NuisanceSettings {
            score: self.score.clone(),
            trimming_rule: self.config.trimming_rule,
            trimming_threshold: self.config.trimming_threshold,
            n_folds: self.config.n_folds,
            nested_split_seed: self.config.nested_split_seed,
            coef_start: self.coef_start,
            coef_bounds: self.coef_bounds,
            parallel: self.config.parallel,
            store_models,
        };
        let n_rep = smpls.len();
        info!(
            "Fitting the {} quantile of Y({}) with ml_g = {}, ml_m = {}, {} folds, {} repetitions.",
            self.config.quantile,
            self.config.treatment,
            self.ml_g.name(),
            self.ml_m.name(),
            self.config.n_folds,
            n_rep
        );
        let mut fit = PqFit {
            coef: f64::NAN,
            se: f64::NAN,
            all_coef: Vec::with_capacity(n_rep),
            all_se: Vec::with_capacity(n_rep),
            all_dml1_coef: Vec::with_capacity(n_rep),
            psi: Vec::with_capacity(n_rep),
            psi_deriv: Vec::with_capacity(n_rep),
            deriv_mean: Vec::with_capacity(n_rep),
            ipw_estimates: Vec::with_capacity(n_rep),
        };
        let mut g_preds = Vec::with_capacity(n_rep);
        let mut m_preds = Vec::with_capacity(n_rep);
        let mut g_models = Vec::with_capacity(n_rep);
        let mut m_models = Vec::with_capacity(n_rep);

        for (r, rep) in smpls.iter().enumerate() {
            let nuisance = estimate_pq_nuisance(&self.ml_g, &self.ml_m, &self.data, rep, &settings)?;
            let est = estimate_coefficient(
                &self.score,
                &nuisance.elements,
                rep,
                self.config.dml_procedure,
                self.coef_start,
                self.coef_bounds,
            )?;
            let var = estimate_variance(&self.score, &nuisance.elements, est.coef)?;
            info!(
                "Repetition {}/{}: coef = {:.6}, se = {:.6}",
                r + 1,
                n_rep,
                est.coef,
                var.se
            );

            fit.all_coef.push(est.coef);
            fit.all_se.push(var.se);
            fit.all_dml1_coef.push(est.fold_coefs);
            fit.psi.push(var.psi);
            fit.psi_deriv.push(var.psi_deriv);
            fit.deriv_mean.push(var.deriv_mean);
            fit.ipw_estimates.push(nuisance.ipw_estimates);
            g_preds.push(nuisance.elements.g);
            m_preds.push(nuisance.elements.m);
            if let (Some(g), Some(m)) = (nuisance.ml_g_models, nuisance.ml_m_models) {
                g_models.push(g);
                m_models.push(m);
            }
        }

        let (coef, se) = aggregate(&fit.all_coef, &fit.all_se, self.data.n_obs(), self.config.aggregation);
        if n_rep > 1 {
            info!(
                "Aggregated [{}] by {:?}: coef = {:.6}, se = {:.6}",
                fmt_vec_output(&fit.all_coef),
                self.config.aggregation,
                coef,
                se
            );
        }
        fit.coef = coef;
        fit.se = se;

        let mut predictions = HashMap::new();
        predictions.insert(ML_G.to_string(), g_preds);
        predictions.insert(ML_M.to_string(), m_preds);
        let models = if store_models {
            Some(PqModels {
                ml_g: g_models,
                ml_m: m_models,
            })
        } else {
            None
        };
        Ok((fit, predictions, models))
    }

    fn fitted(&self) -> Result<&PqFit, DmlError> {
        self.fit.as_ref().ok_or_else(|| DmlError::NotFitted("The estimate".to_string()))
    }

    /// Aggregated estimate.
    pub fn coef(&self) -> Result<f64, DmlError> {
        Ok(self.fitted()?.coef)
    }

    /// Aggregated standard error.
    pub fn se(&self) -> Result<f64, DmlError> {
        Ok(self.fitted()?.se)
    }

    pub fn t_stat(&self) -> Result<f64, DmlError> {
        let fit = self.fitted()?;
        Ok(inference::t_stat(fit.coef, fit.se))
    }

    pub fn pval(&self) -> Result<f64, DmlError> {
        inference::p_value(self.t_stat()?)
    }

    /// Estimate of every repetition.
    pub fn all_coef(&self) -> Result<&[f64], DmlError> {
        Ok(&self.fitted()?.all_coef)
    }

    /// Standard error of every repetition.
    pub fn all_se(&self) -> Result<&[f64], DmlError> {
        Ok(&self.fitted()?.all_se)
    }

    /// Fold-level roots of every repetition, empty for `dml2`.
    pub fn all_dml1_coef(&self) -> Result<&[Vec<f64>], DmlError> {
        Ok(&self.fitted()?.all_dml1_coef)
    }

    /// Score of every observation, `[repetition][observation]`.
    pub fn psi(&self) -> Result<&[Vec<f64>], DmlError> {
        Ok(&self.fitted()?.psi)
    }

    /// Score derivative of every observation, `[repetition][observation]`.
    pub fn psi_deriv(&self) -> Result<&[Vec<f64>], DmlError> {
        Ok(&self.fitted()?.psi_deriv)
    }

    /// Preliminary quantile estimates of the nested fits, `[repetition][fold]`.
    pub fn ipw_estimates(&self) -> Result<&[Vec<f64>], DmlError> {
        Ok(&self.fitted()?.ipw_estimates)
    }

    /// Nuisance predictions keyed by `"ml_g"` and `"ml_m"`, `[repetition][observation]`.
    pub fn predictions(&self) -> Result<&HashMap<String, Vec<Vec<f64>>>, DmlError> {
        self.predictions
            .as_ref()
            .ok_or_else(|| DmlError::NotFitted("Stored predictions".to_string()))
    }

    /// Fitted nuisance models.
    pub fn models(&self) -> Result<&PqModels<G::Model, M::Model>, DmlError> {
        self.models
            .as_ref()
            .ok_or_else(|| DmlError::NotFitted("Stored models".to_string()))
    }

    /// Multiplier bootstrap of the fitted estimate.
    ///
    /// * `method` - Distribution of the bootstrap weights.
    /// * `n_boot_rep` - Number of draws per repetition.
    /// * `seed` - Seed of the weight generator.
    pub fn bootstrap(&mut self, method: BootstrapMethod, n_boot_rep: usize, seed: u64) -> Result<&BootstrapResult, DmlError> {
        let fit = self.fitted()?;
        let boot = multiplier_bootstrap(&fit.psi, &fit.deriv_mean, &fit.all_se, method, n_boot_rep, seed)?;
        Ok(self.boot.insert(boot))
    }

    /// Result of the last call to [`DoubleMLPQ::bootstrap`].
    pub fn boot_result(&self) -> Result<&BootstrapResult, DmlError> {
        self.boot
            .as_ref()
            .ok_or_else(|| DmlError::NotFitted("The bootstrap".to_string()))
    }

    /// Confidence interval at `level`.
    ///
    /// * `joint` - Use the bootstrapped t-statistics for the critical value.
    pub fn confint(&self, level: f64, joint: bool) -> Result<(f64, f64), DmlError> {
        let fit = self.fitted()?;
        if joint {
            let t = self.boot_result()?.pooled_t_stats();
            inference::joint_confint(fit.coef, fit.se, &t, level)
        } else {
            inference::confint(fit.coef, fit.se, level)
        }
    }

    /// Estimate, standard error, test statistic and 95% confidence interval.
    pub fn summary(&self) -> Result<PqSummary, DmlError> {
        let level = 0.95;
        let (ci_lower, ci_upper) = self.confint(level, false)?;
        Ok(PqSummary {
            coef: self.coef()?,
            std_err: self.se()?,
            t_stat: self.t_stat()?,
            p_value: self.pval()?,
            level,
            ci_lower,
            ci_upper,
        })
    }

    /// Hyperparameter tuning of the nuisance learners.
    ///
    /// Grid keys are checked, then the call fails: tuning is not available
    /// for potential quantiles.
    pub fn tune(&mut self, param_grids: &ParamGrids) -> Result<(), DmlError> {
        if let Some(key) = param_grids.keys().find(|k| *k != ML_G && *k != ML_M) {
            return Err(DmlError::InvalidParameter(
                "param_grids".to_string(),
                format!("keys {} or {}", ML_G, ML_M),
                key.clone(),
            ));
        }
        Err(DmlError::NotImplemented(
            "Nuisance tuning not implemented for potential quantiles.".to_string(),
        ))
    }
}
