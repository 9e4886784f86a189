//! Nested cross-fitting of the potential quantile nuisances
//!
//! For every fold the training set is halved. The first half yields a
//! preliminary inverse probability weighting estimate of the quantile, the
//! second half fits the conditional CDF at that estimate, and the propensity
//! is refitted on the whole training set.
use crate::cross_fit::cross_fit_predict;
use crate::data::{DmlData, Matrix};
use crate::errors::DmlError;
use crate::learner::{predict_zero_one_proba, Learner, PredictMethod};
use crate::resampling::{stratified_half_split, stratified_k_fold, SampleSplit};
use crate::score::{PotentialQuantileScore, ScoreElements};
use crate::solver::solve_bracketed;
use crate::trimming::{trim_in_place, TrimmingRule};
use crate::utils::{count_missing, mean};
use log::{debug, warn};
use rayon::prelude::*;

/// Settings of the nuisance procedure, derived from the estimator configuration.
#[derive(Debug, Clone)]
pub struct NuisanceSettings {
    pub score: PotentialQuantileScore,
    pub trimming_rule: TrimmingRule,
    pub trimming_threshold: f64,
    /// Number of folds of the preliminary propensity estimate.
    pub n_folds: usize,
    pub nested_split_seed: u64,
    /// Start value of the first root search.
    pub coef_start: f64,
    pub coef_bounds: (f64, f64),
    pub parallel: bool,
    pub store_models: bool,
}

/// Result of one repetition of the nuisance procedure.
pub struct NuisanceOutput<GM, MM> {
    /// Score elements, with `m` inverted for treatment 0 and trimmed.
    pub elements: ScoreElements,
    /// Preliminary quantile estimate of every fold.
    pub ipw_estimates: Vec<f64>,
    /// Conditional CDF model of every fold, if stored.
    pub ml_g_models: Option<Vec<GM>>,
    /// Propensity model of every fold, if stored.
    pub ml_m_models: Option<Vec<MM>>,
}

struct FoldFit<GM, MM> {
    g_hat: Vec<f64>,
    m_hat: Vec<f64>,
    ipw_est: f64,
    ml_g: GM,
    ml_m: MM,
}

fn rows_with_treatment(data: &DmlData, inds: &[usize], treatment: f64) -> Vec<usize> {
    inds.iter().copied().filter(|i| data.d[*i] == treatment).collect()
}

fn fit_fold<G: Learner, M: Learner>(
    ml_g: &G,
    ml_m: &M,
    data: &DmlData,
    settings: &NuisanceSettings,
    fold: usize,
    split: &SampleSplit,
    start: f64,
) -> Result<FoldFit<G::Model, M::Model>, DmlError> {
    let x = data.x_matrix();
    let treatment = settings.score.treatment;
    let treatment_value = f64::from(treatment);

    let d_train: Vec<f64> = split.train.iter().map(|i| data.d[*i]).collect();
    let (train_1, train_2) = stratified_half_split(&split.train, &d_train, settings.nested_split_seed);
    if rows_with_treatment(data, &train_1, treatment_value).is_empty() {
        return Err(DmlError::EmptyTreatmentGroup { fold, treatment });
    }
    let treated_2 = rows_with_treatment(data, &train_2, treatment_value);
    if treated_2.is_empty() {
        return Err(DmlError::EmptyTreatmentGroup { fold, treatment });
    }

    // Preliminary propensity on the first half.
    let d_1: Vec<f64> = train_1.iter().map(|i| data.d[*i]).collect();
    let y_1: Vec<f64> = train_1.iter().map(|i| data.y[*i]).collect();
    let x_1_data = x.take_rows(&train_1);
    let x_1 = Matrix::new(&x_1_data, train_1.len(), x.cols);
    let smpls_prelim = stratified_k_fold(&d_1, settings.n_folds)?;
    let mut m_prelim = cross_fit_predict(ml_m, &x_1, &d_1, PredictMethod::PredictProba, &smpls_prelim, false, false)?.preds;
    if treatment == 0 {
        m_prelim.iter_mut().for_each(|p| *p = 1.0 - *p);
    }
    trim_in_place(&mut m_prelim, settings.trimming_rule, settings.trimming_threshold)?;

    let ipw_est = solve_bracketed(
        |theta| mean(&settings.score.ipw_score(theta, &d_1, &y_1, &m_prelim)),
        start,
        settings.coef_bounds,
    )?;
    debug!("fold {}: preliminary estimate {:.6}", fold, ipw_est);

    // Conditional CDF at the preliminary estimate on the treated rows of the second half.
    let x_g_data = x.take_rows(&treated_2);
    let x_g = Matrix::new(&x_g_data, treated_2.len(), x.cols);
    let below: Vec<f64> = treated_2
        .iter()
        .map(|i| if data.y[*i] <= ipw_est { 1.0 } else { 0.0 })
        .collect();
    let g_model = ml_g.fit(&x_g, &below)?;

    let x_test_data = x.take_rows(&split.test);
    let x_test = Matrix::new(&x_test_data, split.test.len(), x.cols);
    let g_hat = predict_zero_one_proba(&g_model, &x_test)?;

    let x_train_data = x.take_rows(&split.train);
    let x_train = Matrix::new(&x_train_data, split.train.len(), x.cols);
    let m_model = ml_m.fit(&x_train, &d_train)?;
    let m_hat = predict_zero_one_proba(&m_model, &x_test)?;

    Ok(FoldFit {
        g_hat,
        m_hat,
        ipw_est,
        ml_g: g_model,
        ml_m: m_model,
    })
}

/// Fit the folds in order. Every fold after the first starts at the root
/// returned by the previous one.
fn fit_folds_warm_started<T, F>(splits: &[SampleSplit], start: f64, mut fit: F) -> Result<Vec<T>, DmlError>
where
    F: FnMut(usize, &SampleSplit, f64) -> Result<(T, f64), DmlError>,
{
    let mut start = start;
    let mut fits = Vec::with_capacity(splits.len());
    for (k, split) in splits.iter().enumerate() {
        let (fit_k, root) = fit(k, split, start)?;
        start = root;
        fits.push(fit_k);
    }
    Ok(fits)
}

/// Estimate the nuisance functions of one repetition.
///
/// * `ml_g` - Learner of the conditional CDF.
/// * `ml_m` - Learner of the propensity score.
/// * `data` - Data the estimator was built on.
/// * `splits` - Sample splits of the repetition.
/// * `settings` - Procedure settings.
///
/// Sequentially, every fold starts its root search at the estimate of the
/// previous fold. In parallel, every fold starts at `settings.coef_start`.
pub fn estimate_pq_nuisance<G: Learner, M: Learner>(
    ml_g: &G,
    ml_m: &M,
    data: &DmlData,
    splits: &[SampleSplit],
    settings: &NuisanceSettings,
) -> Result<NuisanceOutput<G::Model, M::Model>, DmlError> {
    let folds: Vec<FoldFit<G::Model, M::Model>> = if settings.parallel {
        splits
            .par_iter()
            .enumerate()
            .map(|(k, split)| fit_fold(ml_g, ml_m, data, settings, k, split, settings.coef_start))
            .collect::<Result<_, _>>()?
    } else {
        fit_folds_warm_started(splits, settings.coef_start, |k, split, start| {
            let fit = fit_fold(ml_g, ml_m, data, settings, k, split, start)?;
            let root = fit.ipw_est;
            Ok((fit, root))
        })?
    };

    let n_obs = data.n_obs();
    let mut g_hat = vec![f64::NAN; n_obs];
    let mut m_hat = vec![f64::NAN; n_obs];
    let mut ipw_estimates = Vec::with_capacity(folds.len());
    let mut ml_g_models = Vec::with_capacity(folds.len());
    let mut ml_m_models = Vec::with_capacity(folds.len());
    for (split, fit) in splits.iter().zip(folds) {
        for (k, i) in split.test.iter().enumerate() {
            g_hat[*i] = fit.g_hat[k];
            m_hat[*i] = fit.m_hat[k];
        }
        ipw_estimates.push(fit.ipw_est);
        ml_g_models.push(fit.ml_g);
        ml_m_models.push(fit.ml_m);
    }

    // g and m are written together, but a learner may still return NaN.
    let uncovered = count_missing(&g_hat).max(count_missing(&m_hat));
    if uncovered > 0 {
        return Err(DmlError::UncoveredIndices(uncovered));
    }

    if settings.score.treatment == 0 {
        m_hat.iter_mut().for_each(|p| *p = 1.0 - *p);
    }
    let threshold = settings.trimming_threshold;
    let n_extreme = m_hat.iter().filter(|p| **p < threshold || **p > 1.0 - threshold).count();
    if n_extreme > 0 {
        warn!(
            "{} propensity scores outside [{}, {}] were trimmed.",
            n_extreme,
            threshold,
            1.0 - threshold
        );
    }
    trim_in_place(&mut m_hat, settings.trimming_rule, threshold)?;

    let treatment_value = f64::from(settings.score.treatment);
    let ind_d = data
        .d
        .iter()
        .map(|d| if *d == treatment_value { 1.0 } else { 0.0 })
        .collect();
    let (ml_g_models, ml_m_models) = if settings.store_models {
        (Some(ml_g_models), Some(ml_m_models))
    } else {
        (None, None)
    };
    Ok(NuisanceOutput {
        elements: ScoreElements {
            ind_d,
            g: g_hat,
            m: m_hat,
            y: data.y.clone(),
        },
        ipw_estimates,
        ml_g_models,
        ml_m_models,
    })
}
