//! Cross-fitted prediction
//!
//! Fits a fresh model on the training part of every split and writes its
//! predictions on the test part into an array aligned with the original rows.
use crate::data::Matrix;
use crate::errors::DmlError;
use crate::learner::{check_prediction_rows, predict_zero_one_proba, Classifier, Learner, PredictMethod};
use crate::resampling::SampleSplit;
use rayon::prelude::*;

/// Out-of-fold predictions together with the per-fold models.
pub struct CrossFitResult<M> {
    /// One prediction per row, `NaN` where a row was never in a test set.
    pub preds: Vec<f64>,
    /// Fitted model for every split, in split order, if requested.
    pub models: Option<Vec<M>>,
}

fn fit_predict_fold<L: Learner>(
    learner: &L,
    x: &Matrix<f64>,
    y: &[f64],
    method: PredictMethod,
    split: &SampleSplit,
) -> Result<(Vec<f64>, L::Model), DmlError> {
    let x_train_data = x.take_rows(&split.train);
    let x_train = Matrix::new(&x_train_data, split.train.len(), x.cols);
    let y_train: Vec<f64> = split.train.iter().map(|i| y[*i]).collect();
    let model = learner.fit(&x_train, &y_train)?;

    let x_test_data = x.take_rows(&split.test);
    let x_test = Matrix::new(&x_test_data, split.test.len(), x.cols);
    let preds = predict_method(&model, &x_test, method)?;
    Ok((preds, model))
}

/// Predict with the requested method.
pub fn predict_method<C: Classifier + ?Sized>(
    model: &C,
    x: &Matrix<f64>,
    method: PredictMethod,
) -> Result<Vec<f64>, DmlError> {
    match method {
        PredictMethod::PredictProba => predict_zero_one_proba(model, x),
        PredictMethod::Predict => {
            let preds = model.predict(x)?;
            check_prediction_rows(preds.len(), x.rows)?;
            Ok(preds)
        }
    }
}

/// Cross-fitted predictions of `learner`.
///
/// * `learner` - Blueprint, fitted once per split.
/// * `x` - Covariates for all rows.
/// * `y` - Labels for all rows.
/// * `method` - Prediction method applied to the test rows.
/// * `splits` - Train/test splits; test sets are expected to partition the rows.
/// * `return_models` - Keep the fitted model of every split.
/// * `parallel` - Fit the splits on the rayon thread pool.
pub fn cross_fit_predict<L: Learner>(
    learner: &L,
    x: &Matrix<f64>,
    y: &[f64],
    method: PredictMethod,
    splits: &[SampleSplit],
    return_models: bool,
    parallel: bool,
) -> Result<CrossFitResult<L::Model>, DmlError> {
    if x.rows != y.len() {
        return Err(DmlError::InvalidData(format!(
            "x has {} rows but {} labels were passed",
            x.rows,
            y.len()
        )));
    }
    let fold_results: Vec<(Vec<f64>, L::Model)> = if parallel {
        splits
            .par_iter()
            .map(|split| fit_predict_fold(learner, x, y, method, split))
            .collect::<Result<_, _>>()?
    } else {
        splits
            .iter()
            .map(|split| fit_predict_fold(learner, x, y, method, split))
            .collect::<Result<_, _>>()?
    };

    let mut preds = vec![f64::NAN; x.rows];
    let mut models = Vec::with_capacity(splits.len());
    for (split, (fold_preds, model)) in splits.iter().zip(fold_results) {
        for (i, p) in split.test.iter().zip(fold_preds) {
            preds[*i] = p;
        }
        models.push(model);
    }
    Ok(CrossFitResult {
        preds,
        models: if return_models { Some(models) } else { None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::{ClassPrior, LogisticRegression};
    use crate::resampling::{stratified_k_fold, SampleSplit};
    use crate::utils::count_missing;

    #[test]
    fn test_out_of_fold_prior() {
        // Each fold's prediction is the treated share of the other folds.
        let y = vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let x = vec![0.0; 6];
        let m = Matrix::new(&x, 6, 1);
        let splits = vec![
            SampleSplit::from_test(vec![0, 1, 2], 6).unwrap(),
            SampleSplit::from_test(vec![3, 4, 5], 6).unwrap(),
        ];
        let res = cross_fit_predict(&ClassPrior::default(), &m, &y, PredictMethod::PredictProba, &splits, true, false)
            .unwrap();
        assert_eq!(res.preds, vec![2.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);
        assert_eq!(res.models.unwrap().len(), 2);
    }

    #[test]
    fn test_uncovered_rows_stay_nan() {
        let y = vec![1.0, 0.0, 0.0, 1.0];
        let x = vec![0.0; 4];
        let m = Matrix::new(&x, 4, 1);
        let splits = vec![SampleSplit::from_test(vec![0, 1], 4).unwrap()];
        let res = cross_fit_predict(&ClassPrior::default(), &m, &y, PredictMethod::PredictProba, &splits, false, false)
            .unwrap();
        assert_eq!(count_missing(&res.preds), 2);
        assert!(res.models.is_none());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let n = 60;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 / n as f64) - 0.5).collect();
        let y: Vec<f64> = (0..n).map(|i| if (i * 7) % 5 < 2 { 1.0 } else { 0.0 }).collect();
        let m = Matrix::new(&x, n, 1);
        let splits = stratified_k_fold(&y, 4).unwrap();
        let learner = LogisticRegression::default();
        let seq = cross_fit_predict(&learner, &m, &y, PredictMethod::PredictProba, &splits, false, false).unwrap();
        let par = cross_fit_predict(&learner, &m, &y, PredictMethod::PredictProba, &splits, false, true).unwrap();
        assert_eq!(seq.preds, par.preds);
        assert_eq!(count_missing(&seq.preds), 0);

        let hard = cross_fit_predict(&learner, &m, &y, PredictMethod::Predict, &splits, false, false).unwrap();
        assert!(hard.preds.iter().all(|p| *p == 0.0 || *p == 1.0));
    }
}
