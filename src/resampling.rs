//! Resampling
//!
//! Repeated (stratified) K-fold sample splitting, plus the stratified
//! half-split and unshuffled stratified K-fold used for nested cross-fitting.
use crate::errors::DmlError;
use crate::utils::validate_min_usize;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// One train/test partition of the observation indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSplit {
    /// Indices the learners are fitted on.
    pub train: Vec<usize>,
    /// Indices the learners predict on.
    pub test: Vec<usize>,
}

impl SampleSplit {
    /// Build a split from test indices, taking the complement in `0..n_obs` as training set.
    pub fn from_test(test: Vec<usize>, n_obs: usize) -> Result<Self, DmlError> {
        if let Some(i) = test.iter().find(|i| **i >= n_obs) {
            return Err(DmlError::InvalidData(format!(
                "test index {} out of range for {} observations",
                i, n_obs
            )));
        }
        Ok(SampleSplit::complement(test, n_obs))
    }

    // Indices are in range for every internal caller.
    fn complement(mut test: Vec<usize>, n_obs: usize) -> Self {
        test.sort_unstable();
        let mut in_test = vec![false; n_obs];
        test.iter().for_each(|i| in_test[*i] = true);
        let train = (0..n_obs).filter(|i| !in_test[*i]).collect();
        SampleSplit { train, test }
    }
}

/// Generator of repeated K-fold sample splits.
pub struct Resampling {
    pub n_folds: usize,
    pub n_rep: usize,
    pub n_obs: usize,
    pub apply_cross_fitting: bool,
    stratify: Option<Vec<f64>>,
}

impl Resampling {
    /// Create a new `Resampling` generator.
    ///
    /// * `n_folds` - Number of folds, at least 2 and at most `n_obs`.
    /// * `n_rep` - Number of repetitions of the sample splitting.
    /// * `n_obs` - Number of observations.
    /// * `apply_cross_fitting` - If false, only the first split of every repetition is kept.
    pub fn new(n_folds: usize, n_rep: usize, n_obs: usize, apply_cross_fitting: bool) -> Result<Self, DmlError> {
        validate_min_usize(n_folds, 2, "n_folds")?;
        validate_min_usize(n_rep, 1, "n_rep")?;
        if n_folds > n_obs {
            return Err(DmlError::InvalidParameter(
                "n_folds".to_string(),
                format!("at most n_obs = {}", n_obs),
                n_folds.to_string(),
            ));
        }
        Ok(Resampling {
            n_folds,
            n_rep,
            n_obs,
            apply_cross_fitting,
            stratify: None,
        })
    }

    /// Preserve the class proportions of `labels` within every fold.
    pub fn with_stratify(mut self, labels: &[f64]) -> Result<Self, DmlError> {
        if labels.len() != self.n_obs {
            return Err(DmlError::InvalidData(format!(
                "stratification vector has {} entries, expected {}",
                labels.len(),
                self.n_obs
            )));
        }
        self.stratify = Some(labels.to_vec());
        Ok(self)
    }

    /// Draw `n_rep` independent sets of sample splits.
    pub fn split_samples(&self, rng: &mut StdRng) -> Vec<Vec<SampleSplit>> {
        (0..self.n_rep)
            .map(|_| {
                let groups = match &self.stratify {
                    Some(labels) => {
                        let mut groups = class_groups(labels);
                        warn_small_classes(&groups, self.n_folds);
                        groups.iter_mut().for_each(|g| g.shuffle(rng));
                        groups
                    }
                    None => {
                        let mut all: Vec<usize> = (0..self.n_obs).collect();
                        all.shuffle(rng);
                        vec![all]
                    }
                };
                let test_sets = match &self.stratify {
                    Some(_) => deal_round_robin(groups, self.n_folds),
                    None => contiguous_folds(&groups[0], self.n_folds),
                };
                let mut splits: Vec<SampleSplit> = test_sets
                    .into_iter()
                    .map(|test| SampleSplit::complement(test, self.n_obs))
                    .collect();
                if !self.apply_cross_fitting {
                    splits.truncate(1);
                }
                splits
            })
            .collect()
    }

    /// Convenience wrapper seeding a fresh generator.
    pub fn split_samples_seeded(&self, seed: u64) -> Vec<Vec<SampleSplit>> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.split_samples(&mut rng)
    }
}

/// Group positions `0..labels.len()` by label value, classes in ascending order,
/// positions in original order.
fn class_groups(labels: &[f64]) -> Vec<Vec<usize>> {
    let mut classes: Vec<f64> = labels.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    let mut groups = vec![Vec::new(); classes.len()];
    for (i, v) in labels.iter().enumerate() {
        // The value is taken from `classes`, so the search always succeeds.
        if let Ok(c) = classes.binary_search_by(|class| class.total_cmp(v)) {
            groups[c].push(i);
        }
    }
    groups
}

fn warn_small_classes(groups: &[Vec<usize>], n_folds: usize) {
    if let Some(min) = groups.iter().map(|g| g.len()).min() {
        if min < n_folds {
            warn!(
                "The least populated class has only {} members, which is less than n_folds = {}.",
                min, n_folds
            );
        }
    }
}

// Members are dealt to folds one by one, continuing across classes,
// so every class and every fold are balanced up to one element.
fn deal_round_robin(groups: Vec<Vec<usize>>, n_folds: usize) -> Vec<Vec<usize>> {
    let mut folds = vec![Vec::new(); n_folds];
    let mut pos = 0;
    for group in groups {
        for i in group {
            folds[pos % n_folds].push(i);
            pos += 1;
        }
    }
    folds
}

fn contiguous_folds(order: &[usize], n_folds: usize) -> Vec<Vec<usize>> {
    let n = order.len();
    let mut folds = Vec::with_capacity(n_folds);
    let mut start = 0;
    for k in 0..n_folds {
        let size = n / n_folds + usize::from(k < n % n_folds);
        folds.push(order[start..start + size].to_vec());
        start += size;
    }
    folds
}

/// Unshuffled stratified K-fold over positions `0..labels.len()`.
pub fn stratified_k_fold(labels: &[f64], n_folds: usize) -> Result<Vec<SampleSplit>, DmlError> {
    validate_min_usize(n_folds, 2, "n_folds")?;
    if n_folds > labels.len() {
        return Err(DmlError::InvalidParameter(
            "n_folds".to_string(),
            format!("at most the number of samples = {}", labels.len()),
            n_folds.to_string(),
        ));
    }
    let groups = class_groups(labels);
    warn_small_classes(&groups, n_folds);
    Ok(deal_round_robin(groups, n_folds)
        .into_iter()
        .map(|test| SampleSplit::complement(test, labels.len()))
        .collect())
}

/// Split `indices` into two halves, stratified on `labels`.
///
/// `labels[k]` belongs to `indices[k]`. Within every class the first half
/// (rounded down) of a seeded shuffle goes to the first part. Both parts
/// are returned sorted.
pub fn stratified_half_split(indices: &[usize], labels: &[f64], seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut first = Vec::with_capacity(indices.len() / 2 + 1);
    let mut second = Vec::with_capacity(indices.len() / 2 + 1);
    for mut group in class_groups(labels) {
        group.shuffle(&mut rng);
        let half = group.len() / 2;
        first.extend(group[..half].iter().map(|p| indices[*p]));
        second.extend(group[half..].iter().map(|p| indices[*p]));
    }
    first.sort_unstable();
    second.sort_unstable();
    (first, second)
}

/// Validate user supplied sample splits.
///
/// Every index must be in range and train/test must be disjoint. With
/// cross-fitting the test sets of each repetition must partition `0..n_obs`.
pub fn check_sample_splitting(
    splits: &[Vec<SampleSplit>],
    n_obs: usize,
    apply_cross_fitting: bool,
) -> Result<(), DmlError> {
    if splits.is_empty() || splits.iter().any(|rep| rep.is_empty()) {
        return Err(DmlError::InvalidData("sample splitting is empty".to_string()));
    }
    for (r, rep) in splits.iter().enumerate() {
        let mut test_count = vec![0usize; n_obs];
        for split in rep {
            let mut in_train = vec![false; n_obs];
            for i in &split.train {
                if *i >= n_obs {
                    return Err(DmlError::InvalidData(format!("train index {} out of range in repetition {}", i, r)));
                }
                in_train[*i] = true;
            }
            for i in &split.test {
                if *i >= n_obs {
                    return Err(DmlError::InvalidData(format!("test index {} out of range in repetition {}", i, r)));
                }
                if in_train[*i] {
                    return Err(DmlError::InvalidData(format!(
                        "index {} is in both train and test set in repetition {}",
                        i, r
                    )));
                }
                test_count[*i] += 1;
            }
        }
        if apply_cross_fitting && test_count.iter().any(|c| *c != 1) {
            return Err(DmlError::InvalidData(format!(
                "test sets of repetition {} do not partition the sample",
                r
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(rep: &[SampleSplit], n_obs: usize) {
        let mut seen = vec![0; n_obs];
        for split in rep {
            for i in &split.test {
                seen[*i] += 1;
            }
            assert_eq!(split.train.len() + split.test.len(), n_obs);
        }
        assert!(seen.iter().all(|c| *c == 1));
    }

    #[test]
    fn test_k_fold_partitions() {
        for (n_obs, n_folds) in [(10, 2), (11, 3), (101, 5), (7, 7)] {
            let resampling = Resampling::new(n_folds, 3, n_obs, true).unwrap();
            let splits = resampling.split_samples_seeded(0);
            assert_eq!(splits.len(), 3);
            for rep in &splits {
                assert_eq!(rep.len(), n_folds);
                assert_partition(rep, n_obs);
                let sizes: Vec<usize> = rep.iter().map(|s| s.test.len()).collect();
                assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
            }
            assert!(check_sample_splitting(&splits, n_obs, true).is_ok());
        }
    }

    #[test]
    fn test_stratified_preserves_proportions() {
        let labels: Vec<f64> = (0..100).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        let resampling = Resampling::new(5, 2, 100, true).unwrap().with_stratify(&labels).unwrap();
        for rep in resampling.split_samples_seeded(7) {
            assert_partition(&rep, 100);
            for split in &rep {
                let treated = split.test.iter().filter(|i| labels[**i] == 1.0).count();
                assert_eq!(treated, 5);
                assert_eq!(split.test.len(), 20);
            }
        }
    }

    #[test]
    fn test_same_seed_same_splits() {
        let resampling = Resampling::new(4, 2, 37, true).unwrap();
        assert_eq!(resampling.split_samples_seeded(3), resampling.split_samples_seeded(3));
        assert_ne!(resampling.split_samples_seeded(3), resampling.split_samples_seeded(4));
    }

    #[test]
    fn test_no_cross_fitting_keeps_one_split() {
        let resampling = Resampling::new(2, 2, 10, false).unwrap();
        let splits = resampling.split_samples_seeded(0);
        assert!(splits.iter().all(|rep| rep.len() == 1));
        assert!(check_sample_splitting(&splits, 10, false).is_ok());
        assert!(check_sample_splitting(&splits, 10, true).is_err());
    }

    #[test]
    fn test_split_from_test_indices() {
        let split = SampleSplit::from_test(vec![4, 1], 6).unwrap();
        assert_eq!(split.test, vec![1, 4]);
        assert_eq!(split.train, vec![0, 2, 3, 5]);
        assert!(matches!(SampleSplit::from_test(vec![0, 6], 6), Err(DmlError::InvalidData(_))));
    }

    #[test]
    fn test_invalid_resampling() {
        assert!(Resampling::new(1, 1, 10, true).is_err());
        assert!(Resampling::new(2, 0, 10, true).is_err());
        assert!(Resampling::new(11, 1, 10, true).is_err());
        assert!(Resampling::new(2, 1, 10, true).unwrap().with_stratify(&[0.0; 9]).is_err());
    }

    #[test]
    fn test_stratified_k_fold_is_deterministic() {
        let labels = vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let a = stratified_k_fold(&labels, 2).unwrap();
        let b = stratified_k_fold(&labels, 2).unwrap();
        assert_eq!(a, b);
        assert_partition(&a, labels.len());
        for split in &a {
            let treated = split.test.iter().filter(|i| labels[**i] == 1.0).count();
            assert!(treated == 1 || treated == 2);
        }
    }

    #[test]
    fn test_stratified_half_split() {
        let indices: Vec<usize> = (100..140).collect();
        let labels: Vec<f64> = (0..40).map(|i| if i < 10 { 1.0 } else { 0.0 }).collect();
        let (first, second) = stratified_half_split(&indices, &labels, 42);
        assert_eq!(first.len(), 20);
        assert_eq!(second.len(), 20);
        let treated_first = first.iter().filter(|i| **i < 110).count();
        assert_eq!(treated_first, 5);
        let mut all: Vec<usize> = first.iter().chain(second.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, indices);
        assert_eq!((first.clone(), second.clone()), stratified_half_split(&indices, &labels, 42));
    }

    #[test]
    fn test_check_sample_splitting_rejects_overlap() {
        let bad = vec![vec![
            SampleSplit { train: vec![0, 1], test: vec![1, 2] },
            SampleSplit { train: vec![1, 2], test: vec![0] },
        ]];
        assert!(check_sample_splitting(&bad, 3, true).is_err());
        let out_of_range = vec![vec![SampleSplit { train: vec![0], test: vec![5] }]];
        assert!(check_sample_splitting(&out_of_range, 3, false).is_err());
    }
}
