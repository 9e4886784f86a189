//! Estimator Configuration
//!
//! Settings of the potential quantile estimator, with serde defaults so a
//! partial JSON document is a valid configuration.
use crate::constants::{NESTED_SPLIT_SEED, SCORE_PQ, TRIMMING_THRESHOLD};
use crate::engine::{Aggregation, DmlProcedure};
use crate::errors::DmlError;
use crate::trimming::TrimmingRule;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_quantile() -> f64 {
    0.5
}
fn default_treatment() -> u8 {
    1
}
fn default_n_folds() -> usize {
    5
}
fn default_n_rep() -> usize {
    1
}
fn default_score() -> String {
    SCORE_PQ.to_string()
}
fn default_trimming_threshold() -> f64 {
    TRIMMING_THRESHOLD
}
fn default_true() -> bool {
    true
}
fn default_nested_split_seed() -> u64 {
    NESTED_SPLIT_SEED
}

/// Configuration for `DoubleMLPQ`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqConfig {
    /// Quantile of the potential outcome, in `(0, 1)`.
    #[serde(default = "default_quantile")]
    pub quantile: f64,
    /// Treatment level of the potential outcome, 0 or 1.
    #[serde(default = "default_treatment")]
    pub treatment: u8,
    /// Number of folds.
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    /// Number of repetitions of the sample splitting.
    #[serde(default = "default_n_rep")]
    pub n_rep: usize,
    /// Score function, `"PQ"` is the only choice.
    #[serde(default = "default_score")]
    pub score: String,
    /// Double machine learning algorithm.
    #[serde(default)]
    pub dml_procedure: DmlProcedure,
    /// Trimming rule for propensities.
    #[serde(default)]
    pub trimming_rule: TrimmingRule,
    /// Trimming threshold, in `(0, 0.5)`.
    #[serde(default = "default_trimming_threshold")]
    pub trimming_threshold: f64,
    /// Bandwidth of the derivative kernel, `n_obs^-0.2` if `None`.
    #[serde(default)]
    pub h: Option<f64>,
    /// Normalize the weights of the derivative estimate.
    #[serde(default = "default_true")]
    pub normalize: bool,
    /// Draw the sample splitting when the estimator is created.
    #[serde(default = "default_true")]
    pub draw_sample_splitting: bool,
    /// Apply cross-fitting, `true` is the only choice.
    #[serde(default = "default_true")]
    pub apply_cross_fitting: bool,
    /// Aggregation of repeated sample splits.
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Seed of the sample splitting.
    #[serde(default)]
    pub seed: u64,
    /// Seed of the stratified half-split inside every training fold.
    #[serde(default = "default_nested_split_seed")]
    pub nested_split_seed: u64,
    /// Fit folds on a rayon thread pool.
    #[serde(default)]
    pub parallel: bool,
    /// Number of threads when `parallel` is set, all available if `None`.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

impl Default for PqConfig {
    fn default() -> Self {
        PqConfig {
            quantile: default_quantile(),
            treatment: default_treatment(),
            n_folds: default_n_folds(),
            n_rep: default_n_rep(),
            score: default_score(),
            dml_procedure: DmlProcedure::default(),
            trimming_rule: TrimmingRule::default(),
            trimming_threshold: default_trimming_threshold(),
            h: None,
            normalize: true,
            draw_sample_splitting: true,
            apply_cross_fitting: true,
            aggregation: Aggregation::default(),
            seed: 0,
            nested_split_seed: default_nested_split_seed(),
            parallel: false,
            num_threads: None,
        }
    }
}

impl PqConfig {
    /// Set the quantile.
    pub fn set_quantile(mut self, quantile: f64) -> Self {
        self.quantile = quantile;
        self
    }

    /// Set the treatment level.
    pub fn set_treatment(mut self, treatment: u8) -> Self {
        self.treatment = treatment;
        self
    }

    /// Set the number of folds.
    pub fn set_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    /// Set the number of repetitions.
    pub fn set_n_rep(mut self, n_rep: usize) -> Self {
        self.n_rep = n_rep;
        self
    }

    /// Set the dml procedure.
    pub fn set_dml_procedure(mut self, dml_procedure: DmlProcedure) -> Self {
        self.dml_procedure = dml_procedure;
        self
    }

    /// Set the trimming threshold.
    pub fn set_trimming_threshold(mut self, trimming_threshold: f64) -> Self {
        self.trimming_threshold = trimming_threshold;
        self
    }

    /// Set the bandwidth.
    pub fn set_h(mut self, h: Option<f64>) -> Self {
        self.h = h;
        self
    }

    /// Set the normalization flag.
    pub fn set_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Set the aggregation rule.
    pub fn set_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the sample splitting seed.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the parallel flag and thread count.
    pub fn set_parallel(mut self, parallel: bool, num_threads: Option<usize>) -> Self {
        self.parallel = parallel;
        self.num_threads = num_threads;
        self
    }
}

/// IO
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), DmlError> {
        fs::write(path, self.json_dump()?).map_err(|e| DmlError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json string.
    fn json_dump(&self) -> Result<String, DmlError> {
        serde_json::to_string(self).map_err(|e| DmlError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, DmlError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| DmlError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, DmlError> {
        let json_str = fs::read_to_string(path).map_err(|e| DmlError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for PqConfig {}
