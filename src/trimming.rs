//! Trimming
//!
//! Keeps propensity scores away from 0 and 1 before they are used as
//! inverse weights.
use crate::errors::DmlError;
use crate::utils::{items_to_strings, validate_open_interval};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rule used to bound propensity predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrimmingRule {
    /// Clip every value into `[threshold, 1 - threshold]`.
    #[default]
    Truncate,
}

impl FromStr for TrimmingRule {
    type Err = DmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "truncate" => Ok(TrimmingRule::Truncate),
            _ => Err(DmlError::ParseString(
                s.to_string(),
                "TrimmingRule".to_string(),
                items_to_strings(vec!["truncate"]),
            )),
        }
    }
}

/// Validate a trimming threshold, which must lie in `(0, 0.5)`.
pub fn check_trimming(threshold: f64) -> Result<(), DmlError> {
    validate_open_interval(threshold, 0.0, 0.5, "trimming_threshold")
}

/// Trim a slice of probabilities in place.
pub fn trim_in_place(p: &mut [f64], rule: TrimmingRule, threshold: f64) -> Result<(), DmlError> {
    check_trimming(threshold)?;
    match rule {
        TrimmingRule::Truncate => {
            let upper = 1.0 - threshold;
            p.iter_mut().for_each(|v| *v = v.clamp(threshold, upper));
        }
    }
    Ok(())
}

/// Return a trimmed copy of `p`.
///
/// * `p` - Probability-like predictions.
/// * `rule` - Trimming rule.
/// * `threshold` - Threshold in `(0, 0.5)`.
pub fn trim(p: &[f64], rule: TrimmingRule, threshold: f64) -> Result<Vec<f64>, DmlError> {
    let mut out = p.to_vec();
    trim_in_place(&mut out, rule, threshold)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_bounds_and_idempotence() {
        let p = vec![0.0, 1e-15, 0.02, 0.5, 0.97, 1.0];
        for threshold in [1e-12, 0.01, 0.05, 0.25, 0.49] {
            let once = trim(&p, TrimmingRule::Truncate, threshold).unwrap();
            assert!(once.iter().all(|v| *v >= threshold && *v <= 1.0 - threshold));
            let twice = trim(&once, TrimmingRule::Truncate, threshold).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_trim_keeps_interior_values() {
        let p = vec![0.2, 0.5, 0.8];
        assert_eq!(trim(&p, TrimmingRule::Truncate, 0.1).unwrap(), p);
    }

    #[test]
    fn test_invalid_threshold() {
        let p = vec![0.5];
        for threshold in [0.0, 0.5, -0.1, 0.7, f64::NAN] {
            assert!(trim(&p, TrimmingRule::Truncate, threshold).is_err());
        }
    }

    #[test]
    fn test_parse_rule() {
        assert_eq!(TrimmingRule::from_str("truncate").unwrap(), TrimmingRule::Truncate);
        assert!(matches!(
            TrimmingRule::from_str("discard"),
            Err(DmlError::ParseString(..))
        ));
    }
}
