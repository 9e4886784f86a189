use crate::errors::DmlError;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    let mut res = String::new();
    if let Some(last) = v.len().checked_sub(1) {
        if last == 0 {
            return format!("{:.4}", v[0]);
        }
        for n in &v[..last] {
            res.push_str(format!("{:.4}", n).as_str());
            res.push_str(", ");
        }
        res.push_str(format!("{:.4}", &v[last]).as_str());
    }
    res
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), DmlError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DmlError::InvalidParameter(
            parameter.to_string(),
            "a finite positive real value".to_string(),
            value.to_string(),
        ))
    }
}

/// Check that `min < value < max`, rejecting NaN.
pub fn validate_open_interval(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), DmlError> {
    if value.is_nan() || value <= min || max <= value {
        let ex_msg = format!("real value strictly between {} and {}", min, max);
        Err(DmlError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Check that an integer parameter is at least `min`.
pub fn validate_min_usize(value: usize, min: usize, parameter: &str) -> Result<(), DmlError> {
    if value < min {
        Err(DmlError::InvalidParameter(
            parameter.to_string(),
            format!("integer larger or equal to {}", min),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

#[inline]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Quantile for sorted data via linear interpolation.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `NaN`
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

/// Quantile via sorting + linear interpolation.
pub fn quantile_linear(data: &[f64], q: f64) -> f64 {
    let mut v = data.to_vec();
    v.sort_by(f64::total_cmp);
    quantile_linear_sorted(&v, q)
}

/// Median with the usual midpoint rule for even lengths.
pub fn median(data: &[f64]) -> f64 {
    quantile_linear(data, 0.5)
}

/// Minimum and maximum of a slice, ignoring NaN.
pub fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
}

/// Count NaN entries, used to detect rows never covered by a test fold.
pub fn count_missing(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_nan()).count()
}
