//! # Utilities
//!
//! Shared numeric helpers for log-space accumulation and index/float
//! conversions used throughout the samplers.

use num_traits::ToPrimitive;

/// Largest magnitude treated as representable before clamping.
pub const OVERFLO: f64 = 1.0e100;

/// Floor applied to adaptive proposal scales.
pub const UNDERFLO: f64 = 1.0e-100;

/// Log of a sum of exponentials, stabilized by subtracting the maximum term.
///
/// Returns negative infinity for an empty slice. For finite inputs the result
/// is never below `max - ln(len)`, so a fully underflowing naive sum cannot
/// collapse to negative infinity here.
#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum = values.iter().map(|value| (value - max).exp()).sum::<f64>();
    max + sum.ln()
}

/// Whether `values` is a probability simplex within `tolerance` of unit mass.
#[must_use]
pub fn is_simplex(values: &[f64], tolerance: f64) -> bool {
    if values.iter().any(|value| !(*value >= 0.0)) {
        return false;
    }
    (values.iter().sum::<f64>() - 1.0).abs() <= tolerance
}

#[must_use]
pub fn max_slice_abs_diff(current: &[f64], previous: &[f64]) -> f64 {
    current
        .iter()
        .zip(previous.iter())
        .map(|(now, before)| (now - before).abs())
        .fold(0.0, f64::max)
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Floor of `value` as a non-negative integer, saturating at `usize::MAX`.
#[must_use]
pub fn floor_to_usize(value: f64) -> usize {
    value.floor().to_usize().unwrap_or(usize::MAX)
}
