//! Small descriptive-statistics helpers shared by the estimators.
//!
//! Everything here is total: empty or degenerate input yields `0.0`
//! instead of `NaN`, so callers can feed the results straight into
//! confidence formulas.

use std::cmp::Ordering;

/// Sort a copy of `data`, dropping non-finite values.
pub fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Coefficient of variation (std / mean). Zero when the mean is zero.
pub fn coefficient_of_variation(data: &[f64]) -> f64 {
    let m = mean(data);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    std_dev(data) / m.abs()
}

/// Linear-interpolated quantile of already sorted data.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn median(data: &[f64]) -> f64 {
    quantile_sorted(&sorted_finite(data), 0.5)
}

/// Sample skewness (Fisher-Pearson, biased).
pub fn skewness(data: &[f64]) -> f64 {
    let sd = std_dev(data);
    if data.len() < 3 || sd < 1e-12 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|&x| ((x - m) / sd).powi(3)).sum::<f64>() / data.len() as f64
}

/// Excess kurtosis (0 for a normal distribution).
pub fn excess_kurtosis(data: &[f64]) -> f64 {
    let sd = std_dev(data);
    if data.len() < 4 || sd < 1e-12 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|&x| ((x - m) / sd).powi(4)).sum::<f64>() / data.len() as f64 - 3.0
}

/// Subtract the least-squares line from a series sampled at integer steps.
pub fn detrend(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(data);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in data.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    data.iter()
        .enumerate()
        .map(|(i, &y)| y - (y_mean + slope * (i as f64 - x_mean)))
        .collect()
}

/// Refine a discrete peak location by fitting a parabola through three
/// neighbouring samples. Returns the fractional offset in `[-0.5, 0.5]`.
pub fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// Relative difference of two positive quantities, measured against the
/// smaller one.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let lo = a.abs().min(b.abs());
    if lo < f64::EPSILON {
        return f64::INFINITY;
    }
    (a - b).abs() / lo
}
