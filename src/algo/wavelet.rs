//! Continuous wavelet transform with the Ricker (Mexican hat) wavelet.
//!
//! Works on sample index rather than time, so irregular sampling needs no
//! resampling. Kernels are truncated at five scales either side, re-centred
//! to zero mean and scaled by `1/sqrt(scale)`; samples beyond the series
//! edges repeat the edge value, so a constant series transforms to zero.

/// Ricker wavelet at `t` for the given scale (unnormalised amplitude).
fn ricker(t: f64, scale: f64) -> f64 {
    let x = t / scale;
    (1.0 - x * x) * (-0.5 * x * x).exp()
}

/// Discrete kernel of length `2 * half + 1`.
pub fn ricker_kernel(scale: f64) -> Vec<f64> {
    let scale = scale.max(0.5);
    let half = (5.0 * scale).ceil() as isize;
    let norm = 1.0 / scale.sqrt();
    let mut kernel: Vec<f64> = (-half..=half)
        .map(|k| norm * ricker(k as f64, scale))
        .collect();
    // truncation leaves a small DC component
    let dc = kernel.iter().sum::<f64>() / kernel.len() as f64;
    for k in kernel.iter_mut() {
        *k -= dc;
    }
    kernel
}

/// Wavelet coefficients, one row per scale, one column per sample.
pub fn cwt(series: &[f64], scales: &[f64]) -> Vec<Vec<f64>> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    scales
        .iter()
        .map(|&scale| {
            let kernel = ricker_kernel(scale);
            let half = (kernel.len() / 2) as isize;
            (0..n as isize)
                .map(|i| {
                    kernel
                        .iter()
                        .enumerate()
                        .map(|(j, w)| {
                            let idx = (i + j as isize - half).clamp(0, n as isize - 1) as usize;
                            w * series[idx]
                        })
                        .sum()
                })
                .collect()
        })
        .collect()
}

/// Squared coefficients.
pub fn energy(coefficients: &[Vec<f64>]) -> Vec<Vec<f64>> {
    coefficients
        .iter()
        .map(|row| row.iter().map(|c| c * c).collect())
        .collect()
}
