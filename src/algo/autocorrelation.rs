//! Autocorrelation of the binned event train.
//!
//! Events are counted on a grid of `median_interval / divisor` seconds,
//! lightly smoothed, mean-removed and autocorrelated via the FFT
//! (Wiener-Khinchin). The first lobe beyond half a median interval that
//! clears the prominence threshold gives the period.

use crate::algo::fft::FftContext;
use crate::algo::spectral::SpectralConfig;
use crate::algo::stats;
use crate::signal::{EstimationMethod, FrequencyEstimate};

/// Count events per bin and smooth with a [1/4, 1/2, 1/4] kernel.
pub fn bin_events(timestamps: &[f64], bin_width: f64, max_bins: usize) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (timestamps.first(), timestamps.last()) else {
        return Vec::new();
    };
    if bin_width <= 0.0 || last <= first {
        return Vec::new();
    }
    let bins = (((last - first) / bin_width).floor() as usize + 1).min(max_bins.max(2));
    let mut counts = vec![0.0; bins];
    for &t in timestamps {
        let idx = (((t - first) / bin_width) as usize).min(bins - 1);
        counts[idx] += 1.0;
    }

    let mut smoothed = vec![0.0; bins];
    for i in 0..bins {
        let left = if i > 0 { counts[i - 1] } else { 0.0 };
        let right = if i + 1 < bins { counts[i + 1] } else { 0.0 };
        smoothed[i] = 0.25 * left + 0.5 * counts[i] + 0.25 * right;
    }
    smoothed
}

/// Autocorrelation normalised so that lag 0 equals 1. Empty for a flat series.
pub fn normalized_autocorrelation(series: &[f64]) -> Vec<f64> {
    let n = series.len();
    if n < 2 {
        return Vec::new();
    }
    let m = stats::mean(series);
    // zero-pad to 2n to avoid circular wrap-around
    let ctx = FftContext::new(2 * n);
    let size = ctx.size();
    let mut re: Vec<f64> = series
        .iter()
        .map(|x| x - m)
        .chain(std::iter::repeat(0.0))
        .take(size)
        .collect();
    let mut im = vec![0.0; size];
    ctx.fft(&mut re, &mut im);

    // |X|^2 is real and even, so a forward transform equals size * inverse
    let mut power: Vec<f64> = re
        .iter()
        .zip(&im)
        .map(|(r, i)| r * r + i * i)
        .collect();
    let mut zeros = vec![0.0; size];
    ctx.fft(&mut power, &mut zeros);

    let zero_lag = power[0];
    if zero_lag.abs() < 1e-12 {
        return Vec::new();
    }
    power[..n].iter().map(|v| v / zero_lag).collect()
}

pub fn estimate(timestamps: &[f64], config: &SpectralConfig) -> Option<FrequencyEstimate> {
    let intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|iv| *iv > 0.0)
        .collect();
    let median_interval = stats::median(&intervals);
    if median_interval <= 0.0 {
        return None;
    }

    let first = *timestamps.first()?;
    let last = *timestamps.last()?;
    let mut bin_width = median_interval / config.autocorr_resolution_divisor.max(1.0);
    let max_bins = config.autocorr_max_bins.max(16);
    if (last - first) / bin_width > max_bins as f64 {
        bin_width = (last - first) / max_bins as f64;
    }

    let binned = bin_events(timestamps, bin_width, max_bins);
    let acf = normalized_autocorrelation(&binned);
    // a period needs at least two repetitions inside the series
    let max_lag = acf.len() / 2;
    let min_lag = ((0.5 * median_interval / bin_width).ceil() as usize).max(2);
    if min_lag + 1 >= max_lag {
        return None;
    }

    let threshold = config.autocorr_min_prominence;
    let mut lag = (min_lag..max_lag).find(|&k| acf[k] >= threshold)?;
    while lag + 1 < max_lag && acf[lag + 1] >= acf[lag] {
        lag += 1;
    }
    if lag + 1 >= max_lag {
        return None;
    }

    let offset = stats::parabolic_offset(acf[lag - 1], acf[lag], acf[lag + 1]);
    let period = (lag as f64 + offset) * bin_width;
    if period <= 0.0 {
        return None;
    }

    Some(
        FrequencyEstimate::new(
            EstimationMethod::Autocorrelation,
            1.0 / period,
            100.0 * acf[lag].clamp(0.0, 1.0),
        )
        .with_resolution(bin_width / (period * period)),
    )
}
