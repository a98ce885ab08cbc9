//! Spectral periodicity estimators.
//!
//! Four independent methods, all run whenever they have enough data:
//! - Resampled FFT on a uniform grid whose step is the *mean* inter-arrival
//!   interval. A fixed high sample rate would fill the grid with
//!   interpolated near-zero samples and halve the apparent frequency.
//! - Welch PSD (segment-averaged periodogram) on the same grid
//! - Lomb-Scargle on the raw irregular timestamps (see `lomb_scargle`)
//! - Autocorrelation of the binned event train (see `autocorrelation`)
//!
//! A method without enough data contributes nothing.

use crate::algo::fft::{FftContext, apply_hann, hann};
use crate::algo::{autocorrelation, lomb_scargle, stats};
use crate::signal::{EstimationMethod, FrequencyEstimate};
use crate::window::Event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub fft_min_events: usize,
    pub welch_min_events: usize,
    /// Welch segment length (rounded down to a power of two)
    pub welch_segment: usize,
    pub lomb_min_events: usize,
    pub autocorr_min_events: usize,
    /// Peak-to-median power ratio required by FFT and Welch
    pub min_snr: f64,
    /// Peak-to-median power ratio required by Lomb-Scargle
    pub lomb_min_ratio: f64,
    pub lomb_oversampling: f64,
    /// Shortest searched period as a multiple of the median interval
    pub lomb_min_period_factor: f64,
    pub max_grid_points: usize,
    /// Autocorrelation bin width is `median_interval / divisor`
    pub autocorr_resolution_divisor: f64,
    pub autocorr_min_prominence: f64,
    pub autocorr_max_bins: usize,
    /// Peaks reported per spectral method
    pub max_peaks: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fft_min_events: 16,
            welch_min_events: 32,
            welch_segment: 64,
            lomb_min_events: 16,
            autocorr_min_events: 16,
            min_snr: 8.0,
            lomb_min_ratio: 10.0,
            lomb_oversampling: 4.0,
            lomb_min_period_factor: 2.0,
            max_grid_points: 2000,
            autocorr_resolution_divisor: 10.0,
            autocorr_min_prominence: 0.2,
            autocorr_max_bins: 16_384,
            max_peaks: 3,
        }
    }
}

/// Uniformly resampled, detrended magnitude series
#[derive(Debug, Clone)]
pub struct UniformSeries {
    pub values: Vec<f64>,
    /// Grid step in seconds (the mean inter-arrival interval)
    pub step: f64,
}

/// Linear interpolation of the magnitude series onto `t0 + k * mean_interval`.
///
/// Returns `None` when the events span no time or the detrended series is flat.
pub fn resample_uniform(events: &[Event]) -> Option<UniformSeries> {
    let n = events.len();
    if n < 4 {
        return None;
    }
    let t0 = events[0].timestamp;
    let span = events[n - 1].timestamp - t0;
    if span <= 0.0 {
        return None;
    }
    let step = span / (n - 1) as f64;

    let mut values = Vec::with_capacity(n);
    let mut j = 0usize;
    for k in 0..n {
        let t = t0 + k as f64 * step;
        while j + 1 < n - 1 && events[j + 1].timestamp < t {
            j += 1;
        }
        let (a, b) = (events[j], events[(j + 1).min(n - 1)]);
        let dt = b.timestamp - a.timestamp;
        let v = if dt > 0.0 {
            let frac = ((t - a.timestamp) / dt).clamp(0.0, 1.0);
            a.value + (b.value - a.value) * frac
        } else {
            b.value
        };
        values.push(v);
    }

    let detrended = stats::detrend(&values);
    if stats::std_dev(&detrended) < 1e-12 {
        return None;
    }
    Some(UniformSeries {
        values: detrended,
        step,
    })
}

/// Local maxima at or above `first_bin`, strongest first, at least two bins apart.
pub(crate) fn spectral_peaks(power: &[f64], first_bin: usize, max_peaks: usize) -> Vec<usize> {
    if power.len() < 3 {
        return Vec::new();
    }
    let start = first_bin.max(1);
    let mut candidates: Vec<usize> = (start..power.len() - 1)
        .filter(|&k| power[k] > 0.0 && power[k] >= power[k - 1] && power[k] >= power[k + 1])
        .collect();
    candidates.sort_by(|&a, &b| power[b].total_cmp(&power[a]).then(a.cmp(&b)));

    let mut peaks: Vec<usize> = Vec::new();
    for k in candidates {
        if peaks.len() >= max_peaks {
            break;
        }
        if peaks.iter().all(|&p| p.abs_diff(k) > 2) {
            peaks.push(k);
        }
    }
    peaks
}

/// Map a peak-to-floor ratio onto 0-100. Zero at the threshold, saturating
/// towards 100 for dominant peaks.
pub(crate) fn ratio_confidence(ratio: f64, min_ratio: f64) -> f64 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 0.0;
    }
    (100.0 * (1.0 - min_ratio / ratio)).clamp(0.0, 100.0)
}

fn peak_frequency(power: &[f64], k: usize, bin_hz: f64) -> f64 {
    let offset = if k > 0 && k + 1 < power.len() {
        stats::parabolic_offset(power[k - 1], power[k], power[k + 1])
    } else {
        0.0
    };
    (k as f64 + offset) * bin_hz
}

/// Lowest usable bin: skip DC and the lowest 1% of the band.
fn first_usable_bin(bins: usize) -> usize {
    ((bins as f64 * 0.01).ceil() as usize).max(1)
}

/// Ensemble of the four spectral methods
#[derive(Debug, Clone, Default)]
pub struct SpectralEstimator {
    config: SpectralConfig,
}

impl SpectralEstimator {
    pub fn new(config: SpectralConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Run every method that has enough data on time-sorted events.
    pub fn estimate(&self, events: &[Event]) -> Vec<FrequencyEstimate> {
        let mut estimates = Vec::new();

        let uniform = if events.len() >= self.config.fft_min_events.min(self.config.welch_min_events)
        {
            resample_uniform(events)
        } else {
            None
        };

        if let Some(series) = &uniform {
            if events.len() >= self.config.fft_min_events {
                estimates.extend(self.resampled_fft(series));
            }
            if events.len() >= self.config.welch_min_events {
                estimates.extend(self.welch(series));
            }
        }

        if events.len() >= self.config.lomb_min_events {
            estimates.extend(lomb_scargle::estimate(events, &self.config));
        }
        if events.len() >= self.config.autocorr_min_events {
            let timestamps: Vec<f64> = events.iter().map(|e| e.timestamp).collect();
            estimates.extend(autocorrelation::estimate(&timestamps, &self.config));
        }

        estimates
    }

    /// Peak of the tapered magnitude spectrum of the resampled series.
    pub fn resampled_fft(&self, series: &UniformSeries) -> Vec<FrequencyEstimate> {
        let ctx = FftContext::new(series.values.len());
        let tapered = apply_hann(&series.values);
        let power = ctx.power_spectrum(&tapered);
        let bin_hz = 1.0 / (ctx.size() as f64 * series.step);

        let first = first_usable_bin(power.len());
        let band = &power[first.min(power.len())..];
        let floor = stats::median(band);
        let spectrum_max = power.iter().copied().fold(0.0_f64, f64::max);
        if floor <= 0.0 || spectrum_max <= 0.0 {
            return Vec::new();
        }

        spectral_peaks(&power, first, self.config.max_peaks)
            .into_iter()
            .filter_map(|k| {
                let snr = power[k] / floor;
                if snr < self.config.min_snr {
                    return None;
                }
                let dominance = power[k] / spectrum_max;
                let confidence = ratio_confidence(snr, self.config.min_snr) * dominance;
                Some(
                    FrequencyEstimate::new(
                        EstimationMethod::ResampledFft,
                        peak_frequency(&power, k, bin_hz),
                        confidence,
                    )
                    .with_resolution(bin_hz),
                )
            })
            .collect()
    }

    /// Welch PSD: 50% overlapping Hann segments, averaged.
    pub fn welch(&self, series: &UniformSeries) -> Vec<FrequencyEstimate> {
        let n = series.values.len();
        let mut segment = self.config.welch_segment.max(16).min(n / 2);
        if segment < 16 {
            return Vec::new();
        }
        // round down to a power of two
        segment = 1usize << (usize::BITS - 1 - segment.leading_zeros());

        let ctx = FftContext::new(segment);
        let taper = hann(segment);
        let hop = segment / 2;

        let mut psd = vec![0.0; segment / 2 + 1];
        let mut segments = 0usize;
        let mut start = 0usize;
        while start + segment <= n {
            let windowed: Vec<f64> = series.values[start..start + segment]
                .iter()
                .zip(&taper)
                .map(|(&x, &w)| x * w)
                .collect();
            for (acc, p) in psd.iter_mut().zip(ctx.power_spectrum(&windowed)) {
                *acc += p;
            }
            segments += 1;
            start += hop;
        }
        if segments < 2 {
            return Vec::new();
        }
        for p in psd.iter_mut() {
            *p /= segments as f64;
        }

        let bin_hz = 1.0 / (segment as f64 * series.step);
        let first = first_usable_bin(psd.len());
        let floor = stats::median(&psd[first.min(psd.len())..]);
        if floor <= 0.0 {
            return Vec::new();
        }

        spectral_peaks(&psd, first, 1)
            .into_iter()
            .filter_map(|k| {
                let snr = psd[k] / floor;
                (snr >= self.config.min_snr).then(|| {
                    FrequencyEstimate::new(
                        EstimationMethod::Welch,
                        peak_frequency(&psd, k, bin_hz),
                        ratio_confidence(snr, self.config.min_snr),
                    )
                    .with_resolution(bin_hz)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Events every `dt` seconds whose magnitude follows a sinusoid of
    /// period `value_period`.
    fn modulated(n: usize, dt: f64, value_period: f64) -> Vec<Event> {
        (0..n)
            .map(|i| {
                let t = i as f64 * dt + if i % 2 == 0 { 0.05 } else { -0.05 } * dt;
                Event {
                    timestamp: t,
                    value: 10.0 + 5.0 * (2.0 * PI * t / value_period).sin(),
                }
            })
            .collect()
    }

    #[test]
    fn test_resample_uses_mean_interval() {
        let events = modulated(101, 2.0, 40.0);
        let series = resample_uniform(&events).unwrap();
        assert_eq!(series.values.len(), 101);
        let span = events[100].timestamp - events[0].timestamp;
        assert!((series.step - span / 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_series_is_rejected() {
        let events: Vec<Event> = (0..50)
            .map(|i| Event {
                timestamp: i as f64,
                value: 3.0,
            })
            .collect();
        assert!(resample_uniform(&events).is_none());
        assert!(SpectralEstimator::default().estimate(&events).iter().all(|e| {
            e.method == EstimationMethod::Autocorrelation
        }));
    }

    #[test]
    fn test_resampled_fft_finds_value_modulation() {
        let events = modulated(256, 2.0, 40.0);
        let series = resample_uniform(&events).unwrap();
        let estimates = SpectralEstimator::default().resampled_fft(&series);
        let top = estimates.first().expect("fft should report a peak");
        assert!(
            (top.frequency_hz - 1.0 / 40.0).abs() / (1.0 / 40.0) < 0.05,
            "fft frequency {}",
            top.frequency_hz
        );
        assert!(top.confidence > 50.0);
    }

    #[test]
    fn test_welch_finds_value_modulation() {
        let events = modulated(512, 2.0, 40.0);
        let series = resample_uniform(&events).unwrap();
        let estimates = SpectralEstimator::default().welch(&series);
        let top = estimates.first().expect("welch should report a peak");
        let rel = (top.frequency_hz - 1.0 / 40.0).abs() / (1.0 / 40.0);
        assert!(rel < 0.1, "welch frequency {}", top.frequency_hz);
        assert!(top.resolution_hz > 0.0);
    }

    #[test]
    fn test_spectral_peaks_order_and_separation() {
        let power = [0.0, 1.0, 9.0, 8.0, 9.5, 1.0, 0.0, 4.0, 0.0];
        let peaks = spectral_peaks(&power, 1, 3);
        assert_eq!(peaks, vec![4, 7]);
    }

    #[test]
    fn test_ratio_confidence_bounds() {
        assert_eq!(ratio_confidence(4.0, 8.0), 0.0);
        assert!(ratio_confidence(800.0, 8.0) > 98.0);
        assert_eq!(ratio_confidence(f64::NAN, 8.0), 0.0);
    }
}
