//! Lomb-Scargle periodogram for unevenly sampled magnitudes.
//!
//! Works on the original timestamps, so short sparse bursts are not
//! smeared out by resampling. The frequency grid spans
//! `[1 / max_period, 1 / min_period]` where `max_period` is half the
//! observed span and `min_period` a multiple of the median interval.

use crate::algo::spectral::{SpectralConfig, ratio_confidence, spectral_peaks};
use crate::algo::stats;
use crate::signal::{EstimationMethod, FrequencyEstimate};
use crate::window::Event;
use std::f64::consts::PI;

/// Evenly spaced frequency grid for the periodogram.
pub fn frequency_grid(events: &[Event], config: &SpectralConfig) -> Vec<f64> {
    let n = events.len();
    if n < 4 {
        return Vec::new();
    }
    let span = events[n - 1].timestamp - events[0].timestamp;
    let intervals: Vec<f64> = events
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|iv| *iv > 0.0)
        .collect();
    let median_interval = stats::median(&intervals);
    if span <= 0.0 || median_interval <= 0.0 {
        return Vec::new();
    }

    let max_period = span / 2.0;
    let min_period = median_interval * config.lomb_min_period_factor.max(1.0);
    if min_period >= max_period {
        return Vec::new();
    }
    let f_lo = 1.0 / max_period;
    let f_hi = 1.0 / min_period;

    let df = 1.0 / (config.lomb_oversampling.max(1.0) * span);
    let points = (((f_hi - f_lo) / df).floor() as usize + 1).clamp(2, config.max_grid_points.max(2));
    let step = (f_hi - f_lo) / (points - 1) as f64;
    (0..points).map(|i| f_lo + i as f64 * step).collect()
}

/// Normalised periodogram power at each grid frequency.
///
/// Returns an empty vector for zero-variance magnitudes.
pub fn periodogram(events: &[Event], freqs: &[f64]) -> Vec<f64> {
    let values: Vec<f64> = events.iter().map(|e| e.value).collect();
    let mean = stats::mean(&values);
    let variance = stats::std_dev(&values).powi(2);
    if variance < 1e-24 {
        return Vec::new();
    }
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();

    freqs
        .iter()
        .map(|&f| {
            let omega = 2.0 * PI * f;

            let (mut s2, mut c2) = (0.0, 0.0);
            for e in events {
                let arg = 2.0 * omega * e.timestamp;
                s2 += arg.sin();
                c2 += arg.cos();
            }
            let tau = s2.atan2(c2) / (2.0 * omega);

            let (mut yc, mut ys, mut cc, mut ss) = (0.0, 0.0, 0.0, 0.0);
            for (e, &y) in events.iter().zip(&centered) {
                let arg = omega * (e.timestamp - tau);
                let (s, c) = arg.sin_cos();
                yc += y * c;
                ys += y * s;
                cc += c * c;
                ss += s * s;
            }

            let mut power = 0.0;
            if cc > 1e-12 {
                power += yc * yc / cc;
            }
            if ss > 1e-12 {
                power += ys * ys / ss;
            }
            power / (2.0 * variance)
        })
        .collect()
}

/// Strongest periodogram peaks, scored against the median power.
pub fn estimate(events: &[Event], config: &SpectralConfig) -> Vec<FrequencyEstimate> {
    let freqs = frequency_grid(events, config);
    if freqs.len() < 3 {
        return Vec::new();
    }
    let power = periodogram(events, &freqs);
    if power.is_empty() {
        return Vec::new();
    }
    let noise_floor = stats::median(&power);
    if noise_floor <= 0.0 {
        return Vec::new();
    }
    let resolution = freqs[1] - freqs[0];

    spectral_peaks(&power, 1, config.max_peaks)
        .into_iter()
        .filter_map(|k| {
            let ratio = power[k] / noise_floor;
            if ratio < config.lomb_min_ratio {
                return None;
            }
            let offset = stats::parabolic_offset(power[k - 1], power[k], power[k + 1]);
            Some(
                FrequencyEstimate::new(
                    EstimationMethod::LombScargle,
                    freqs[k] + offset * resolution,
                    ratio_confidence(ratio, config.lomb_min_ratio),
                )
                .with_resolution(resolution),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn irregular_modulated(n: usize, value_period: f64) -> Vec<Event> {
        // deterministic irregular spacing between 1 and 3 seconds
        let mut t = 0.0;
        (0..n)
            .map(|i| {
                t += 1.0 + ((i * 7919) % 13) as f64 / 6.5;
                Event {
                    timestamp: t,
                    value: 20.0 + 8.0 * (2.0 * PI * t / value_period).cos(),
                }
            })
            .collect()
    }

    #[test]
    fn test_grid_bounds() {
        let events = irregular_modulated(200, 60.0);
        let grid = frequency_grid(&events, &SpectralConfig::default());
        let span = events.last().unwrap().timestamp - events[0].timestamp;
        assert!((grid[0] - 2.0 / span).abs() < 1e-12);
        assert!(grid.len() <= SpectralConfig::default().max_grid_points);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_recovers_period_from_irregular_samples() {
        let events = irregular_modulated(200, 60.0);
        let estimates = estimate(&events, &SpectralConfig::default());
        let top = estimates.first().expect("periodogram should find a peak");
        let rel = (top.frequency_hz - 1.0 / 60.0).abs() * 60.0;
        assert!(rel < 0.03, "frequency {}", top.frequency_hz);
        assert!(top.confidence > 50.0);
    }

    #[test]
    fn test_constant_magnitudes_yield_nothing() {
        let events: Vec<Event> = (0..100)
            .map(|i| Event {
                timestamp: i as f64 * 1.7,
                value: 4.0,
            })
            .collect();
        assert!(estimate(&events, &SpectralConfig::default()).is_empty());
    }
}
