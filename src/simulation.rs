//! Seeded synthetic event streams.
//!
//! Used by the integration tests and `cadence simulate`. The random draws
//! per event are fixed (jitter, amplitude, gap), so two specs differing
//! only in jitter size produce the same underlying noise scaled
//! differently.

use crate::window::Event;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum AmplitudeModel {
    Constant { value: f64 },
    /// Normal draws, clamped at zero
    Gaussian { mean: f64, std_dev: f64 },
    /// Heavy-tailed sizes typical of organic activity
    LogNormal { mu: f64, sigma: f64 },
    /// Deterministic modulation of the magnitude over time
    Sinusoidal {
        mean: f64,
        amplitude: f64,
        period_secs: f64,
    },
}

impl Default for AmplitudeModel {
    fn default() -> Self {
        Self::LogNormal { mu: 3.0, sigma: 0.8 }
    }
}

/// Value burst over the tail of the stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    /// Trailing share of events affected
    pub fraction: f64,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub period_secs: f64,
    /// Timestamp jitter standard deviation as a fraction of the period
    pub jitter_ratio: f64,
    pub count: usize,
    pub start: f64,
    pub amplitude: AmplitudeModel,
    /// Share of intervals stretched by a spurious gap
    pub gap_fraction: f64,
    /// Gap length in periods
    pub gap_periods: f64,
    pub spike: Option<Spike>,
    pub seed: u64,
}

impl StreamSpec {
    pub fn new(period_secs: f64, count: usize) -> Self {
        Self {
            period_secs,
            jitter_ratio: 0.0,
            count,
            start: 1_700_000_000.0,
            amplitude: AmplitudeModel::default(),
            gap_fraction: 0.0,
            gap_periods: 10.0,
            spike: None,
            seed: 0,
        }
    }

    pub fn jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.max(0.0);
        self
    }

    pub fn amplitude(mut self, model: AmplitudeModel) -> Self {
        self.amplitude = model;
        self
    }

    pub fn gaps(mut self, fraction: f64, periods: f64) -> Self {
        self.gap_fraction = fraction.clamp(0.0, 1.0);
        self.gap_periods = periods.max(0.0);
        self
    }

    pub fn spike(mut self, fraction: f64, factor: f64) -> Self {
        self.spike = Some(Spike { fraction, factor });
        self
    }

    pub fn start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn draw_amplitude(model: &AmplitudeModel, t: f64, rng: &mut StdRng) -> f64 {
    // one standard normal per event keeps the draw count model-independent
    let z: f64 = StandardNormal.sample(rng);
    let value = match model {
        AmplitudeModel::Constant { value } => *value,
        AmplitudeModel::Gaussian { mean, std_dev } => mean + std_dev.abs() * z,
        AmplitudeModel::LogNormal { mu, sigma } => (mu + sigma.abs() * z).exp(),
        AmplitudeModel::Sinusoidal {
            mean,
            amplitude,
            period_secs,
        } => {
            if *period_secs > 0.0 {
                mean + amplitude * (2.0 * PI * t / period_secs).sin()
            } else {
                *mean
            }
        }
    };
    value.max(0.0)
}

/// Generate the stream in arrival order.
pub fn generate(spec: &StreamSpec) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let sigma = spec.jitter_ratio * spec.period_secs;
    let spike_from = spec
        .spike
        .map(|s| spec.count - ((spec.count as f64 * s.fraction.clamp(0.0, 1.0)).round() as usize).min(spec.count))
        .unwrap_or(spec.count);

    let mut offset = 0.0;
    (0..spec.count)
        .map(|i| {
            let z: f64 = StandardNormal.sample(&mut rng);
            let gap_draw: f64 = rng.random();
            if i > 0 && gap_draw < spec.gap_fraction {
                offset += spec.gap_periods * spec.period_secs;
            }

            let timestamp = spec.start + i as f64 * spec.period_secs + offset + sigma * z;
            let mut value = draw_amplitude(&spec.amplitude, timestamp - spec.start, &mut rng);
            if i >= spike_from {
                if let Some(spike) = spec.spike {
                    value *= spike.factor;
                }
            }
            Event { timestamp, value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::stats;

    #[test]
    fn test_same_seed_same_stream() {
        let spec = StreamSpec::new(10.0, 50).jitter(0.05).seed(9);
        assert_eq!(generate(&spec), generate(&spec));
        assert_ne!(generate(&spec), generate(&spec.clone().seed(10)));
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let events = generate(&StreamSpec::new(41.0, 20).start(0.0));
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.timestamp, i as f64 * 41.0);
        }
    }

    #[test]
    fn test_jitter_scales_same_noise() {
        let small = generate(&StreamSpec::new(10.0, 30).jitter(0.01).seed(4).start(0.0));
        let large = generate(&StreamSpec::new(10.0, 30).jitter(0.02).seed(4).start(0.0));
        for (i, (a, b)) in small.iter().zip(&large).enumerate() {
            let grid = i as f64 * 10.0;
            assert!(((b.timestamp - grid) - 2.0 * (a.timestamp - grid)).abs() < 1e-9);
            assert_eq!(a.value, b.value);
        }
    }

    #[test]
    fn test_gaps_and_spike() {
        let events = generate(&StreamSpec::new(1.0, 200).gaps(0.1, 50.0).spike(0.1, 5.0).seed(3));
        let big_gaps = events
            .windows(2)
            .filter(|w| w[1].timestamp - w[0].timestamp > 10.0)
            .count();
        assert!(big_gaps > 5 && big_gaps < 40, "gaps {}", big_gaps);

        let plain = generate(&StreamSpec::new(1.0, 200).gaps(0.1, 50.0).seed(3));
        assert_eq!(events[180].value, plain[180].value * 5.0);
        assert_eq!(events[179].value, plain[179].value);
    }

    #[test]
    fn test_gaussian_amplitudes_look_gaussian() {
        let events = generate(
            &StreamSpec::new(5.0, 400)
                .amplitude(AmplitudeModel::Gaussian {
                    mean: 100.0,
                    std_dev: 10.0,
                })
                .seed(1),
        );
        let values: Vec<f64> = events.iter().map(|e| e.value).collect();
        assert!(stats::skewness(&values).abs() < 0.5);
        assert!((stats::mean(&values) - 100.0).abs() < 3.0);
    }
}
