//! Wavelet-energy burst scorer.
//!
//! Independent of frequency matching: each source keeps its own rolling
//! buffer of raw values. A score compares the peak wavelet energy in the
//! most recent slice of the buffer with the mean energy over the whole
//! buffer and maps the ratio onto 0-100.
//!
//! The baseline is a mean while the recent value is a peak, so broadband
//! noise alone can reach the saturation ratio: a stationary heavy-tailed
//! (log-normal) stream typically scores 100 with the default scales. The
//! score separates bursts from quiet or smooth activity; it does not
//! separate bursts from noisy activity. Bursts that left the recent slice
//! raise the baseline and score low.

use crate::algo::{stats, wavelet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrgencyConfig {
    pub max_points: usize,
    pub min_points: usize,
    /// Wavelet scales in samples
    pub scales: Vec<f64>,
    /// Trailing share of the buffer treated as "recent"
    pub recent_fraction: f64,
    /// Energy ratio at which the score reaches 100
    pub saturation_ratio: f64,
    /// Minimum time between two recomputations for one source
    pub cooldown_ms: u64,
}

impl Default for UrgencyConfig {
    fn default() -> Self {
        Self {
            max_points: 512,
            min_points: 32,
            scales: vec![1.0, 2.0, 4.0, 8.0, 16.0],
            recent_fraction: 0.1,
            saturation_ratio: 3.0,
            cooldown_ms: 2000,
        }
    }
}

/// Per-source rolling buffer plus the last computed score
#[derive(Debug, Clone, Default)]
pub struct UrgencyState {
    points: VecDeque<(f64, f64)>,
    last_score: f64,
    last_computed: Option<Instant>,
}

impl UrgencyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    /// Values in timestamp order.
    fn ordered_values(&self) -> Vec<f64> {
        let mut points: Vec<(f64, f64)> = self.points.iter().copied().collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.into_iter().map(|(_, v)| v).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrgencyTracker {
    config: UrgencyConfig,
}

impl UrgencyTracker {
    pub fn new(config: UrgencyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UrgencyConfig {
        &self.config
    }

    /// Append a point. Non-finite or negative values are ignored.
    pub fn record(&self, state: &mut UrgencyState, timestamp: f64, value: f64) -> bool {
        if !(timestamp.is_finite() && value.is_finite()) || value < 0.0 {
            return false;
        }
        state.points.push_back((timestamp, value));
        while state.points.len() > self.config.max_points.max(1) {
            state.points.pop_front();
        }
        true
    }

    /// Score for one source, recomputed at most once per cooldown.
    pub fn score(&self, state: &mut UrgencyState) -> f64 {
        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        let fresh = state
            .last_computed
            .is_some_and(|at| at.elapsed() < cooldown);
        if fresh {
            return state.last_score;
        }
        let score = self.compute(&state.ordered_values());
        state.last_score = score;
        state.last_computed = Some(Instant::now());
        score
    }

    /// 0-100 burst score of an index-spaced value series.
    pub fn compute(&self, values: &[f64]) -> f64 {
        let n = values.len();
        if n < self.config.min_points.max(4) || self.config.scales.is_empty() {
            return 0.0;
        }
        let m = stats::mean(values);
        let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
        let energy = wavelet::energy(&wavelet::cwt(&centered, &self.config.scales));

        let cells = (energy.len() * n) as f64;
        let baseline = energy.iter().flatten().sum::<f64>() / cells;
        if !(baseline.is_finite() && baseline > 1e-18) {
            return 0.0;
        }

        let recent = ((n as f64 * self.config.recent_fraction.clamp(0.0, 1.0)).ceil() as usize).clamp(1, n);
        let peak = energy
            .iter()
            .flat_map(|row| row[n - recent..].iter().copied())
            .fold(0.0_f64, f64::max);

        let span = (self.config.saturation_ratio - 1.0).max(f64::EPSILON);
        ((peak / baseline - 1.0) / span).clamp(0.0, 1.0) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> UrgencyTracker {
        UrgencyTracker::new(UrgencyConfig {
            cooldown_ms: 0,
            ..UrgencyConfig::default()
        })
    }

    fn fill(tracker: &UrgencyTracker, values: &[f64]) -> UrgencyState {
        let mut state = UrgencyState::new();
        for (i, &v) in values.iter().enumerate() {
            tracker.record(&mut state, i as f64 * 5.0, v);
        }
        state
    }

    #[test]
    fn test_flat_stream_scores_zero() {
        let t = tracker();
        let mut state = fill(&t, &[42.0; 200]);
        assert_eq!(t.score(&mut state), 0.0);
    }

    #[test]
    fn test_recent_spike_scores_high() {
        let t = tracker();
        let mut values: Vec<f64> = (0..200).map(|i| 10.0 + (i % 3) as f64 * 0.2).collect();
        for v in values.iter_mut().skip(180) {
            *v *= 5.0;
        }
        let mut state = fill(&t, &values);
        let score = t.score(&mut state);
        assert!(score > 50.0, "score {}", score);
    }

    #[test]
    fn test_old_burst_does_not_score() {
        let t = tracker();
        let values: Vec<f64> = (0..200)
            .map(|i| {
                let base = 10.0 + (i % 3) as f64 * 0.2;
                if (80..100).contains(&i) { base * 5.0 } else { base }
            })
            .collect();
        let mut state = fill(&t, &values);
        assert!(t.score(&mut state) < 1.0);
    }

    #[test]
    fn test_too_few_points() {
        let t = tracker();
        let mut state = fill(&t, &[1.0, 9.0, 1.0, 9.0]);
        assert_eq!(t.score(&mut state), 0.0);
    }

    #[test]
    fn test_buffer_is_bounded_and_filters_input() {
        let t = UrgencyTracker::new(UrgencyConfig {
            max_points: 10,
            ..UrgencyConfig::default()
        });
        let mut state = UrgencyState::new();
        for i in 0..25 {
            t.record(&mut state, i as f64, 1.0);
        }
        assert!(!t.record(&mut state, 30.0, -1.0));
        assert!(!t.record(&mut state, f64::NAN, 1.0));
        assert_eq!(state.len(), 10);
    }

    #[test]
    fn test_cooldown_serves_cached_score() {
        let t = UrgencyTracker::new(UrgencyConfig {
            cooldown_ms: 60_000,
            ..UrgencyConfig::default()
        });
        let mut state = fill(&t, &[5.0; 100]);
        assert_eq!(t.score(&mut state), 0.0);
        // a burst arriving inside the cooldown is not seen yet
        for i in 0..20 {
            t.record(&mut state, 1000.0 + i as f64, 500.0);
        }
        assert_eq!(t.score(&mut state), 0.0);
        assert_eq!(state.last_score(), 0.0);
    }
}
