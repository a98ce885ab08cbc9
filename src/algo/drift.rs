//! Slow-drift compensation for matched patterns.
//!
//! A pattern's cadence wanders gradually. Each accepted match updates
//! `drift = (1 - alpha) * drift + alpha * (observed / baseline)` and the
//! compensated frequency `observed / drift` stays near the baseline the
//! pattern was first seen at, so re-matching keeps tracking it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftState {
    pub pattern_name: String,
    pub baseline_frequency_hz: f64,
    pub smoothed_drift_factor: f64,
    pub observations: u64,
}

impl DriftState {
    fn seed(pattern_name: &str, observed: f64) -> Self {
        Self {
            pattern_name: pattern_name.to_string(),
            baseline_frequency_hz: observed,
            smoothed_drift_factor: 1.0,
            observations: 1,
        }
    }

    pub fn compensate(&self, observed: f64) -> f64 {
        if self.smoothed_drift_factor > 0.0 {
            observed / self.smoothed_drift_factor
        } else {
            observed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftAdjustment {
    pub drift_factor: f64,
    pub compensated_frequency_hz: f64,
    /// True when this observation created the baseline
    pub seeded: bool,
}

/// Drift state for every pattern matched on one source
#[derive(Debug, Clone)]
pub struct DriftTracker {
    alpha: f64,
    states: BTreeMap<String, DriftState>,
}

impl Default for DriftTracker {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl DriftTracker {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            states: BTreeMap::new(),
        }
    }

    /// Record an accepted match and return the compensated frequency.
    pub fn observe(&mut self, pattern_name: &str, observed_hz: f64) -> DriftAdjustment {
        if let Some(state) = self.states.get_mut(pattern_name) {
            let ratio = if state.baseline_frequency_hz > 0.0 {
                observed_hz / state.baseline_frequency_hz
            } else {
                1.0
            };
            state.smoothed_drift_factor =
                (1.0 - self.alpha) * state.smoothed_drift_factor + self.alpha * ratio;
            state.observations += 1;
            return DriftAdjustment {
                drift_factor: state.smoothed_drift_factor,
                compensated_frequency_hz: state.compensate(observed_hz),
                seeded: false,
            };
        }

        self.states
            .insert(pattern_name.to_string(), DriftState::seed(pattern_name, observed_hz));
        DriftAdjustment {
            drift_factor: 1.0,
            compensated_frequency_hz: observed_hz,
            seeded: true,
        }
    }

    /// Compensated frequency for a tracked pattern without updating it.
    pub fn compensate(&self, pattern_name: &str, observed_hz: f64) -> Option<f64> {
        self.states.get(pattern_name).map(|s| s.compensate(observed_hz))
    }

    pub fn get(&self, pattern_name: &str) -> Option<&DriftState> {
        self.states.get(pattern_name)
    }

    /// Tracked patterns in name order
    pub fn states(&self) -> impl Iterator<Item = &DriftState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_seeds() {
        let mut tracker = DriftTracker::default();
        let adj = tracker.observe("p", 0.1);
        assert!(adj.seeded);
        assert_eq!(adj.drift_factor, 1.0);
        assert_eq!(adj.compensated_frequency_hz, 0.1);
        assert_eq!(tracker.get("p").unwrap().baseline_frequency_hz, 0.1);
    }

    #[test]
    fn test_smoothing_formula() {
        let mut tracker = DriftTracker::new(0.05);
        tracker.observe("p", 0.1);
        let adj = tracker.observe("p", 0.11);
        let expected = 0.95 * 1.0 + 0.05 * 1.1;
        assert!((adj.drift_factor - expected).abs() < 1e-12);
        assert!((adj.compensated_frequency_hz - 0.11 / expected).abs() < 1e-12);
    }

    #[test]
    fn test_slow_drift_is_compensated() {
        let mut tracker = DriftTracker::new(0.05);
        let mut observed = 0.1;
        let mut last = None;
        for _ in 0..300 {
            last = Some(tracker.observe("p", observed));
            observed *= 1.001; // 0.1% per step
        }
        let adj = last.unwrap();
        // raw frequency drifted ~35%, compensated stays close to baseline
        assert!(observed / 0.1 > 1.3);
        assert!((adj.compensated_frequency_hz - 0.1).abs() / 0.1 < 0.05);
    }

    #[test]
    fn test_patterns_are_independent() {
        let mut tracker = DriftTracker::default();
        tracker.observe("a", 0.1);
        tracker.observe("b", 0.5);
        tracker.observe("a", 0.2);
        assert_eq!(tracker.get("b").unwrap().smoothed_drift_factor, 1.0);
        assert_eq!(tracker.len(), 2);
        assert!(tracker.compensate("c", 1.0).is_none());
    }
}
