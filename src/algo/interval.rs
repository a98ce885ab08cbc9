//! Inter-arrival period estimation.
//!
//! The most accurate single method for near-periodic discrete events and
//! the anchor of the ensemble:
//! 1. consecutive inter-arrival intervals
//! 2. IQR outlier trim (never below `min_intervals` survivors)
//! 3. period = median of survivors
//! 4. confidence = mean of `100 * (1 - CV)` and the percentage of
//!    survivors within 10% of the median

use crate::algo::stats;
use crate::signal::{EstimationMethod, FrequencyEstimate};

/// Width of the regularity band around the median period
const REGULARITY_BAND: f64 = 0.10;
const IQR_FENCE: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalStats {
    pub period_secs: f64,
    /// Mean of the surviving intervals
    pub mean_interval: f64,
    /// Coefficient of variation of the surviving intervals
    pub cv: f64,
    /// `100 * (1 - cv)`, clamped
    pub cv_confidence: f64,
    /// Percent of survivors within 10% of the median
    pub regularity: f64,
    pub confidence: f64,
    pub intervals_used: usize,
    pub intervals_trimmed: usize,
}

impl IntervalStats {
    pub fn frequency_hz(&self) -> f64 {
        if self.period_secs > 0.0 {
            1.0 / self.period_secs
        } else {
            0.0
        }
    }

    /// Ensemble candidate, absent for a degenerate (zero) period.
    pub fn to_estimate(&self) -> Option<FrequencyEstimate> {
        (self.period_secs > 0.0).then(|| {
            FrequencyEstimate::new(EstimationMethod::Interval, self.frequency_hz(), self.confidence)
        })
    }
}

#[derive(Debug, Clone)]
pub struct IntervalEstimator {
    min_events: usize,
    min_intervals: usize,
}

impl Default for IntervalEstimator {
    fn default() -> Self {
        Self::new(20, 5)
    }
}

impl IntervalEstimator {
    pub fn new(min_events: usize, min_intervals: usize) -> Self {
        Self {
            min_events: min_events.max(2),
            min_intervals: min_intervals.max(2),
        }
    }

    pub fn min_events(&self) -> usize {
        self.min_events
    }

    /// Estimate from time-sorted timestamps. `None` means insufficient data.
    pub fn estimate(&self, timestamps: &[f64]) -> Option<IntervalStats> {
        if timestamps.len() < self.min_events {
            return None;
        }

        let intervals: Vec<f64> = timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|iv| iv.is_finite() && *iv >= 0.0)
            .collect();
        if intervals.len() < self.min_intervals {
            return None;
        }

        let survivors = self.iqr_trim(&intervals);
        let trimmed = intervals.len() - survivors.len();

        let period = stats::median(&survivors);
        let mean_interval = stats::mean(&survivors);
        if period <= 0.0 || mean_interval <= 0.0 {
            return Some(IntervalStats {
                period_secs: 0.0,
                mean_interval: 0.0,
                cv: 0.0,
                cv_confidence: 0.0,
                regularity: 0.0,
                confidence: 0.0,
                intervals_used: survivors.len(),
                intervals_trimmed: trimmed,
            });
        }

        let cv = stats::std_dev(&survivors) / mean_interval;
        let cv_confidence = (100.0 * (1.0 - cv)).clamp(0.0, 100.0);

        let band = REGULARITY_BAND * period;
        let regular = survivors
            .iter()
            .filter(|&&iv| (iv - period).abs() <= band)
            .count();
        let regularity = 100.0 * regular as f64 / survivors.len() as f64;

        Some(IntervalStats {
            period_secs: period,
            mean_interval,
            cv,
            cv_confidence,
            regularity,
            confidence: ((cv_confidence + regularity) / 2.0).clamp(0.0, 100.0),
            intervals_used: survivors.len(),
            intervals_trimmed: trimmed,
        })
    }

    /// Drop intervals outside the Tukey fences; fall back to the untrimmed
    /// set when too few survive.
    fn iqr_trim(&self, intervals: &[f64]) -> Vec<f64> {
        let sorted = stats::sorted_finite(intervals);
        let q1 = stats::quantile_sorted(&sorted, 0.25);
        let q3 = stats::quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        let lo = q1 - IQR_FENCE * iqr;
        let hi = q3 + IQR_FENCE * iqr;

        let survivors: Vec<f64> = intervals
            .iter()
            .copied()
            .filter(|&iv| iv >= lo && iv <= hi)
            .collect();

        if survivors.len() < self.min_intervals {
            intervals.to_vec()
        } else {
            survivors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(period: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * period).collect()
    }

    #[test]
    fn test_insufficient_events() {
        let est = IntervalEstimator::default();
        assert!(est.estimate(&regular(10.0, 19)).is_none());
        assert!(est.estimate(&regular(10.0, 20)).is_some());
    }

    #[test]
    fn test_perfect_period_full_confidence() {
        let stats = IntervalEstimator::default()
            .estimate(&regular(41.0, 50))
            .unwrap();
        assert!((stats.period_secs - 41.0).abs() < 1e-9);
        assert!(stats.cv < 1e-9);
        assert!((stats.confidence - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_outlier_intervals_are_trimmed() {
        let mut ts = Vec::new();
        let mut t = 0.0;
        for i in 0..60 {
            ts.push(t);
            // every tenth gap is enormous
            t += if i % 10 == 9 { 5000.0 } else { 41.0 + (i % 3) as f64 * 0.2 };
        }
        let stats = IntervalEstimator::default().estimate(&ts).unwrap();
        assert!(stats.intervals_trimmed >= 5);
        assert!(
            (stats.period_secs - 41.2).abs() < 0.5,
            "median should ignore outliers: {}",
            stats.period_secs
        );
        assert!(stats.confidence > 90.0);
    }

    #[test]
    fn test_trim_never_leaves_too_few() {
        let est = IntervalEstimator::new(3, 6);
        // Fences keep only five of six intervals, below the floor
        let ts = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 1005.0];
        let stats = est.estimate(&ts).unwrap();
        assert_eq!(stats.intervals_used, 6);
        assert_eq!(stats.intervals_trimmed, 0);
        assert!((stats.period_secs - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_intervals_are_degenerate() {
        let ts = vec![5.0; 30];
        let stats = IntervalEstimator::default().estimate(&ts).unwrap();
        assert_eq!(stats.confidence, 0.0);
        assert!(stats.to_estimate().is_none());
    }
}
