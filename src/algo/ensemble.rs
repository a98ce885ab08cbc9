//! Ensemble combiner for multi-method frequency candidates.
//!
//! Candidates whose frequencies are mutually within `cluster_tolerance`
//! (relative) are grouped. A cluster scores `sum(weight * confidence)`
//! over its members, where the weight is a fixed per-method reliability
//! constant. Clusters are ranked by score, ties broken by the lower
//! frequency, so identical inputs always produce identical rankings.

use crate::algo::stats;
use crate::signal::{EstimationMethod, FrequencyEstimate, NUM_METHODS};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fixed reliability weight per method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodWeights {
    pub interval: f64,
    pub resampled_fft: f64,
    pub welch: f64,
    pub lomb_scargle: f64,
    pub autocorrelation: f64,
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self {
            interval: 1.0,
            lomb_scargle: 0.7,
            resampled_fft: 0.6,
            welch: 0.5,
            autocorrelation: 0.4,
        }
    }
}

impl MethodWeights {
    pub fn get(&self, method: EstimationMethod) -> f64 {
        match method {
            EstimationMethod::Interval => self.interval,
            EstimationMethod::ResampledFft => self.resampled_fft,
            EstimationMethod::Welch => self.welch,
            EstimationMethod::LombScargle => self.lomb_scargle,
            EstimationMethod::Autocorrelation => self.autocorrelation,
        }
    }

    pub fn as_array(&self) -> [f64; NUM_METHODS] {
        EstimationMethod::ALL.map(|m| self.get(m))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Relative tolerance for two candidates to share a cluster
    pub cluster_tolerance: f64,
    pub weights: MethodWeights,
    /// Lower bound for the resolution penalty applied to Welch votes
    pub min_resolution_scale: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            cluster_tolerance: 0.05,
            weights: MethodWeights::default(),
            min_resolution_scale: 0.25,
        }
    }
}

/// A group of agreeing candidates
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyCluster {
    /// Weighted mean frequency of the members
    pub frequency_hz: f64,
    pub score: f64,
    pub members: Vec<FrequencyEstimate>,
    /// Confidence of the member contributing the most to `score`
    pub confidence: f64,
}

impl FrequencyCluster {
    pub fn period_secs(&self) -> f64 {
        if self.frequency_hz > 0.0 {
            1.0 / self.frequency_hz
        } else {
            0.0
        }
    }

    pub fn contains_method(&self, method: EstimationMethod) -> bool {
        self.members.iter().any(|m| m.method == method)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnsembleCombiner {
    config: EnsembleConfig,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Effective vote weight of one candidate.
    ///
    /// Welch trades resolution for noise robustness, so its vote shrinks
    /// when a bin is wide compared to the clustering tolerance.
    pub fn weight(&self, estimate: &FrequencyEstimate) -> f64 {
        let base = self.config.weights.get(estimate.method);
        if estimate.method != EstimationMethod::Welch || estimate.resolution_hz <= 0.0 {
            return base;
        }
        let acceptable = self.config.cluster_tolerance * estimate.frequency_hz;
        base * (acceptable / estimate.resolution_hz).clamp(self.config.min_resolution_scale, 1.0)
    }

    /// Cluster and rank candidates, best first.
    pub fn combine(&self, estimates: &[FrequencyEstimate]) -> Vec<FrequencyCluster> {
        let mut candidates: Vec<FrequencyEstimate> = estimates
            .iter()
            .copied()
            .filter(|e| e.frequency_hz.is_finite() && e.frequency_hz > 0.0)
            .collect();
        // fixed processing order: frequency, then method, then confidence
        candidates.sort_by(|a, b| {
            a.frequency_hz
                .total_cmp(&b.frequency_hz)
                .then(a.method.cmp(&b.method))
                .then(b.confidence.total_cmp(&a.confidence))
        });

        let mut clusters = Vec::new();
        let mut start = 0;
        while start < candidates.len() {
            let anchor = candidates[start].frequency_hz;
            let mut end = start + 1;
            while end < candidates.len()
                && stats::relative_difference(candidates[end].frequency_hz, anchor)
                    <= self.config.cluster_tolerance
            {
                end += 1;
            }
            clusters.push(self.build_cluster(candidates[start..end].to_vec()));
            start = end;
        }

        clusters.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.frequency_hz.total_cmp(&b.frequency_hz))
        });
        clusters
    }

    fn build_cluster(&self, members: Vec<FrequencyEstimate>) -> FrequencyCluster {
        let mut score = 0.0;
        let mut weighted_freq = 0.0;
        let mut lead: Option<(f64, f64)> = None;

        for m in &members {
            let vote = self.weight(m) * m.confidence;
            score += vote;
            weighted_freq += vote * m.frequency_hz;
            if lead.is_none_or(|(best, _)| vote > best) {
                lead = Some((vote, m.confidence));
            }
        }

        let frequency_hz = if score > 0.0 {
            weighted_freq / score
        } else {
            stats::mean(&members.iter().map(|m| m.frequency_hz).collect::<Vec<_>>())
        };

        FrequencyCluster {
            frequency_hz,
            score,
            confidence: lead.map(|(_, c)| c).unwrap_or(0.0),
            members,
        }
    }
}
