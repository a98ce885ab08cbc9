//! Plausibility checks applied to a detection before it is trusted.
//!
//! Four independent checks, a veto when at least `min_flags` fire:
//! - interval CV below `cv_floor` (too perfect for organic activity)
//! - near-Gaussian amplitude skew and kurtosis (organic sizes are heavy-tailed)
//! - the online anomaly model scores the current feature vector as
//!   out-of-distribution
//! - more than `max_simultaneous_matches` signatures matched at once
//!
//! A veto marks the detection untrusted; it never hides it.

use crate::algo::isolation::IsolationForest;
use crate::algo::stats;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoofConfig {
    /// Checks that must fire for a veto
    pub min_flags: usize,
    pub cv_floor: f64,
    /// `|skew|` below this counts as Gaussian-like
    pub gaussian_skew: f64,
    /// `|excess kurtosis|` below this counts as Gaussian-like
    pub gaussian_excess_kurtosis: f64,
    pub max_simultaneous_matches: usize,
    /// Feature vectors kept for (re)fitting the anomaly model
    pub history: usize,
    pub min_train: usize,
    pub refit_every: usize,
    pub trees: usize,
    pub sample_size: usize,
    /// Isolation score above which a vector is out-of-distribution
    pub threshold: f64,
    pub seed: u64,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            min_flags: 2,
            cv_floor: 0.01,
            gaussian_skew: 0.5,
            gaussian_excess_kurtosis: 1.0,
            max_simultaneous_matches: 7,
            history: 256,
            min_train: 32,
            refit_every: 64,
            trees: 50,
            sample_size: 128,
            threshold: 0.6,
            seed: 0x5eed_cade,
        }
    }
}

/// Shape summary of a magnitude distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    /// p95 / p50
    pub tail_ratio: f64,
    /// Fraction of values above `mean + 2 * std_dev`
    pub peak_density: f64,
}

impl FeatureVector {
    pub const DIMENSIONS: usize = 6;

    /// Needs at least four finite values.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let sorted = stats::sorted_finite(values);
        if sorted.len() < 4 {
            return None;
        }
        let mean = stats::mean(&sorted);
        let std_dev = stats::std_dev(&sorted);
        let p50 = stats::quantile_sorted(&sorted, 0.5);
        let p95 = stats::quantile_sorted(&sorted, 0.95);
        let tail_ratio = if p50.abs() > f64::EPSILON { p95 / p50 } else { 0.0 };
        let peak_cut = mean + 2.0 * std_dev;
        let peaks = sorted.iter().filter(|&&v| v > peak_cut).count();

        Some(Self {
            mean,
            std_dev,
            skewness: stats::skewness(&sorted),
            excess_kurtosis: stats::excess_kurtosis(&sorted),
            tail_ratio,
            peak_density: peaks as f64 / sorted.len() as f64,
        })
    }

    pub fn as_vec(&self) -> Vec<f64> {
        vec![
            self.mean,
            self.std_dev,
            self.skewness,
            self.excess_kurtosis,
            self.tail_ratio,
            self.peak_density,
        ]
    }
}

/// Lifecycle of the anomaly model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPhase {
    Untrained,
    Training,
    Trained,
}

#[derive(Debug, Clone)]
enum ModelState {
    Untrained,
    Training {
        buffer: Vec<FeatureVector>,
    },
    Trained {
        forest: IsolationForest,
        history: VecDeque<FeatureVector>,
        since_fit: usize,
    },
}

/// Online isolation-forest model over a rolling feature history.
///
/// Transitions are explicit: the first observation moves `Untrained` to
/// `Training`, reaching `min_train` buffered vectors fits the forest, and
/// every `refit_every` further observations refit it on the history.
#[derive(Debug, Clone)]
pub struct AnomalyModel {
    state: ModelState,
    config: SpoofConfig,
    rng: StdRng,
    fits: u64,
    observed: u64,
}

impl AnomalyModel {
    pub fn new(config: &SpoofConfig) -> Self {
        Self {
            state: ModelState::Untrained,
            config: config.clone(),
            rng: StdRng::seed_from_u64(config.seed),
            fits: 0,
            observed: 0,
        }
    }

    pub fn phase(&self) -> ModelPhase {
        match self.state {
            ModelState::Untrained => ModelPhase::Untrained,
            ModelState::Training { .. } => ModelPhase::Training,
            ModelState::Trained { .. } => ModelPhase::Trained,
        }
    }

    pub fn fits(&self) -> u64 {
        self.fits
    }

    /// Feature vectors observed since creation
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Isolation score of `features`, if a model is trained.
    pub fn score(&self, features: &FeatureVector) -> Option<f64> {
        match &self.state {
            ModelState::Trained { forest, .. } => Some(forest.score(&features.as_vec())),
            _ => None,
        }
    }

    /// Score `features` against the current model, then add them to the
    /// history and advance the state machine.
    pub fn observe(&mut self, features: FeatureVector) -> Option<f64> {
        let score = self.score(&features);
        self.observed += 1;

        self.state = match std::mem::replace(&mut self.state, ModelState::Untrained) {
            ModelState::Untrained => self.after_training_step(vec![features]),
            ModelState::Training { mut buffer } => {
                buffer.push(features);
                self.after_training_step(buffer)
            }
            ModelState::Trained {
                forest,
                mut history,
                since_fit,
            } => {
                history.push_back(features);
                while history.len() > self.config.history.max(self.config.min_train) {
                    history.pop_front();
                }
                let since_fit = since_fit + 1;
                if since_fit >= self.config.refit_every.max(1) {
                    let rows: Vec<Vec<f64>> = history.iter().map(FeatureVector::as_vec).collect();
                    match self.fit(&rows) {
                        Some(refit) => ModelState::Trained {
                            forest: refit,
                            history,
                            since_fit: 0,
                        },
                        None => ModelState::Trained {
                            forest,
                            history,
                            since_fit,
                        },
                    }
                } else {
                    ModelState::Trained {
                        forest,
                        history,
                        since_fit,
                    }
                }
            }
        };

        score
    }

    fn after_training_step(&mut self, buffer: Vec<FeatureVector>) -> ModelState {
        if buffer.len() < self.config.min_train.max(2) {
            return ModelState::Training { buffer };
        }
        let rows: Vec<Vec<f64>> = buffer.iter().map(FeatureVector::as_vec).collect();
        match self.fit(&rows) {
            Some(forest) => ModelState::Trained {
                forest,
                history: buffer.into_iter().collect(),
                since_fit: 0,
            },
            None => ModelState::Training { buffer },
        }
    }

    fn fit(&mut self, rows: &[Vec<f64>]) -> Option<IsolationForest> {
        let forest = IsolationForest::fit(rows, self.config.trees, self.config.sample_size, &mut self.rng)?;
        self.fits += 1;
        info!(
            rows = rows.len(),
            trees = forest.num_trees(),
            fits = self.fits,
            "Anomaly model fitted"
        );
        Some(forest)
    }
}

/// Individual plausibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofCheck {
    PerfectPeriodicity,
    GaussianAmplitudes,
    OutOfDistribution,
    TooManyMatches,
}

impl SpoofCheck {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PerfectPeriodicity => "perfect_periodicity",
            Self::GaussianAmplitudes => "gaussian_amplitudes",
            Self::OutOfDistribution => "out_of_distribution",
            Self::TooManyMatches => "too_many_matches",
        }
    }
}

/// What the guard sees of one detection
#[derive(Debug, Clone, Copy)]
pub struct SpoofInputs<'a> {
    /// Interval coefficient of variation, if the interval estimator ran
    pub interval_cv: Option<f64>,
    pub amplitudes: &'a [f64],
    /// Distinct signatures matched across all ranked clusters
    pub match_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpoofVerdict {
    pub flagged: bool,
    pub checks: Vec<SpoofCheck>,
    pub anomaly_score: Option<f64>,
}

impl SpoofVerdict {
    pub fn reasons(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name().to_string()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SpoofGuard {
    config: SpoofConfig,
    model: AnomalyModel,
}

impl Default for SpoofGuard {
    fn default() -> Self {
        Self::new(SpoofConfig::default())
    }
}

impl SpoofGuard {
    pub fn new(config: SpoofConfig) -> Self {
        let model = AnomalyModel::new(&config);
        Self { config, model }
    }

    pub fn model(&self) -> &AnomalyModel {
        &self.model
    }

    /// Run every check. The anomaly model also learns from `inputs`.
    pub fn evaluate(&mut self, inputs: &SpoofInputs<'_>) -> SpoofVerdict {
        let features = FeatureVector::from_values(inputs.amplitudes);
        let anomaly_score = features.and_then(|f| self.model.observe(f));
        self.verdict(inputs, features.as_ref(), anomaly_score)
    }

    /// Run every check without feeding the anomaly model.
    pub fn inspect(&self, inputs: &SpoofInputs<'_>) -> SpoofVerdict {
        let features = FeatureVector::from_values(inputs.amplitudes);
        let anomaly_score = features.as_ref().and_then(|f| self.model.score(f));
        self.verdict(inputs, features.as_ref(), anomaly_score)
    }

    fn verdict(
        &self,
        inputs: &SpoofInputs<'_>,
        features: Option<&FeatureVector>,
        anomaly_score: Option<f64>,
    ) -> SpoofVerdict {
        let mut checks = Vec::new();

        if inputs.interval_cv.is_some_and(|cv| cv < self.config.cv_floor) {
            checks.push(SpoofCheck::PerfectPeriodicity);
        }

        let gaussian_like = features.is_some_and(|f| {
            f.std_dev > 1e-12
                && f.skewness.abs() < self.config.gaussian_skew
                && f.excess_kurtosis.abs() < self.config.gaussian_excess_kurtosis
        });
        if gaussian_like {
            checks.push(SpoofCheck::GaussianAmplitudes);
        }

        if anomaly_score.is_some_and(|s| s > self.config.threshold) {
            checks.push(SpoofCheck::OutOfDistribution);
        }

        if inputs.match_count > self.config.max_simultaneous_matches {
            checks.push(SpoofCheck::TooManyMatches);
        }

        SpoofVerdict {
            flagged: checks.len() >= self.config.min_flags.max(1),
            checks,
            anomaly_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand_distr::{Distribution, LogNormal, Normal};

    fn gaussian(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Normal::new(100.0, 10.0).unwrap();
        (0..n).map(|_| dist.sample(&mut rng)).collect()
    }

    fn heavy_tailed(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = LogNormal::new(3.0, 0.8).unwrap();
        (0..n).map(|_| dist.sample(&mut rng)).collect()
    }

    #[test]
    fn test_feature_vector() {
        let f = FeatureVector::from_values(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert!(f.skewness > 1.0);
        assert!((f.tail_ratio - (80.8 / 3.0)).abs() < 1e-9);
        assert!(FeatureVector::from_values(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_synthetic_profile_is_vetoed() {
        let mut guard = SpoofGuard::default();
        let amplitudes = gaussian(400, 11);
        let verdict = guard.evaluate(&SpoofInputs {
            interval_cv: Some(0.0),
            amplitudes: &amplitudes,
            match_count: 1,
        });
        assert!(verdict.flagged, "checks fired: {:?}", verdict.checks);
        assert!(verdict.checks.contains(&SpoofCheck::PerfectPeriodicity));
        assert!(verdict.checks.contains(&SpoofCheck::GaussianAmplitudes));
    }

    #[test]
    fn test_inspect_leaves_model_untouched() {
        let mut guard = SpoofGuard::default();
        let amplitudes = gaussian(400, 11);
        let inputs = SpoofInputs {
            interval_cv: Some(0.0),
            amplitudes: &amplitudes,
            match_count: 1,
        };
        let verdict = guard.inspect(&inputs);
        assert!(verdict.flagged);
        assert!(verdict.anomaly_score.is_none());
        assert_eq!(guard.model().observed(), 0);
        assert_eq!(guard.model().phase(), ModelPhase::Untrained);

        assert_eq!(guard.evaluate(&inputs).checks, verdict.checks);
        assert_eq!(guard.model().observed(), 1);
    }

    #[test]
    fn test_organic_profile_passes() {
        let mut guard = SpoofGuard::default();
        let amplitudes = heavy_tailed(400, 5);
        let verdict = guard.evaluate(&SpoofInputs {
            interval_cv: Some(0.08),
            amplitudes: &amplitudes,
            match_count: 1,
        });
        assert!(!verdict.flagged, "checks fired: {:?}", verdict.checks);
        assert!(verdict.checks.is_empty());
    }

    #[test]
    fn test_single_check_is_not_enough() {
        let mut guard = SpoofGuard::default();
        let amplitudes = heavy_tailed(200, 9);
        let verdict = guard.evaluate(&SpoofInputs {
            interval_cv: Some(0.001),
            amplitudes: &amplitudes,
            match_count: 8,
        });
        assert!(verdict.flagged);
        assert_eq!(
            verdict.reasons(),
            vec!["perfect_periodicity".to_string(), "too_many_matches".to_string()]
        );

        let verdict = guard.evaluate(&SpoofInputs {
            interval_cv: Some(0.001),
            amplitudes: &amplitudes,
            match_count: 1,
        });
        assert!(!verdict.flagged);
    }

    #[test]
    fn test_model_state_machine() {
        let config = SpoofConfig {
            min_train: 8,
            refit_every: 4,
            history: 16,
            trees: 10,
            sample_size: 8,
            ..SpoofConfig::default()
        };
        let mut model = AnomalyModel::new(&config);
        assert_eq!(model.phase(), ModelPhase::Untrained);

        let mut rng = StdRng::seed_from_u64(2);
        let mut next = || {
            let values: Vec<f64> = (0..50).map(|_| 10.0 + rng.random::<f64>()).collect();
            FeatureVector::from_values(&values).unwrap()
        };

        assert!(model.observe(next()).is_none());
        assert_eq!(model.phase(), ModelPhase::Training);
        for _ in 0..6 {
            assert!(model.observe(next()).is_none());
        }
        assert_eq!(model.phase(), ModelPhase::Training);
        // eighth vector triggers the first fit
        model.observe(next());
        assert_eq!(model.phase(), ModelPhase::Trained);
        assert_eq!(model.fits(), 1);

        assert!(model.observe(next()).is_some());
        for _ in 0..3 {
            model.observe(next());
        }
        assert_eq!(model.fits(), 2);
    }

    #[test]
    fn test_out_of_distribution_vector_scores_high() {
        let config = SpoofConfig {
            min_train: 64,
            ..SpoofConfig::default()
        };
        let mut model = AnomalyModel::new(&config);
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..64 {
            let values: Vec<f64> = (0..50).map(|_| 10.0 + rng.random::<f64>()).collect();
            model.observe(FeatureVector::from_values(&values).unwrap());
        }
        assert_eq!(model.phase(), ModelPhase::Trained);

        let odd = FeatureVector::from_values(&heavy_tailed(50, 1001)).unwrap();
        let odd_score = model.score(&odd).unwrap();
        assert!(odd_score > config.threshold, "odd score {}", odd_score);
    }
}
