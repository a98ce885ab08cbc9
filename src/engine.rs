//! Frequency fingerprinting engine.
//!
//! Pipeline per `tick`:
//! 1. Snapshot: time-sorted events within the horizon
//! 2. Estimation: interval statistics plus the four spectral methods
//! 3. Decision: ensemble clustering, signature match, drift compensation
//! 4. Validation: SpoofGuard plausibility checks on known matches
//!
//! Each source owns three locks: its event window, its urgency buffer and
//! its analysis state. `tick` holds the analysis lock throughout (ticks on
//! one source are serialized and the cooldown check is atomic) but holds
//! the window lock only while copying the snapshot, so ingestion never
//! waits on analysis.

use crate::algo::drift::{DriftState, DriftTracker};
use crate::algo::ensemble::{EnsembleCombiner, FrequencyCluster};
use crate::algo::interval::{IntervalEstimator, IntervalStats};
use crate::algo::spectral::SpectralEstimator;
use crate::algo::stats;
use crate::config::EngineConfig;
use crate::registry::{RegistryConfig, SourceRegistry};
use crate::signal::{
    DetectionResult, DetectionStatus, FrequencyEstimate, MethodBreakdown, unknown_label,
};
use crate::signature::{FingerprintSignature, SignatureLibrary};
use crate::spoof::{SpoofGuard, SpoofInputs, SpoofVerdict};
use crate::urgency::{UrgencyState, UrgencyTracker};
use crate::window::{Event, EventWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Mutable analysis state of one source
struct AnalysisState {
    drift: DriftTracker,
    guard: SpoofGuard,
    cached: Option<(Instant, DetectionResult)>,
    /// Accepted-event count of the window at the last analysis that fed
    /// drift and the anomaly model
    learned_at: Option<u64>,
}

/// Everything the engine keeps for one source label
pub struct SourceState {
    window: Mutex<EventWindow>,
    urgency: Mutex<UrgencyState>,
    analysis: Mutex<AnalysisState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SourceState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            window: Mutex::new(EventWindow::new(
                config.window.horizon_secs,
                config.window.retention_factor,
                config.window.max_events,
            )),
            urgency: Mutex::new(UrgencyState::new()),
            analysis: Mutex::new(AnalysisState {
                drift: DriftTracker::new(config.drift_alpha),
                guard: SpoofGuard::new(config.spoof.clone()),
                cached: None,
                learned_at: None,
            }),
        }
    }
}

/// Engine-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub sources: usize,
    pub events_accepted: u64,
    pub events_dropped: u64,
    pub ticks_computed: u64,
    pub ticks_cached: u64,
    pub sources_evicted: u64,
}

/// Signature chosen for the dominant frequency
struct ResolvedMatch {
    signature: FingerprintSignature,
    /// Frequency that fell inside the tolerance band
    matched_frequency_hz: f64,
}

pub struct FingerprintEngine {
    config: EngineConfig,
    registry: SourceRegistry<SourceState>,
    library: SignatureLibrary,
    interval: IntervalEstimator,
    spectral: SpectralEstimator,
    ensemble: EnsembleCombiner,
    urgency: UrgencyTracker,
    dropped: AtomicU64,
    ticks_computed: AtomicU64,
    ticks_cached: AtomicU64,
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl FingerprintEngine {
    pub fn new(config: EngineConfig) -> Self {
        let library = config.signature_library();
        Self::with_library(config, library)
    }

    /// Build with an explicit signature library, ignoring `config.signatures`.
    pub fn with_library(config: EngineConfig, library: SignatureLibrary) -> Self {
        let needed = config.min_events as f64;
        for sig in library.iter() {
            if sig.period_secs() * needed > config.window.horizon_secs {
                warn!(
                    pattern = %sig.name,
                    period = sig.period_secs(),
                    horizon = config.window.horizon_secs,
                    "Signature period too long to collect min_events inside the horizon"
                );
            }
        }
        let registry = SourceRegistry::new(RegistryConfig {
            max_sources: config.max_sources,
            shards: config.shards,
        });
        Self {
            registry,
            library,
            interval: IntervalEstimator::new(config.min_events, config.min_intervals),
            spectral: SpectralEstimator::new(config.spectral.clone()),
            ensemble: EnsembleCombiner::new(config.ensemble.clone()),
            urgency: UrgencyTracker::new(config.urgency.clone()),
            dropped: AtomicU64::new(0),
            ticks_computed: AtomicU64::new(0),
            ticks_cached: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn signatures(&self) -> &SignatureLibrary {
        &self.library
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Record one event. Malformed input (non-finite fields, negative
    /// value) is dropped and reported as `false`; it never fails.
    pub fn add_event(&self, source: &str, timestamp: f64, value: f64) -> bool {
        if Event::checked(timestamp, value).is_none() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let (state, evicted) = self
            .registry
            .get_or_create(source, || SourceState::new(&self.config));
        if let Some(label) = evicted {
            warn!(evicted = %label, capacity = self.config.max_sources, "Source registry full, evicted least recently used source");
        }

        let accepted = lock(&state.window).add_event(timestamp, value);
        if accepted {
            self.urgency.record(&mut lock(&state.urgency), timestamp, value);
        }
        accepted
    }

    /// Record a batch for one source; returns how many were accepted.
    pub fn add_events<I>(&self, source: &str, events: I) -> usize
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        events
            .into_iter()
            .filter(|&(ts, value)| self.add_event(source, ts, value))
            .count()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Detection for one source. Repeated calls inside `tick_cooldown_ms`
    /// return the cached result; this only bounds compute cost.
    pub fn tick(&self, source: &str) -> DetectionResult {
        self.tick_inner(source, true)
    }

    /// Detection for one source, recomputed regardless of the cooldown.
    pub fn tick_uncached(&self, source: &str) -> DetectionResult {
        self.tick_inner(source, false)
    }

    fn tick_inner(&self, source: &str, use_cache: bool) -> DetectionResult {
        let Some(state) = self.registry.get(source) else {
            return DetectionResult::insufficient(source, 0);
        };

        let mut analysis = lock(&state.analysis);
        let cooldown = Duration::from_millis(self.config.tick_cooldown_ms);
        if use_cache && !cooldown.is_zero() {
            if let Some((at, cached)) = &analysis.cached {
                if at.elapsed() < cooldown {
                    self.ticks_cached.fetch_add(1, Ordering::Relaxed);
                    return cached.clone();
                }
            }
        }

        let (events, accepted) = {
            let window = lock(&state.window);
            (window.snapshot_within_horizon(), window.counters().0)
        };
        // recomputing an unchanged buffer must not count as a new observation
        let fresh = analysis.learned_at != Some(accepted);
        let result = self.analyze(source, &events, fresh, &mut analysis);
        analysis.learned_at = Some(accepted);
        self.ticks_computed.fetch_add(1, Ordering::Relaxed);
        analysis.cached = Some((Instant::now(), result.clone()));
        result
    }

    /// Burst score in [0, 100] for one source; 0 for unknown sources.
    pub fn urgency_score(&self, source: &str) -> f64 {
        match self.registry.get(source) {
            Some(state) => self.urgency.score(&mut lock(&state.urgency)),
            None => 0.0,
        }
    }

    /// Tracked source labels, sorted.
    pub fn sources(&self) -> Vec<String> {
        self.registry.labels()
    }

    pub fn remove_source(&self, source: &str) -> bool {
        self.registry.remove(source).is_some()
    }

    /// Events currently retained for a source.
    pub fn event_count(&self, source: &str) -> usize {
        self.registry
            .get(source)
            .map(|state| lock(&state.window).len())
            .unwrap_or(0)
    }

    /// Drift state of every pattern matched on a source, by name.
    pub fn drift_states(&self, source: &str) -> Vec<DriftState> {
        self.registry
            .get(source)
            .map(|state| lock(&state.analysis).drift.states().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> EngineStats {
        let (accepted, dropped) = self
            .registry
            .entries()
            .iter()
            .map(|(_, state)| lock(&state.window).counters())
            .fold((0, 0), |(a, d), (sa, sd)| (a + sa, d + sd));
        EngineStats {
            sources: self.registry.len(),
            events_accepted: accepted,
            events_dropped: dropped + self.dropped.load(Ordering::Relaxed),
            ticks_computed: self.ticks_computed.load(Ordering::Relaxed),
            ticks_cached: self.ticks_cached.load(Ordering::Relaxed),
            sources_evicted: self.registry.stats().total_evictions,
        }
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    fn analyze(
        &self,
        source: &str,
        events: &[Event],
        fresh: bool,
        analysis: &mut AnalysisState,
    ) -> DetectionResult {
        let n = events.len();
        if n < self.config.min_events {
            debug!(source, events = n, "Insufficient data");
            return DetectionResult::insufficient(source, n);
        }

        let timestamps: Vec<f64> = events.iter().map(|e| e.timestamp).collect();
        let amplitudes: Vec<f64> = events.iter().map(|e| e.value).collect();

        let interval = self.interval.estimate(&timestamps);
        let interval_cv = interval.as_ref().filter(|s| s.period_secs > 0.0).map(|s| s.cv);
        let mut estimates: Vec<FrequencyEstimate> =
            interval.as_ref().and_then(IntervalStats::to_estimate).into_iter().collect();
        estimates.extend(self.spectral.estimate(events));

        let clusters = self.ensemble.combine(&estimates);
        let mut result = DetectionResult::insufficient(source, n);
        result.status = DetectionStatus::Success;

        let Some(dominant) = clusters.first() else {
            // degenerate signal: enough events, no usable candidate
            result.matched_name = unknown_label(0.0);
            result.per_method_breakdown = breakdown(&estimates, None);
            let verdict = analysis.guard.inspect(&SpoofInputs {
                interval_cv,
                amplitudes: &amplitudes,
                match_count: 0,
            });
            apply_guard(&mut result, &verdict);
            debug!(source, events = n, "No periodic candidate");
            return result;
        };

        let frequency = dominant.frequency_hz;
        result.dominant_frequency_hz = frequency;
        result.period = dominant.period_secs();
        result.confidence = dominant.confidence;
        result.per_method_breakdown = breakdown(&estimates, Some(dominant));
        result.matches = self.all_matches(&clusters);

        let inputs = SpoofInputs {
            interval_cv,
            amplitudes: &amplitudes,
            match_count: result.matches.len(),
        };

        let Some(resolved) = self.resolve_match(frequency, &analysis.drift) else {
            result.matched_name = unknown_label(frequency);
            // unknowns are scored but never train the anomaly model
            apply_guard(&mut result, &analysis.guard.inspect(&inputs));
            if result.spoof_flag {
                warn!(source, frequency, reasons = ?result.spoof_reasons, "Unmatched detection looks synthetic");
            }
            debug!(source, frequency, confidence = result.confidence, "Unmatched frequency");
            return result;
        };

        let signature = resolved.signature;
        result.matched_name = signature.name.clone();
        result.match_error = Some(signature.relative_error(resolved.matched_frequency_hz));
        result.profile_similarity = Some(signature.profile_similarity(
            stats::coefficient_of_variation(&amplitudes),
            interval_cv.unwrap_or(0.0),
        ));

        let verdict = if fresh {
            analysis.guard.evaluate(&inputs)
        } else {
            analysis.guard.inspect(&inputs)
        };
        apply_guard(&mut result, &verdict);
        if verdict.flagged {
            warn!(source, pattern = %signature.name, reasons = ?result.spoof_reasons, "Detection vetoed as implausible");
        }

        // only fresh, trusted matches move the drift baseline
        if fresh && !verdict.flagged {
            let adjustment = analysis.drift.observe(&signature.name, frequency);
            if adjustment.seeded {
                info!(source, pattern = %signature.name, baseline_hz = frequency, "Drift baseline seeded");
            }
            result.drift_factor = Some(adjustment.drift_factor);
            result.compensated_frequency_hz = Some(adjustment.compensated_frequency_hz);
        } else {
            result.drift_factor = analysis.drift.get(&signature.name).map(|s| s.smoothed_drift_factor);
            result.compensated_frequency_hz = Some(
                analysis
                    .drift
                    .compensate(&signature.name, frequency)
                    .unwrap_or(frequency),
            );
        }

        debug!(
            source,
            frequency,
            pattern = %result.matched_name,
            confidence = result.confidence,
            spoof = result.spoof_flag,
            "Tick"
        );
        result
    }

    /// Direct library match, else the best drift-compensated match among
    /// patterns already tracked for the source.
    fn resolve_match(&self, frequency: f64, drift: &DriftTracker) -> Option<ResolvedMatch> {
        if let Some(m) = self.library.best_match(frequency) {
            return Some(ResolvedMatch {
                signature: m.signature,
                matched_frequency_hz: frequency,
            });
        }

        drift
            .states()
            .filter_map(|state| {
                let signature = self.library.get(&state.pattern_name)?;
                let compensated = state.compensate(frequency);
                let error = signature.relative_error(compensated);
                (error <= signature.tolerance_ratio).then_some((error, signature, compensated))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, signature, compensated)| ResolvedMatch {
                signature: signature.clone(),
                matched_frequency_hz: compensated,
            })
    }

    /// Distinct signatures matched by any ranked cluster, sorted.
    fn all_matches(&self, clusters: &[FrequencyCluster]) -> Vec<String> {
        clusters
            .iter()
            .filter_map(|c| self.library.best_match(c.frequency_hz))
            .map(|m| m.signature.name)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn apply_guard(result: &mut DetectionResult, verdict: &SpoofVerdict) {
    result.spoof_flag = verdict.flagged;
    result.spoof_reasons = verdict.reasons();
}

fn breakdown(estimates: &[FrequencyEstimate], dominant: Option<&FrequencyCluster>) -> Vec<MethodBreakdown> {
    let mut rows: Vec<MethodBreakdown> = estimates
        .iter()
        .map(|e| MethodBreakdown {
            method: e.method,
            frequency_hz: e.frequency_hz,
            period_secs: e.period_secs(),
            confidence: e.confidence,
            in_dominant_cluster: dominant.is_some_and(|c| c.members.contains(e)),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.method
            .cmp(&b.method)
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.frequency_hz.total_cmp(&b.frequency_hz))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::EstimationMethod;
    use crate::simulation::{AmplitudeModel, StreamSpec, generate};

    fn engine() -> FingerprintEngine {
        FingerprintEngine::new(EngineConfig {
            tick_cooldown_ms: 0,
            ..EngineConfig::default()
        })
    }

    fn feed_regular(engine: &FingerprintEngine, source: &str, period: f64, n: usize) {
        let spec = StreamSpec::new(period, n).jitter(0.02).seed(n as u64);
        for event in generate(&spec) {
            engine.add_event(source, event.timestamp, event.value);
        }
    }

    #[test]
    fn test_unknown_source_is_insufficient() {
        let result = engine().tick("nobody");
        assert_eq!(result.status, DetectionStatus::InsufficientData);
        assert_eq!(result.event_count, 0);
    }

    #[test]
    fn test_malformed_events_do_not_create_sources() {
        let e = engine();
        assert!(!e.add_event("a", f64::NAN, 1.0));
        assert!(!e.add_event("a", 1.0, -2.0));
        assert!(e.sources().is_empty());
        assert_eq!(e.stats().events_dropped, 2);
    }

    #[test]
    fn test_matches_builtin_signature() {
        let e = engine();
        feed_regular(&e, "feed", 15.0, 120);
        let result = e.tick("feed");
        assert!(result.is_success());
        assert_eq!(result.matched_name, "cadence_15s");
        assert!((result.period - 15.0).abs() < 0.3, "period {}", result.period);
        assert!(!result.spoof_flag);
        assert_eq!(result.drift_factor, Some(1.0));
        assert!(result.match_error.unwrap() < 0.02);
        assert!(
            result
                .per_method_breakdown
                .iter()
                .any(|b| b.method == EstimationMethod::Interval && b.in_dominant_cluster)
        );
        assert_eq!(e.drift_states("feed").len(), 1);
    }

    #[test]
    fn test_unmatched_frequency_is_labelled_unknown() {
        let e = engine();
        feed_regular(&e, "odd", 32.0, 100);
        let result = e.tick("odd");
        assert!(result.is_success());
        assert!(result.matched_name.starts_with("unknown_"), "{}", result.matched_name);
        assert!(!result.spoof_flag);
        assert!(result.drift_factor.is_none());
    }

    #[test]
    fn test_cooldown_serves_cached_result() {
        let e = FingerprintEngine::new(EngineConfig {
            tick_cooldown_ms: 60_000,
            ..EngineConfig::default()
        });
        feed_regular(&e, "s", 5.0, 60);
        let first = e.tick("s");
        feed_regular(&e, "s", 5.0, 10);
        let second = e.tick("s");
        assert_eq!(first, second);
        assert_eq!(e.stats().ticks_cached, 1);
        assert_eq!(e.stats().ticks_computed, 1);
        let fresh = e.tick_uncached("s");
        assert_eq!(e.stats().ticks_computed, 2);
        assert!(fresh.is_success());
    }

    #[test]
    fn test_drift_fallback_keeps_tracking() {
        let e = engine();
        feed_regular(&e, "slow", 60.0, 50);
        assert_eq!(e.tick("slow").matched_name, "cadence_60s");

        let mut analysis = AnalysisState {
            drift: DriftTracker::new(0.05),
            guard: SpoofGuard::default(),
            cached: None,
            learned_at: None,
        };
        analysis.drift.observe("cadence_60s", 1.0 / 60.0);
        for _ in 0..60 {
            analysis.drift.observe("cadence_60s", 1.0 / 70.0);
        }
        // 1/72 Hz is outside the 10% band, but compensated lands inside it
        let freq = 1.0 / 72.0;
        assert!(e.signatures().best_match(freq).is_none());
        let resolved = e.resolve_match(freq, &analysis.drift).expect("compensated match");
        assert_eq!(resolved.signature.name, "cadence_60s");
    }

    fn feed_synthetic(engine: &FingerprintEngine, source: &str, period: f64, n: usize) {
        let spec = StreamSpec::new(period, n)
            .amplitude(AmplitudeModel::Gaussian {
                mean: 100.0,
                std_dev: 10.0,
            })
            .seed(3);
        for event in generate(&spec) {
            engine.add_event(source, event.timestamp, event.value);
        }
    }

    fn observed(engine: &FingerprintEngine, source: &str) -> u64 {
        let state = engine.registry.get(source).unwrap();
        let count = lock(&state.analysis).guard.model().observed();
        count
    }

    #[test]
    fn test_longest_builtin_signature_matches_with_defaults() {
        let e = engine();
        feed_regular(&e, "hourly", 3600.0, 30);
        let result = e.tick("hourly");
        assert!(result.is_success(), "events {}", result.event_count);
        assert_eq!(result.matched_name, "cadence_3600s");
    }

    #[test]
    fn test_vetoed_match_leaves_drift_untouched() {
        let e = engine();
        feed_synthetic(&e, "bot", 5.0, 400);
        let result = e.tick("bot");
        assert_eq!(result.matched_name, "cadence_5s");
        assert!(result.spoof_flag, "reasons {:?}", result.spoof_reasons);
        assert!(e.drift_states("bot").is_empty());
        assert!(result.drift_factor.is_none());
        assert_eq!(result.compensated_frequency_hz, Some(result.dominant_frequency_hz));
    }

    #[test]
    fn test_unmatched_synthetic_stream_is_flagged() {
        let e = engine();
        feed_synthetic(&e, "odd-bot", 32.0, 200);
        let result = e.tick("odd-bot");
        assert!(result.matched_name.starts_with("unknown_"), "{}", result.matched_name);
        assert!(result.spoof_flag);
        assert!(result.spoof_reasons.contains(&"perfect_periodicity".to_string()));
        assert!(result.spoof_reasons.contains(&"gaussian_amplitudes".to_string()));
        // unknowns never train the anomaly model
        assert_eq!(observed(&e, "odd-bot"), 0);
    }

    #[test]
    fn test_degenerate_signal_reports_zero_confidence() {
        let e = engine();
        e.add_events("stuck", (0..30).map(|_| (1000.0, 5.0)));
        let result = e.tick("stuck");
        assert_eq!(result.status, DetectionStatus::Success);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.period, 0.0);
        assert_eq!(result.matched_name, "unknown_0.000000");
        assert!(!result.spoof_flag);
        assert_eq!(result.event_count, 30);
    }

    #[test]
    fn test_recompute_on_unchanged_buffer_does_not_learn() {
        let e = engine();
        feed_regular(&e, "s", 5.0, 60);
        let first = e.tick("s");
        assert_eq!(first.matched_name, "cadence_5s");
        assert!(!first.spoof_flag);
        assert_eq!(observed(&e, "s"), 1);

        for _ in 0..5 {
            let again = e.tick_uncached("s");
            assert_eq!(again.drift_factor, first.drift_factor);
            assert_eq!(again.compensated_frequency_hz, first.compensated_frequency_hz);
        }
        assert_eq!(observed(&e, "s"), 1);
        assert_eq!(e.drift_states("s")[0].observations, 1);

        e.add_event("s", 1_700_000_300.0, 20.0);
        e.tick("s");
        assert_eq!(observed(&e, "s"), 2);
        assert_eq!(e.drift_states("s")[0].observations, 2);
    }

    #[test]
    fn test_remove_and_event_count() {
        let e = engine();
        e.add_events("x", (0..30).map(|i| (i as f64, 1.0)));
        assert_eq!(e.event_count("x"), 30);
        assert!(e.remove_source("x"));
        assert_eq!(e.event_count("x"), 0);
        assert!(!e.remove_source("x"));
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FingerprintEngine>();
    }
}
