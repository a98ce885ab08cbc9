//! Engine configuration.
//!
//! Every field has a default; a JSON document only needs the fields it
//! overrides:
//!
//! ```json
//! { "window": { "horizon_secs": 900 }, "tick_cooldown_ms": 0 }
//! ```

use crate::algo::ensemble::EnsembleConfig;
use crate::algo::spectral::SpectralConfig;
use crate::error::{EngineError, Result};
use crate::signature::{FingerprintSignature, SignatureLibrary};
use crate::spoof::SpoofConfig;
use crate::urgency::UrgencyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Analysis horizon W in seconds. Must cover `min_events` periods of
    /// the slowest signature for that signature to be reachable.
    pub horizon_secs: f64,
    /// Events are kept until older than `horizon_secs * retention_factor`
    pub retention_factor: f64,
    /// Hard cap per source
    pub max_events: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 86_400.0,
            retention_factor: 1.5,
            max_events: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    /// Events in the horizon before a source is analysed
    pub min_events: usize,
    /// Surviving intervals required by the interval estimator
    pub min_intervals: usize,
    /// Repeated ticks inside this interval return the cached result.
    /// A throughput control only; results do not depend on it.
    pub tick_cooldown_ms: u64,
    pub spectral: SpectralConfig,
    pub ensemble: EnsembleConfig,
    /// Smoothing factor of the drift tracker
    pub drift_alpha: f64,
    pub spoof: SpoofConfig,
    pub urgency: UrgencyConfig,
    /// Sources tracked before the least recently used one is evicted
    pub max_sources: usize,
    /// Lock shards of the source registry
    pub shards: usize,
    /// Replacement signature table; the built-in table when absent
    pub signatures: Option<Vec<FingerprintSignature>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            min_events: 20,
            min_intervals: 5,
            tick_cooldown_ms: 2000,
            spectral: SpectralConfig::default(),
            ensemble: EnsembleConfig::default(),
            drift_alpha: 0.05,
            spoof: SpoofConfig::default(),
            urgency: UrgencyConfig::default(),
            max_sources: 100_000,
            shards: 16,
            signatures: None,
        }
    }
}

fn check(ok: bool, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(reason.to_string()))
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.window;
        check(
            w.horizon_secs.is_finite() && w.horizon_secs > 0.0,
            "window.horizon_secs must be positive",
        )?;
        check(
            w.retention_factor.is_finite() && w.retention_factor >= 1.0,
            "window.retention_factor must be at least 1",
        )?;
        check(w.max_events >= self.min_events, "window.max_events must be at least min_events")?;
        check(self.min_events >= 3, "min_events must be at least 3")?;
        check(self.min_intervals >= 2, "min_intervals must be at least 2")?;

        let tol = self.ensemble.cluster_tolerance;
        check(tol > 0.0 && tol < 1.0, "ensemble.cluster_tolerance must be in (0, 1)")?;
        check(
            self.ensemble.weights.as_array().iter().all(|w| w.is_finite() && *w >= 0.0),
            "ensemble.weights must be non-negative",
        )?;
        check(
            self.spectral.min_snr > 0.0 && self.spectral.lomb_min_ratio > 0.0,
            "spectral power ratios must be positive",
        )?;
        check(
            self.drift_alpha > 0.0 && self.drift_alpha <= 1.0,
            "drift_alpha must be in (0, 1]",
        )?;

        check(self.spoof.min_flags >= 1, "spoof.min_flags must be at least 1")?;
        check(
            self.spoof.threshold > 0.0 && self.spoof.threshold < 1.0,
            "spoof.threshold must be in (0, 1)",
        )?;
        check(self.spoof.min_train >= 2, "spoof.min_train must be at least 2")?;

        let u = &self.urgency;
        check(!u.scales.is_empty(), "urgency.scales must not be empty")?;
        check(
            u.scales.iter().all(|s| s.is_finite() && *s > 0.0),
            "urgency.scales must be positive",
        )?;
        check(
            u.recent_fraction > 0.0 && u.recent_fraction <= 1.0,
            "urgency.recent_fraction must be in (0, 1]",
        )?;
        check(u.saturation_ratio > 1.0, "urgency.saturation_ratio must exceed 1")?;
        check(u.max_points >= u.min_points, "urgency.max_points must be at least min_points")?;

        check(self.max_sources >= 1, "max_sources must be at least 1")?;
        check(self.shards >= 1, "shards must be at least 1")?;
        if let Some(table) = &self.signatures {
            check(!table.is_empty(), "signatures must not be empty when given")?;
            for sig in table {
                check(
                    sig.frequency_hz.is_finite() && sig.frequency_hz > 0.0,
                    &format!("signature {} needs a positive frequency", sig.name),
                )?;
                check(
                    sig.tolerance_ratio > 0.0 && sig.tolerance_ratio < 1.0,
                    &format!("signature {} tolerance must be in (0, 1)", sig.name),
                )?;
            }
        }
        Ok(())
    }

    /// Signatures whose period times `min_events` exceeds the horizon; they
    /// can never collect enough events to match.
    pub fn unreachable_signatures(&self) -> Vec<String> {
        let needed = self.min_events as f64;
        self.signature_library()
            .iter()
            .filter(|sig| sig.period_secs() * needed > self.window.horizon_secs)
            .map(|sig| sig.name.clone())
            .collect()
    }

    /// Library built from `signatures`, or the built-in table.
    pub fn signature_library(&self) -> SignatureLibrary {
        match &self.signatures {
            Some(table) => SignatureLibrary::new(table.clone()),
            None => SignatureLibrary::builtin(),
        }
    }
}
