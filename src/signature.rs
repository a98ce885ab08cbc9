//! Named reference frequencies with tolerance bands.
//!
//! The library is read-only once built. The built-in table is opaque:
//! each entry is just a labelled frequency plus the noise profile expected
//! around it.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_TOLERANCE: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintSignature {
    pub name: String,
    pub frequency_hz: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance_ratio: f64,
    /// Expected coefficient of variation of event magnitudes
    #[serde(default)]
    pub expected_amplitude_variation: f64,
    /// Expected coefficient of variation of inter-arrival times
    #[serde(default)]
    pub expected_phase_noise: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl FingerprintSignature {
    pub fn from_period(name: &str, period_secs: f64, amplitude_variation: f64, phase_noise: f64) -> Self {
        Self {
            name: name.to_string(),
            frequency_hz: 1.0 / period_secs,
            tolerance_ratio: DEFAULT_TOLERANCE,
            expected_amplitude_variation: amplitude_variation,
            expected_phase_noise: phase_noise,
        }
    }

    pub fn period_secs(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    /// `|observed - reference| / reference`
    pub fn relative_error(&self, frequency_hz: f64) -> f64 {
        (frequency_hz - self.frequency_hz).abs() / self.frequency_hz
    }

    /// 0-100 closeness of an observed noise profile to the expected one.
    pub fn profile_similarity(&self, amplitude_cv: f64, interval_cv: f64) -> f64 {
        fn closeness(observed: f64, expected: f64) -> f64 {
            1.0 / (1.0 + (observed - expected).abs() / expected.max(0.01))
        }
        let amp = closeness(amplitude_cv, self.expected_amplitude_variation);
        let phase = closeness(interval_cv, self.expected_phase_noise);
        (50.0 * (amp + phase)).clamp(0.0, 100.0)
    }
}

static BUILTIN: Lazy<Vec<FingerprintSignature>> = Lazy::new(|| {
    vec![
        FingerprintSignature::from_period("cadence_1s", 1.0, 0.05, 0.02),
        FingerprintSignature::from_period("cadence_5s", 5.0, 0.10, 0.03),
        FingerprintSignature::from_period("cadence_8_7s", 8.7, 0.35, 0.05),
        FingerprintSignature::from_period("cadence_15s", 15.0, 0.25, 0.04),
        FingerprintSignature::from_period("cadence_23_5s", 23.5, 0.40, 0.06),
        FingerprintSignature::from_period("cadence_41s", 41.0, 0.50, 0.05),
        FingerprintSignature::from_period("cadence_60s", 60.0, 0.30, 0.03),
        FingerprintSignature::from_period("cadence_120s", 120.0, 0.45, 0.08),
        FingerprintSignature::from_period("cadence_300s", 300.0, 0.60, 0.10),
        FingerprintSignature::from_period("cadence_900s", 900.0, 0.60, 0.12),
        FingerprintSignature::from_period("cadence_3600s", 3600.0, 0.80, 0.15),
    ]
});

/// Outcome of matching one frequency against the library
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMatch {
    pub signature: FingerprintSignature,
    pub relative_error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureLibrary {
    signatures: Vec<FingerprintSignature>,
}

impl Default for SignatureLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SignatureLibrary {
    pub fn builtin() -> Self {
        Self::new(BUILTIN.clone())
    }

    /// Build from a custom table. Entries with a non-positive or non-finite
    /// frequency are skipped; order is normalised by name.
    pub fn new(mut signatures: Vec<FingerprintSignature>) -> Self {
        signatures.retain(|s| s.frequency_hz.is_finite() && s.frequency_hz > 0.0);
        for s in &mut signatures {
            if !(s.tolerance_ratio.is_finite() && s.tolerance_ratio > 0.0) {
                s.tolerance_ratio = DEFAULT_TOLERANCE;
            }
        }
        signatures.sort_by(|a, b| a.name.cmp(&b.name));
        Self { signatures }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerprintSignature> {
        self.signatures.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FingerprintSignature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    /// The signature with minimum relative error, if that error is within
    /// its tolerance. Ties go to the lexicographically smaller name.
    pub fn best_match(&self, frequency_hz: f64) -> Option<SignatureMatch> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return None;
        }
        let best = self.signatures.iter().min_by(|a, b| {
            a.relative_error(frequency_hz)
                .partial_cmp(&b.relative_error(frequency_hz))
                .unwrap_or(Ordering::Equal)
                .then(a.name.cmp(&b.name))
        })?;
        let relative_error = best.relative_error(frequency_hz);
        (relative_error <= best.tolerance_ratio).then(|| SignatureMatch {
            signature: best.clone(),
            relative_error,
        })
    }
}
