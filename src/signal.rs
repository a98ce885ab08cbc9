//! Detection output types.
//!
//! Estimators emit `FrequencyEstimate`s tagged with their `EstimationMethod`;
//! the engine folds them into one `DetectionResult` per `tick`.

use serde::{Deserialize, Serialize};

/// Number of estimation methods in the ensemble
pub const NUM_METHODS: usize = 5;

/// Periodicity estimation methods
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    Interval = 0,
    ResampledFft = 1,
    Welch = 2,
    LombScargle = 3,
    Autocorrelation = 4,
}

impl EstimationMethod {
    pub const ALL: [EstimationMethod; NUM_METHODS] = [
        Self::Interval,
        Self::ResampledFft,
        Self::Welch,
        Self::LombScargle,
        Self::Autocorrelation,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Interval),
            1 => Some(Self::ResampledFft),
            2 => Some(Self::Welch),
            3 => Some(Self::LombScargle),
            4 => Some(Self::Autocorrelation),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interval => "Interval/IQR",
            Self::ResampledFft => "Spectral/FFT",
            Self::Welch => "Spectral/Welch",
            Self::LombScargle => "Spectral/LombScargle",
            Self::Autocorrelation => "Autocorrelation",
        }
    }
}

/// A single candidate frequency from one estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEstimate {
    pub method: EstimationMethod,
    pub frequency_hz: f64,
    /// 0-100
    pub confidence: f64,
    /// Frequency resolution of the underlying grid, 0 when not applicable
    #[serde(default)]
    pub resolution_hz: f64,
}

impl FrequencyEstimate {
    pub fn new(method: EstimationMethod, frequency_hz: f64, confidence: f64) -> Self {
        Self {
            method,
            frequency_hz,
            confidence: confidence.clamp(0.0, 100.0),
            resolution_hz: 0.0,
        }
    }

    pub fn with_resolution(mut self, resolution_hz: f64) -> Self {
        self.resolution_hz = resolution_hz.max(0.0);
        self
    }

    pub fn period_secs(&self) -> f64 {
        if self.frequency_hz > 0.0 {
            1.0 / self.frequency_hz
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    #[default]
    InsufficientData,
    Success,
}

/// Per-method view of what each estimator contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBreakdown {
    pub method: EstimationMethod,
    pub frequency_hz: f64,
    pub period_secs: f64,
    pub confidence: f64,
    /// Whether this estimate belongs to the winning cluster
    pub in_dominant_cluster: bool,
}

/// Outcome of one `tick` for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub source: String,
    pub status: DetectionStatus,
    pub dominant_frequency_hz: f64,
    pub period: f64,
    /// 0-100
    pub confidence: f64,
    /// Signature name or `unknown_<freq>`
    pub matched_name: String,
    pub spoof_flag: bool,
    pub per_method_breakdown: Vec<MethodBreakdown>,

    /// Every signature matched by any ranked cluster
    pub matches: Vec<String>,
    /// Relative error against the winning signature
    pub match_error: Option<f64>,
    pub drift_factor: Option<f64>,
    pub compensated_frequency_hz: Option<f64>,
    /// 0-100 agreement between observed noise and the signature profile
    pub profile_similarity: Option<f64>,
    pub spoof_reasons: Vec<String>,
    pub event_count: usize,
}

impl DetectionResult {
    pub fn insufficient(source: &str, event_count: usize) -> Self {
        Self {
            source: source.to_string(),
            status: DetectionStatus::InsufficientData,
            dominant_frequency_hz: 0.0,
            period: 0.0,
            confidence: 0.0,
            matched_name: String::new(),
            spoof_flag: false,
            per_method_breakdown: Vec::new(),
            matches: Vec::new(),
            match_error: None,
            drift_factor: None,
            compensated_frequency_hz: None,
            profile_similarity: None,
            spoof_reasons: Vec::new(),
            event_count,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DetectionStatus::Success
    }

    /// True when the match is a library signature rather than `unknown_*`
    pub fn is_known_match(&self) -> bool {
        self.is_success() && !self.matched_name.starts_with(UNKNOWN_PREFIX)
    }
}

pub const UNKNOWN_PREFIX: &str = "unknown_";

/// Label for a frequency that matched no signature.
pub fn unknown_label(frequency_hz: f64) -> String {
    format!("{}{:.6}", UNKNOWN_PREFIX, frequency_hz)
}
