//! Frequency fingerprinting of timestamped event streams.
//!
//! Events are grouped by source label. For each source the engine
//! estimates the dominant emission frequency with several independent
//! methods, matches it against a library of known signatures, follows slow
//! frequency drift and vetoes detections whose statistics look synthetic.

pub mod algo;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod signal;
pub mod signature;
pub mod simulation;
pub mod spoof;
pub mod urgency;
pub mod window;

pub use config::{EngineConfig, WindowConfig};
pub use engine::{EngineStats, FingerprintEngine};
pub use error::{EngineError, Result};
pub use registry::{RegistryConfig, SourceRegistry};
pub use signal::{DetectionResult, DetectionStatus, EstimationMethod, FrequencyEstimate, MethodBreakdown};
pub use signature::{FingerprintSignature, SignatureLibrary, SignatureMatch};
pub use spoof::{AnomalyModel, FeatureVector, SpoofCheck, SpoofConfig, SpoofGuard, SpoofVerdict};
pub use urgency::{UrgencyConfig, UrgencyTracker};
pub use window::{Event, EventWindow};
