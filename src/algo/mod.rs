pub mod autocorrelation;
pub mod drift;
pub mod ensemble;
pub mod fft;
pub mod interval;
pub mod isolation;
pub mod lomb_scargle;
pub mod spectral;
pub mod stats;
pub mod wavelet;

// Re-exports for convenience
pub use drift::{DriftAdjustment, DriftState, DriftTracker};
pub use ensemble::{EnsembleCombiner, EnsembleConfig, FrequencyCluster, MethodWeights};
pub use fft::FftContext;
pub use interval::{IntervalEstimator, IntervalStats};
pub use isolation::IsolationForest;
pub use spectral::{SpectralConfig, SpectralEstimator};
