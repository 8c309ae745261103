//! Pipeline configuration (§6). No persisted state, no environment
//! variables, no wire protocol — values are supplied by the caller per
//! `stack()` invocation.
//!
//! The `Default` impl follows the style of the reference repo's
//! `config_manager::AppConfig`, minus the file-backed persistence that
//! module layers on top (out of scope here, see DESIGN.md).

use serde::{Deserialize, Serialize};

use crate::reduce::Reducer;

/// Which registration strategy (C4) to run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlignmentStrategy {
    Standard,
    Consensus,
    Planetary { quality_percent: u8 },
    Minimal,
}

impl AlignmentStrategy {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            AlignmentStrategy::Standard => "Standard",
            AlignmentStrategy::Consensus => "Consensus",
            AlignmentStrategy::Planetary { .. } => "Planetary",
            AlignmentStrategy::Minimal => "Minimal",
        }
    }
}

/// Tunable knobs shared across strategies and reducers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Initial per-channel threshold for the star detector (0-255).
    pub detect_threshold: u8,
    /// Minimum stars target for the adaptive detector.
    pub detect_min_stars: usize,
    /// Signature-ratio tolerance in the consensus matcher.
    pub consensus_tolerance: f64,
    /// Clipping multiple for the Sigma reducer.
    pub sigma_k: f32,
    /// Fraction of sharpest frames kept by the planetary strategy (1-100).
    pub planetary_quality: u8,
    /// FFT window size used by the planetary strategy (power of 2).
    pub planetary_fft_size: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            detect_threshold: crate::star::DEFAULT_THRESHOLD,
            detect_min_stars: 2,
            consensus_tolerance: 0.05,
            sigma_k: 2.0,
            planetary_quality: 80,
            planetary_fft_size: 256,
        }
    }
}

impl StackConfig {
    /// Validates the preconditions in §6 that are not already enforced by
    /// the type system (`quality_percent in [1,100]`, `k>0`).
    pub fn validate(&self) -> Result<(), crate::error::StackError> {
        if self.sigma_k <= 0.0 {
            return Err(crate::error::StackError::InvalidInput("sigma_k must be > 0".into()));
        }
        if !(1..=100).contains(&self.planetary_quality) {
            return Err(crate::error::StackError::InvalidInput(
                "planetary_quality must be in [1,100]".into(),
            ));
        }
        if self.planetary_fft_size == 0 || (self.planetary_fft_size & (self.planetary_fft_size - 1)) != 0 {
            return Err(crate::error::StackError::InvalidInput(
                "planetary_fft_size must be a power of 2".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn reducer_for(&self, kind: Reducer) -> Reducer {
        match kind {
            Reducer::Sigma { .. } => Reducer::Sigma { k: self.sigma_k },
            other => other,
        }
    }
}
