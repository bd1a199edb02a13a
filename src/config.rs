//! Pipeline configuration
//!
//! Defaults reproduce the reference baselines: 1024-point Hann STFT with
//! hop 512, refinement off, one Wiener iteration, 10 second crop. A JSON
//! file can override any subset of fields; CLI flags override the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Default FFT size
pub const DEFAULT_N_FFT: usize = 1024;

/// Default hop between frames (50% overlap)
pub const DEFAULT_HOP: usize = 512;

/// Default crop applied to every track, in seconds
pub const DEFAULT_MAX_SECONDS: f64 = 10.0;

/// STFT framing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StftParams {
    pub n_fft: usize,
    pub hop: usize,
}

impl Default for StftParams {
    fn default() -> Self {
        Self {
            n_fft: DEFAULT_N_FFT,
            hop: DEFAULT_HOP,
        }
    }
}

impl StftParams {
    /// Number of non-negative frequency bins
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Check that the Hann window / hop pair reconstructs perfectly
    pub fn validate(&self) -> Result<()> {
        if self.n_fft < 2 || self.n_fft % 2 != 0 {
            return Err(EvalError::InvalidConfig {
                reason: format!("n_fft must be even and at least 2, got {}", self.n_fft),
            });
        }
        if self.hop == 0 || self.hop > self.n_fft / 2 {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "hop must be in 1..={} for n_fft {}, got {}",
                    self.n_fft / 2,
                    self.n_fft,
                    self.hop
                ),
            });
        }
        Ok(())
    }
}

/// How source PSDs evolve across Wiener iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsdUpdate {
    /// Refit PSDs from the current complex estimates every pass (EM)
    #[default]
    Reestimate,
    /// Keep the PSDs derived from the initial magnitudes; only the
    /// spatial covariances are refit
    Frozen,
}

/// Multichannel Wiener refinement parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Number of EM passes; 0 runs a single pass
    ///
    /// Unsigned, so a negative count is rejected when the config is parsed.
    pub iterations: usize,
    pub psd_update: PsdUpdate,
    /// Stabilizing constant for PSD ratios and covariance regularization
    pub eps: f64,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            psd_update: PsdUpdate::Reestimate,
            eps: f32::EPSILON as f64,
        }
    }
}

impl RefinerConfig {
    pub fn with_iterations(iterations: usize) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    /// Iteration count actually run
    pub fn effective_iterations(&self) -> usize {
        self.iterations.max(1)
    }
}

/// Everything the separation pipeline needs for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stft: StftParams,
    /// Run the Wiener refinement stage (`BU_MWF`)
    pub refine: bool,
    pub refiner: RefinerConfig,
    /// Crop tracks to the first N seconds before the transform; 0 = full
    pub max_seconds: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stft: StftParams::default(),
            refine: false,
            refiner: RefinerConfig::default(),
            max_seconds: DEFAULT_MAX_SECONDS,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EvalError::FileNotFound {
            path: path.display().to_string(),
            source: Some(e),
        })?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.stft.validate()?;
        if !self.max_seconds.is_finite() || self.max_seconds < 0.0 {
            return Err(EvalError::InvalidConfig {
                reason: format!("max_seconds must be >= 0, got {}", self.max_seconds),
            });
        }
        if self.refiner.eps.is_nan() || self.refiner.eps <= 0.0 {
            return Err(EvalError::InvalidConfig {
                reason: format!("refiner eps must be positive, got {}", self.refiner.eps),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.stft.n_fft, 1024);
        assert_eq!(config.stft.hop, 512);
        assert_eq!(config.stft.num_bins(), 513);
        assert_eq!(config.refiner.iterations, 1);
        assert!(!config.refine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_stft_params() {
        assert!(StftParams { n_fft: 1023, hop: 256 }.validate().is_err());
        assert!(StftParams { n_fft: 1024, hop: 0 }.validate().is_err());
        assert!(StftParams { n_fft: 1024, hop: 768 }.validate().is_err());
        assert!(StftParams { n_fft: 1024, hop: 256 }.validate().is_ok());
    }

    #[test]
    fn test_iteration_floor() {
        assert_eq!(RefinerConfig::with_iterations(0).effective_iterations(), 1);
        assert_eq!(RefinerConfig::with_iterations(3).effective_iterations(), 3);
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"refine": true, "refiner": {{"iterations": 2, "psd_update": "frozen"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert!(config.refine);
        assert_eq!(config.refiner.iterations, 2);
        assert_eq!(config.refiner.psd_update, PsdUpdate::Frozen);
        assert_eq!(config.stft, StftParams::default());
        assert_eq!(config.max_seconds, DEFAULT_MAX_SECONDS);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_seconds": -1.0}}"#).unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_negative_iterations() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"refiner": {{"iterations": -1}}}}"#).unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }
}
