//! Windowed signal-to-distortion scoring
//!
//! SDR per window is `10·log10(Σ s² / Σ (s - ŝ)²)` summed over both
//! channels. Windows whose reference is silent carry no information and
//! are skipped; the reported value is the median over the rest.

use serde::{Deserialize, Serialize};

use crate::dsp::StemMap;
use crate::engine::AudioBuffer;
use crate::error::{EvalError, Result};

/// Ceiling for windows where the estimate matches the reference exactly
pub const MAX_SDR_DB: f64 = 120.0;

/// Scores for one source of one variant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceMetrics {
    /// Median SDR over valid windows; `None` when no window was valid
    #[serde(rename = "SDR_med")]
    pub sdr_median: Option<f64>,
}

/// Compares estimates against references
pub trait Scorer: Send + Sync {
    /// Score all four sources; waveforms are truncated to their common length
    fn score(
        &self,
        references: &StemMap<AudioBuffer>,
        estimates: &StemMap<AudioBuffer>,
    ) -> Result<StemMap<SourceMetrics>>;
}

/// Median of per-window SDRs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowedSdrScorer {
    window_secs: f64,
    hop_secs: f64,
}

impl Default for WindowedSdrScorer {
    fn default() -> Self {
        Self {
            window_secs: 1.0,
            hop_secs: 1.0,
        }
    }
}

impl WindowedSdrScorer {
    pub fn new(window_secs: f64, hop_secs: f64) -> Result<Self> {
        if !(window_secs.is_finite() && window_secs > 0.0 && hop_secs.is_finite() && hop_secs > 0.0) {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "scoring window and hop must be positive, got {}s / {}s",
                    window_secs, hop_secs
                ),
            });
        }
        Ok(Self {
            window_secs,
            hop_secs,
        })
    }

    /// SDR of every window with a non-silent reference
    fn window_sdrs(&self, reference: &AudioBuffer, estimate: &AudioBuffer, len: usize) -> Vec<f64> {
        let rate = reference.sample_rate as f64;
        let window = ((self.window_secs * rate).round() as usize).max(1);
        let hop = ((self.hop_secs * rate).round() as usize).max(1);

        let mut sdrs = Vec::new();
        let mut start = 0;
        while start + window <= len {
            let mut signal = 0.0_f64;
            let mut error = 0.0_f64;
            for (r, e) in reference.samples.iter().zip(&estimate.samples) {
                for (&s, &s_hat) in r[start..start + window].iter().zip(&e[start..start + window]) {
                    signal += (s as f64).powi(2);
                    error += (s as f64 - s_hat as f64).powi(2);
                }
            }
            if signal > 0.0 {
                sdrs.push((10.0 * (signal / error).log10()).min(MAX_SDR_DB));
            }
            start += hop;
        }
        sdrs
    }
}

/// Median with the mean of the two middle values for even counts
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

impl Scorer for WindowedSdrScorer {
    fn score(
        &self,
        references: &StemMap<AudioBuffer>,
        estimates: &StemMap<AudioBuffer>,
    ) -> Result<StemMap<SourceMetrics>> {
        let sample_rate = references.vocals.sample_rate;
        let channels = references.vocals.channels();
        for (_, buffer) in references.iter().chain(estimates.iter()) {
            if buffer.sample_rate != sample_rate {
                return Err(EvalError::SampleRateMismatch {
                    expected: sample_rate,
                    actual: buffer.sample_rate,
                });
            }
            if buffer.channels() != channels {
                return Err(EvalError::ChannelMismatch {
                    expected: channels,
                    actual: buffer.channels(),
                });
            }
        }

        let len = references
            .iter()
            .chain(estimates.iter())
            .map(|(_, buffer)| buffer.len())
            .min()
            .unwrap_or(0);

        Ok(references.map(|source, reference| {
            let mut sdrs = self.window_sdrs(reference, &estimates[source], len);
            SourceMetrics {
                sdr_median: median(&mut sdrs),
            }
        }))
    }
}
