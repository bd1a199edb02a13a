//! Audio Buffer Management
//!
//! Non-interleaved `f32` buffers. Tracks are stereo at 44.1kHz by
//! convention, but the buffer itself keeps whatever rate it was built with.

use crate::error::{EvalError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sample rate of the MUSDB18 family of datasets
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Number of channels every track must carry
pub const STEREO_CHANNELS: usize = 2;

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Waveform container used at every stage boundary
///
/// # Example
/// ```
/// use stemeval::engine::buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
///
/// let buffer = AudioBuffer::new(DEFAULT_SAMPLE_RATE as usize, ChannelLayout::Stereo);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer at [`DEFAULT_SAMPLE_RATE`]
    pub fn new(num_samples: usize, layout: ChannelLayout) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// All channels must have the same length.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(EvalError::InvalidAudio {
                reason: "buffer needs at least one channel".to_string(),
                source: None,
            });
        }
        let len = samples[0].len();
        if let Some(bad) = samples.iter().find(|ch| ch.len() != len) {
            return Err(EvalError::InvalidAudio {
                reason: format!(
                    "channel lengths differ ({} vs {} samples)",
                    len,
                    bad.len()
                ),
                source: None,
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(EvalError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Copy of the first `num_samples` samples of every channel
    ///
    /// Buffers already shorter than `num_samples` are returned unchanged.
    pub fn truncated(&self, num_samples: usize) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .map(|ch| ch[..num_samples.min(ch.len())].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Copy limited to the first `seconds` of audio; `0` keeps everything
    pub fn cropped_to_secs(&self, seconds: f64) -> Self {
        if seconds <= 0.0 {
            return self.clone();
        }
        let num_samples = (self.sample_rate as f64 * seconds) as usize;
        self.truncated(num_samples)
    }

    /// Hard-clamp every sample to `[-1.0, 1.0]`
    pub fn clamp(&mut self) {
        for sample in self.samples.iter_mut().flat_map(|ch| ch.iter_mut()) {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    /// Fail with `ChannelMismatch` unless the buffer is stereo
    pub fn ensure_stereo(&self) -> Result<()> {
        if self.channels() != STEREO_CHANNELS {
            return Err(EvalError::ChannelMismatch {
                expected: STEREO_CHANNELS,
                actual: self.channels(),
            });
        }
        Ok(())
    }

    /// Sum of squared samples across all channels
    pub fn energy(&self) -> f64 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum()
    }

    /// Check if buffers are approximately equal within tolerance
    pub fn is_approx_equal(&self, other: &AudioBuffer, tolerance: f32) -> bool {
        if self.channels() != other.channels() || self.sample_rate != other.sample_rate {
            return false;
        }
        self.samples.iter().zip(other.samples.iter()).all(|(a, b)| {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = AudioBuffer::new(1000, ChannelLayout::Stereo);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(buffer.energy(), 0.0);
    }

    #[test]
    fn test_from_channels_rejects_ragged() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 44100);
        assert!(matches!(result, Err(EvalError::InvalidAudio { .. })));
    }

    #[test]
    fn test_from_interleaved() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buffer = AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, 44100).unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 3.0, 5.0]);
        assert_eq!(buffer.channel(1), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_crop_to_seconds() {
        let buffer = AudioBuffer::new(44100 * 3, ChannelLayout::Stereo);
        assert_eq!(buffer.cropped_to_secs(1.5).len(), 66150);
        assert_eq!(buffer.cropped_to_secs(0.0).len(), 44100 * 3);
        assert_eq!(buffer.cropped_to_secs(10.0).len(), 44100 * 3);
    }

    #[test]
    fn test_clamp() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.5, -2.0], vec![0.25, -0.5]], 44100).unwrap();
        buffer.clamp();
        assert_eq!(buffer.channel(0), &[1.0, -1.0]);
        assert_eq!(buffer.channel(1), &[0.25, -0.5]);
    }

    #[test]
    fn test_ensure_stereo() {
        assert!(AudioBuffer::new(10, ChannelLayout::Stereo).ensure_stereo().is_ok());
        let err = AudioBuffer::new(10, ChannelLayout::Mono).ensure_stereo().unwrap_err();
        assert!(matches!(err, EvalError::ChannelMismatch { expected: 2, actual: 1 }));
    }
}
