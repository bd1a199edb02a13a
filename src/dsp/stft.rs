//! Short-time Fourier transform for stereo waveforms
//!
//! Centered framing: each channel is zero-padded by `n_fft / 2` on both
//! sides, so frame `t` is centered on sample `t * hop`. The forward
//! transform is unnormalized; the inverse divides by the summed squared
//! synthesis window, which makes `inverse(forward(x))` exact for any
//! `hop <= n_fft / 2` with the periodic Hann window.
//!
//! Frame count for `L` input samples is `0` when `L == 0`, otherwise
//! `1 + L / hop`. The inverse returns `hop * (frames - 1)` samples.

use std::sync::Arc;

use log::debug;
use rayon::prelude::*;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::config::StftParams;
use crate::dsp::tensor::{Spectrogram, Tensor3};
use crate::engine::AudioBuffer;
use crate::error::{EvalError, Result};

/// Periodic Hann window of length `size`
pub fn hann_window(size: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Forward/inverse STFT with planned FFTs and a cached window
pub struct SpectralTransform {
    params: StftParams,
    window: Vec<f32>,
    forward_fft: Arc<dyn Fft<f32>>,
    inverse_fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Default for SpectralTransform {
    fn default() -> Self {
        Self::build(StftParams::default())
    }
}

impl SpectralTransform {
    /// Plan a transform for `params`
    pub fn new(params: StftParams) -> Result<Self> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: StftParams) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            window: hann_window(params.n_fft),
            forward_fft: planner.plan_fft_forward(params.n_fft),
            inverse_fft: planner.plan_fft_inverse(params.n_fft),
            params,
        }
    }

    /// Number of frames `forward` produces for `num_samples` samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples == 0 {
            0
        } else {
            1 + num_samples / self.params.hop
        }
    }

    /// Number of samples `inverse` produces for `num_frames` frames
    pub fn output_len(&self, num_frames: usize) -> usize {
        num_frames.saturating_sub(1) * self.params.hop
    }

    /// Transform every channel of `waveform` into a `(channel, bin, frame)` spectrogram
    pub fn forward(&self, waveform: &AudioBuffer) -> Spectrogram {
        let num_frames = self.num_frames(waveform.len());
        let shape = [waveform.channels(), self.params.num_bins(), num_frames];

        let mut spectrogram: Spectrogram = Tensor3::zeros(shape);
        let plane = shape[1] * num_frames;
        if plane > 0 {
            spectrogram
                .as_mut_slice()
                .par_chunks_mut(plane)
                .zip(waveform.samples.par_iter())
                .for_each(|(dst, samples)| self.forward_channel(samples, num_frames, dst));
        }

        debug!(
            "STFT: {} samples x {} ch -> {} bins x {} frames",
            waveform.len(),
            waveform.channels(),
            shape[1],
            num_frames
        );

        spectrogram
    }

    /// Reconstruct a waveform from `spectrogram`
    ///
    /// Channels are zero-padded to the longest one and clamped to `[-1, 1]`.
    pub fn inverse(&self, spectrogram: &Spectrogram, sample_rate: u32) -> Result<AudioBuffer> {
        let expected_bins = self.params.num_bins();
        if spectrogram.num_bins() != expected_bins {
            return Err(EvalError::shape_mismatch(
                "inverse STFT",
                [spectrogram.num_channels(), expected_bins, spectrogram.num_frames()],
                spectrogram.shape(),
            ));
        }

        let num_frames = spectrogram.num_frames();
        let mut channels: Vec<Vec<f32>> = (0..spectrogram.num_channels())
            .into_par_iter()
            .map(|ch| self.inverse_channel(spectrogram.channel_slice(ch), num_frames))
            .collect();

        let max_len = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.resize(max_len, 0.0);
        }

        let mut buffer = AudioBuffer::from_channels(channels, sample_rate)?;
        buffer.clamp();
        Ok(buffer)
    }

    /// Windowed FFT of one channel into `out`, laid out bin-major (`bins * frames`)
    fn forward_channel(&self, samples: &[f32], num_frames: usize, out: &mut [Complex32]) {
        let n_fft = self.params.n_fft;
        let hop = self.params.hop;
        let pad = n_fft / 2;
        let num_bins = self.params.num_bins();

        let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.forward_fft.get_inplace_scratch_len()];

        for t in 0..num_frames {
            let start = t * hop;
            for (i, (slot, &w)) in frame.iter_mut().zip(self.window.iter()).enumerate() {
                // Position in the unpadded signal; outside it the padding is zero.
                let sample = (start + i)
                    .checked_sub(pad)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *slot = Complex32::new(sample * w, 0.0);
            }

            self.forward_fft.process_with_scratch(&mut frame, &mut scratch);

            for (bin, value) in frame.iter().take(num_bins).enumerate() {
                out[bin * num_frames + t] = *value;
            }
        }
    }

    /// Overlap-add inverse of one bin-major channel
    fn inverse_channel(&self, bins: &[Complex32], num_frames: usize) -> Vec<f32> {
        if num_frames == 0 {
            return Vec::new();
        }

        let n_fft = self.params.n_fft;
        let hop = self.params.hop;
        let pad = n_fft / 2;
        let num_bins = self.params.num_bins();
        let total = n_fft + hop * (num_frames - 1);
        let scale = 1.0 / n_fft as f32;

        let mut output = vec![0.0_f32; total];
        let mut window_sum = vec![0.0_f32; total];
        let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.inverse_fft.get_inplace_scratch_len()];

        for t in 0..num_frames {
            for bin in 0..num_bins {
                frame[bin] = bins[bin * num_frames + t];
            }
            // A real signal has purely real DC and Nyquist bins.
            frame[0].im = 0.0;
            frame[n_fft / 2].im = 0.0;
            for bin in 1..n_fft / 2 {
                frame[n_fft - bin] = frame[bin].conj();
            }

            self.inverse_fft.process_with_scratch(&mut frame, &mut scratch);

            let start = t * hop;
            for (i, &w) in self.window.iter().enumerate() {
                output[start + i] += frame[i].re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &ws) in output.iter_mut().zip(window_sum.iter()) {
            if ws > f32::MIN_POSITIVE {
                *sample /= ws;
            }
        }

        output.truncate(total - pad);
        output.drain(..pad);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{generate_stereo_test_tone, ChannelLayout};

    fn noise_like(len: usize, seed: u32) -> Vec<f32> {
        // Deterministic LCG; keeps amplitudes inside (-0.5, 0.5)
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_hann_window_is_periodic() {
        let window = hann_window(4);
        assert_eq!(window.len(), 4);
        assert!(window[0].abs() < 1e-7);
        assert!((window[2] - 1.0).abs() < 1e-6);
        assert!((window[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_frame_count() {
        let stft = SpectralTransform::default();
        assert_eq!(stft.num_frames(0), 0);
        assert_eq!(stft.num_frames(1), 1);
        assert_eq!(stft.num_frames(512), 2);
        assert_eq!(stft.num_frames(44100), 87);
        assert_eq!(stft.output_len(87), 44032);
    }

    #[test]
    fn test_round_trip_noise() {
        let stft = SpectralTransform::default();
        let len = 512 * 40;
        let buffer =
            AudioBuffer::from_channels(vec![noise_like(len, 1), noise_like(len, 2)], 44100).unwrap();

        let spec = stft.forward(&buffer);
        assert_eq!(spec.shape(), [2, 513, 41]);

        let restored = stft.inverse(&spec, 44100).unwrap();
        assert_eq!(restored.len(), len);
        for ch in 0..2 {
            for (a, b) in buffer.channel(ch).iter().zip(restored.channel(ch)) {
                assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_round_trip_truncates_to_hop_multiple() {
        let stft = SpectralTransform::default();
        let buffer = generate_stereo_test_tone(440.0, 1000.0, 0.1, 44100);
        let restored = stft.inverse(&stft.forward(&buffer), 44100).unwrap();

        assert_eq!(restored.len(), 4410 / 512 * 512);
        for ch in 0..2 {
            for (a, b) in buffer.channel(ch).iter().zip(restored.channel(ch)) {
                assert!((a - b).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_empty_input_yields_zero_frames() {
        let stft = SpectralTransform::default();
        let empty = AudioBuffer::new(0, ChannelLayout::Stereo);
        let spec = stft.forward(&empty);
        assert_eq!(spec.shape(), [2, 513, 0]);

        let restored = stft.inverse(&spec, 44100).unwrap();
        assert_eq!(restored.channels(), 2);
        assert!(restored.is_empty());
    }

    #[test]
    fn test_sub_frame_input_is_degenerate_not_error() {
        let stft = SpectralTransform::default();
        let short = AudioBuffer::from_channels(vec![vec![0.25; 100], vec![-0.25; 100]], 44100).unwrap();
        let spec = stft.forward(&short);
        assert_eq!(spec.num_frames(), 1);
        assert!(spec.is_finite());

        let restored = stft.inverse(&spec, 44100).unwrap();
        assert_eq!(restored.len(), 0);
    }

    #[test]
    fn test_silence_stays_silent() {
        let stft = SpectralTransform::default();
        let silent = AudioBuffer::new(4096, ChannelLayout::Stereo);
        let spec = stft.forward(&silent);
        assert!(spec.as_slice().iter().all(|c| c.norm() == 0.0));
        let restored = stft.inverse(&spec, 44100).unwrap();
        assert!(restored.samples.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sine_energy_lands_in_expected_bin() {
        let stft = SpectralTransform::default();
        // Bin 20 of a 1024-point FFT at 44.1 kHz
        let freq = 20.0 * 44100.0 / 1024.0;
        let buffer = generate_stereo_test_tone(freq, freq, 0.5, 44100);
        let mag = stft.forward(&buffer).magnitude();

        let frame = mag.num_frames() / 2;
        let peak_bin = (0..mag.num_bins())
            .max_by(|&a, &b| mag[(0, a, frame)].total_cmp(&mag[(0, b, frame)]))
            .unwrap();
        assert_eq!(peak_bin, 20);
    }

    #[test]
    fn test_inverse_clamps_output() {
        let stft = SpectralTransform::default();
        let loud = AudioBuffer::from_channels(vec![vec![0.9; 2048], vec![-0.9; 2048]], 44100).unwrap();
        let mut spec = stft.forward(&loud);
        for value in spec.as_mut_slice() {
            *value *= 4.0;
        }
        let restored = stft.inverse(&spec, 44100).unwrap();
        assert!(restored.samples.iter().flatten().all(|s| s.abs() <= 1.0));
        assert_eq!(restored.channel(0)[1000], 1.0);
        assert_eq!(restored.channel(1)[1000], -1.0);
    }

    #[test]
    fn test_inverse_rejects_wrong_bin_count() {
        let stft = SpectralTransform::default();
        let spec: Spectrogram = Tensor3::zeros([2, 257, 4]);
        assert!(stft.inverse(&spec, 44100).is_err());
    }
}
