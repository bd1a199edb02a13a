//! Per-track separation pipeline
//!
//! Runs the stages for one track in order:
//!
//! ```text
//! crop -> STFT -> IRM -> mask + ISTFT (BU) -> [Wiener + ISTFT (BU_MWF)]
//! ```
//!
//! and adds the mixture-as-estimate baseline (BL). Each stage is a pure
//! function of the previous one's output, so a failure leaves nothing
//! behind and only affects the current track.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dataset::Track;
use crate::dsp::{apply_mask, ideal_ratio_masks, Magnitude, SpectralTransform, StemMap, WienerRefiner};
use crate::engine::AudioBuffer;
use crate::error::Result;

// ============================================================================
// Variants
// ============================================================================

/// Estimation strategy; the serialized names are the report keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    /// The unmodified mixture used as every source's estimate
    #[serde(rename = "BL")]
    MixtureBaseline,
    /// Ideal ratio mask applied to the mixture
    #[serde(rename = "BU")]
    RatioMask,
    /// Ratio mask refined by the multichannel Wiener filter
    #[serde(rename = "BU_MWF")]
    RatioMaskWiener,
}

impl Variant {
    pub const ALL: [Variant; 3] = [
        Variant::MixtureBaseline,
        Variant::RatioMask,
        Variant::RatioMaskWiener,
    ];

    /// Short key used in reports and file names
    pub fn key(&self) -> &'static str {
        match self {
            Variant::MixtureBaseline => "BL",
            Variant::RatioMask => "BU",
            Variant::RatioMaskWiener => "BU_MWF",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Timings
// ============================================================================

/// Wall-clock time spent per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub io: Duration,
    pub stft: Duration,
    pub irm: Duration,
    pub istft: Duration,
    pub mwf: Duration,
    pub eval: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.io + self.stft + self.irm + self.istft + self.mwf + self.eval
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "I/O={:.3}s  STFT={:.3}s  IRM={:.3}s  ISTFT={:.3}s  MWF={:.3}s  EVAL={:.3}s",
            self.io.as_secs_f64(),
            self.stft.as_secs_f64(),
            self.irm.as_secs_f64(),
            self.istft.as_secs_f64(),
            self.mwf.as_secs_f64(),
            self.eval.as_secs_f64()
        )
    }
}

// ============================================================================
// Output
// ============================================================================

/// Everything one track produces before scoring
#[derive(Debug, Clone)]
pub struct TrackEstimates {
    pub name: String,
    pub sample_rate: u32,
    /// References after cropping, aligned with the estimates
    pub references: StemMap<AudioBuffer>,
    pub estimates: BTreeMap<Variant, StemMap<AudioBuffer>>,
    pub timings: StageTimings,
}

impl TrackEstimates {
    pub fn variant(&self, variant: Variant) -> Option<&StemMap<AudioBuffer>> {
        self.estimates.get(&variant)
    }

    /// Produced variants in report order
    pub fn variants(&self) -> impl Iterator<Item = (Variant, &StemMap<AudioBuffer>)> {
        self.estimates.iter().map(|(variant, stems)| (*variant, stems))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug)]
pub struct SeparationPipeline {
    config: PipelineConfig,
    transform: SpectralTransform,
    refiner: WienerRefiner,
}

impl SeparationPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transform: SpectralTransform::new(config.stft)?,
            refiner: WienerRefiner::new(config.refiner),
            config,
        })
    }

    /// Build every configured estimate for `track`
    pub fn process_track(&self, track: &Track) -> Result<TrackEstimates> {
        let mut timings = StageTimings::default();
        let sample_rate = track.sample_rate();

        let started = Instant::now();
        let track = track.cropped(self.config.max_seconds);
        timings.io = started.elapsed();
        debug!(
            "[{}] {:.2}s at {} Hz after crop",
            track.name,
            track.duration_secs(),
            sample_rate
        );

        let started = Instant::now();
        let mixture = self.transform.forward(&track.mixture);
        timings.stft = started.elapsed();

        // Reference transforms count towards the mask stage
        let started = Instant::now();
        let reference_magnitudes: StemMap<Magnitude> = track
            .references
            .par_map(|_, reference| self.transform.forward(reference).magnitude());
        let masks = ideal_ratio_masks(&reference_magnitudes)?;
        timings.irm = started.elapsed();

        let mut estimates = BTreeMap::new();

        let started = Instant::now();
        let masked = masks.try_map(|_, mask| apply_mask(&mixture, mask))?;
        let ratio_mask = masked
            .par_map(|_, spectrogram| self.transform.inverse(spectrogram, sample_rate))
            .transpose()?;
        estimates.insert(Variant::RatioMask, ratio_mask);
        timings.istft = started.elapsed();

        if self.config.refine {
            let started = Instant::now();
            let mixture_magnitude = mixture.magnitude();
            let initial = masks.try_map(|source, mask| {
                mask.zip_map(&mixture_magnitude, &format!("{} initial magnitude", source), |&m, &x| {
                    m * x
                })
            })?;
            let refined = self.refiner.refine(&mixture, &initial)?;
            let wiener = refined
                .par_map(|_, spectrogram| self.transform.inverse(spectrogram, sample_rate))
                .transpose()?;
            estimates.insert(Variant::RatioMaskWiener, wiener);
            timings.mwf = started.elapsed();
        }

        estimates.insert(Variant::MixtureBaseline, StemMap::splat(track.mixture.clone()));

        info!(
            "[{}] built {} variant(s) from {} frames",
            track.name,
            estimates.len(),
            mixture.num_frames()
        );

        Ok(TrackEstimates {
            name: track.name,
            sample_rate,
            references: track.references,
            estimates,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StftParams;
    use crate::dsp::Source;

    fn tone(len: usize, freq: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 8000.0).sin())
            .collect()
    }

    fn stereo(samples: Vec<f32>) -> AudioBuffer {
        AudioBuffer::from_channels(vec![samples.clone(), samples], 8000).unwrap()
    }

    fn small_config(refine: bool) -> PipelineConfig {
        PipelineConfig {
            stft: StftParams { n_fft: 256, hop: 128 },
            refine,
            max_seconds: 0.0,
            ..PipelineConfig::default()
        }
    }

    fn two_tone_track(len: usize) -> Track {
        let vocals = tone(len, 440.0, 0.3);
        let bass = tone(len, 110.0, 0.3);
        let mixture: Vec<f32> = vocals.iter().zip(&bass).map(|(a, b)| a + b).collect();
        let mut references = StemMap::splat(stereo(vec![0.0; len]));
        references.vocals = stereo(vocals);
        references.bass = stereo(bass);
        Track::new("two_tones", stereo(mixture), references).unwrap()
    }

    #[test]
    fn test_variant_keys() {
        assert_eq!(serde_json::to_string(&Variant::RatioMaskWiener).unwrap(), "\"BU_MWF\"");
        let keys: Vec<&str> = Variant::ALL.iter().map(|v| v.key()).collect();
        assert_eq!(keys, vec!["BL", "BU", "BU_MWF"]);
    }

    #[test]
    fn test_produces_baseline_and_mask_variants() {
        let pipeline = SeparationPipeline::new(small_config(false)).unwrap();
        let track = two_tone_track(128 * 40);
        let estimates = pipeline.process_track(&track).unwrap();

        assert_eq!(estimates.estimates.len(), 2);
        assert!(estimates.variant(Variant::RatioMaskWiener).is_none());

        let baseline = estimates.variant(Variant::MixtureBaseline).unwrap();
        assert_eq!(baseline.drums, track.mixture);

        let masked = estimates.variant(Variant::RatioMask).unwrap();
        for (_, estimate) in masked.iter() {
            assert_eq!(estimate.channels(), 2);
            assert_eq!(estimate.len(), 128 * 40);
        }
    }

    #[test]
    fn test_refinement_adds_variant() {
        let pipeline = SeparationPipeline::new(small_config(true)).unwrap();
        let estimates = pipeline.process_track(&two_tone_track(128 * 20)).unwrap();

        let wiener = estimates.variant(Variant::RatioMaskWiener).unwrap();
        for (_, estimate) in wiener.iter() {
            assert!(estimate.samples.iter().flatten().all(|s| s.is_finite()));
        }
        assert!(wiener[Source::Drums].energy() < 1e-3 * wiener[Source::Vocals].energy());
    }

    #[test]
    fn test_crop_applies_to_references() {
        let mut config = small_config(false);
        config.max_seconds = 0.5;
        let pipeline = SeparationPipeline::new(config).unwrap();
        let estimates = pipeline.process_track(&two_tone_track(8000)).unwrap();

        assert!(estimates.references.iter().all(|(_, r)| r.len() == 4000));
        assert_eq!(estimates.variant(Variant::MixtureBaseline).unwrap().vocals.len(), 4000);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_config(false);
        config.stft.hop = 0;
        assert!(SeparationPipeline::new(config).is_err());
    }

    #[test]
    fn test_timings_display() {
        let timings = StageTimings {
            stft: Duration::from_millis(1500),
            ..StageTimings::default()
        };
        let line = timings.to_string();
        assert!(line.starts_with("I/O=0.000s  STFT=1.500s"));
        assert!(line.ends_with("EVAL=0.000s"));
        assert_eq!(timings.total(), Duration::from_millis(1500));
    }
}
