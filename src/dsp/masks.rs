//! Ideal ratio masks
//!
//! `mask_s = |S_s| / (Σ_k |S_k| + ε)` per time-frequency bin, computed
//! from ground-truth reference magnitudes. Applying a mask scales the
//! mixture spectrogram and keeps its phase.

use crate::dsp::source::{Source, StemMap};
use crate::dsp::tensor::{Magnitude, Mask, Spectrogram, Tensor3};
use crate::error::Result;

/// Added to the per-bin magnitude sum before dividing
pub const MASK_EPSILON: f32 = 1e-8;

/// Compute one ideal ratio mask per source
///
/// All four magnitude tensors must have the same shape.
pub fn ideal_ratio_masks(reference_magnitudes: &StemMap<Magnitude>) -> Result<StemMap<Mask>> {
    let shape = reference_magnitudes.vocals.shape();
    for (source, magnitude) in reference_magnitudes.iter() {
        magnitude.ensure_same_shape(shape, &format!("{} reference magnitude", source))?;
    }

    let mut total: Tensor3<f32> = Tensor3::zeros(shape);
    for (_, magnitude) in reference_magnitudes.iter() {
        for (acc, &m) in total.as_mut_slice().iter_mut().zip(magnitude.as_slice()) {
            *acc += m;
        }
    }
    for acc in total.as_mut_slice() {
        *acc += MASK_EPSILON;
    }

    reference_magnitudes.try_map(|source: Source, magnitude| {
        magnitude.zip_map(&total, &format!("{} mask", source), |&m, &sum| m / sum)
    })
}

/// Scale the mixture by a real-valued mask, keeping the mixture phase
pub fn apply_mask(mixture: &Spectrogram, mask: &Mask) -> Result<Spectrogram> {
    mixture.zip_map(mask, "mask application", |&x, &m| x * m)
}
