//! Spectral core
//!
//! Transform, oracle masking and multichannel Wiener refinement. Every
//! stage consumes and produces [`Tensor3`] values indexed by
//! (channel, bin, frame); per-source data travels in a [`StemMap`].

pub mod masks;
pub mod source;
pub mod stft;
pub mod tensor;
pub mod wiener;

pub use masks::{apply_mask, ideal_ratio_masks, MASK_EPSILON};
pub use source::{Source, StemMap};
pub use stft::{hann_window, SpectralTransform};
pub use tensor::{Magnitude, Mask, Spectrogram, Tensor3};
pub use wiener::{refine, Mat2, RefinementState, WienerRefiner};
