//! stemeval - Oracle Source-Separation Baselines
//!
//! Builds and scores three estimates of the vocals, drums, bass and other
//! stems of a stereo mixture:
//! - `BL`: the mixture itself, for every source
//! - `BU`: the ideal ratio mask applied to the mixture STFT
//! - `BU_MWF`: the ratio-mask magnitudes refined by a multichannel Wiener filter
//!
//! # Architecture
//!
//! The spectral core (`dsp`) is a chain of pure functions over
//! `(channel, bin, frame)` tensors: STFT, masks, Wiener refinement.
//! `pipeline` runs them per track; `dataset`, `eval` and `cli` are the
//! glue that loads tracks, scores estimates and writes the summary.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod eval;
pub mod pipeline;

pub use config::{PipelineConfig, PsdUpdate, RefinerConfig, StftParams};
pub use error::{EvalError, Result};
