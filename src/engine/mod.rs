//! Audio Engine Module
//!
//! Waveform containers and WAV file I/O used around the spectral core.

pub mod buffer;
pub mod io;

pub use buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE, STEREO_CHANNELS};
pub use io::{export_audio, generate_stereo_test_tone, import_audio, ExportFormat};
