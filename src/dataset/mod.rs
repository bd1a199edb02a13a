//! Track provider
//!
//! Reads MUSDB18-HQ style directories:
//!
//! ```text
//! <root>/<subset>/<track name>/mixture.wav
//!                              vocals.wav
//!                              drums.wav
//!                              bass.wav
//!                              other.wav
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::dsp::{Source, StemMap};
use crate::engine::{import_audio, AudioBuffer};
use crate::error::{EvalError, Result};

/// File stem of the mixture inside a track directory
pub const MIXTURE_FILE: &str = "mixture.wav";

// ============================================================================
// Subset
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Subset {
    Train,
    #[default]
    Test,
}

impl Subset {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Subset::Train => "train",
            Subset::Test => "test",
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Subset {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Subset::Train),
            "test" => Ok(Subset::Test),
            other => Err(EvalError::DatasetError {
                reason: format!("unknown subset '{}', expected train or test", other),
            }),
        }
    }
}

// ============================================================================
// Track
// ============================================================================

/// A stereo mixture with its four reference stems
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub mixture: AudioBuffer,
    pub references: StemMap<AudioBuffer>,
}

impl Track {
    /// Build a track, checking that every waveform is stereo at one rate
    ///
    /// Mixture and references are truncated to their shortest length.
    pub fn new(name: impl Into<String>, mixture: AudioBuffer, references: StemMap<AudioBuffer>) -> Result<Self> {
        mixture.ensure_stereo()?;
        for (_, reference) in references.iter() {
            reference.ensure_stereo()?;
            if reference.sample_rate != mixture.sample_rate {
                return Err(EvalError::SampleRateMismatch {
                    expected: mixture.sample_rate,
                    actual: reference.sample_rate,
                });
            }
        }

        let name = name.into();
        let common = references
            .iter()
            .map(|(_, r)| r.len())
            .fold(mixture.len(), usize::min);
        if references.iter().any(|(_, r)| r.len() != common) || mixture.len() != common {
            warn!(
                "[{}] mixture ({} samples) and reference lengths differ; truncating to {} samples",
                name,
                mixture.len(),
                common
            );
            return Ok(Self {
                name,
                mixture: mixture.truncated(common),
                references: references.map(|_, r| r.truncated(common)),
            });
        }

        Ok(Self {
            name,
            mixture,
            references,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixture.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.mixture.duration_secs()
    }

    /// Copy limited to the first `max_seconds`; `0` keeps the full track
    pub fn cropped(&self, max_seconds: f64) -> Track {
        Track {
            name: self.name.clone(),
            mixture: self.mixture.cropped_to_secs(max_seconds),
            references: self.references.map(|_, r| r.cropped_to_secs(max_seconds)),
        }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Source of tracks for the batch runner
pub trait TrackProvider {
    /// Track names, in processing order
    fn track_names(&self) -> Result<Vec<String>>;

    /// Load one track by name
    fn load(&self, name: &str) -> Result<Track>;
}

/// MUSDB18-HQ directory on disk
#[derive(Debug, Clone)]
pub struct MusdbDirectory {
    root: PathBuf,
    subset: Subset,
}

impl MusdbDirectory {
    /// Open `<root>/<subset>`; fails if the directory does not exist
    pub fn open(root: impl AsRef<Path>, subset: Subset) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let dataset = Self { root, subset };
        if !dataset.subset_dir().is_dir() {
            return Err(EvalError::FileNotFound {
                path: dataset.subset_dir().display().to_string(),
                source: None,
            });
        }
        Ok(dataset)
    }

    pub fn subset_dir(&self) -> PathBuf {
        self.root.join(self.subset.dir_name())
    }

    fn load_stem(dir: &Path, file_name: &str) -> Result<AudioBuffer> {
        let path = dir.join(file_name);
        debug!("Loading {}", path.display());
        import_audio(&path)
    }
}

impl TrackProvider for MusdbDirectory {
    fn track_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(self.subset_dir()).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| EvalError::DatasetError {
                reason: format!("cannot list {}: {}", self.subset_dir().display(), e),
            })?;
            if entry.file_type().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<Track> {
        let dir = self.subset_dir().join(name);
        if !dir.is_dir() {
            return Err(EvalError::DatasetError {
                reason: format!("no track named '{}' in {}", name, self.subset_dir().display()),
            });
        }

        let mixture = Self::load_stem(&dir, MIXTURE_FILE)?;
        let references = StemMap::try_from_fn(|source: Source| {
            let file_name = format!("{}.wav", source);
            if !dir.join(&file_name).is_file() {
                return Err(EvalError::MissingSource { stem: source });
            }
            Self::load_stem(&dir, &file_name)
        })?;

        Track::new(name, mixture, references)
    }
}
