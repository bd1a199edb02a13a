//! The fixed source set and the per-source record
//!
//! Every per-source collection in the pipeline is a [`StemMap`], which has
//! one named field per [`Source`]. Partial coverage cannot be represented;
//! the only place a source can go missing is the conversion from a loose
//! `HashMap`, which reports `MissingSource`.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use rayon::join;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// One of the four target stems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Source {
    /// All sources in canonical order
    pub const ALL: [Source; 4] = [Source::Vocals, Source::Drums, Source::Bass, Source::Other];

    /// Lowercase stem name, as used for file names and report keys
    pub fn name(&self) -> &'static str {
        match self {
            Source::Vocals => "vocals",
            Source::Drums => "drums",
            Source::Bass => "bass",
            Source::Other => "other",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        Source::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EvalError::DatasetError {
                reason: format!("unknown source '{}'", s),
            })
    }
}

/// One value per source
///
/// Serializes as an object keyed by lowercase source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemMap<T> {
    pub vocals: T,
    pub drums: T,
    pub bass: T,
    pub other: T,
}

impl<T> StemMap<T> {
    /// Build by calling `f` once per source, in canonical order
    pub fn from_fn<F: FnMut(Source) -> T>(mut f: F) -> Self {
        Self {
            vocals: f(Source::Vocals),
            drums: f(Source::Drums),
            bass: f(Source::Bass),
            other: f(Source::Other),
        }
    }

    /// Fallible [`StemMap::from_fn`]; stops at the first error
    pub fn try_from_fn<E, F: FnMut(Source) -> std::result::Result<T, E>>(
        mut f: F,
    ) -> std::result::Result<Self, E> {
        Ok(Self {
            vocals: f(Source::Vocals)?,
            drums: f(Source::Drums)?,
            bass: f(Source::Bass)?,
            other: f(Source::Other)?,
        })
    }

    /// Take ownership of the entries of a loose map
    ///
    /// Fails with `MissingSource` for the first absent source.
    pub fn from_map(mut map: HashMap<Source, T>) -> Result<Self> {
        Self::try_from_fn(|source| {
            map.remove(&source)
                .ok_or(EvalError::MissingSource { stem: source })
        })
    }

    pub fn map<U, F: FnMut(Source, &T) -> U>(&self, mut f: F) -> StemMap<U> {
        StemMap::from_fn(|source| f(source, &self[source]))
    }

    pub fn try_map<U, E, F: FnMut(Source, &T) -> std::result::Result<U, E>>(
        &self,
        mut f: F,
    ) -> std::result::Result<StemMap<U>, E> {
        StemMap::try_from_fn(|source| f(source, &self[source]))
    }

    /// Entries in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Source, &T)> {
        Source::ALL.into_iter().map(move |source| (source, &self[source]))
    }
}

impl<T: Sync> StemMap<T> {
    /// [`StemMap::map`] with the four calls spread over the rayon pool
    pub fn par_map<U, F>(&self, f: F) -> StemMap<U>
    where
        U: Send,
        F: Fn(Source, &T) -> U + Sync,
    {
        let ((vocals, drums), (bass, other)) = join(
            || join(|| f(Source::Vocals, &self.vocals), || f(Source::Drums, &self.drums)),
            || join(|| f(Source::Bass, &self.bass), || f(Source::Other, &self.other)),
        );
        StemMap {
            vocals,
            drums,
            bass,
            other,
        }
    }
}

impl<T, E> StemMap<std::result::Result<T, E>> {
    /// First error in canonical order, or every value
    pub fn transpose(self) -> std::result::Result<StemMap<T>, E> {
        Ok(StemMap {
            vocals: self.vocals?,
            drums: self.drums?,
            bass: self.bass?,
            other: self.other?,
        })
    }
}

impl<T: Clone> StemMap<T> {
    /// The same value for every source
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl<T> IntoIterator for StemMap<T> {
    type Item = (Source, T);
    type IntoIter = std::array::IntoIter<(Source, T), 4>;

    fn into_iter(self) -> Self::IntoIter {
        [
            (Source::Vocals, self.vocals),
            (Source::Drums, self.drums),
            (Source::Bass, self.bass),
            (Source::Other, self.other),
        ]
        .into_iter()
    }
}

impl<T> Index<Source> for StemMap<T> {
    type Output = T;

    fn index(&self, source: Source) -> &T {
        match source {
            Source::Vocals => &self.vocals,
            Source::Drums => &self.drums,
            Source::Bass => &self.bass,
            Source::Other => &self.other,
        }
    }
}

impl<T> IndexMut<Source> for StemMap<T> {
    fn index_mut(&mut self, source: Source) -> &mut T {
        match source {
            Source::Vocals => &mut self.vocals,
            Source::Drums => &mut self.drums,
            Source::Bass => &mut self.bass,
            Source::Other => &mut self.other,
        }
    }
}
