//! Result aggregation
//!
//! JSON layout: `{track: {variant: {source: {"SDR_med": value}}}}`. A
//! track that was not scored maps to `{"note": "<reason>"}` instead.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::StemMap;
use crate::error::{EvalError, Result};
use crate::eval::scorer::SourceMetrics;
use crate::pipeline::Variant;

/// Note recorded for tracks processed with scoring disabled
pub const SKIP_EVAL_NOTE: &str = "skip_eval=True (no scoring run)";

/// Per-source metrics for every scored variant of a track
pub type VariantScores = BTreeMap<Variant, StemMap<SourceMetrics>>;

/// One track's entry in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackReport {
    Note { note: String },
    Scored(VariantScores),
}

/// Accumulated results of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationReport {
    tracks: BTreeMap<String, TrackReport>,
}

impl EvaluationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record scores for one variant, replacing any note for the track
    pub fn insert_scores(&mut self, track: &str, variant: Variant, scores: StemMap<SourceMetrics>) {
        let entry = self
            .tracks
            .entry(track.to_string())
            .or_insert_with(|| TrackReport::Scored(BTreeMap::new()));
        match entry {
            TrackReport::Scored(variants) => {
                variants.insert(variant, scores);
            }
            TrackReport::Note { .. } => {
                let mut variants = BTreeMap::new();
                variants.insert(variant, scores);
                *entry = TrackReport::Scored(variants);
            }
        }
    }

    /// Record a note for a track, replacing anything recorded before
    pub fn insert_note(&mut self, track: &str, note: impl Into<String>) {
        self.tracks
            .insert(track.to_string(), TrackReport::Note { note: note.into() });
    }

    pub fn get(&self, track: &str) -> Option<&TrackReport> {
        self.tracks.get(track)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of tracks that carry scores rather than a note
    pub fn scored_count(&self) -> usize {
        self.tracks
            .values()
            .filter(|report| matches!(report, TrackReport::Scored(_)))
            .count()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON, creating parent directories
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EvalError::FileNotFound {
            path: path.display().to_string(),
            source: Some(e),
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn metrics(value: f64) -> StemMap<SourceMetrics> {
        StemMap::splat(SourceMetrics {
            sdr_median: Some(value),
        })
    }

    #[test]
    fn test_json_layout() {
        let mut report = EvaluationReport::new();
        report.insert_scores("song", Variant::RatioMask, metrics(8.5));
        report.insert_scores("song", Variant::MixtureBaseline, metrics(-3.0));
        report.insert_note("broken", "failed: missing source: drums");

        let value = serde_json::to_value(&report).unwrap();
        let sources = |v: f64| {
            json!({
                "vocals": {"SDR_med": v},
                "drums": {"SDR_med": v},
                "bass": {"SDR_med": v},
                "other": {"SDR_med": v},
            })
        };
        assert_eq!(
            value,
            json!({
                "song": {"BL": sources(-3.0), "BU": sources(8.5)},
                "broken": {"note": "failed: missing source: drums"},
            })
        );
    }

    #[test]
    fn test_scores_replace_note() {
        let mut report = EvaluationReport::new();
        report.insert_note("song", SKIP_EVAL_NOTE);
        assert_eq!(report.scored_count(), 0);

        report.insert_scores("song", Variant::RatioMaskWiener, metrics(1.0));
        assert_eq!(report.scored_count(), 1);
        match report.get("song").unwrap() {
            TrackReport::Scored(variants) => {
                assert_eq!(variants.keys().copied().collect::<Vec<_>>(), vec![Variant::RatioMaskWiener]);
            }
            other => panic!("expected scores, got {:?}", other),
        }
    }

    #[test]
    fn test_write_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("results.json");

        let mut report = EvaluationReport::new();
        report.insert_scores("a", Variant::RatioMask, metrics(4.25));
        report.insert_note("b", SKIP_EVAL_NOTE);
        report.write_json(&path).unwrap();

        let loaded = EvaluationReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_empty_report_is_empty_object() {
        assert_eq!(EvaluationReport::new().to_json_string().unwrap(), "{}");
    }
}
