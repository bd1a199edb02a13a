//! Scoring and result aggregation

pub mod report;
pub mod scorer;

pub use report::{EvaluationReport, TrackReport, VariantScores, SKIP_EVAL_NOTE};
pub use scorer::{median, Scorer, SourceMetrics, WindowedSdrScorer, MAX_SDR_DB};
