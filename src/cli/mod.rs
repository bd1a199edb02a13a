//! CLI Module
//!
//! Command-line interface for running the separation baselines.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::dataset::Subset;

/// Source-separation baseline evaluator
#[derive(Parser, Debug)]
#[command(name = "stemeval")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build BL/BU(/BU_MWF) estimates for a dataset subset and score them
    #[command(name = "evaluate")]
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Root of a MUSDB18-HQ style dataset
    #[arg(long)]
    pub musdb_root: PathBuf,

    /// Dataset subset
    #[arg(long, value_enum, default_value_t = Subset::Test)]
    pub subset: Subset,

    /// Where to write the JSON summary
    #[arg(long, default_value = "experiments/results/baselines.json")]
    pub out: PathBuf,

    /// Write every estimate as a WAV file
    #[arg(long)]
    pub write_wavs: bool,

    /// Directory for estimate WAVs
    #[arg(long, default_value = "experiments/results/wavs")]
    pub wav_dir: PathBuf,

    /// Refine the ratio-mask estimates with the multichannel Wiener filter
    #[arg(long)]
    pub mwf: bool,

    /// Wiener iterations (0 runs one pass; negative counts are rejected) [default: 1]
    #[arg(long)]
    pub mwf_iter: Option<usize>,

    /// Keep the initial PSDs fixed across Wiener iterations
    #[arg(long)]
    pub freeze_psd: bool,

    /// Number of tracks to process (0 = all)
    #[arg(long, default_value_t = 1)]
    pub max_tracks: usize,

    /// Crop each track to its first N seconds (0 = full) [default: 10]
    #[arg(long)]
    pub max_seconds: Option<f64>,

    /// Build estimates (and WAVs) without scoring them
    #[arg(long)]
    pub skip_eval: bool,

    /// JSON pipeline configuration; flags above take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_defaults() {
        let cli = Cli::parse_from(["stemeval", "evaluate", "--musdb-root", "/data/musdb"]);
        let Some(Commands::Evaluate(args)) = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(args.subset, Subset::Test);
        assert_eq!(args.out, PathBuf::from("experiments/results/baselines.json"));
        assert_eq!(args.max_tracks, 1);
        assert_eq!(args.max_seconds, None);
        assert!(!args.mwf && !args.skip_eval && !args.write_wavs);
    }

    #[test]
    fn test_evaluate_flags() {
        let cli = Cli::parse_from([
            "stemeval",
            "--verbose",
            "evaluate",
            "--musdb-root",
            "m",
            "--subset",
            "train",
            "--mwf",
            "--mwf-iter",
            "3",
            "--max-tracks",
            "0",
            "--max-seconds",
            "2.5",
        ]);
        assert!(cli.verbose);
        let Some(Commands::Evaluate(args)) = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(args.subset, Subset::Train);
        assert!(args.mwf);
        assert_eq!(args.mwf_iter, Some(3));
        assert_eq!(args.max_tracks, 0);
        assert_eq!(args.max_seconds, Some(2.5));
    }

    #[test]
    fn test_rejects_negative_iterations() {
        let parsed = Cli::try_parse_from(["stemeval", "evaluate", "--musdb-root", "/data", "--mwf-iter", "-1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_requires_dataset_root() {
        assert!(Cli::try_parse_from(["stemeval", "evaluate"]).is_err());
    }
}
