//! Command-line argument parsing for kmcqa
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::data::formatter::DatasetMode;
use crate::inference::Strategy;

/// kmcqa - dataset building and answer scoring for Korean multiple-choice QA
#[derive(Parser, Debug)]
#[command(name = "kmcqa")]
#[command(version)]
#[command(about = "Format, augment and score Korean multiple-choice exam questions", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only, no progress bars)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Never augment prompts with retrieved passages
    #[arg(long, global = true)]
    pub no_rag: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build tokenized train/eval datasets and the trainer manifest
    Prepare {
        /// Output directory (config `data.output_dir` by default)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Format a CSV into chat examples without tokenizing
    Format {
        /// Input CSV (config test file by default)
        #[arg(value_name = "CSV")]
        input: Option<PathBuf>,

        /// Build training examples (with answer turn) or evaluation examples
        #[arg(long, value_enum, default_value_t = FormatMode::Eval)]
        mode: FormatMode,

        /// Write JSONL here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run an inference strategy over the test CSV
    Infer {
        #[arg(long, value_enum, default_value_t = Strategy::Score)]
        strategy: Strategy,

        /// Input CSV (config test file by default)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Model directory or hub id (config `model.model_path` by default)
        #[arg(long)]
        model: Option<String>,

        /// Output directory (config `data.output_dir` by default)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Accuracy of a predictions file against labelled data
    Evaluate {
        /// `id,answer` CSV
        #[arg(long)]
        predictions: PathBuf,

        /// Labelled CSV (config eval file by default)
        #[arg(long)]
        labels: Option<PathBuf>,
    },
}

/// Dataset mode as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    Train,
    Eval,
}

impl From<FormatMode> for DatasetMode {
    fn from(mode: FormatMode) -> Self {
        match mode {
            FormatMode::Train => DatasetMode::Train,
            FormatMode::Eval => DatasetMode::Eval,
        }
    }
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Check if should show progress bars
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}
