//! Command-line argument definitions.

use std::path::PathBuf;

use bt_core::FailurePolicy;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

/// Behavioral observation analysis.
///
/// Turns coded start/stop and point events into intervals and derives time
/// budgets, co-occurrence, latency and inter-rater reliability.
#[derive(Debug, Parser)]
#[command(name = "bt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// What to do with observations that fail validation (overrides config).
    #[arg(long, global = true, value_enum)]
    pub on_failure: Option<PolicyArg>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate every observation of a project.
    Check {
        /// Project file (JSON).
        project: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List aggregated intervals.
    Aggregate(Selection),

    /// Duration, occurrences, mean, stdev and proportion per behavior.
    TimeBudget {
        #[command(flatten)]
        selection: Selection,

        /// Split every observation window into bins of this many seconds.
        #[arg(long)]
        bin_size: Option<Decimal>,
    },

    /// Evaluate a boolean filter over "subject|behavior" selectors.
    Filter {
        #[command(flatten)]
        selection: Selection,

        /// Filter expression, e.g. '"A|walk" & ("B|sniff" | "B|call")'.
        #[arg(long, short = 'e')]
        expression: String,

        /// Show per-observation count, total, mean and stdev.
        #[arg(long)]
        summary: bool,
    },

    /// Overlap duration of every combination of selected behaviors.
    Cooccurrence {
        #[command(flatten)]
        selection: Selection,

        /// Leave out combinations that never overlap.
        #[arg(long)]
        hide_zero: bool,

        /// Sum over observations.
        #[arg(long)]
        total: bool,
    },

    /// Latency from marker to target behaviors.
    Latency {
        #[command(flatten)]
        selection: Selection,

        /// Marker behavior (repeatable).
        #[arg(long, required = true)]
        marker: Vec<String>,

        /// Target behavior (repeatable).
        #[arg(long, required = true)]
        target: Vec<String>,

        /// Accept targets coded for any subject.
        #[arg(long)]
        any_subject: bool,

        /// Pool latencies per subject, marker and target.
        #[arg(long)]
        summary: bool,
    },

    /// Time-unit Cohen's kappa between observations.
    Kappa(Agreement),

    /// Needleman-Wunsch identity between observations.
    Align(Agreement),
}

/// Observation, subject, behavior and window selection shared by commands.
#[derive(Debug, Clone, Args)]
pub struct Selection {
    /// Project file (JSON).
    pub project: PathBuf,

    /// Observation to analyse (repeatable; default all).
    #[arg(long = "observation", short = 'o')]
    pub observations: Vec<String>,

    /// Subject to analyse (repeatable; default all coded subjects).
    #[arg(long = "subject", short = 's')]
    pub subjects: Vec<String>,

    /// Behavior to analyse (repeatable; default the whole ethogram).
    #[arg(long = "behavior", short = 'b')]
    pub behaviors: Vec<String>,

    /// Behavior whose time is removed from the proportion denominator.
    #[arg(long = "exclude")]
    pub excluded: Vec<String>,

    /// How the analysis window is chosen.
    #[arg(long, value_enum, default_value_t = WindowArg::Full)]
    pub window: WindowArg,

    /// Window start (with --window arbitrary).
    #[arg(long)]
    pub start: Option<Decimal>,

    /// Window stop (with --window arbitrary).
    #[arg(long)]
    pub stop: Option<Decimal>,

    /// Keep modifiers apart.
    #[arg(long)]
    pub modifiers: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Options for inter-rater reliability.
#[derive(Debug, Clone, Args)]
pub struct Agreement {
    #[command(flatten)]
    pub selection: Selection,

    /// Sampling step in seconds (overrides config).
    #[arg(long)]
    pub interval: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WindowArg {
    /// The whole observation.
    Full,
    /// From the first to the last event.
    Events,
    /// From --start to --stop.
    Arbitrary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Skip,
    Abort,
    Annotate,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Skip => Self::Skip,
            PolicyArg::Abort => Self::Abort,
            PolicyArg::Annotate => Self::Annotate,
        }
    }
}
