//! Analysis engine for coded behavioral observations.
//!
//! This crate turns raw start/stop and point events into intervals and
//! derives:
//! - Time budgets: duration, occurrences, mean, stdev and proportion of time
//! - Interval algebra: boolean filters over `"subject|behavior"` selectors
//!   and behavior co-occurrence
//! - Latency from marker to target behaviors
//! - Inter-rater reliability: time-unit Cohen's kappa and Needleman-Wunsch
//!   identity

pub mod aggregate;
pub mod analysis;
pub mod clip;
pub mod cooccurrence;
pub mod error;
pub mod ethogram;
pub mod event;
pub mod filter;
pub mod interval;
pub mod irr;
pub mod latency;
pub mod normalize;
pub mod stat;
pub mod time_budget;
pub mod types;

pub use aggregate::{AggregateKey, AggregatedEvent, AggregatedTable, aggregate_observation};
pub use analysis::{AnalysisContext, FailurePolicy, ObservationFailure, PreparedRun};
pub use clip::{TimeWindow, WindowPolicy, clip_table};
pub use cooccurrence::{CooccurrenceRow, CooccurrenceTotal, cooccurrence, total_by_combination};
pub use error::AnalysisError;
pub use ethogram::{BehaviorType, Ethogram, EthogramEntry};
pub use event::{CodingInterval, Event, Observation, ObservationKind};
pub use filter::{
    FilterExpr, FilterRow, FilterSummary, Selector, apply_filter, parse_filter, summarize_filter,
};
pub use interval::{Interval, IntervalSet};
pub use irr::{
    IrrMatrix, IrrMeasure, IrrParams, PairAgreement, cohen_kappa, irr_matrix,
    needleman_wunsch_identity,
};
pub use latency::{LatencyParams, LatencyRow, LatencySummary, latency, summarize_latency};
pub use normalize::{EventFlag, TaggedEvent, normalize};
pub use stat::Stat;
pub use time_budget::{
    BinnedTimeBudgetRow, TimeBudgetParams, TimeBudgetRow, time_budget, time_budget_binned,
};
pub use types::{BehaviorCode, NO_FOCAL_SUBJECT, ObservationId, Subject, ValidationError};
