//! CLI subcommand implementations.

pub mod aggregate;
pub mod check;
pub mod cooccurrence;
pub mod filter;
pub mod irr;
pub mod latency;
pub mod time_budget;
pub mod util;
