//! Behavioral observation analysis CLI library.
//!
//! This crate provides the CLI interface for `bt-core`.

mod cli;
pub mod commands;
mod config;
pub mod project;

pub use cli::{Agreement, Cli, Commands, PolicyArg, Selection, WindowArg};
pub use config::Config;
pub use project::Project;
