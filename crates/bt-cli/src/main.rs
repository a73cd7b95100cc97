use std::path::Path;

use anyhow::{Context, Result};
use bt_core::{AnalysisContext, FailurePolicy, IrrMeasure};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bt_cli::commands::{aggregate, check, cooccurrence, filter, irr, latency, time_budget};
use bt_cli::{Cli, Commands, Config, Project};

/// Load a project and hand it to a fresh analysis context.
fn open_project(path: &Path, policy: FailurePolicy) -> Result<AnalysisContext> {
    let project = Project::load(path)?;
    Ok(project.into_context(policy))
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    let policy = cli.on_failure.map_or(config.failure_policy, FailurePolicy::from);

    let mut out = std::io::stdout().lock();
    match &cli.command {
        Some(Commands::Check { project, json }) => {
            let ctx = open_project(project, policy)?;
            check::run(&mut out, &ctx, *json)?;
        }
        Some(Commands::Aggregate(selection)) => {
            let ctx = open_project(&selection.project, policy)?;
            aggregate::run(&mut out, &ctx, selection)?;
        }
        Some(Commands::TimeBudget {
            selection,
            bin_size,
        }) => {
            let ctx = open_project(&selection.project, policy)?;
            let include_modifiers = selection.modifiers || config.include_modifiers;
            time_budget::run(&mut out, &ctx, selection, *bin_size, include_modifiers)?;
        }
        Some(Commands::Filter {
            selection,
            expression,
            summary,
        }) => {
            let ctx = open_project(&selection.project, policy)?;
            filter::run(&mut out, &ctx, selection, expression, *summary)?;
        }
        Some(Commands::Cooccurrence {
            selection,
            hide_zero,
            total,
        }) => {
            let ctx = open_project(&selection.project, policy)?;
            let hide_zero = *hide_zero || config.hide_zero_cooccurrence;
            cooccurrence::run(&mut out, &ctx, selection, hide_zero, *total)?;
        }
        Some(Commands::Latency {
            selection,
            marker,
            target,
            any_subject,
            summary,
        }) => {
            let ctx = open_project(&selection.project, policy)?;
            latency::run(&mut out, &ctx, selection, marker, target, *any_subject, *summary)?;
        }
        Some(Commands::Kappa(agreement)) => {
            let selection = &agreement.selection;
            let ctx = open_project(&selection.project, policy)?;
            let include_modifiers = selection.modifiers || config.include_modifiers;
            irr::run(
                &mut out,
                &ctx,
                agreement,
                IrrMeasure::Kappa,
                config.kappa_interval,
                include_modifiers,
            )?;
        }
        Some(Commands::Align(agreement)) => {
            let selection = &agreement.selection;
            let ctx = open_project(&selection.project, policy)?;
            let include_modifiers = selection.modifiers || config.include_modifiers;
            irr::run(
                &mut out,
                &ctx,
                agreement,
                IrrMeasure::Identity,
                config.kappa_interval,
                include_modifiers,
            )?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
