//! Filter command: evaluate a boolean expression over selector interval sets.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use bt_core::{
    AnalysisContext, FilterRow, FilterSummary, ObservationFailure, apply_filter, parse_filter,
    summarize_filter,
};

use super::util::{count_cell, format_failures, format_json, prepare, render_table, time_cell};
use crate::cli::Selection;

pub fn format_detail(rows: &[FilterRow], failures: &[ObservationFailure]) -> String {
    let mut errors = Vec::new();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| match row {
            FilterRow::Interval {
                observation,
                start,
                stop,
                duration,
            } => vec![
                observation.to_string(),
                time_cell(*start),
                time_cell(*stop),
                time_cell(*duration),
            ],
            FilterRow::Error {
                observation,
                message,
            } => {
                errors.push(format!("{observation}: {message}"));
                vec![
                    observation.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "UNPAIRED".to_string(),
                ]
            }
        })
        .collect();

    let mut out = render_table(&["observation", "start", "stop", "duration"], &cells);
    if !errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors:");
        for error in errors {
            let _ = writeln!(out, "- {error}");
        }
    }
    out.push_str(&format_failures(failures));
    out
}

pub fn format_summary(rows: &[FilterSummary], failures: &[ObservationFailure]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.observation.to_string(),
                count_cell(r.count),
                r.total.to_string(),
                r.mean.to_string(),
                r.stdev.to_string(),
            ]
        })
        .collect();
    let mut out = render_table(&["observation", "count", "total", "mean", "stdev"], &cells);
    out.push_str(&format_failures(failures));
    out
}

/// Runs the filter command.
pub fn run<W: Write>(
    writer: &mut W,
    ctx: &AnalysisContext,
    selection: &Selection,
    expression: &str,
    summary: bool,
) -> Result<()> {
    // Parse before any aggregation work.
    let expr = parse_filter(expression).context("invalid filter expression")?;
    tracing::debug!(expression = %expr, "parsed filter");

    let run = prepare(ctx, selection)?;
    let observations = run.observations();
    let rows = apply_filter(&run.table, &observations, &expr);

    if summary {
        let summaries = summarize_filter(&observations, &rows);
        if selection.json {
            writeln!(writer, "{}", format_json(&summaries, &run.failures)?)?;
        } else {
            write!(writer, "{}", format_summary(&summaries, &run.failures))?;
        }
    } else if selection.json {
        writeln!(writer, "{}", format_json(&rows, &run.failures)?)?;
    } else {
        write!(writer, "{}", format_detail(&rows, &run.failures))?;
    }
    Ok(())
}
