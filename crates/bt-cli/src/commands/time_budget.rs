//! Time-budget command, plain or binned.

use std::io::Write;

use anyhow::{Context, Result};
use bt_core::{
    AnalysisContext, BehaviorType, BinnedTimeBudgetRow, ObservationFailure, TimeBudgetParams,
    TimeBudgetRow, time_budget, time_budget_binned,
};
use rust_decimal::Decimal;

use super::util::{
    behavior_codes, count_cell, format_failures, format_json, prepare, render_table,
    selected_behaviors, selected_subjects, time_cell,
};
use crate::cli::Selection;

fn budget_cells(row: &TimeBudgetRow, with_modifiers: bool) -> Vec<String> {
    let mut cells = vec![row.subject.to_string(), row.behavior.to_string()];
    if with_modifiers {
        cells.push(row.modifiers.clone().unwrap_or_default());
    }
    cells.extend([
        match row.kind {
            BehaviorType::State => "STATE",
            BehaviorType::Point => "POINT",
        }
        .to_string(),
        row.duration.to_string(),
        count_cell(row.occurrences),
        row.mean.to_string(),
        row.stdev.to_string(),
        row.proportion.to_string(),
    ]);
    cells
}

const BUDGET_HEADERS: [&str; 6] =
    ["type", "duration", "occurrences", "mean", "stdev", "proportion"];

fn headers<'a>(leading: &[&'a str], with_modifiers: bool) -> Vec<&'a str> {
    let mut out = leading.to_vec();
    out.extend(["subject", "behavior"]);
    if with_modifiers {
        out.push("modifiers");
    }
    out.extend(BUDGET_HEADERS);
    out
}

pub fn format_budget(
    rows: &[TimeBudgetRow],
    with_modifiers: bool,
    failures: &[ObservationFailure],
) -> String {
    let cells: Vec<Vec<String>> = rows.iter().map(|r| budget_cells(r, with_modifiers)).collect();
    let mut out = render_table(&headers(&[], with_modifiers), &cells);
    out.push_str(&format_failures(failures));
    out
}

pub fn format_binned(
    rows: &[BinnedTimeBudgetRow],
    with_modifiers: bool,
    failures: &[ObservationFailure],
) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            let mut cells = vec![
                r.observation.to_string(),
                time_cell(r.bin_start),
                time_cell(r.bin_stop),
            ];
            cells.extend(budget_cells(&r.row, with_modifiers));
            cells
        })
        .collect();
    let mut out = render_table(
        &headers(&["observation", "bin start", "bin stop"], with_modifiers),
        &cells,
    );
    out.push_str(&format_failures(failures));
    out
}

/// Runs the time-budget command.
pub fn run<W: Write>(
    writer: &mut W,
    ctx: &AnalysisContext,
    selection: &Selection,
    bin_size: Option<Decimal>,
    include_modifiers: bool,
) -> Result<()> {
    let run = prepare(ctx, selection)?;
    let params = TimeBudgetParams {
        subjects: selected_subjects(selection, &run),
        behaviors: selected_behaviors(selection, ctx.ethogram())?,
        excluded: behavior_codes(&selection.excluded, ctx.ethogram())?,
        include_modifiers,
    };

    if let Some(size) = bin_size {
        let rows = time_budget_binned(&run.table, ctx.ethogram(), &run.windows, &params, size)
            .context("invalid --bin-size")?;
        if selection.json {
            writeln!(writer, "{}", format_json(&rows, &run.failures)?)?;
        } else {
            write!(writer, "{}", format_binned(&rows, include_modifiers, &run.failures))?;
        }
    } else {
        let rows = time_budget(&run.table, ctx.ethogram(), &run.windows, &params);
        if selection.json {
            writeln!(writer, "{}", format_json(&rows, &run.failures)?)?;
        } else {
            write!(writer, "{}", format_budget(&rows, include_modifiers, &run.failures))?;
        }
    }
    Ok(())
}
