//! Co-occurrence command.

use std::io::Write;

use anyhow::Result;
use bt_core::{
    AnalysisContext, BehaviorCode, CooccurrenceRow, CooccurrenceTotal, ObservationFailure,
    cooccurrence, total_by_combination,
};

use super::util::{
    format_failures, format_json, prepare, render_table, selected_behaviors, selected_subjects,
};
use crate::cli::Selection;

fn combination(behaviors: &[BehaviorCode]) -> String {
    behaviors
        .iter()
        .map(BehaviorCode::as_str)
        .collect::<Vec<_>>()
        .join(" + ")
}

pub fn format_rows(rows: &[CooccurrenceRow], failures: &[ObservationFailure]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.observation.to_string(),
                r.subject.to_string(),
                combination(&r.behaviors),
                r.duration.to_string(),
            ]
        })
        .collect();
    let mut out = render_table(&["observation", "subject", "behaviors", "duration"], &cells);
    out.push_str(&format_failures(failures));
    out
}

pub fn format_totals(rows: &[CooccurrenceTotal], failures: &[ObservationFailure]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| vec![r.subject.to_string(), combination(&r.behaviors), r.duration.to_string()])
        .collect();
    let mut out = render_table(&["subject", "behaviors", "duration"], &cells);
    out.push_str(&format_failures(failures));
    out
}

/// Runs the co-occurrence command.
pub fn run<W: Write>(
    writer: &mut W,
    ctx: &AnalysisContext,
    selection: &Selection,
    hide_zero: bool,
    total: bool,
) -> Result<()> {
    let run = prepare(ctx, selection)?;
    let subjects = selected_subjects(selection, &run);
    let behaviors = selected_behaviors(selection, ctx.ethogram())?;
    let rows = cooccurrence(&run.table, &run.observations(), &subjects, &behaviors, hide_zero);

    if total {
        let totals = total_by_combination(&rows);
        if selection.json {
            writeln!(writer, "{}", format_json(&totals, &run.failures)?)?;
        } else {
            write!(writer, "{}", format_totals(&totals, &run.failures))?;
        }
    } else if selection.json {
        writeln!(writer, "{}", format_json(&rows, &run.failures)?)?;
    } else {
        write!(writer, "{}", format_rows(&rows, &run.failures))?;
    }
    Ok(())
}
