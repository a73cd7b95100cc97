//! Aggregate command: list the intervals built from the raw events.

use std::io::Write;

use anyhow::Result;
use bt_core::{AggregatedEvent, AnalysisContext, BehaviorType, PreparedRun, Subject};

use super::util::{
    format_failures, format_json, prepare, render_table, selected_behaviors, time_cell,
};
use crate::cli::Selection;

pub fn format_aggregate(rows: &[&AggregatedEvent], run: &PreparedRun) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|e| {
            vec![
                e.observation.to_string(),
                e.subject.to_string(),
                e.behavior.to_string(),
                match e.kind {
                    BehaviorType::State => "STATE",
                    BehaviorType::Point => "POINT",
                }
                .to_string(),
                e.modifiers.clone(),
                time_cell(e.start),
                time_cell(e.stop),
                e.duration().map_or_else(|| "NA".to_string(), time_cell),
            ]
        })
        .collect();
    let mut out = render_table(
        &["observation", "subject", "behavior", "type", "modifiers", "start", "stop", "duration"],
        &cells,
    );

    let mut unpaired: Vec<_> = run.table.unpaired_keys().collect();
    unpaired.sort();
    for key in unpaired {
        out.push_str(&format!(
            "UNPAIRED: {} / {} / {}\n",
            key.observation, key.subject, key.behavior
        ));
    }
    out.push_str(&format_failures(&run.failures));
    out
}

/// Runs the aggregate command.
pub fn run<W: Write>(writer: &mut W, ctx: &AnalysisContext, selection: &Selection) -> Result<()> {
    let mut run = prepare(ctx, selection)?;

    let behaviors = selected_behaviors(selection, ctx.ethogram())?;
    let subjects: Vec<Subject> = selection
        .subjects
        .iter()
        .map(|s| Subject::new(s.as_str()))
        .collect();
    run.table
        .retain(|e| {
            behaviors.contains(&e.behavior)
                && (subjects.is_empty() || subjects.contains(&e.subject))
        });

    let rows = run.table.rows();
    if selection.json {
        writeln!(writer, "{}", format_json(&rows, &run.failures)?)?;
    } else {
        write!(writer, "{}", format_aggregate(&rows, &run))?;
    }
    Ok(())
}
