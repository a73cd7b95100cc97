//! Latency command.

use std::io::Write;

use anyhow::Result;
use bt_core::{
    AnalysisContext, LatencyParams, LatencyRow, LatencySummary, ObservationFailure, latency,
    summarize_latency,
};

use super::util::{
    behavior_codes, count_cell, format_failures, format_json, prepare, render_table,
    selected_subjects,
};
use crate::cli::Selection;

pub fn format_rows(rows: &[LatencyRow], failures: &[ObservationFailure]) -> String {
    let with_target_subject = rows.iter().any(|r| r.target_subject.is_some());
    let mut headers = vec!["observation", "subject", "marker", "marker time", "target"];
    if with_target_subject {
        headers.push("target subject");
    }
    headers.push("latency");

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            let mut cells = vec![
                r.observation.to_string(),
                r.subject.to_string(),
                r.marker.to_string(),
                r.marker_time.to_string(),
                r.target.to_string(),
            ];
            if with_target_subject {
                cells.push(
                    r.target_subject
                        .as_ref()
                        .map_or_else(|| "-".to_string(), ToString::to_string),
                );
            }
            cells.push(r.latency.to_string());
            cells
        })
        .collect();
    let mut out = render_table(&headers, &cells);
    out.push_str(&format_failures(failures));
    out
}

pub fn format_summary(rows: &[LatencySummary], failures: &[ObservationFailure]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.subject.to_string(),
                r.marker.to_string(),
                r.target.to_string(),
                count_cell(r.count),
                r.mean.to_string(),
                r.stdev.to_string(),
            ]
        })
        .collect();
    let mut out = render_table(&["subject", "marker", "target", "count", "mean", "stdev"], &cells);
    out.push_str(&format_failures(failures));
    out
}

/// Runs the latency command.
pub fn run<W: Write>(
    writer: &mut W,
    ctx: &AnalysisContext,
    selection: &Selection,
    markers: &[String],
    targets: &[String],
    any_subject: bool,
    summary: bool,
) -> Result<()> {
    let markers = behavior_codes(markers, ctx.ethogram())?;
    let targets = behavior_codes(targets, ctx.ethogram())?;
    let run = prepare(ctx, selection)?;
    let params = LatencyParams {
        subjects: selected_subjects(selection, &run),
        markers,
        targets,
        any_subject,
    };
    let rows = latency(&run.table, &run.observations(), &params);

    if summary {
        let summaries = summarize_latency(&rows);
        if selection.json {
            writeln!(writer, "{}", format_json(&summaries, &run.failures)?)?;
        } else {
            write!(writer, "{}", format_summary(&summaries, &run.failures))?;
        }
    } else if selection.json {
        writeln!(writer, "{}", format_json(&rows, &run.failures)?)?;
    } else {
        write!(writer, "{}", format_rows(&rows, &run.failures))?;
    }
    Ok(())
}
