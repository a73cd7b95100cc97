//! Shared utilities for CLI commands.

use std::fmt::Write;

use anyhow::{Context, Result, bail};
use bt_core::stat::format_decimal;
use bt_core::{
    AnalysisContext, BehaviorCode, Ethogram, ObservationFailure, ObservationId, PreparedRun, Stat,
    Subject, WindowPolicy,
};
use chrono::Utc;
use serde::Serialize;

use crate::cli::{Selection, WindowArg};

/// Window policy from `--window`, `--start` and `--stop`.
pub fn window_policy(selection: &Selection) -> Result<WindowPolicy> {
    match selection.window {
        WindowArg::Full => Ok(WindowPolicy::FullObservation),
        WindowArg::Events => Ok(WindowPolicy::Events),
        WindowArg::Arbitrary => {
            let (Some(start), Some(stop)) = (selection.start, selection.stop) else {
                bail!("--window arbitrary needs both --start and --stop");
            };
            Ok(WindowPolicy::Arbitrary { start, stop })
        }
    }
}

pub fn observation_ids(selection: &Selection) -> Result<Vec<ObservationId>> {
    selection
        .observations
        .iter()
        .map(|o| ObservationId::new(o.as_str()).context("invalid --observation"))
        .collect()
}

/// Behavior codes from user input; every code must exist in the ethogram.
pub fn behavior_codes(names: &[String], ethogram: &Ethogram) -> Result<Vec<BehaviorCode>> {
    names
        .iter()
        .map(|name| {
            let code = BehaviorCode::new(name.as_str()).context("invalid behavior code")?;
            if ethogram.get(&code).is_none() {
                bail!("behavior {name:?} is not defined in the ethogram");
            }
            Ok(code)
        })
        .collect()
}

/// Selected behaviors, or every ethogram behavior.
pub fn selected_behaviors(selection: &Selection, ethogram: &Ethogram) -> Result<Vec<BehaviorCode>> {
    if selection.behaviors.is_empty() {
        return Ok(ethogram.codes().cloned().collect());
    }
    behavior_codes(&selection.behaviors, ethogram)
}

/// Selected subjects, or every subject coded in the run.
pub fn selected_subjects(selection: &Selection, run: &PreparedRun) -> Vec<Subject> {
    if !selection.subjects.is_empty() {
        return selection.subjects.iter().map(|s| Subject::new(s.as_str())).collect();
    }
    let coded: Vec<Subject> = run.table.subjects().into_iter().cloned().collect();
    if coded.is_empty() {
        vec![Subject::no_focal()]
    } else {
        coded
    }
}

/// Aggregate, validate and clip the selected observations.
pub fn prepare(ctx: &AnalysisContext, selection: &Selection) -> Result<PreparedRun> {
    let run = ctx
        .prepare(&observation_ids(selection)?, &window_policy(selection)?)
        .context("failed to prepare observations")?;
    Ok(run)
}

/// Render rows as left-aligned columns under a dashed header.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &mut dyn Iterator<Item = String>| -> String {
        let joined: Vec<String> = cells
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect();
        joined.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&mut headers.iter().map(ToString::to_string)));
    let _ = writeln!(out, "{}", line(&mut widths.iter().map(|&w| "-".repeat(w))));
    for row in rows {
        let _ = writeln!(out, "{}", line(&mut row.iter().cloned()));
    }
    out
}

/// Occurrence counts are shown without decimals.
pub fn count_cell(stat: Stat) -> String {
    match stat {
        Stat::Value(v) => v.normalize().to_string(),
        other => other.to_string(),
    }
}

pub fn time_cell(value: rust_decimal::Decimal) -> String {
    format_decimal(value)
}

/// Trailing list of observations left out of the run.
pub fn format_failures(failures: &[ObservationFailure]) -> String {
    let mut out = String::new();
    if failures.is_empty() {
        return out;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Skipped observations:");
    for failure in failures {
        let _ = writeln!(out, "- {}: {}", failure.observation, failure.error);
    }
    out
}

/// JSON envelope shared by all commands.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a, T: Serialize> {
    pub generated_at: String,
    pub rows: &'a T,
    pub failures: &'a [ObservationFailure],
}

pub fn format_json<T: Serialize>(rows: &T, failures: &[ObservationFailure]) -> Result<String> {
    let output = JsonOutput {
        generated_at: Utc::now().to_rfc3339(),
        rows,
        failures,
    };
    Ok(serde_json::to_string_pretty(&output)?)
}
