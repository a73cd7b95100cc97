//! Inter-rater reliability commands: kappa and alignment identity.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use bt_core::stat::format_decimal;
use bt_core::{
    AnalysisContext, IrrMatrix, IrrMeasure, IrrParams, PairAgreement, cohen_kappa, irr_matrix,
    needleman_wunsch_identity,
};
use rust_decimal::Decimal;

use super::util::{
    format_failures, format_json, observation_ids, render_table, selected_behaviors,
    selected_subjects, window_policy,
};
use crate::cli::Agreement;

fn value_cell(measure: IrrMeasure, value: Decimal) -> String {
    match measure {
        IrrMeasure::Kappa => format_decimal(value),
        IrrMeasure::Identity => format!("{} %", format_decimal(value)),
    }
}

/// Plain-text report for one pair of observations.
pub fn format_pair(pair: &PairAgreement) -> String {
    let subjects: Vec<String> = pair.subjects.iter().map(ToString::to_string).collect();
    let label = match pair.measure {
        IrrMeasure::Kappa => "Cohen's kappa",
        IrrMeasure::Identity => "Identity",
    };

    let mut out = String::new();
    let _ = writeln!(out, "Observations: {} - {}", pair.first, pair.second);
    let _ = writeln!(out, "Interval: {} s", format_decimal(pair.interval));
    let _ = writeln!(out, "Subjects: {}", subjects.join(", "));
    let _ = writeln!(out, "Ticks: {}", pair.ticks);
    let _ = writeln!(out, "{label}: {}", value_cell(pair.measure, pair.value));
    out
}

/// Square matrix with observation ids as row and column labels.
pub fn format_matrix(matrix: &IrrMatrix) -> String {
    let mut headers = vec!["observation"];
    headers.extend(matrix.observations.iter().map(|o| o.as_str()));
    let cells: Vec<Vec<String>> = matrix
        .observations
        .iter()
        .zip(&matrix.values)
        .map(|(obs, row)| {
            let mut cells = vec![obs.to_string()];
            cells.extend(row.iter().map(|v| value_cell(matrix.measure, *v)));
            cells
        })
        .collect();
    render_table(&headers, &cells)
}

/// Runs `kappa` or `align`.
///
/// Every selected observation must have rows in its window; one without is
/// handled by the failure policy before any pairing. Exactly two remaining
/// observations give a pair report; any other count gives the full matrix.
pub fn run<W: Write>(
    writer: &mut W,
    ctx: &AnalysisContext,
    agreement: &Agreement,
    measure: IrrMeasure,
    default_interval: Decimal,
    include_modifiers: bool,
) -> Result<()> {
    let selection = &agreement.selection;
    let run = ctx
        .prepare_coded(&observation_ids(selection)?, &window_policy(selection)?)
        .context("failed to prepare observations")?;
    let params = IrrParams {
        subjects: selected_subjects(selection, &run),
        behaviors: selected_behaviors(selection, ctx.ethogram())?,
        interval: agreement.interval.unwrap_or(default_interval),
        include_modifiers,
    };
    let observations = run.observations();

    if let [first, second] = observations.as_slice() {
        let pair = match measure {
            IrrMeasure::Kappa => cohen_kappa(&run.table, first, second, &params),
            IrrMeasure::Identity => needleman_wunsch_identity(&run.table, first, second, &params),
        }
        .context("agreement failed")?;
        if selection.json {
            writeln!(writer, "{}", format_json(&pair, &run.failures)?)?;
        } else {
            write!(writer, "{}", format_pair(&pair))?;
            write!(writer, "{}", format_failures(&run.failures))?;
        }
        return Ok(());
    }

    let matrix = irr_matrix(&run.table, &observations, &params, measure, ctx.cancellation())
        .context("agreement failed")?;
    if selection.json {
        writeln!(writer, "{}", format_json(&matrix, &run.failures)?)?;
    } else {
        write!(writer, "{}", format_matrix(&matrix))?;
        write!(writer, "{}", format_failures(&run.failures))?;
    }
    Ok(())
}
