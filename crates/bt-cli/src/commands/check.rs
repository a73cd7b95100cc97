//! Check command: validate every observation without running an analysis.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Result, bail};
use bt_core::{AnalysisContext, ObservationId, aggregate_observation};
use serde::Serialize;

use super::util::{format_json, render_table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckEntry {
    pub observation: ObservationId,
    pub events: usize,
    pub intervals: usize,
    pub errors: Vec<String>,
}

impl CheckEntry {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Normalize and aggregate every observation, collecting all problems.
pub fn check(ctx: &AnalysisContext) -> Result<Vec<CheckEntry>> {
    let mut entries = Vec::new();
    for id in ctx.observation_ids() {
        let observation = ctx.observation(id)?;
        let entry = match aggregate_observation(observation, ctx.ethogram()) {
            Ok(aggregate) => CheckEntry {
                observation: id.clone(),
                events: observation.events.len(),
                intervals: aggregate.events.len(),
                errors: aggregate.unpaired.iter().map(ToString::to_string).collect(),
            },
            Err(err) => CheckEntry {
                observation: id.clone(),
                events: observation.events.len(),
                intervals: 0,
                errors: vec![err.to_string()],
            },
        };
        entries.push(entry);
    }
    Ok(entries)
}

pub fn format_check(entries: &[CheckEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.observation.to_string(),
                e.events.to_string(),
                e.intervals.to_string(),
                if e.is_ok() { "ok" } else { "FAILED" }.to_string(),
            ]
        })
        .collect();
    let mut out = render_table(&["observation", "events", "intervals", "status"], &rows);

    let failed: Vec<&CheckEntry> = entries.iter().filter(|e| !e.is_ok()).collect();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Problems:");
        for entry in failed {
            for error in &entry.errors {
                let _ = writeln!(out, "- {error}");
            }
        }
    }
    out
}

/// Runs the check command. Fails when any observation has problems.
pub fn run<W: Write>(writer: &mut W, ctx: &AnalysisContext, json: bool) -> Result<()> {
    let entries = check(ctx)?;
    if json {
        writeln!(writer, "{}", format_json(&entries, &[])?)?;
    } else {
        write!(writer, "{}", format_check(&entries))?;
    }

    let failed = entries.iter().filter(|e| !e.is_ok()).count();
    if failed > 0 {
        bail!("{failed} of {} observations failed validation", entries.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::{
        BehaviorCode, BehaviorType, Ethogram, EthogramEntry, Event, Observation, ObservationKind,
    };
    use insta::assert_snapshot;
    use rust_decimal_macros::dec;

    fn code(s: &str) -> BehaviorCode {
        BehaviorCode::new(s).unwrap()
    }

    fn context() -> AnalysisContext {
        let ethogram = Ethogram::new([EthogramEntry::new(code("rest"), BehaviorType::State)]);
        let good = Observation::new(
            ObservationId::new("good").unwrap(),
            ObservationKind::Live,
            vec![
                Event::new(dec!(0), "", code("rest")),
                Event::new(dec!(5), "", code("rest")),
            ],
        );
        let open = Observation::new(
            ObservationId::new("open").unwrap(),
            ObservationKind::Live,
            vec![Event::new(dec!(2), "", code("rest"))],
        );
        let unknown = Observation::new(
            ObservationId::new("typo").unwrap(),
            ObservationKind::Live,
            vec![Event::new(dec!(1), "", code("rset"))],
        );
        AnalysisContext::new(ethogram, [good, open, unknown])
    }

    #[test]
    fn check_lists_every_problem() {
        let entries = check(&context()).unwrap();
        assert_snapshot!(format_check(&entries), @r#"
        observation  events  intervals  status
        -----------  ------  ---------  ------
        good         2       1          ok
        open         1       0          FAILED
        typo         1       0          FAILED

        Problems:
        - unpaired state event in observation open: No focal subject / rest [] at 2
        - behavior "rset" in observation typo is not defined in the ethogram
        "#);
    }

    #[test]
    fn run_fails_when_any_observation_fails() {
        let mut out = Vec::new();
        let err = run(&mut out, &context(), false).unwrap_err();
        assert_eq!(err.to_string(), "2 of 3 observations failed validation");
        assert!(!out.is_empty());
    }
}
