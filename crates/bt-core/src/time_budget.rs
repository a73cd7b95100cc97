//! Time budget: duration, occurrences, mean, stdev and proportion of time.
//!
//! Proportion uses one denominator for plain and binned budgets: the summed
//! window length minus the time covered by the union of the subject's
//! excluded behaviors inside the window. Excluded time is never removed from
//! any behavior's own duration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::{AggregatedEvent, AggregatedTable};
use crate::clip::{TimeWindow, clip_table};
use crate::ethogram::{BehaviorType, Ethogram};
use crate::interval::IntervalSet;
use crate::stat::{Stat, mean, sample_stdev};
use crate::types::{BehaviorCode, ObservationId, Subject, ValidationError};

/// User selection for a time budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeBudgetParams {
    pub subjects: Vec<Subject>,
    pub behaviors: Vec<BehaviorCode>,
    /// Behaviors whose time is taken out of the proportion denominator.
    pub excluded: Vec<BehaviorCode>,
    /// Report one row per modifier combination.
    pub include_modifiers: bool,
}

/// One line of a time budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBudgetRow {
    pub subject: Subject,
    pub behavior: BehaviorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<String>,
    #[serde(rename = "type")]
    pub kind: BehaviorType,
    pub duration: Stat,
    pub occurrences: Stat,
    pub mean: Stat,
    pub stdev: Stat,
    pub proportion: Stat,
}

/// A time budget line for one bin of one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinnedTimeBudgetRow {
    pub observation: ObservationId,
    pub bin_start: Decimal,
    pub bin_stop: Decimal,
    #[serde(flatten)]
    pub row: TimeBudgetRow,
}

/// Compute the budget over the given observations, pooled.
///
/// `table` must already be clipped to each observation's window; `windows`
/// selects the observations and supplies the denominators. Behaviors the
/// ethogram does not define are skipped.
pub fn time_budget(
    table: &AggregatedTable,
    ethogram: &Ethogram,
    windows: &BTreeMap<ObservationId, TimeWindow>,
    params: &TimeBudgetParams,
) -> Vec<TimeBudgetRow> {
    let total_window: Decimal = windows.values().map(TimeWindow::length).sum();
    let mut rows = Vec::new();

    for subject in &params.subjects {
        let denominator = denominator(table, windows, subject, &params.excluded, total_window);

        for behavior in &params.behaviors {
            let Some(kind) = ethogram.behavior_type(behavior) else {
                tracing::warn!(behavior = %behavior, "behavior not in ethogram, skipped");
                continue;
            };

            let events: Vec<&AggregatedEvent> = windows
                .keys()
                .flat_map(|obs| table.for_behavior(obs, subject, behavior))
                .collect();

            if params.include_modifiers {
                let mut groups: BTreeMap<&str, Vec<&AggregatedEvent>> = BTreeMap::new();
                for event in &events {
                    groups.entry(event.modifiers.as_str()).or_default().push(event);
                }
                for key in table.unpaired_keys().filter(|k| {
                    windows.contains_key(&k.observation)
                        && &k.subject == subject
                        && &k.behavior == behavior
                }) {
                    groups.entry(key.modifiers.as_str()).or_default();
                }
                if groups.is_empty() {
                    groups.insert("", Vec::new());
                }

                for (modifiers, group) in groups {
                    let unpaired = table.unpaired_keys().any(|k| {
                        windows.contains_key(&k.observation)
                            && &k.subject == subject
                            && &k.behavior == behavior
                            && k.modifiers == modifiers
                    });
                    rows.push(build_row(
                        subject,
                        behavior,
                        Some(modifiers.to_string()),
                        kind,
                        &group,
                        unpaired,
                        denominator,
                    ));
                }
            } else {
                let unpaired = windows
                    .keys()
                    .any(|obs| table.has_unpaired(Some(obs), subject, behavior));
                rows.push(build_row(
                    subject, behavior, None, kind, &events, unpaired, denominator,
                ));
            }
        }
    }

    rows
}

/// Window length left after removing the subject's excluded time.
fn denominator(
    table: &AggregatedTable,
    windows: &BTreeMap<ObservationId, TimeWindow>,
    subject: &Subject,
    excluded: &[BehaviorCode],
    total_window: Decimal,
) -> Stat {
    if excluded.is_empty() {
        return Stat::Value(total_window);
    }
    let mut excluded_time = Decimal::ZERO;
    for (obs, window) in windows {
        if excluded
            .iter()
            .any(|b| table.has_unpaired(Some(obs), subject, b))
        {
            return Stat::Unpaired;
        }
        let set: IntervalSet = excluded
            .iter()
            .flat_map(|b| table.for_behavior(obs, subject, b))
            .map(AggregatedEvent::interval)
            .collect();
        excluded_time += set.clip(window.min, window.max).total_length();
    }
    Stat::Value(total_window - excluded_time)
}

fn build_row(
    subject: &Subject,
    behavior: &BehaviorCode,
    modifiers: Option<String>,
    kind: BehaviorType,
    events: &[&AggregatedEvent],
    unpaired: bool,
    denominator: Stat,
) -> TimeBudgetRow {
    let row = |duration, occurrences, mean, stdev, proportion| TimeBudgetRow {
        subject: subject.clone(),
        behavior: behavior.clone(),
        modifiers: modifiers.clone(),
        kind,
        duration,
        occurrences,
        mean,
        stdev,
        proportion,
    };

    if unpaired {
        return row(
            Stat::Unpaired,
            Stat::Unpaired,
            Stat::Unpaired,
            Stat::Unpaired,
            Stat::Unpaired,
        );
    }

    let occurrences = Stat::Value(Decimal::from(events.len()));
    match kind {
        BehaviorType::Point => row(
            Stat::NotApplicable,
            occurrences,
            Stat::NotApplicable,
            Stat::NotApplicable,
            Stat::NotApplicable,
        ),
        BehaviorType::State => {
            let durations: Vec<Decimal> = events.iter().filter_map(|e| e.duration()).collect();
            let total: Decimal = durations.iter().copied().sum();
            let proportion = Stat::Value(total).combine(denominator, |d, w| {
                if w > Decimal::ZERO { d.checked_div(w) } else { None }
            });
            row(
                Stat::Value(total),
                occurrences,
                mean(&durations).into(),
                sample_stdev(&durations).into(),
                proportion,
            )
        }
    }
}

/// Repeat the budget over fixed-width bins of every observation's window.
///
/// Bins run from `min` in steps of `bin_size`; the last bin is clipped to
/// `max`. A point exactly on an inner bin edge counts in the later bin.
pub fn time_budget_binned(
    table: &AggregatedTable,
    ethogram: &Ethogram,
    windows: &BTreeMap<ObservationId, TimeWindow>,
    params: &TimeBudgetParams,
    bin_size: Decimal,
) -> Result<Vec<BinnedTimeBudgetRow>, ValidationError> {
    if bin_size <= Decimal::ZERO {
        return Err(ValidationError::InvalidBinSize { value: bin_size });
    }

    let mut rows = Vec::new();
    for (observation, window) in windows {
        let own = table.restrict_to(observation);
        let mut bin_start = window.min;
        loop {
            let bin_stop = (bin_start + bin_size).min(window.max);
            let bin = TimeWindow {
                min: bin_start,
                max: bin_stop,
            };
            let last = bin_stop >= window.max;

            let mut clipped = clip_table(&own, bin);
            if !last {
                clipped = clipped
                    .filter_map(|e| (!(e.is_point() && e.start == bin_stop)).then(|| e.clone()));
            }
            let bin_windows = BTreeMap::from([(observation.clone(), bin)]);
            rows.extend(
                time_budget(&clipped, ethogram, &bin_windows, params)
                    .into_iter()
                    .map(|row| BinnedTimeBudgetRow {
                        observation: observation.clone(),
                        bin_start,
                        bin_stop,
                        row,
                    }),
            );

            if last || bin_start == bin_stop {
                break;
            }
            bin_start = bin_stop;
        }
    }
    Ok(rows)
}
