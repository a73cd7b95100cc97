//! Latency from a marker behavior to the next occurrence of a target behavior.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::{AggregatedEvent, AggregatedTable};
use crate::stat::{Stat, mean, sample_stdev};
use crate::types::{BehaviorCode, ObservationId, Subject};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyParams {
    pub subjects: Vec<Subject>,
    pub markers: Vec<BehaviorCode>,
    pub targets: Vec<BehaviorCode>,
    /// Accept target occurrences from any subject, not only the marker's.
    pub any_subject: bool,
}

/// Latency from one marker occurrence to one target behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyRow {
    pub observation: ObservationId,
    pub subject: Subject,
    pub marker: BehaviorCode,
    pub marker_time: Stat,
    pub target: BehaviorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_subject: Option<Subject>,
    pub latency: Stat,
}

/// Latencies pooled over observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub subject: Subject,
    pub marker: BehaviorCode,
    pub target: BehaviorCode,
    pub count: Stat,
    pub mean: Stat,
    pub stdev: Stat,
}

/// One row per marker start and target behavior.
///
/// The latency is measured to the first target start at or after the marker
/// start; `NA` when no target follows. Unpaired streams on either side make
/// the latency `UNPAIRED`.
pub fn latency(
    table: &AggregatedTable,
    observations: &[ObservationId],
    params: &LatencyParams,
) -> Vec<LatencyRow> {
    let mut rows = Vec::new();
    for observation in observations {
        for subject in &params.subjects {
            for marker in &params.markers {
                let mut starts: Vec<Decimal> = table
                    .for_behavior(observation, subject, marker)
                    .map(|e| e.start)
                    .collect();
                starts.sort();
                let marker_unpaired = table.has_unpaired(Some(observation), subject, marker);

                for target in &params.targets {
                    let candidates =
                        target_candidates(table, observation, subject, target, params.any_subject);
                    let target_unpaired = if params.any_subject {
                        table
                            .unpaired_keys()
                            .any(|k| &k.observation == observation && &k.behavior == target)
                    } else {
                        table.has_unpaired(Some(observation), subject, target)
                    };

                    let row = |marker_time, target_subject, latency| LatencyRow {
                        observation: observation.clone(),
                        subject: subject.clone(),
                        marker: marker.clone(),
                        marker_time,
                        target: target.clone(),
                        target_subject,
                        latency,
                    };

                    if starts.is_empty() && marker_unpaired {
                        rows.push(row(Stat::Unpaired, None, Stat::Unpaired));
                        continue;
                    }

                    for &start in &starts {
                        if marker_unpaired || target_unpaired {
                            rows.push(row(Stat::Value(start), None, Stat::Unpaired));
                            continue;
                        }
                        let next = candidates.iter().find(|e| e.start >= start);
                        let target_subject = next
                            .filter(|_| params.any_subject)
                            .map(|e| e.subject.clone());
                        let latency: Stat = next.map(|e| e.start - start).into();
                        rows.push(row(Stat::Value(start), target_subject, latency));
                    }
                }
            }
        }
    }
    rows
}

/// Target occurrences ordered by start.
fn target_candidates<'a>(
    table: &'a AggregatedTable,
    observation: &ObservationId,
    subject: &Subject,
    target: &BehaviorCode,
    any_subject: bool,
) -> Vec<&'a AggregatedEvent> {
    let mut out: Vec<&AggregatedEvent> = table
        .events()
        .filter(|e| {
            &e.observation == observation
                && &e.behavior == target
                && (any_subject || &e.subject == subject)
        })
        .collect();
    out.sort_by(|a, b| a.start.cmp(&b.start));
    out
}

/// Pool rows by subject, marker and target.
pub fn summarize_latency(rows: &[LatencyRow]) -> Vec<LatencySummary> {
    let mut groups: BTreeMap<(&Subject, &BehaviorCode, &BehaviorCode), Vec<Stat>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((&row.subject, &row.marker, &row.target))
            .or_default()
            .push(row.latency);
    }

    groups
        .into_iter()
        .map(|((subject, marker, target), stats)| {
            let summary = |count, mean, stdev| LatencySummary {
                subject: subject.clone(),
                marker: marker.clone(),
                target: target.clone(),
                count,
                mean,
                stdev,
            };
            if stats.iter().any(|s| s.is_unpaired()) {
                return summary(Stat::Unpaired, Stat::Unpaired, Stat::Unpaired);
            }
            let values: Vec<Decimal> = stats.iter().filter_map(|s| s.value()).collect();
            summary(
                Stat::Value(Decimal::from(values.len())),
                mean(&values).into(),
                sample_stdev(&values).into(),
            )
        })
        .collect()
}
