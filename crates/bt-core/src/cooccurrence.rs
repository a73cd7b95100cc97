//! Behavior co-occurrence: how long every combination of behaviors overlaps.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::AggregatedTable;
use crate::interval::IntervalSet;
use crate::stat::Stat;
use crate::types::{BehaviorCode, ObservationId, Subject};

/// Overlap of one behavior combination for one subject in one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooccurrenceRow {
    pub observation: ObservationId,
    pub subject: Subject,
    pub behaviors: Vec<BehaviorCode>,
    pub duration: Stat,
}

/// Co-occurrence totals across observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooccurrenceTotal {
    pub subject: Subject,
    pub behaviors: Vec<BehaviorCode>,
    pub duration: Stat,
}

/// All `k`-element combinations in lexical index order.
pub fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    let n = items.len();
    if k == 0 || k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.iter().map(|&i| items[i].clone()).collect());

        // Rightmost index that can still move forward.
        let Some(pos) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            return out;
        };
        idx[pos] += 1;
        for j in pos + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Intersect every k-combination (k = 2..=n) of the selected behaviors.
///
/// Subjects are processed per observation. Combinations involving a behavior
/// with unpaired events report `UNPAIRED`. With `hide_zero`, combinations with
/// zero overlap are left out.
pub fn cooccurrence(
    table: &AggregatedTable,
    observations: &[ObservationId],
    subjects: &[Subject],
    behaviors: &[BehaviorCode],
    hide_zero: bool,
) -> Vec<CooccurrenceRow> {
    let mut behaviors = behaviors.to_vec();
    behaviors.sort();
    behaviors.dedup();

    let combos: Vec<Vec<BehaviorCode>> = (2..=behaviors.len())
        .flat_map(|k| combinations(&behaviors, k))
        .collect();

    let mut rows = Vec::new();
    for observation in observations {
        for subject in subjects {
            let sets: BTreeMap<&BehaviorCode, IntervalSet> = behaviors
                .iter()
                .map(|b| {
                    let set: IntervalSet = table
                        .for_behavior(observation, subject, b)
                        .map(|e| e.interval())
                        .collect();
                    (b, set)
                })
                .collect();

            for combo in &combos {
                let unpaired = combo
                    .iter()
                    .any(|b| table.has_unpaired(Some(observation), subject, b));
                let duration = if unpaired {
                    Stat::Unpaired
                } else {
                    let overlap = combo
                        .iter()
                        .filter_map(|b| sets.get(b))
                        .fold(None::<IntervalSet>, |acc, set| {
                            Some(acc.map_or_else(|| set.clone(), |a| a.intersection(set)))
                        })
                        .unwrap_or_default();
                    Stat::Value(overlap.total_length())
                };

                if hide_zero && duration == Stat::Value(Decimal::ZERO) {
                    continue;
                }
                rows.push(CooccurrenceRow {
                    observation: observation.clone(),
                    subject: subject.clone(),
                    behaviors: combo.clone(),
                    duration,
                });
            }
        }
    }
    rows
}

/// Sum rows over observations, keyed by subject and combination.
pub fn total_by_combination(rows: &[CooccurrenceRow]) -> Vec<CooccurrenceTotal> {
    let mut totals: BTreeMap<(&Subject, &[BehaviorCode]), Stat> = BTreeMap::new();
    for row in rows {
        totals
            .entry((&row.subject, row.behaviors.as_slice()))
            .and_modify(|acc| *acc = acc.combine(row.duration, |a, b| Some(a + b)))
            .or_insert(row.duration);
    }
    totals
        .into_iter()
        .map(|((subject, behaviors), duration)| CooccurrenceTotal {
            subject: subject.clone(),
            behaviors: behaviors.to_vec(),
            duration,
        })
        .collect()
}
