//! Inter-rater reliability between two codings of the same session.
//!
//! Both measures sample a shared time axis every `interval` seconds, from the
//! earliest first event to the latest last event of the two observations. At
//! each tick a subject's state is the sorted set of behavior labels active at
//! that tick: state intervals covering it, plus point occurrences `p` with
//! `t - interval/2 <= p < t + interval/2`.

use std::collections::HashMap;
use std::hash::Hash;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregatedTable;
use crate::error::AnalysisError;
use crate::types::{BehaviorCode, ObservationId, Subject, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrrParams {
    pub subjects: Vec<Subject>,
    pub behaviors: Vec<BehaviorCode>,
    /// Sampling step in seconds.
    pub interval: Decimal,
    /// Label active behaviors as `behavior|modifiers`.
    pub include_modifiers: bool,
}

impl IrrParams {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.interval <= Decimal::ZERO {
            return Err(ValidationError::InvalidInterval {
                value: self.interval,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrrMeasure {
    Kappa,
    Identity,
}

/// Agreement between one pair of observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairAgreement {
    pub first: ObservationId,
    pub second: ObservationId,
    pub interval: Decimal,
    pub subjects: Vec<Subject>,
    pub ticks: usize,
    pub measure: IrrMeasure,
    /// Cohen's kappa, or identity in percent.
    pub value: Decimal,
}

/// Symmetric observation × observation agreement matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrrMatrix {
    pub measure: IrrMeasure,
    pub observations: Vec<ObservationId>,
    pub values: Vec<Vec<Decimal>>,
}

/// Hash-consed codes for distinct tick states, assigned on first sight.
#[derive(Debug)]
struct Vocabulary<K> {
    codes: HashMap<K, usize>,
}

impl<K: Hash + Eq> Vocabulary<K> {
    fn new() -> Self {
        Self {
            codes: HashMap::new(),
        }
    }

    fn intern(&mut self, key: K) -> usize {
        let next = self.codes.len();
        *self.codes.entry(key).or_insert(next)
    }

    fn len(&self) -> usize {
        self.codes.len()
    }
}

/// One occurrence reduced to what sampling needs.
struct Track {
    label: String,
    point: bool,
    start: Decimal,
    stop: Decimal,
}

fn tracks(
    table: &AggregatedTable,
    observation: &ObservationId,
    subject: &Subject,
    params: &IrrParams,
) -> Vec<Track> {
    params
        .behaviors
        .iter()
        .flat_map(|b| table.for_behavior(observation, subject, b))
        .map(|e| Track {
            label: if params.include_modifiers {
                format!("{}|{}", e.behavior, e.modifiers)
            } else {
                e.behavior.to_string()
            },
            point: e.is_point(),
            start: e.start,
            stop: e.stop,
        })
        .collect()
}

fn active(tracks: &[Track], t: Decimal, half: Decimal) -> Vec<String> {
    let mut labels: Vec<String> = tracks
        .iter()
        .filter(|tr| {
            if tr.point {
                t - half <= tr.start && tr.start < t + half
            } else {
                tr.start <= t && t < tr.stop
            }
        })
        .map(|tr| tr.label.clone())
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

/// Sampling instants `first, first + step, ...` up to and including `last`.
pub fn ticks(first: Decimal, last: Decimal, step: Decimal) -> Vec<Decimal> {
    let mut out = Vec::new();
    if step <= Decimal::ZERO {
        return out;
    }
    let mut t = first;
    while t <= last {
        out.push(t);
        t += step;
    }
    out
}

fn time_axis(
    table: &AggregatedTable,
    first: &ObservationId,
    second: &ObservationId,
) -> Result<(Decimal, Decimal), AnalysisError> {
    let bounds = |obs: &ObservationId| match (table.first_time(obs), table.last_time(obs)) {
        (Some(lo), Some(hi)) => Ok((lo, hi)),
        _ => Err(AnalysisError::DataUnavailable {
            observation: obs.to_string(),
        }),
    };
    let (lo_a, hi_a) = bounds(first)?;
    let (lo_b, hi_b) = bounds(second)?;
    Ok((lo_a.min(lo_b), hi_a.max(hi_b)))
}

fn warn_unpaired(table: &AggregatedTable, observations: [&ObservationId; 2], params: &IrrParams) {
    for obs in observations {
        let unpaired = params.subjects.iter().any(|s| {
            params
                .behaviors
                .iter()
                .any(|b| table.has_unpaired(Some(obs), s, b))
        });
        if unpaired {
            tracing::warn!(observation = %obs, "unpaired events ignored in agreement");
        }
    }
}

/// Time-unit Cohen's kappa between two observations.
///
/// Every (tick, subject) contributes one pair of state codes to the
/// contingency table. Kappa is 1 when the chance-corrected denominator is 0.
pub fn cohen_kappa(
    table: &AggregatedTable,
    first: &ObservationId,
    second: &ObservationId,
    params: &IrrParams,
) -> Result<PairAgreement, AnalysisError> {
    params.validate()?;
    let (lo, hi) = time_axis(table, first, second)?;
    warn_unpaired(table, [first, second], params);

    let axis = ticks(lo, hi, params.interval);
    let half = params.interval / Decimal::TWO;

    let mut vocabulary = Vocabulary::new();
    let mut pairs = Vec::with_capacity(axis.len() * params.subjects.len());
    for subject in &params.subjects {
        let tracks_a = tracks(table, first, subject, params);
        let tracks_b = tracks(table, second, subject, params);
        for &t in &axis {
            let a = vocabulary.intern(active(&tracks_a, t, half));
            let b = vocabulary.intern(active(&tracks_b, t, half));
            pairs.push((a, b));
        }
    }

    let n = vocabulary.len();
    let mut contingency = vec![vec![0u64; n]; n];
    for (a, b) in pairs.iter().copied() {
        let cell = contingency
            .get_mut(a)
            .and_then(|row| row.get_mut(b))
            .ok_or_else(|| {
                AnalysisError::Computation(format!("contingency index ({a}, {b}) out of {n}"))
            })?;
        *cell += 1;
    }

    let kappa = kappa_from_contingency(&contingency);
    tracing::debug!(
        first = %first,
        second = %second,
        ticks = axis.len(),
        states = n,
        kappa = %kappa,
        "cohen kappa"
    );

    Ok(PairAgreement {
        first: first.clone(),
        second: second.clone(),
        interval: params.interval,
        subjects: params.subjects.clone(),
        ticks: axis.len(),
        measure: IrrMeasure::Kappa,
        value: kappa,
    })
}

/// `(trace - e) / (total - e)` with `e = Σ row_i · col_i / total`.
fn kappa_from_contingency(contingency: &[Vec<u64>]) -> Decimal {
    let n = contingency.len();
    let total: u64 = contingency.iter().flatten().sum();
    let trace: u64 = (0..n).map(|i| contingency[i][i]).sum();
    if total == 0 {
        return Decimal::ONE;
    }

    let total = Decimal::from(total);
    let expected: Decimal = (0..n)
        .map(|i| {
            let row: u64 = contingency[i].iter().sum();
            let col: u64 = contingency.iter().map(|r| r[i]).sum();
            Decimal::from(row) * Decimal::from(col) / total
        })
        .sum();

    let denominator = total - expected;
    if denominator.is_zero() {
        return Decimal::ONE;
    }
    (Decimal::from(trace) - expected) / denominator
}

/// Needleman-Wunsch identity between two observations.
///
/// Each tick becomes one symbol combining the states of all selected
/// subjects. Identity is the share of aligned positions holding equal
/// symbols, in percent.
pub fn needleman_wunsch_identity(
    table: &AggregatedTable,
    first: &ObservationId,
    second: &ObservationId,
    params: &IrrParams,
) -> Result<PairAgreement, AnalysisError> {
    params.validate()?;
    let (lo, hi) = time_axis(table, first, second)?;
    warn_unpaired(table, [first, second], params);

    let axis = ticks(lo, hi, params.interval);
    let half = params.interval / Decimal::TWO;

    let mut vocabulary = Vocabulary::new();
    let mut sequence = |obs: &ObservationId| -> Vec<usize> {
        let per_subject: Vec<Vec<Track>> = params
            .subjects
            .iter()
            .map(|s| tracks(table, obs, s, params))
            .collect();
        axis.iter()
            .map(|&t| {
                let symbol: Vec<Vec<String>> =
                    per_subject.iter().map(|tr| active(tr, t, half)).collect();
                vocabulary.intern(symbol)
            })
            .collect()
    };
    let seq_a = sequence(first);
    let seq_b = sequence(second);

    let identity = alignment_identity(&seq_a, &seq_b);
    tracing::debug!(
        first = %first,
        second = %second,
        ticks = axis.len(),
        identity = %identity,
        "needleman-wunsch identity"
    );

    Ok(PairAgreement {
        first: first.clone(),
        second: second.clone(),
        interval: params.interval,
        subjects: params.subjects.clone(),
        ticks: axis.len(),
        measure: IrrMeasure::Identity,
        value: identity,
    })
}

const MATCH: i64 = 1;
const MISMATCH: i64 = -1;
const GAP: i64 = -1;

/// One cell of the alignment grid: best score plus the length and match
/// count of the path that reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    score: i64,
    length: u64,
    matches: u64,
}

impl Cell {
    const ORIGIN: Self = Self {
        score: 0,
        length: 0,
        matches: 0,
    };

    fn step(self, score: i64, matched: bool) -> Self {
        Self {
            score,
            length: self.length + 1,
            matches: self.matches + u64::from(matched),
        }
    }

    fn gap(self) -> Self {
        self.step(self.score + GAP, false)
    }
}

/// Global alignment of `a` against `b`, returning `(length, matches)`.
///
/// Only two rows are kept. Ties prefer diagonal, then left (column step),
/// then up (row step), the same path a full-matrix backtrace would take.
fn align<T: PartialEq>(a: &[T], b: &[T]) -> (u64, u64) {
    let mut prev: Vec<Cell> = std::iter::successors(Some(Cell::ORIGIN), |c| Some(c.gap()))
        .take(b.len() + 1)
        .collect();
    let mut cur = Vec::with_capacity(b.len() + 1);
    for x in a {
        cur.clear();
        cur.push(prev[0].gap());
        for (j, y) in b.iter().enumerate() {
            let matched = x == y;
            let diagonal = prev[j].score + if matched { MATCH } else { MISMATCH };
            let left = cur[j].score + GAP;
            let up = prev[j + 1].score + GAP;
            let best = diagonal.max(left).max(up);
            let cell = if best == diagonal {
                prev[j].step(best, matched)
            } else if best == left {
                cur[j].gap()
            } else {
                prev[j + 1].gap()
            };
            cur.push(cell);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    let last = prev[b.len()];
    (last.length, last.matches)
}

/// Global alignment identity in percent; two empty sequences give 100.
pub fn alignment_identity<T: PartialEq>(a: &[T], b: &[T]) -> Decimal {
    let (length, matches) = align(a, b);
    if length == 0 {
        return Decimal::ONE_HUNDRED;
    }
    Decimal::from(matches) * Decimal::ONE_HUNDRED / Decimal::from(length)
}

/// Agreement for every pair of observations, computed in parallel.
///
/// The diagonal compares each observation with itself. Cancellation is
/// checked before each pair.
pub fn irr_matrix(
    table: &AggregatedTable,
    observations: &[ObservationId],
    params: &IrrParams,
    measure: IrrMeasure,
    cancel: &CancellationToken,
) -> Result<IrrMatrix, AnalysisError> {
    params.validate()?;
    let pairs: Vec<(usize, usize)> = (0..observations.len())
        .flat_map(|i| (i..observations.len()).map(move |j| (i, j)))
        .collect();

    let results: Vec<(usize, usize, Decimal)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            let (a, b) = (&observations[i], &observations[j]);
            let agreement = match measure {
                IrrMeasure::Kappa => cohen_kappa(table, a, b, params)?,
                IrrMeasure::Identity => needleman_wunsch_identity(table, a, b, params)?,
            };
            Ok((i, j, agreement.value))
        })
        .collect::<Result<_, _>>()?;

    let n = observations.len();
    let mut values = vec![vec![Decimal::ZERO; n]; n];
    for (i, j, value) in results {
        values[i][j] = value;
        values[j][i] = value;
    }

    Ok(IrrMatrix {
        measure,
        observations: observations.to_vec(),
        values,
    })
}
