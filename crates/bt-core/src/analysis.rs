//! Per-invocation analysis context.
//!
//! Each run rebuilds its aggregated table from the raw events. Nothing is
//! cached between runs and no table is shared until it is complete.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregatedTable, aggregate_observation};
use crate::clip::{TimeWindow, WindowPolicy, clip_table};
use crate::error::AnalysisError;
use crate::ethogram::Ethogram;
use crate::event::Observation;
use crate::types::{ObservationId, ValidationError};

/// What to do with an observation that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Leave the observation out and keep going.
    #[default]
    Skip,
    /// Stop the whole run on the first failure.
    Abort,
    /// Keep complete pairs of unpaired streams and flag them so derived
    /// statistics report `UNPAIRED`. Other failures are skipped.
    Annotate,
}

impl FailurePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Abort => "abort",
            Self::Annotate => "annotate",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            "annotate" => Ok(Self::Annotate),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// An observation left out of a run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationFailure {
    pub observation: ObservationId,
    pub error: String,
    #[serde(skip)]
    pub cause: AnalysisError,
}

/// A complete, immutable snapshot for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedRun {
    /// Intervals of every accepted observation, clipped to its window.
    pub table: AggregatedTable,
    /// Window of every accepted observation.
    pub windows: BTreeMap<ObservationId, TimeWindow>,
    pub failures: Vec<ObservationFailure>,
}

impl PreparedRun {
    /// Accepted observations in id order.
    pub fn observations(&self) -> Vec<ObservationId> {
        self.windows.keys().cloned().collect()
    }
}

/// One observation's aggregated table and window, if it had any events.
type Prepared = Option<(AggregatedTable, TimeWindow)>;

/// Inputs owned by one analysis invocation.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    ethogram: Ethogram,
    observations: BTreeMap<ObservationId, Observation>,
    policy: FailurePolicy,
    cancel: CancellationToken,
}

impl AnalysisContext {
    pub fn new(ethogram: Ethogram, observations: impl IntoIterator<Item = Observation>) -> Self {
        Self {
            ethogram,
            observations: observations.into_iter().map(|o| (o.id.clone(), o)).collect(),
            policy: FailurePolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub const fn ethogram(&self) -> &Ethogram {
        &self.ethogram
    }

    pub const fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn observation_ids(&self) -> impl Iterator<Item = &ObservationId> {
        self.observations.keys()
    }

    pub fn observation(&self, id: &ObservationId) -> Result<&Observation, ValidationError> {
        self.observations
            .get(id)
            .ok_or_else(|| ValidationError::UnknownObservation {
                observation: id.to_string(),
            })
    }

    /// Validate, aggregate and clip the selected observations.
    ///
    /// An empty selection means every observation. Observations are processed
    /// in parallel; cancellation is checked before each one. Failures are
    /// handled according to the context's [`FailurePolicy`].
    pub fn prepare(
        &self,
        selection: &[ObservationId],
        window: &WindowPolicy,
    ) -> Result<PreparedRun, AnalysisError> {
        let selected: Vec<&Observation> = if selection.is_empty() {
            self.observations.values().collect()
        } else {
            selection
                .iter()
                .map(|id| self.observation(id))
                .collect::<Result<_, _>>()?
        };

        let outcomes: Vec<(&ObservationId, Result<Prepared, ValidationError>)> = selected
            .par_iter()
            .map(|obs| {
                if self.cancel.is_cancelled() {
                    return Err(AnalysisError::Cancelled);
                }
                Ok((&obs.id, self.prepare_one(obs, window)))
            })
            .collect::<Result<_, _>>()?;

        if self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let mut run = PreparedRun::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some((table, window))) => {
                    run.table.merge(table);
                    run.windows.insert(id.clone(), window);
                }
                Ok(None) => {
                    tracing::debug!(observation = %id, "no events to derive a window from");
                }
                Err(err) if self.policy == FailurePolicy::Abort => {
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(observation = %id, error = %err, "observation skipped");
                    run.failures.push(ObservationFailure {
                        observation: id.clone(),
                        error: err.to_string(),
                        cause: err.into(),
                    });
                }
            }
        }

        tracing::info!(
            observations = run.windows.len(),
            failures = run.failures.len(),
            policy = %self.policy,
            "analysis table prepared"
        );
        Ok(run)
    }

    /// [`prepare`](Self::prepare) for analyses that need rows from every
    /// selected observation, such as agreement between two codings.
    ///
    /// A selected observation left without rows is `DataUnavailable` and
    /// goes through the failure policy like any other failure.
    pub fn prepare_coded(
        &self,
        selection: &[ObservationId],
        window: &WindowPolicy,
    ) -> Result<PreparedRun, AnalysisError> {
        let mut run = self.prepare(selection, window)?;
        let selected: Vec<ObservationId> = if selection.is_empty() {
            self.observations.keys().cloned().collect()
        } else {
            selection.to_vec()
        };

        for id in selected {
            if run.failures.iter().any(|f| f.observation == id) {
                continue;
            }
            if run.windows.contains_key(&id) && !run.table.for_observation(&id).is_empty() {
                continue;
            }
            let err = AnalysisError::DataUnavailable {
                observation: id.to_string(),
            };
            if self.policy == FailurePolicy::Abort {
                return Err(err);
            }
            tracing::warn!(observation = %id, error = %err, "observation skipped");
            run.windows.remove(&id);
            run.failures.push(ObservationFailure {
                observation: id,
                error: err.to_string(),
                cause: err,
            });
        }
        Ok(run)
    }

    fn prepare_one(
        &self,
        observation: &Observation,
        window: &WindowPolicy,
    ) -> Result<Prepared, ValidationError> {
        let aggregate = aggregate_observation(observation, &self.ethogram)?;
        let annotate = self.policy == FailurePolicy::Annotate;
        match aggregate.unpaired.first() {
            Some(first) if !annotate => return Err(first.clone()),
            _ => {}
        }

        let Some(window) = window.resolve(observation)? else {
            return Ok(None);
        };

        let mut table = AggregatedTable::new();
        table.add_observation(aggregate, annotate);
        tracing::debug!(
            observation = %observation.id,
            rows = table.len(),
            "observation aggregated"
        );
        Ok(Some((clip_table(&table, window), window)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethogram::{BehaviorType, EthogramEntry};
    use crate::event::{Event, ObservationKind};
    use crate::stat::Stat;
    use crate::time_budget::{TimeBudgetParams, time_budget};
    use crate::types::{BehaviorCode, Subject};
    use rust_decimal_macros::dec;

    fn code(s: &str) -> BehaviorCode {
        BehaviorCode::new(s).unwrap()
    }

    fn id(s: &str) -> ObservationId {
        ObservationId::new(s).unwrap()
    }

    fn ethogram() -> Ethogram {
        Ethogram::new([
            EthogramEntry::new(code("rest"), BehaviorType::State),
            EthogramEntry::new(code("feed"), BehaviorType::State),
        ])
    }

    fn paired() -> Observation {
        Observation::new(
            id("good"),
            ObservationKind::Live,
            vec![
                Event::new(dec!(0.0), "", code("rest")),
                Event::new(dec!(5.0), "", code("rest")),
                Event::new(dec!(5.0), "", code("feed")),
                Event::new(dec!(9.0), "", code("feed")),
            ],
        )
    }

    fn unpaired() -> Observation {
        Observation::new(
            id("bad"),
            ObservationKind::Live,
            vec![
                Event::new(dec!(1.0), "", code("feed")),
                Event::new(dec!(2.0), "", code("feed")),
                Event::new(dec!(3.0), "", code("rest")),
            ],
        )
    }

    fn context(policy: FailurePolicy) -> AnalysisContext {
        AnalysisContext::new(ethogram(), [paired(), unpaired()]).with_policy(policy)
    }

    #[test]
    fn skip_mode_excludes_unpaired_observation_only() {
        let run = context(FailurePolicy::Skip)
            .prepare(&[], &WindowPolicy::FullObservation)
            .unwrap();

        assert_eq!(run.observations(), vec![id("good")]);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].observation, id("bad"));
        assert!(matches!(
            run.failures[0].cause,
            AnalysisError::Validation(ValidationError::Unpaired { .. })
        ));
        assert_eq!(run.table.len(), 2);
        assert!(run.table.for_observation(&id("bad")).is_empty());
    }

    #[test]
    fn abort_mode_halts_the_run() {
        let err = context(FailurePolicy::Abort)
            .prepare(&[], &WindowPolicy::FullObservation)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Validation(ValidationError::Unpaired { .. })
        ));
    }

    #[test]
    fn annotate_mode_propagates_unpaired_stats() {
        let run = context(FailurePolicy::Annotate)
            .prepare(&[id("bad")], &WindowPolicy::FullObservation)
            .unwrap();
        assert!(run.failures.is_empty());

        let rows = time_budget(
            &run.table,
            &ethogram(),
            &run.windows,
            &TimeBudgetParams {
                subjects: vec![Subject::no_focal()],
                behaviors: vec![code("feed"), code("rest")],
                ..TimeBudgetParams::default()
            },
        );
        assert_eq!(rows[0].duration, Stat::Value(dec!(1)));
        assert_eq!(rows[1].duration, Stat::Unpaired);
    }

    #[test]
    fn windows_are_resolved_and_applied() {
        let run = context(FailurePolicy::Skip)
            .prepare(
                &[id("good")],
                &WindowPolicy::Arbitrary {
                    start: dec!(2),
                    stop: dec!(6),
                },
            )
            .unwrap();
        let rows = run.table.rows();
        assert_eq!((rows[0].start, rows[0].stop), (dec!(2), dec!(5)));
        assert_eq!((rows[1].start, rows[1].stop), (dec!(5), dec!(6)));
    }

    #[test]
    fn unknown_observation_is_rejected() {
        let err = context(FailurePolicy::Skip)
            .prepare(&[id("missing")], &WindowPolicy::Events)
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Validation(ValidationError::UnknownObservation {
                observation: "missing".into()
            })
        );
    }

    #[test]
    fn cancelled_context_returns_no_table() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = context(FailurePolicy::Skip)
            .with_cancellation(cancel)
            .prepare(&[], &WindowPolicy::FullObservation)
            .unwrap_err();
        assert_eq!(err, AnalysisError::Cancelled);
    }

    #[test]
    fn each_run_rebuilds_from_raw_events() {
        let ctx = context(FailurePolicy::Skip);
        let first = ctx.prepare(&[], &WindowPolicy::Events).unwrap();
        let second = ctx.prepare(&[], &WindowPolicy::Events).unwrap();
        assert_eq!(first, second);
    }

    fn with_empty(policy: FailurePolicy) -> AnalysisContext {
        let empty = Observation::new(id("empty"), ObservationKind::Live, Vec::new());
        AnalysisContext::new(ethogram(), [paired(), empty]).with_policy(policy)
    }

    #[test]
    fn coded_run_reports_observation_without_rows() {
        let selection = [id("good"), id("empty")];
        let plain = with_empty(FailurePolicy::Skip)
            .prepare(&selection, &WindowPolicy::FullObservation)
            .unwrap();
        assert!(plain.failures.is_empty());

        let run = with_empty(FailurePolicy::Skip)
            .prepare_coded(&selection, &WindowPolicy::FullObservation)
            .unwrap();
        assert_eq!(run.observations(), vec![id("good")]);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].observation, id("empty"));
        assert_eq!(
            run.failures[0].cause,
            AnalysisError::DataUnavailable {
                observation: "empty".into()
            }
        );

        let err = with_empty(FailurePolicy::Abort)
            .prepare_coded(&selection, &WindowPolicy::FullObservation)
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::DataUnavailable {
                observation: "empty".into()
            }
        );
    }

    #[test]
    fn coded_run_drops_window_emptied_by_clipping() {
        let run = context(FailurePolicy::Skip)
            .prepare_coded(
                &[id("good")],
                &WindowPolicy::Arbitrary {
                    start: dec!(20),
                    stop: dec!(30),
                },
            )
            .unwrap();
        assert!(run.observations().is_empty());
        assert_eq!(
            run.failures[0].error,
            "observation good has no recorded events in the analysis window"
        );
    }

    #[test]
    fn failure_policy_parses_case_insensitively() {
        assert_eq!("ANNOTATE".parse::<FailurePolicy>(), Ok(FailurePolicy::Annotate));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }
}
