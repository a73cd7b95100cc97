//! Restricting aggregated intervals to an analysis window.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregatedEvent, AggregatedTable};
use crate::ethogram::BehaviorType;
use crate::event::Observation;
use crate::types::ValidationError;

/// Closed analysis window `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub min: Decimal,
    pub max: Decimal,
}

impl TimeWindow {
    pub fn new(min: Decimal, max: Decimal) -> Result<Self, ValidationError> {
        if min > max {
            return Err(ValidationError::InvalidWindow {
                start: min,
                stop: max,
            });
        }
        Ok(Self { min, max })
    }

    pub fn length(&self) -> Decimal {
        self.max - self.min
    }
}

/// How the analysis window of an observation is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// `[0, observation length]`, or the coding interval when one is set.
    #[default]
    FullObservation,
    /// From the first to the last recorded event.
    Events,
    /// User-supplied bounds.
    Arbitrary { start: Decimal, stop: Decimal },
}

impl WindowPolicy {
    /// Resolve the window for one observation.
    ///
    /// Returns `Ok(None)` when the observation has no events to derive bounds
    /// from.
    pub fn resolve(
        &self,
        observation: &Observation,
    ) -> Result<Option<TimeWindow>, ValidationError> {
        match *self {
            Self::FullObservation => {
                if let Some(interval) = observation.coding_interval {
                    return TimeWindow::new(interval.start, interval.stop).map(Some);
                }
                observation
                    .length()
                    .map(|len| TimeWindow::new(Decimal::ZERO.min(len), len))
                    .transpose()
            }
            Self::Events => match (observation.first_event_time(), observation.last_event_time()) {
                (Some(first), Some(last)) => TimeWindow::new(first, last).map(Some),
                _ => Ok(None),
            },
            Self::Arbitrary { start, stop } => TimeWindow::new(start, stop).map(Some),
        }
    }
}

/// Clip one interval; `None` when it lies outside the window.
///
/// Points are kept iff `min <= t <= max`. State intervals touching the window
/// only at a bound carry no time inside it and are dropped, as are states
/// clamped to zero length by a zero-width window.
pub fn clip_event(event: &AggregatedEvent, window: TimeWindow) -> Option<AggregatedEvent> {
    match event.kind {
        BehaviorType::Point => {
            (event.start >= window.min && event.start <= window.max).then(|| event.clone())
        }
        BehaviorType::State => {
            if event.stop <= window.min || event.start >= window.max {
                return None;
            }
            let mut clipped = event.clone();
            clipped.start = event.start.max(window.min);
            clipped.stop = event.stop.min(window.max);
            // A zero-width window would leave an empty state behind.
            if clipped.stop <= clipped.start && event.start < event.stop {
                return None;
            }
            Some(clipped)
        }
    }
}

/// Clip every row of a table to one window. Idempotent.
pub fn clip_table(table: &AggregatedTable, window: TimeWindow) -> AggregatedTable {
    table.filter_map(|event| clip_event(event, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CodingInterval, Event, ObservationKind};
    use crate::types::{BehaviorCode, ObservationId, Subject};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn state(start: Decimal, stop: Decimal) -> AggregatedEvent {
        AggregatedEvent {
            observation: ObservationId::new("o").unwrap(),
            subject: Subject::no_focal(),
            behavior: BehaviorCode::new("rest").unwrap(),
            kind: BehaviorType::State,
            modifiers: String::new(),
            start,
            stop,
            comment_start: String::new(),
            comment_stop: String::new(),
        }
    }

    fn point(t: Decimal) -> AggregatedEvent {
        AggregatedEvent {
            kind: BehaviorType::Point,
            behavior: BehaviorCode::new("bite").unwrap(),
            ..state(t, t)
        }
    }

    fn window(min: Decimal, max: Decimal) -> TimeWindow {
        TimeWindow::new(min, max).unwrap()
    }

    #[test]
    fn straddling_intervals_are_truncated() {
        let w = window(dec!(10), dec!(20));
        let left = clip_event(&state(dec!(5), dec!(15)), w).unwrap();
        assert_eq!((left.start, left.stop), (dec!(10), dec!(15)));
        let right = clip_event(&state(dec!(15), dec!(25)), w).unwrap();
        assert_eq!((right.start, right.stop), (dec!(15), dec!(20)));
        let both = clip_event(&state(dec!(0), dec!(30)), w).unwrap();
        assert_eq!((both.start, both.stop), (dec!(10), dec!(20)));
    }

    #[test]
    fn inside_intervals_are_unchanged() {
        let event = state(dec!(11), dec!(12));
        assert_eq!(clip_event(&event, window(dec!(10), dec!(20))), Some(event));
    }

    #[test]
    fn outside_intervals_are_dropped() {
        let w = window(dec!(10), dec!(20));
        assert_eq!(clip_event(&state(dec!(0), dec!(5)), w), None);
        assert_eq!(clip_event(&state(dec!(0), dec!(10)), w), None);
        assert_eq!(clip_event(&state(dec!(20), dec!(21)), w), None);
    }

    #[test]
    fn zero_width_window_drops_covering_state() {
        let w = window(dec!(9.8), dec!(9.8));
        assert_eq!(clip_event(&state(dec!(9.7), dec!(13.1)), w), None);
        assert!(clip_event(&point(dec!(9.8)), w).is_some());

        let mut table = AggregatedTable::new();
        table.insert(state(dec!(9.7), dec!(13.1)));
        let once = clip_table(&table, w);
        assert!(once.is_empty());
        assert_eq!(clip_table(&once, w), once);
    }

    #[test]
    fn points_on_bounds_are_kept() {
        let w = window(dec!(10), dec!(20));
        assert!(clip_event(&point(dec!(10)), w).is_some());
        assert!(clip_event(&point(dec!(20)), w).is_some());
        assert!(clip_event(&point(dec!(20.001)), w).is_none());
    }

    #[test]
    fn inverted_window_is_rejected() {
        assert_eq!(
            TimeWindow::new(dec!(2), dec!(1)),
            Err(ValidationError::InvalidWindow {
                start: dec!(2),
                stop: dec!(1)
            })
        );
    }

    fn observation() -> Observation {
        let rest = BehaviorCode::new("rest").unwrap();
        Observation::new(
            ObservationId::new("o").unwrap(),
            ObservationKind::Media,
            vec![
                Event::new(dec!(3), "", rest.clone()),
                Event::new(dec!(8), "", rest),
            ],
        )
    }

    #[test]
    fn window_policies_resolve() {
        let mut obs = observation();
        obs.media_lengths = vec![dec!(60)];

        assert_eq!(
            WindowPolicy::FullObservation.resolve(&obs).unwrap(),
            Some(window(dec!(0), dec!(60)))
        );
        assert_eq!(
            WindowPolicy::Events.resolve(&obs).unwrap(),
            Some(window(dec!(3), dec!(8)))
        );
        assert_eq!(
            WindowPolicy::Arbitrary {
                start: dec!(1),
                stop: dec!(2)
            }
            .resolve(&obs)
            .unwrap(),
            Some(window(dec!(1), dec!(2)))
        );

        obs.coding_interval = Some(CodingInterval {
            start: dec!(5),
            stop: dec!(50),
        });
        assert_eq!(
            WindowPolicy::FullObservation.resolve(&obs).unwrap(),
            Some(window(dec!(5), dec!(50)))
        );
    }

    #[test]
    fn events_policy_without_events_is_none() {
        let mut obs = observation();
        obs.events.clear();
        assert_eq!(WindowPolicy::Events.resolve(&obs).unwrap(), None);
        assert_eq!(WindowPolicy::FullObservation.resolve(&obs).unwrap(), None);
    }

    proptest! {
        #[test]
        fn clipping_is_idempotent(
            spans in prop::collection::vec((0i64..200, 0i64..50, any::<bool>()), 0..20),
            lo in 0i64..150,
            len in 0i64..100,
        ) {
            let mut table = AggregatedTable::new();
            for (start, span, is_point) in spans {
                let start = Decimal::new(start, 1);
                let event = if is_point {
                    point(start)
                } else {
                    state(start, start + Decimal::new(span + 1, 1))
                };
                table.insert(event);
            }
            let w = window(Decimal::new(lo, 1), Decimal::new(lo + len, 1));
            let once = clip_table(&table, w);
            let twice = clip_table(&once, w);
            prop_assert_eq!(once, twice);
        }
    }
}
