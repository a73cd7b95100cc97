//! Interval aggregation.
//!
//! Turns tagged events into one interval per state occurrence (`[start, stop)`)
//! or point occurrence (`[t, t]`), stored in a composite-keyed table that is
//! rebuilt for every analysis run.

use std::collections::{BTreeSet, HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::ethogram::{BehaviorType, Ethogram};
use crate::event::Observation;
use crate::interval::Interval;
use crate::normalize::{EventFlag, TaggedEvent, normalize};
use crate::types::{BehaviorCode, ObservationId, Subject, ValidationError};

/// Identifies one event stream within one observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AggregateKey {
    pub observation: ObservationId,
    pub subject: Subject,
    pub behavior: BehaviorCode,
    pub modifiers: String,
}

/// One interval derived from paired or point raw events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedEvent {
    pub observation: ObservationId,
    pub subject: Subject,
    pub behavior: BehaviorCode,
    #[serde(rename = "type")]
    pub kind: BehaviorType,
    pub modifiers: String,
    pub start: Decimal,
    pub stop: Decimal,
    pub comment_start: String,
    pub comment_stop: String,
}

impl AggregatedEvent {
    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            observation: self.observation.clone(),
            subject: self.subject.clone(),
            behavior: self.behavior.clone(),
            modifiers: self.modifiers.clone(),
        }
    }

    pub fn is_point(&self) -> bool {
        self.kind == BehaviorType::Point
    }

    /// Length of a state occurrence; `None` for points.
    pub fn duration(&self) -> Option<Decimal> {
        match self.kind {
            BehaviorType::State => Some(self.stop - self.start),
            BehaviorType::Point => None,
        }
    }

    /// Closed-open for states, singleton for points.
    pub fn interval(&self) -> Interval {
        match self.kind {
            BehaviorType::State => Interval::closed_open(self.start, self.stop),
            BehaviorType::Point => Interval::singleton(self.start),
        }
    }
}

/// Aggregation output for one observation.
#[derive(Debug, Clone, Default)]
pub struct ObservationAggregate {
    pub events: Vec<AggregatedEvent>,
    /// One entry per stream ending with an unmatched START.
    pub unpaired: Vec<ValidationError>,
}

impl ObservationAggregate {
    pub fn is_paired(&self) -> bool {
        self.unpaired.is_empty()
    }
}

/// Build intervals for one observation.
///
/// Complete pairs are always returned; streams ending in an unmatched START are
/// reported in [`ObservationAggregate::unpaired`] instead of being closed.
pub fn aggregate_observation(
    observation: &Observation,
    ethogram: &Ethogram,
) -> Result<ObservationAggregate, ValidationError> {
    let tagged = normalize(observation, ethogram)?;

    // Group while keeping first-seen order so output is deterministic.
    let mut order: Vec<(&Subject, &BehaviorCode, &str)> = Vec::new();
    let mut streams: HashMap<(&Subject, &BehaviorCode, &str), Vec<TaggedEvent<'_>>> =
        HashMap::new();
    for t in &tagged {
        let key = (t.subject(), t.behavior(), t.modifiers());
        streams
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(*t);
    }

    let mut result = ObservationAggregate::default();
    for key in order {
        let Some(stream) = streams.get(&key) else {
            continue;
        };
        let (subject, behavior, modifiers) = key;
        let make = |kind, start: &TaggedEvent<'_>, stop: &TaggedEvent<'_>| AggregatedEvent {
            observation: observation.id.clone(),
            subject: subject.clone(),
            behavior: behavior.clone(),
            kind,
            modifiers: modifiers.to_string(),
            start: start.time,
            stop: stop.time,
            comment_start: start.event.comment.clone(),
            comment_stop: stop.event.comment.clone(),
        };

        let mut pending: Option<&TaggedEvent<'_>> = None;
        for t in stream {
            match t.flag {
                EventFlag::Point => result.events.push(make(BehaviorType::Point, t, t)),
                EventFlag::Start => pending = Some(t),
                EventFlag::Stop => {
                    if let Some(start) = pending.take() {
                        result.events.push(make(BehaviorType::State, start, t));
                    }
                }
            }
        }

        if let Some(start) = pending {
            tracing::debug!(
                observation = %observation.id,
                subject = %subject,
                behavior = %behavior,
                time = %start.time,
                "unpaired state event"
            );
            result.unpaired.push(ValidationError::Unpaired {
                observation: observation.id.to_string(),
                subject: subject.label().to_string(),
                behavior: behavior.to_string(),
                modifiers: modifiers.to_string(),
                time: start.time,
            });
        }
    }

    result.events.sort_by(|a, b| a.start.cmp(&b.start));
    Ok(result)
}

/// Composite-keyed interval table.
///
/// Supports exact (observation, subject, behavior, modifiers) lookup and
/// range-overlap queries. Rows under each key are kept sorted by start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedTable {
    rows: HashMap<AggregateKey, Vec<AggregatedEvent>>,
    unpaired: HashSet<AggregateKey>,
}

impl AggregatedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: AggregatedEvent) {
        let list = self.rows.entry(event.key()).or_default();
        let at = list.partition_point(|e| e.start <= event.start);
        list.insert(at, event);
    }

    pub fn mark_unpaired(&mut self, key: AggregateKey) {
        self.unpaired.insert(key);
    }

    /// Add one observation's aggregate. When `keep_unpaired` is set the
    /// offending streams are flagged; otherwise they are ignored.
    pub fn add_observation(&mut self, aggregate: ObservationAggregate, keep_unpaired: bool) {
        for event in aggregate.events {
            self.insert(event);
        }
        if !keep_unpaired {
            return;
        }
        for err in aggregate.unpaired {
            if let ValidationError::Unpaired {
                observation,
                subject,
                behavior,
                modifiers,
                ..
            } = err
            {
                let (Ok(observation), Ok(behavior)) =
                    (ObservationId::new(observation), BehaviorCode::new(behavior))
                else {
                    continue;
                };
                self.mark_unpaired(AggregateKey {
                    observation,
                    subject: Subject::new(subject),
                    behavior,
                    modifiers,
                });
            }
        }
    }

    /// Exact-key lookup.
    pub fn get(&self, key: &AggregateKey) -> &[AggregatedEvent] {
        self.rows.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn is_unpaired(&self, key: &AggregateKey) -> bool {
        self.unpaired.contains(key)
    }

    /// Whether any stream of this subject and behavior (any modifiers) is
    /// unpaired, optionally restricted to one observation.
    pub fn has_unpaired(
        &self,
        observation: Option<&ObservationId>,
        subject: &Subject,
        behavior: &BehaviorCode,
    ) -> bool {
        self.unpaired.iter().any(|k| {
            observation.is_none_or(|o| &k.observation == o)
                && &k.subject == subject
                && &k.behavior == behavior
        })
    }

    pub fn unpaired_keys(&self) -> impl Iterator<Item = &AggregateKey> {
        self.unpaired.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &AggregateKey> {
        self.rows.keys()
    }

    pub fn events(&self) -> impl Iterator<Item = &AggregatedEvent> {
        self.rows.values().flatten()
    }

    /// Events intersecting the closed range `[start, stop]`.
    pub fn overlapping(&self, start: Decimal, stop: Decimal) -> Vec<&AggregatedEvent> {
        let mut hits: Vec<_> = self
            .events()
            .filter(|e| e.start <= stop && e.stop >= start)
            .collect();
        sort_rows(&mut hits);
        hits
    }

    /// All events of one observation, ordered by start.
    pub fn for_observation(&self, observation: &ObservationId) -> Vec<&AggregatedEvent> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|(k, _)| &k.observation == observation)
            .flat_map(|(_, v)| v)
            .collect();
        sort_rows(&mut rows);
        rows
    }

    /// Events for one subject and behavior across all modifiers.
    pub fn for_behavior<'a>(
        &'a self,
        observation: &'a ObservationId,
        subject: &'a Subject,
        behavior: &'a BehaviorCode,
    ) -> impl Iterator<Item = &'a AggregatedEvent> + 'a {
        self.rows
            .iter()
            .filter(move |(k, _)| {
                &k.observation == observation && &k.subject == subject && &k.behavior == behavior
            })
            .flat_map(|(_, v)| v)
    }

    /// Every row ordered by observation, start, subject, behavior.
    pub fn rows(&self) -> Vec<&AggregatedEvent> {
        let mut rows: Vec<_> = self.events().collect();
        sort_rows(&mut rows);
        rows
    }

    pub fn observations(&self) -> BTreeSet<&ObservationId> {
        self.rows
            .keys()
            .chain(self.unpaired.iter())
            .map(|k| &k.observation)
            .collect()
    }

    pub fn subjects(&self) -> BTreeSet<&Subject> {
        self.rows
            .keys()
            .chain(self.unpaired.iter())
            .map(|k| &k.subject)
            .collect()
    }

    pub fn behaviors(&self) -> BTreeSet<&BehaviorCode> {
        self.rows
            .keys()
            .chain(self.unpaired.iter())
            .map(|k| &k.behavior)
            .collect()
    }

    /// Earliest start in an observation.
    pub fn first_time(&self, observation: &ObservationId) -> Option<Decimal> {
        self.rows
            .iter()
            .filter(|(k, _)| &k.observation == observation)
            .filter_map(|(_, v)| v.first().map(|e| e.start))
            .min()
    }

    /// Latest stop in an observation.
    pub fn last_time(&self, observation: &ObservationId) -> Option<Decimal> {
        self.rows
            .iter()
            .filter(|(k, _)| &k.observation == observation)
            .flat_map(|(_, v)| v.iter().map(|e| e.stop))
            .max()
    }

    /// Rebuild the table by mapping every row; `None` drops the row.
    /// Unpaired flags are carried over.
    #[must_use]
    pub fn filter_map(
        &self,
        mut f: impl FnMut(&AggregatedEvent) -> Option<AggregatedEvent>,
    ) -> Self {
        let mut table = Self {
            rows: HashMap::with_capacity(self.rows.len()),
            unpaired: self.unpaired.clone(),
        };
        for event in self.events() {
            if let Some(mapped) = f(event) {
                table.insert(mapped);
            }
        }
        table
    }

    /// Drop rows in place; keys left without rows are removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&AggregatedEvent) -> bool) {
        for events in self.rows.values_mut() {
            events.retain(&mut keep);
        }
        self.rows.retain(|_, events| !events.is_empty());
    }

    /// Move every row of `other` into this table.
    pub fn merge(&mut self, other: Self) {
        for (_, events) in other.rows {
            for event in events {
                self.insert(event);
            }
        }
        self.unpaired.extend(other.unpaired);
    }

    /// Keep only rows of the given observation.
    #[must_use]
    pub fn restrict_to(&self, observation: &ObservationId) -> Self {
        let mut table = self.filter_map(|e| (&e.observation == observation).then(|| e.clone()));
        table.unpaired.retain(|k| &k.observation == observation);
        table
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.values().all(Vec::is_empty)
    }
}

fn sort_rows(rows: &mut [&AggregatedEvent]) {
    rows.sort_by(|a, b| {
        (&a.observation, a.start, &a.subject, &a.behavior, &a.modifiers).cmp(&(
            &b.observation,
            b.start,
            &b.subject,
            &b.behavior,
            &b.modifiers,
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethogram::EthogramEntry;
    use crate::event::{Event, ObservationKind};
    use rust_decimal_macros::dec;

    fn code(s: &str) -> BehaviorCode {
        BehaviorCode::new(s).unwrap()
    }

    fn ethogram() -> Ethogram {
        Ethogram::new([
            EthogramEntry::new(code("rest"), BehaviorType::State),
            EthogramEntry::new(code("feed"), BehaviorType::State),
            EthogramEntry::new(code("bite"), BehaviorType::Point),
        ])
    }

    fn observation(id: &str, events: Vec<Event>) -> Observation {
        Observation::new(ObservationId::new(id).unwrap(), ObservationKind::Live, events)
    }

    fn rest_feed() -> Observation {
        observation(
            "o1",
            vec![
                Event::new(dec!(0.0), "", code("rest")),
                Event::new(dec!(5.0), "", code("rest")),
                Event::new(dec!(5.0), "", code("feed")),
                Event::new(dec!(9.0), "", code("feed")),
            ],
        )
    }

    #[test]
    fn pairs_become_closed_open_intervals() {
        let agg = aggregate_observation(&rest_feed(), &ethogram()).unwrap();
        assert!(agg.is_paired());
        assert_eq!(agg.events.len(), 2);

        let rest = &agg.events[0];
        assert_eq!(rest.behavior.as_str(), "rest");
        assert_eq!((rest.start, rest.stop), (dec!(0.0), dec!(5.0)));
        assert_eq!(rest.interval(), Interval::closed_open(dec!(0.0), dec!(5.0)));
        assert_eq!(rest.duration(), Some(dec!(5.0)));

        let feed = &agg.events[1];
        assert_eq!((feed.start, feed.stop), (dec!(5.0), dec!(9.0)));
    }

    #[test]
    fn points_become_singletons_without_duration() {
        let obs = observation("o1", vec![Event::new(dec!(3.25), "", code("bite"))]);
        let agg = aggregate_observation(&obs, &ethogram()).unwrap();
        let bite = &agg.events[0];
        assert!(bite.is_point());
        assert_eq!((bite.start, bite.stop), (dec!(3.25), dec!(3.25)));
        assert_eq!(bite.interval(), Interval::singleton(dec!(3.25)));
        assert_eq!(bite.duration(), None);
    }

    #[test]
    fn comments_follow_start_and_stop() {
        let obs = observation(
            "o1",
            vec![
                Event::new(dec!(1), "", code("rest")).with_comment("lies down"),
                Event::new(dec!(2), "", code("rest")).with_comment("gets up"),
            ],
        );
        let agg = aggregate_observation(&obs, &ethogram()).unwrap();
        assert_eq!(agg.events[0].comment_start, "lies down");
        assert_eq!(agg.events[0].comment_stop, "gets up");
    }

    #[test]
    fn trailing_start_is_reported_not_closed() {
        let obs = observation(
            "o1",
            vec![
                Event::new(dec!(0), "", code("rest")),
                Event::new(dec!(2), "", code("rest")),
                Event::new(dec!(4), "", code("rest")),
            ],
        );
        let agg = aggregate_observation(&obs, &ethogram()).unwrap();
        assert_eq!(agg.events.len(), 1);
        assert_eq!(
            agg.unpaired,
            vec![ValidationError::Unpaired {
                observation: "o1".into(),
                subject: "No focal subject".into(),
                behavior: "rest".into(),
                modifiers: String::new(),
                time: dec!(4),
            }]
        );
    }

    #[test]
    fn table_supports_exact_and_range_lookup() {
        let agg = aggregate_observation(&rest_feed(), &ethogram()).unwrap();
        let mut table = AggregatedTable::new();
        table.add_observation(agg, false);

        let key = AggregateKey {
            observation: ObservationId::new("o1").unwrap(),
            subject: Subject::no_focal(),
            behavior: code("feed"),
            modifiers: String::new(),
        };
        assert_eq!(table.get(&key).len(), 1);
        assert_eq!(table.len(), 2);

        let hits = table.overlapping(dec!(6), dec!(7));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].behavior.as_str(), "feed");

        let both = table.overlapping(dec!(5), dec!(5));
        assert_eq!(both.len(), 2);

        let obs = ObservationId::new("o1").unwrap();
        assert_eq!(table.first_time(&obs), Some(dec!(0)));
        assert_eq!(table.last_time(&obs), Some(dec!(9)));
    }

    #[test]
    fn unpaired_flags_survive_rebuilds() {
        let obs = observation("o1", vec![Event::new(dec!(0), "A", code("rest"))]);
        let agg = aggregate_observation(&obs, &ethogram()).unwrap();
        let mut table = AggregatedTable::new();
        table.add_observation(agg, true);

        let id = ObservationId::new("o1").unwrap();
        assert!(table.has_unpaired(Some(&id), &Subject::new("A"), &code("rest")));
        assert!(table.is_empty());

        let rebuilt = table.filter_map(|e| Some(e.clone()));
        assert!(rebuilt.has_unpaired(None, &Subject::new("A"), &code("rest")));
        assert_eq!(rebuilt.observations().len(), 1);
    }

    #[test]
    fn restrict_to_drops_other_observations() {
        let mut table = AggregatedTable::new();
        table.add_observation(aggregate_observation(&rest_feed(), &ethogram()).unwrap(), false);
        let mut other = rest_feed();
        other.id = ObservationId::new("o2").unwrap();
        table.add_observation(aggregate_observation(&other, &ethogram()).unwrap(), false);

        let only = table.restrict_to(&ObservationId::new("o2").unwrap());
        assert_eq!(only.len(), 2);
        assert!(only.events().all(|e| e.observation.as_str() == "o2"));
    }

    #[test]
    fn retain_removes_emptied_keys() {
        let mut table = AggregatedTable::new();
        table.add_observation(aggregate_observation(&rest_feed(), &ethogram()).unwrap(), false);
        table.retain(|e| e.behavior.as_str() == "rest");
        assert_eq!(table.len(), 1);
        assert_eq!(table.keys().count(), 1);
        let behaviors: Vec<&str> =
            table.behaviors().into_iter().map(BehaviorCode::as_str).collect();
        assert_eq!(behaviors, vec!["rest"]);
    }
}
