//! Tags raw events as START, STOP or POINT.
//!
//! State behaviors alternate: within one observation, the n-th occurrence of a
//! (subject, behavior, modifiers) stream is a START when n is even (0-based)
//! and a STOP when it is odd. Point behaviors are always POINT.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::ethogram::{BehaviorType, Ethogram};
use crate::event::{Event, Observation};
use crate::types::{BehaviorCode, Subject, ValidationError};

/// Role of an event within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventFlag {
    Start,
    Stop,
    Point,
}

impl fmt::Display for EventFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Point => "POINT",
        })
    }
}

/// A raw event with its resolved timestamp and flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedEvent<'a> {
    pub event: &'a Event,
    pub time: Decimal,
    pub flag: EventFlag,
}

impl TaggedEvent<'_> {
    pub fn subject(&self) -> &Subject {
        &self.event.subject
    }

    pub fn behavior(&self) -> &BehaviorCode {
        &self.event.behavior
    }

    pub fn modifiers(&self) -> &str {
        &self.event.modifiers
    }
}

/// Tag every event of an observation.
///
/// Fails on missing timestamps, events out of chronological order, and
/// behaviors the ethogram does not define.
pub fn normalize<'a>(
    observation: &'a Observation,
    ethogram: &Ethogram,
) -> Result<Vec<TaggedEvent<'a>>, ValidationError> {
    observation.check_timeline()?;

    let mut seen: HashMap<(&Subject, &BehaviorCode, &str), usize> = HashMap::new();
    let mut tagged = Vec::with_capacity(observation.events.len());

    for event in &observation.events {
        let kind = ethogram.behavior_type(&event.behavior).ok_or_else(|| {
            ValidationError::UnknownBehavior {
                observation: observation.id.to_string(),
                behavior: event.behavior.to_string(),
            }
        })?;
        let Some(time) = event.time else {
            return Err(ValidationError::MissingTimestamp {
                observation: observation.id.to_string(),
            });
        };

        let flag = match kind {
            BehaviorType::Point => EventFlag::Point,
            BehaviorType::State => {
                let count = seen
                    .entry((&event.subject, &event.behavior, event.modifiers.as_str()))
                    .or_insert(0);
                let flag = if *count % 2 == 0 {
                    EventFlag::Start
                } else {
                    EventFlag::Stop
                };
                *count += 1;
                flag
            }
        };

        tagged.push(TaggedEvent { event, time, flag });
    }

    Ok(tagged)
}
