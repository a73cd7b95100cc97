//! Raw coded events and the observations that own them.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{BehaviorCode, ObservationId, Subject, ValidationError};

/// A single coded occurrence as recorded by the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds (or frame index for image sequences). `None` when the
    /// observation was coded without timestamps.
    pub time: Option<Decimal>,
    /// Focal subject; empty for no focal subject.
    #[serde(default)]
    pub subject: Subject,
    pub behavior: BehaviorCode,
    /// Selected modifier values joined with `|`.
    #[serde(default)]
    pub modifiers: String,
    #[serde(default)]
    pub comment: String,
}

impl Event {
    pub fn new(time: Decimal, subject: impl Into<Subject>, behavior: BehaviorCode) -> Self {
        Self {
            time: Some(time),
            subject: subject.into(),
            behavior,
            modifiers: String::new(),
            comment: String::new(),
        }
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: impl Into<String>) -> Self {
        self.modifiers = modifiers.into();
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// How an observation was coded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    /// Coded against one or more media files.
    #[default]
    Media,
    /// Coded live against a wall clock.
    Live,
    /// Coded against an image sequence; times are ordinal indices.
    Images,
}

impl ObservationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Live => "live",
            Self::Images => "images",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationKind {
    type Err = UnknownObservationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" | "FILE" => Ok(Self::Media),
            "live" | "LIVE" => Ok(Self::Live),
            "images" | "IMAGES" => Ok(Self::Images),
            _ => Err(UnknownObservationKind(s.to_string())),
        }
    }
}

impl Serialize for ObservationKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ObservationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown observation kind strings.
#[derive(Debug, Clone)]
pub struct UnknownObservationKind(String);

impl fmt::Display for UnknownObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown observation kind: {}", self.0)
    }
}

impl std::error::Error for UnknownObservationKind {}

/// Bounds the observer restricted coding to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingInterval {
    pub start: Decimal,
    pub stop: Decimal,
}

/// One observation session with its ordered raw events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    #[serde(default)]
    pub kind: ObservationKind,
    /// Events in chronological order.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Duration of each media file, in playback order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_lengths: Vec<Decimal>,
    /// Offset added to media time.
    #[serde(default)]
    pub time_offset: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding_interval: Option<CodingInterval>,
}

impl Observation {
    pub fn new(id: ObservationId, kind: ObservationKind, events: Vec<Event>) -> Self {
        Self {
            id,
            kind,
            events,
            media_lengths: Vec::new(),
            time_offset: Decimal::ZERO,
            coding_interval: None,
        }
    }

    /// Whether every event carries a timestamp.
    pub fn has_timestamps(&self) -> bool {
        self.events.iter().all(|e| e.time.is_some())
    }

    /// Fails if any event lacks a timestamp or events go back in time.
    pub fn check_timeline(&self) -> Result<(), ValidationError> {
        let mut previous: Option<Decimal> = None;
        for event in &self.events {
            let Some(time) = event.time else {
                return Err(ValidationError::MissingTimestamp {
                    observation: self.id.to_string(),
                });
            };
            if previous.is_some_and(|p| time < p) {
                return Err(ValidationError::UnsortedEvents {
                    observation: self.id.to_string(),
                });
            }
            previous = Some(time);
        }
        Ok(())
    }

    pub fn first_event_time(&self) -> Option<Decimal> {
        self.events.iter().filter_map(|e| e.time).min()
    }

    pub fn last_event_time(&self) -> Option<Decimal> {
        self.events.iter().filter_map(|e| e.time).max()
    }

    /// Total observation length.
    ///
    /// Media observations use the offset plus the summed media durations;
    /// live and image observations use the last event time.
    pub fn length(&self) -> Option<Decimal> {
        match self.kind {
            ObservationKind::Media if !self.media_lengths.is_empty() => {
                Some(self.time_offset + self.media_lengths.iter().copied().sum::<Decimal>())
            }
            _ => self.last_event_time(),
        }
    }
}
