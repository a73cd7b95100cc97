//! Core type definitions with validation.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display label for events not attributed to a tracked individual.
pub const NO_FOCAL_SUBJECT: &str = "No focal subject";

/// Validation errors raised before any heavy computation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A state behavior has a START without a matching STOP.
    #[error(
        "unpaired state event in observation {observation}: {subject} / {behavior} [{modifiers}] at {time}"
    )]
    Unpaired {
        observation: String,
        subject: String,
        behavior: String,
        modifiers: String,
        time: Decimal,
    },

    /// The advanced filter expression could not be parsed.
    #[error("malformed filter expression: {reason}")]
    MalformedFilter { reason: String },

    /// A behavior was coded but is not defined in the ethogram.
    #[error("behavior {behavior:?} in observation {observation} is not defined in the ethogram")]
    UnknownBehavior {
        observation: String,
        behavior: String,
    },

    /// An event has no timestamp where one is required.
    #[error("observation {observation} has events without timestamps")]
    MissingTimestamp { observation: String },

    /// Events are not in chronological order.
    #[error("events of observation {observation} are not sorted by time")]
    UnsortedEvents { observation: String },

    /// The requested observation does not exist.
    #[error("unknown observation: {observation}")]
    UnknownObservation { observation: String },

    /// Time bin width must be strictly positive.
    #[error("bin size must be greater than zero, got {value}")]
    InvalidBinSize { value: Decimal },

    /// Sampling interval must be strictly positive.
    #[error("sampling interval must be greater than zero, got {value}")]
    InvalidInterval { value: Decimal },

    /// Window bounds are inverted.
    #[error("invalid time window: start {start} is after stop {stop}")]
    InvalidWindow { start: Decimal, stop: Decimal },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated observation identifier.
    ///
    /// Observation IDs must be non-empty; they key the project's observation map.
    ObservationId, "observation ID"
);

define_string_id!(
    /// A validated behavior code.
    ///
    /// Behavior codes must be non-empty and are looked up in the ethogram.
    BehaviorCode, "behavior code"
);

/// The individual an event is attributed to.
///
/// The empty subject means "no focal subject". It is rendered with
/// [`NO_FOCAL_SUBJECT`], and that label parses back to the empty subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// The "no focal subject" sentinel.
    pub const fn no_focal() -> Self {
        Self(String::new())
    }

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == NO_FOCAL_SUBJECT {
            Self::no_focal()
        } else {
            Self(name)
        }
    }

    pub fn is_focal(&self) -> bool {
        !self.0.is_empty()
    }

    /// Raw subject name; empty for the sentinel.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        if self.is_focal() {
            &self.0
        } else {
            NO_FOCAL_SUBJECT
        }
    }
}

impl From<String> for Subject {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Subject {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_id_rejects_empty() {
        assert!(ObservationId::new("").is_err());
        assert!(ObservationId::new("obs-1").is_ok());
    }

    #[test]
    fn behavior_code_rejects_empty() {
        assert_eq!(
            BehaviorCode::new("").unwrap_err(),
            ValidationError::Empty {
                field: "behavior code"
            }
        );
        assert!(BehaviorCode::new("rest").is_ok());
    }

    #[test]
    fn behavior_code_serde_roundtrip() {
        let code = BehaviorCode::new("feed").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"feed\"");
        let parsed: BehaviorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn observation_id_serde_rejects_empty() {
        let result: Result<ObservationId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn empty_subject_is_no_focal_subject() {
        let subject = Subject::new("");
        assert!(!subject.is_focal());
        assert_eq!(subject.label(), NO_FOCAL_SUBJECT);
        assert_eq!(subject.to_string(), "No focal subject");
    }

    #[test]
    fn sentinel_label_maps_back_to_empty_subject() {
        assert_eq!(Subject::new(NO_FOCAL_SUBJECT), Subject::no_focal());
        assert_eq!(Subject::new(NO_FOCAL_SUBJECT).as_str(), "");
    }

    #[test]
    fn subject_serializes_raw_name() {
        let json = serde_json::to_string(&Subject::no_focal()).unwrap();
        assert_eq!(json, "\"\"");
        let parsed: Subject = serde_json::from_str("\"Mouse 1\"").unwrap();
        assert_eq!(parsed.label(), "Mouse 1");
    }
}
