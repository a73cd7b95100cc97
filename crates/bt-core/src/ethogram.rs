//! The behavior catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::BehaviorCode;

/// Whether a behavior has a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorType {
    /// Logged as paired START/STOP events.
    #[serde(alias = "STATE", alias = "State event")]
    State,
    /// Logged as a single instantaneous event.
    #[serde(alias = "POINT", alias = "Point event")]
    Point,
}

/// A named set of values the observer picks from when coding a behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// One behavior definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthogramEntry {
    pub code: BehaviorCode,
    #[serde(rename = "type")]
    pub kind: BehaviorType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<ModifierSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl EthogramEntry {
    pub const fn new(code: BehaviorCode, kind: BehaviorType) -> Self {
        Self {
            code,
            kind,
            modifiers: Vec::new(),
            category: None,
        }
    }
}

/// Read-only behavior catalog keyed by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<EthogramEntry>", into = "Vec<EthogramEntry>")]
pub struct Ethogram {
    entries: BTreeMap<BehaviorCode, EthogramEntry>,
}

impl Ethogram {
    pub fn new(entries: impl IntoIterator<Item = EthogramEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.code.clone(), entry))
                .collect(),
        }
    }

    pub fn get(&self, code: &BehaviorCode) -> Option<&EthogramEntry> {
        self.entries.get(code)
    }

    pub fn behavior_type(&self, code: &BehaviorCode) -> Option<BehaviorType> {
        self.entries.get(code).map(|e| e.kind)
    }

    pub fn is_state(&self, code: &BehaviorCode) -> bool {
        self.behavior_type(code) == Some(BehaviorType::State)
    }

    pub fn is_point(&self, code: &BehaviorCode) -> bool {
        self.behavior_type(code) == Some(BehaviorType::Point)
    }

    /// All codes in lexical order.
    pub fn codes(&self) -> impl Iterator<Item = &BehaviorCode> {
        self.entries.keys()
    }

    pub fn state_behaviors(&self) -> impl Iterator<Item = &BehaviorCode> {
        self.entries
            .values()
            .filter(|e| e.kind == BehaviorType::State)
            .map(|e| &e.code)
    }

    pub fn point_behaviors(&self) -> impl Iterator<Item = &BehaviorCode> {
        self.entries
            .values()
            .filter(|e| e.kind == BehaviorType::Point)
            .map(|e| &e.code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<EthogramEntry>> for Ethogram {
    fn from(entries: Vec<EthogramEntry>) -> Self {
        Self::new(entries)
    }
}

impl From<Ethogram> for Vec<EthogramEntry> {
    fn from(ethogram: Ethogram) -> Self {
        ethogram.entries.into_values().collect()
    }
}
