//! Statistic values that carry "not applicable" and "unpaired" explicitly.

use std::fmt;

use rust_decimal::prelude::*;
use serde::Serialize;

/// Number of decimals used when rendering values.
pub const DISPLAY_PRECISION: u32 = 3;

/// A derived statistic.
///
/// `NotApplicable` and `Unpaired` propagate through arithmetic so that a
/// failure upstream stays visible in every result built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Value(Decimal),
    /// The statistic is undefined (point duration, stdev of one sample, ...).
    NotApplicable,
    /// Built from a state behavior with an unmatched START.
    Unpaired,
}

impl Stat {
    pub const fn value(self) -> Option<Decimal> {
        match self {
            Self::Value(v) => Some(v),
            Self::NotApplicable | Self::Unpaired => None,
        }
    }

    pub const fn is_unpaired(self) -> bool {
        matches!(self, Self::Unpaired)
    }

    /// Value rounded half away from zero to [`DISPLAY_PRECISION`] places.
    pub fn rounded(self) -> Self {
        match self {
            Self::Value(v) => Self::Value(round_display(v)),
            other => other,
        }
    }

    /// Combine two statistics; `Unpaired` dominates `NotApplicable`.
    #[must_use]
    pub fn combine(self, other: Self, f: impl FnOnce(Decimal, Decimal) -> Option<Decimal>) -> Self {
        match (self, other) {
            (Self::Unpaired, _) | (_, Self::Unpaired) => Self::Unpaired,
            (Self::NotApplicable, _) | (_, Self::NotApplicable) => Self::NotApplicable,
            (Self::Value(a), Self::Value(b)) => f(a, b).map_or(Self::NotApplicable, Self::Value),
        }
    }
}

impl From<Decimal> for Stat {
    fn from(value: Decimal) -> Self {
        Self::Value(value)
    }
}

impl From<Option<Decimal>> for Stat {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(Self::NotApplicable, Self::Value)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", format_decimal(*v)),
            Self::NotApplicable => f.write_str("NA"),
            Self::Unpaired => f.write_str("UNPAIRED"),
        }
    }
}

impl Serialize for Stat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Value(v) => Serialize::serialize(v, serializer),
            Self::NotApplicable => serializer.serialize_str("NA"),
            Self::Unpaired => serializer.serialize_str("UNPAIRED"),
        }
    }
}

pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// Render with exactly [`DISPLAY_PRECISION`] decimals.
pub fn format_decimal(value: Decimal) -> String {
    let mut rounded = round_display(value);
    rounded.rescale(DISPLAY_PRECISION);
    rounded.to_string()
}

/// Arithmetic mean; `None` for an empty sample.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let n = Decimal::from(values.len());
    Some(values.iter().copied().sum::<Decimal>() / n)
}

/// Sample standard deviation (n - 1); `None` with fewer than two values.
pub fn sample_stdev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares: Decimal = values.iter().map(|v| (*v - mean) * (*v - mean)).sum();
    let variance = squares / Decimal::from(values.len() - 1);
    variance.sqrt()
}
