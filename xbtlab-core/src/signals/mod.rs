//! Signal feed boundary: pre-computed indicator values per bar.
//!
//! The engine never computes indicators. A feed hands it, for every bar, a
//! set of named tri-state signals and a volatility value (ATR-like, in price
//! units) used to place stops and targets.

pub mod column;
pub mod timeframe;

pub use column::{Column, ColumnSignalFeed};
pub use timeframe::Timeframe;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{Bar, Side};

/// A signal value. `Unknown` means "not computable here" (warm-up, gap) and
/// never counts as `False`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tristate {
    True,
    False,
    #[default]
    Unknown,
}

impl Tristate {
    pub fn is_true(self) -> bool {
        matches!(self, Tristate::True)
    }

    pub fn is_false(self) -> bool {
        matches!(self, Tristate::False)
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Tristate::Unknown)
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Tristate::Unknown, Tristate::from)
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tristate::True => write!(f, "true"),
            Tristate::False => write!(f, "false"),
            Tristate::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parses a table cell: `true`/`1`, `false`/`0`, or empty/`unknown`/`nan` for unknown.
impl FromStr for Tristate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Tristate::True),
            "false" | "0" => Ok(Tristate::False),
            "" | "unknown" | "nan" | "null" => Ok(Tristate::Unknown),
            other => Err(format!("'{other}' is not a signal value")),
        }
    }
}

/// Signal values and volatility as seen by one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub values: BTreeMap<String, Tristate>,
    pub volatility: Option<f64>,
}

impl SignalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Tristate>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = Some(volatility);
        self
    }

    /// Value of `name`; a signal the feed did not provide is `Unknown`.
    pub fn get(&self, name: &str) -> Tristate {
        self.values.get(name).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("column '{name}' is defined twice")]
    DuplicateColumn { name: String },

    #[error("column '{column}': row {row} timestamp {timestamp} is not after the previous bucket")]
    NonMonotonic {
        column: String,
        row: usize,
        timestamp: i64,
    },

    #[error("signal evaluation failed: {0}")]
    Evaluation(String),
}

/// Source of per-bar signal snapshots.
///
/// Implementations must be deterministic: the same bar index and bar always
/// produce the same snapshot.
pub trait SignalFeed: Send + Sync {
    fn evaluate(&self, bar_index: usize, bar: &Bar) -> Result<SignalSnapshot, SignalError>;
}

impl<F> SignalFeed for F
where
    F: Fn(usize, &Bar) -> Result<SignalSnapshot, SignalError> + Send + Sync,
{
    fn evaluate(&self, bar_index: usize, bar: &Bar) -> Result<SignalSnapshot, SignalError> {
        self(bar_index, bar)
    }
}

/// Direction implied by the configured signals and the daily anchor.
///
/// Long when every signal is `True` and price is above the anchor, short when
/// every signal is `False` and price is below it. Any `Unknown` (or an empty
/// signal list) resolves to no entry.
pub fn resolve_direction(
    snapshot: &SignalSnapshot,
    signals: &[String],
    price: f64,
    anchor: f64,
) -> Option<Side> {
    if signals.is_empty() {
        return None;
    }
    let states: Vec<Tristate> = signals.iter().map(|name| snapshot.get(name)).collect();
    if states.iter().any(|s| !s.is_known()) {
        return None;
    }
    if states.iter().all(|s| s.is_true()) && price > anchor {
        Some(Side::Long)
    } else if states.iter().all(|s| s.is_false()) && price < anchor {
        Some(Side::Short)
    } else {
        None
    }
}
