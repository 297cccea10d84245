//! Column-table signal feed.
//!
//! Each column holds values computed on its own timeframe, keyed by candle
//! open time. A bar sees, for every column, the value of the candle of that
//! timeframe containing the bar's timestamp.

use std::collections::BTreeMap;

use super::{SignalError, SignalFeed, SignalSnapshot, Tristate, Timeframe};
use crate::domain::Bar;

/// One named series on one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<T> {
    name: String,
    timeframe: Timeframe,
    keys: Vec<i64>,
    values: Vec<T>,
}

impl<T: Copy> Column<T> {
    /// Build a column from `(timestamp, value)` rows.
    ///
    /// Timestamps are floored to their bucket start and must be strictly
    /// increasing after flooring.
    pub fn new(
        name: impl Into<String>,
        timeframe: Timeframe,
        rows: impl IntoIterator<Item = (i64, T)>,
    ) -> Result<Self, SignalError> {
        let name = name.into();
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (row, (timestamp, value)) in rows.into_iter().enumerate() {
            let key = timeframe.bucket_start(timestamp);
            if keys.last().is_some_and(|&prev| key <= prev) {
                return Err(SignalError::NonMonotonic {
                    column: name,
                    row,
                    timestamp,
                });
            }
            keys.push(key);
            values.push(value);
        }
        Ok(Self {
            name,
            timeframe,
            keys,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Value of the candle containing `timestamp`, if the column has one.
    pub fn lookup(&self, timestamp: i64) -> Option<T> {
        let key = self.timeframe.bucket_start(timestamp);
        self.keys
            .binary_search(&key)
            .ok()
            .map(|idx| self.values[idx])
    }
}

/// Feed backed by in-memory signal and volatility columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnSignalFeed {
    signals: BTreeMap<String, Column<Tristate>>,
    volatility: Option<Column<f64>>,
}

impl ColumnSignalFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, column: Column<Tristate>) -> Result<Self, SignalError> {
        if self.signals.contains_key(column.name()) {
            return Err(SignalError::DuplicateColumn {
                name: column.name().to_string(),
            });
        }
        self.signals.insert(column.name().to_string(), column);
        Ok(self)
    }

    pub fn with_volatility(mut self, column: Column<f64>) -> Self {
        self.volatility = Some(column);
        self
    }
}

impl SignalFeed for ColumnSignalFeed {
    fn evaluate(&self, _bar_index: usize, bar: &Bar) -> Result<SignalSnapshot, SignalError> {
        let values = self
            .signals
            .iter()
            .map(|(name, column)| {
                let value = column.lookup(bar.timestamp).unwrap_or_default();
                (name.clone(), value)
            })
            .collect();
        let volatility = self
            .volatility
            .as_ref()
            .and_then(|column| column.lookup(bar.timestamp));
        Ok(SignalSnapshot { values, volatility })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY0: i64 = 1_613_779_200;
    const HOUR: i64 = 3_600;

    fn minute_bar(timestamp: i64) -> Bar {
        Bar::new(timestamp, 100.0, 101.0, 99.0, 100.5, 1.0)
    }

    fn feed() -> ColumnSignalFeed {
        let ema = Column::new(
            "ema",
            Timeframe::H1,
            [(DAY0, Tristate::True), (DAY0 + HOUR, Tristate::False)],
        )
        .unwrap();
        let rsi = Column::new(
            "rsi",
            Timeframe::M15,
            [(DAY0, Tristate::Unknown), (DAY0 + 900, Tristate::True)],
        )
        .unwrap();
        let atr = Column::new("atr", Timeframe::H1, [(DAY0, 250.0)]).unwrap();
        ColumnSignalFeed::new()
            .with_signal(ema)
            .unwrap()
            .with_signal(rsi)
            .unwrap()
            .with_volatility(atr)
    }

    #[test]
    fn bar_sees_its_bucket() {
        let feed = feed();
        let snap = feed.evaluate(0, &minute_bar(DAY0 + 16 * 60)).unwrap();
        assert_eq!(snap.get("ema"), Tristate::True);
        assert_eq!(snap.get("rsi"), Tristate::True);
        assert_eq!(snap.volatility, Some(250.0));

        let snap = feed.evaluate(1, &minute_bar(DAY0 + 5 * 60)).unwrap();
        assert_eq!(snap.get("rsi"), Tristate::Unknown);
    }

    #[test]
    fn missing_bucket_is_unknown() {
        let feed = feed();
        let snap = feed.evaluate(0, &minute_bar(DAY0 + 3 * HOUR)).unwrap();
        assert_eq!(snap.get("ema"), Tristate::Unknown);
        assert_eq!(snap.volatility, None);
    }

    #[test]
    fn misaligned_keys_are_floored() {
        let col = Column::new("x", Timeframe::H1, [(DAY0 + 59, 1.0)]).unwrap();
        assert_eq!(col.lookup(DAY0 + 30 * 60), Some(1.0));
    }

    #[test]
    fn rejects_rows_in_the_same_bucket() {
        let err = Column::new("x", Timeframe::H1, [(DAY0, 1.0), (DAY0 + 60, 2.0)]).unwrap_err();
        assert!(matches!(err, SignalError::NonMonotonic { row: 1, .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let a = Column::new("ema", Timeframe::H1, [(DAY0, Tristate::True)]).unwrap();
        let err = ColumnSignalFeed::new()
            .with_signal(a.clone())
            .unwrap()
            .with_signal(a)
            .unwrap_err();
        assert_eq!(
            err,
            SignalError::DuplicateColumn {
                name: "ema".into()
            }
        );
    }
}
