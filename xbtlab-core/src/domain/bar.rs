//! Bar: the fundamental market data unit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SECONDS_PER_HOUR: i64 = 3_600;
pub const SECONDS_PER_DAY: i64 = 86_400;

/// OHLCV bar keyed by its open time in Unix seconds (UTC).
///
/// Bars are produced by a bar source and never mutated by the engine. All
/// calendar arithmetic (day rollover, hour buckets) is done in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub turnover: f64,
}

/// Why a bar was rejected at the source boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar {timestamp}: {field} is not a finite positive price ({value})")]
    InvalidPrice {
        timestamp: i64,
        field: &'static str,
        value: f64,
    },

    #[error("bar {timestamp}: high {high} / low {low} do not bracket open and close")]
    InconsistentRange { timestamp: i64, high: f64, low: f64 },

    #[error("bar {timestamp}: negative or non-finite {field} ({value})")]
    InvalidQuantity {
        timestamp: i64,
        field: &'static str,
        value: f64,
    },

    #[error("bar timestamp {0} is outside the representable date range")]
    TimestampOutOfRange(i64),
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            turnover: 0.0,
        }
    }

    /// Check typed fields for sanity. Malformed bars never reach the engine.
    pub fn validate(&self) -> Result<(), BarError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(BarError::InvalidPrice {
                    timestamp: self.timestamp,
                    field,
                    value,
                });
            }
        }

        if self.high < self.low
            || self.high < self.open
            || self.high < self.close
            || self.low > self.open
            || self.low > self.close
        {
            return Err(BarError::InconsistentRange {
                timestamp: self.timestamp,
                high: self.high,
                low: self.low,
            });
        }

        for (field, value) in [("volume", self.volume), ("turnover", self.turnover)] {
            if !value.is_finite() || value < 0.0 {
                return Err(BarError::InvalidQuantity {
                    timestamp: self.timestamp,
                    field,
                    value,
                });
            }
        }

        if self.datetime().is_none() {
            return Err(BarError::TimestampOutOfRange(self.timestamp));
        }

        Ok(())
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// UTC calendar date, if the timestamp is representable.
    pub fn date(&self) -> Option<NaiveDate> {
        self.datetime().map(|dt| dt.date_naive())
    }

    /// Days since the epoch. Two bars share a calendar day iff this matches.
    pub fn day_index(&self) -> i64 {
        day_index(self.timestamp)
    }

    /// Hours since the epoch.
    pub fn hour_index(&self) -> i64 {
        self.timestamp.div_euclid(SECONDS_PER_HOUR)
    }

    /// Hour of the UTC day, 0..=23.
    pub fn hour_of_day(&self) -> u32 {
        hour_of_day(self.timestamp)
    }
}

pub fn day_index(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY)
}

pub fn hour_of_day(timestamp: i64) -> u32 {
    (timestamp.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR) as u32
}

/// True when both timestamps fall on the same UTC calendar day.
pub fn same_day(a: i64, b: i64) -> bool {
    day_index(a) == day_index(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2021-02-20 00:00:00 UTC
    const MIDNIGHT: i64 = 1_613_779_200;

    fn sample_bar() -> Bar {
        Bar::new(MIDNIGHT, 50_000.0, 50_500.0, 49_800.0, 50_200.0, 1_200.0)
    }

    #[test]
    fn bar_validates() {
        assert!(sample_bar().validate().is_ok());
    }

    #[test]
    fn bar_rejects_nan_price() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(matches!(
            bar.validate(),
            Err(BarError::InvalidPrice { field: "open", .. })
        ));
    }

    #[test]
    fn bar_rejects_inverted_range() {
        let mut bar = sample_bar();
        bar.high = 49_700.0;
        assert!(matches!(
            bar.validate(),
            Err(BarError::InconsistentRange { .. })
        ));
    }

    #[test]
    fn bar_rejects_negative_volume() {
        let mut bar = sample_bar();
        bar.volume = -1.0;
        assert!(matches!(
            bar.validate(),
            Err(BarError::InvalidQuantity { field: "volume", .. })
        ));
    }

    #[test]
    fn calendar_helpers_use_utc() {
        let bar = sample_bar();
        assert_eq!(bar.date(), NaiveDate::from_ymd_opt(2021, 2, 20));
        assert_eq!(bar.hour_of_day(), 0);
        assert_eq!(hour_of_day(MIDNIGHT + 3 * SECONDS_PER_HOUR + 59), 3);
        assert!(same_day(MIDNIGHT, MIDNIGHT + SECONDS_PER_DAY - 1));
        assert!(!same_day(MIDNIGHT - 1, MIDNIGHT));
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
