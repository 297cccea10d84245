//! Replay configuration, rolling session state, and run result types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::account::Liquidity;
use crate::domain::{Bar, Position, Side};
use crate::report::Summary;
use crate::risk::RiskGate;

/// How the stop distance is derived from volatility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// `stop_atr * volatility` from entry.
    #[default]
    Volatility,
    /// The volatility distance, narrowed to the current hour's low (long) or
    /// high (short) when that is closer.
    VolatilityOrHourExtreme,
}

/// Strategy parameters for one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Signal names that must all agree for an entry.
    pub signals: Vec<String>,
    /// UTC hours (0..=23) in which no new position is opened.
    pub no_trade_hours: Vec<u32>,
    pub stop_atr: f64,
    pub tp_atr: f64,
    pub stop_mode: StopMode,
    /// Percent of balance risked per trade.
    pub risk: f64,
    pub entry_liquidity: Liquidity,
    /// Decimals stop and take-profit levels are rounded to.
    pub price_decimals: u32,
    pub gate: RiskGate,
    /// Close a position still live after the last bar at its close.
    pub close_at_end: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            signals: Vec::new(),
            no_trade_hours: Vec::new(),
            stop_atr: 2.0,
            tp_atr: 2.0,
            stop_mode: StopMode::Volatility,
            risk: 1.0,
            entry_liquidity: Liquidity::Taker,
            price_decimals: 2,
            gate: RiskGate::default(),
            close_at_end: false,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.signals.is_empty() {
            return Err(ReplayError::InvalidConfig(
                "at least one signal is required".into(),
            ));
        }
        for (name, value) in [
            ("stop_atr", self.stop_atr),
            ("tp_atr", self.tp_atr),
            ("risk", self.risk),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReplayError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        if let Some(hour) = self.no_trade_hours.iter().find(|&&h| h > 23) {
            return Err(ReplayError::InvalidConfig(format!(
                "no_trade_hours entry {hour} is not an hour of the day"
            )));
        }
        if self.price_decimals > 8 {
            return Err(ReplayError::InvalidConfig(format!(
                "price_decimals {} is out of range (0..=8)",
                self.price_decimals
            )));
        }
        Ok(())
    }

    pub fn trades_in_hour(&self, hour: u32) -> bool {
        !self.no_trade_hours.contains(&hour)
    }

    /// Stop and take-profit for an entry at `entry`.
    ///
    /// `hour_extreme` is the running hour low (long) or high (short) seen
    /// before this bar, used by `StopMode::VolatilityOrHourExtreme`.
    pub fn entry_levels(
        &self,
        side: Side,
        entry: f64,
        volatility: f64,
        hour_extreme: Option<f64>,
    ) -> EntryLevels {
        let mut stop_distance = self.stop_atr * volatility;
        if self.stop_mode == StopMode::VolatilityOrHourExtreme {
            let extreme_distance = hour_extreme.map(|level| match side {
                Side::Long => entry - level,
                Side::Short => level - entry,
            });
            if let Some(d) = extreme_distance.filter(|&d| d > 0.0) {
                stop_distance = stop_distance.min(d);
            }
        }
        let tp_distance = self.tp_atr * volatility;
        let sign = side.sign();
        EntryLevels {
            stop: round_to(entry - sign * stop_distance, self.price_decimals),
            take_profit: round_to(entry + sign * tp_distance, self.price_decimals),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryLevels {
    pub stop: f64,
    pub take_profit: f64,
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Hour and day bookkeeping carried across bars.
#[derive(Debug, Clone, Default)]
pub(crate) struct Session {
    hour: Option<i64>,
    hour_high: f64,
    hour_low: f64,
    day: Option<i64>,
    anchor: f64,
}

impl Session {
    /// Roll the hour and day windows forward to `bar`. Call before acting on it.
    pub fn begin(&mut self, bar: &Bar) {
        let day = bar.day_index();
        if self.day != Some(day) {
            self.day = Some(day);
            self.anchor = bar.open;
        }
        let hour = bar.hour_index();
        if self.hour != Some(hour) {
            self.hour = Some(hour);
            self.hour_high = bar.open;
            self.hour_low = bar.open;
        }
    }

    /// Fold the bar's range into the running hour extremes. Call after acting on it.
    pub fn absorb(&mut self, bar: &Bar) {
        self.hour_high = self.hour_high.max(bar.high);
        self.hour_low = self.hour_low.min(bar.low);
    }

    /// Opening price of the current UTC day.
    pub fn anchor(&self) -> f64 {
        self.anchor
    }

    pub fn hour_extreme(&self, side: Side) -> Option<f64> {
        self.hour?;
        Some(match side {
            Side::Long => self.hour_low,
            Side::Short => self.hour_high,
        })
    }
}

/// Where in the per-bar pipeline a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultStage {
    /// The bar itself failed validation and was skipped.
    Bar,
    Signal,
    Volatility,
    Entry,
    Update,
    Close,
}

impl fmt::Display for FaultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultStage::Bar => "bar",
            FaultStage::Signal => "signal",
            FaultStage::Volatility => "volatility",
            FaultStage::Entry => "entry",
            FaultStage::Update => "update",
            FaultStage::Close => "close",
        };
        f.write_str(name)
    }
}

/// A per-bar failure. Recorded and skipped; the replay continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarFault {
    pub bar_index: usize,
    pub timestamp: i64,
    pub stage: FaultStage,
    pub message: String,
}

impl BarFault {
    pub fn new(bar_index: usize, bar: &Bar, stage: FaultStage, message: impl fmt::Display) -> Self {
        Self {
            bar_index,
            timestamp: bar.timestamp,
            stage,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for BarFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bar {} ({}) {}: {}",
            self.bar_index, self.timestamp, self.stage, self.message
        )
    }
}

/// Errors that prevent a replay from running at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("bar {index} timestamp {timestamp} does not follow {previous}")]
    NonMonotonicBars {
        index: usize,
        previous: i64,
        timestamp: i64,
    },

    #[error("invalid replay config: {0}")]
    InvalidConfig(String),
}

/// Result of a complete replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub summary: Summary,
    /// Closed positions in close order.
    pub trades: Vec<Position>,
    pub faults: Vec<BarFault>,
    /// Positions opened.
    pub entries: usize,
    /// Bars on which the signal feed was consulted.
    pub signals_evaluated: usize,
    pub bars_processed: usize,
    /// Position still live after the last bar (when not closed at end).
    pub final_position: Option<Position>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY0: i64 = 1_613_779_200;

    fn config() -> ReplayConfig {
        ReplayConfig {
            signals: vec!["ema".into()],
            ..ReplayConfig::default()
        }
    }

    #[test]
    fn default_config_needs_signals() {
        assert!(matches!(
            ReplayConfig::default().validate(),
            Err(ReplayError::InvalidConfig(_))
        ));
        assert!(config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = config();
        cfg.no_trade_hours = vec![3, 24];
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.tp_atr = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.risk = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn volatility_levels_are_symmetric() {
        let cfg = config();
        let long = cfg.entry_levels(Side::Long, 50_000.0, 250.0, None);
        assert_eq!(long.stop, 49_500.0);
        assert_eq!(long.take_profit, 50_500.0);

        let short = cfg.entry_levels(Side::Short, 50_000.0, 250.0, None);
        assert_eq!(short.stop, 50_500.0);
        assert_eq!(short.take_profit, 49_500.0);
    }

    #[test]
    fn levels_are_rounded() {
        let cfg = ReplayConfig {
            stop_atr: 1.0,
            tp_atr: 0.95,
            ..config()
        };
        let levels = cfg.entry_levels(Side::Long, 100.0, 1.234_567, None);
        assert_eq!(levels.stop, 98.77);
        assert_eq!(levels.take_profit, 101.17);
    }

    #[test]
    fn hour_extreme_narrows_stop() {
        let cfg = ReplayConfig {
            stop_mode: StopMode::VolatilityOrHourExtreme,
            ..config()
        };
        let levels = cfg.entry_levels(Side::Long, 50_000.0, 250.0, Some(49_800.0));
        assert_eq!(levels.stop, 49_800.0);

        // Hour extreme farther than the volatility stop: volatility wins.
        let levels = cfg.entry_levels(Side::Long, 50_000.0, 250.0, Some(49_000.0));
        assert_eq!(levels.stop, 49_500.0);

        // Entry at the extreme gives no usable distance.
        let levels = cfg.entry_levels(Side::Short, 50_000.0, 250.0, Some(50_000.0));
        assert_eq!(levels.stop, 50_500.0);
    }

    #[test]
    fn hour_extreme_ignored_in_volatility_mode() {
        let levels = config().entry_levels(Side::Short, 50_000.0, 250.0, Some(50_100.0));
        assert_eq!(levels.stop, 50_500.0);
    }

    #[test]
    fn session_tracks_anchor_and_hour() {
        let mut s = Session::default();
        let first = Bar::new(DAY0 + 30 * 60, 100.0, 103.0, 98.0, 101.0, 1.0);
        s.begin(&first);
        assert_eq!(s.anchor(), 100.0);
        assert_eq!(s.hour_extreme(Side::Long), Some(100.0));
        s.absorb(&first);
        assert_eq!(s.hour_extreme(Side::Long), Some(98.0));
        assert_eq!(s.hour_extreme(Side::Short), Some(103.0));

        // Same day, next hour: anchor stays, hour resets.
        let next = Bar::new(DAY0 + 3_600, 101.0, 102.0, 100.5, 101.5, 1.0);
        s.begin(&next);
        assert_eq!(s.anchor(), 100.0);
        assert_eq!(s.hour_extreme(Side::Long), Some(101.0));

        // Next day after a gap: first bar seen is the anchor.
        let later = Bar::new(DAY0 + 86_400 + 7_200, 110.0, 111.0, 109.0, 110.0, 1.0);
        s.begin(&later);
        assert_eq!(s.anchor(), 110.0);
    }

    #[test]
    fn fault_displays_stage() {
        let bar = Bar::new(DAY0, 1.0, 1.0, 1.0, 1.0, 0.0);
        let fault = BarFault::new(7, &bar, FaultStage::Volatility, "missing");
        assert_eq!(fault.to_string(), format!("bar 7 ({DAY0}) volatility: missing"));
    }

    #[test]
    fn round_to_decimals() {
        assert_eq!(round_to(49_123.456, 2), 49_123.46);
        assert_eq!(round_to(49_123.456, 0), 49_123.0);
    }
}
