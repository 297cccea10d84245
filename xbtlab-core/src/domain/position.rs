//! Position: the single simulated inverse-contract position and its closed result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Whether `stop` sits on the losing side of `entry` for this side.
    pub fn is_protective_stop(self, entry: f64, stop: f64) -> bool {
        match self {
            Side::Long => stop < entry,
            Side::Short => stop > entry,
        }
    }

    /// Whether `target` sits on the winning side of `entry` for this side.
    pub fn is_profit_target(self, entry: f64, target: f64) -> bool {
        match self {
            Side::Long => target > entry,
            Side::Short => target < entry,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

/// One partial exit taken while the position stayed open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialExit {
    pub timestamp: i64,
    pub price: f64,
    /// Fraction of the size held at the time of the exit (0, 1].
    pub portion: f64,
    /// Contracts closed by this exit.
    pub size: f64,
    /// Realized profit in base currency, fees included.
    pub profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub before: f64,
    pub after: f64,
}

/// Outcome of a closed position. Present only once the position is closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub closed_at: i64,
    /// Closed by the stop level rather than a target or manual close.
    pub stopped: bool,
    pub exit: f64,
    /// Realized profit in base currency: entry seed + price PnL + exit fee.
    pub profit: f64,
    /// Balance change in percent. `None` if the balance before the close was not positive.
    pub percent: Option<f64>,
    pub balance: BalanceChange,
}

/// A simulated position. Owned by the account while live; appended to the
/// trade list with `result` populated once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry: f64,
    pub stop: Option<f64>,
    pub take_profit: Option<f64>,
    /// The stop given at open time, kept after any tightening.
    pub initial_stop: Option<f64>,
    /// Percent of balance risked when sizing.
    pub risk: f64,
    /// Remaining size in contracts.
    pub size: f64,
    /// Running PnL seed: entry fee adjustment, realized on close.
    pub pnl: f64,
    pub opened_at: i64,
    pub partial_exits: Vec<PartialExit>,
    pub result: Option<TradeResult>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.result.is_none()
    }

    pub fn closed_at(&self) -> Option<i64> {
        self.result.map(|r| r.closed_at)
    }

    pub fn exit(&self) -> Option<f64> {
        self.result.map(|r| r.exit)
    }

    /// Profit booked by partial exits before the final close.
    pub fn partial_profit(&self) -> f64 {
        self.partial_exits.iter().map(|p| p.profit).sum()
    }

    /// Contracts at open time, before any partial exit.
    pub fn initial_size(&self) -> f64 {
        self.size + self.partial_exits.iter().map(|p| p.size).sum::<f64>()
    }

    pub fn is_winner(&self) -> bool {
        self.result.is_some_and(|r| r.profit > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_position() -> Position {
        Position {
            side: Side::Long,
            entry: 50_000.0,
            stop: Some(49_000.0),
            take_profit: Some(51_000.0),
            initial_stop: Some(49_000.0),
            risk: 5.0,
            size: 61_250.0,
            pnl: -0.0018375,
            opened_at: 0,
            partial_exits: vec![PartialExit {
                timestamp: 60,
                price: 50_500.0,
                portion: 0.5,
                size: 61_250.0,
                profit: 0.011,
            }],
            result: None,
        }
    }

    #[test]
    fn side_level_checks() {
        assert!(Side::Long.is_protective_stop(100.0, 95.0));
        assert!(!Side::Long.is_protective_stop(100.0, 105.0));
        assert!(Side::Short.is_protective_stop(100.0, 105.0));
        assert!(Side::Short.is_profit_target(100.0, 90.0));
        assert!(!Side::Short.is_profit_target(100.0, 110.0));
    }

    #[test]
    fn side_parses_and_displays() {
        assert_eq!("LONG".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Short);
        assert!("flat".parse::<Side>().is_err());
        assert_eq!(Side::Short.to_string(), "short");
    }

    #[test]
    fn open_position_has_no_result() {
        let pos = sample_position();
        assert!(pos.is_open());
        assert_eq!(pos.closed_at(), None);
        assert!(!pos.is_winner());
    }

    #[test]
    fn partial_exit_bookkeeping() {
        let pos = sample_position();
        assert_eq!(pos.initial_size(), 122_500.0);
        assert!((pos.partial_profit() - 0.011).abs() < 1e-12);
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Long).unwrap(), "\"long\"");
    }
}
