//! Result summary: aggregate statistics of a finished (or running) account.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::account::{percent_change, Account};

/// Won trades as a percentage of closed trades.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrikeRate {
    Ratio(f64),
    /// No closed trades yet.
    NotAvailable,
}

impl StrikeRate {
    pub fn from_counts(won: u32, trades: usize) -> Self {
        if trades == 0 {
            StrikeRate::NotAvailable
        } else {
            StrikeRate::Ratio(won as f64 / trades as f64 * 100.0)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            StrikeRate::Ratio(v) => Some(v),
            StrikeRate::NotAvailable => None,
        }
    }
}

impl fmt::Display for StrikeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeRate::Ratio(v) => write!(f, "{v:.2}%"),
            StrikeRate::NotAvailable => write!(f, "N/A"),
        }
    }
}

/// Serialized as a number, or the string `"N/A"`.
impl Serialize for StrikeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StrikeRate::Ratio(v) => serializer.serialize_f64(*v),
            StrikeRate::NotAvailable => serializer.serialize_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub trades: usize,
    pub strike_rate: StrikeRate,
    pub start_balance: f64,
    pub balance: f64,
    pub growth_pct: f64,
    /// Worst peak-to-trough change in percent, 0 or negative.
    pub max_drawdown_pct: f64,
    pub won: u32,
    pub lost: u32,
    pub even: u32,
    pub ruined: bool,
}

impl Summary {
    pub fn from_account(account: &Account) -> Self {
        let totals = account.totals();
        let trades = account.trades().len();
        Self {
            trades,
            strike_rate: StrikeRate::from_counts(totals.won, trades),
            start_balance: account.start_balance(),
            balance: account.balance(),
            growth_pct: percent_change(account.start_balance(), account.balance()),
            max_drawdown_pct: account.max_drawdown(),
            won: totals.won,
            lost: totals.lost,
            even: totals.even,
            ruined: account.is_ruined(),
        }
    }
}

impl Account {
    pub fn summary(&self) -> Summary {
        Summary::from_account(self)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "trades:       {}", self.trades)?;
        writeln!(f, "strike rate:  {}", self.strike_rate)?;
        writeln!(f, "balance:      {:.8}", self.balance)?;
        writeln!(f, "growth:       {:.2}%", self.growth_pct)?;
        writeln!(f, "max drawdown: {:.2}%", self.max_drawdown_pct)?;
        write!(
            f,
            "won/lost/even: {}/{}/{}",
            self.won, self.lost, self.even
        )?;
        if self.ruined {
            write!(f, "\naccount ruined")?;
        }
        Ok(())
    }
}
