//! Win/loss counters and per-bar transition flags.

use serde::{Deserialize, Serialize};

/// Classification of a closed trade by the sign of its realized profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Won,
    Lost,
    /// Exactly zero profit. A real third outcome, not a rounding bucket.
    Even,
}

impl Outcome {
    pub fn classify(profit: f64) -> Self {
        if profit > 0.0 {
            Outcome::Won
        } else if profit < 0.0 {
            Outcome::Lost
        } else {
            Outcome::Even
        }
    }
}

/// Counters for the current UTC calendar day. Reset on day rollover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub won: u32,
    pub lost: u32,
    pub even: u32,
    /// Positions opened today.
    pub trades: u32,
}

impl DailyStats {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Won => self.won += 1,
            Outcome::Lost => self.lost += 1,
            Outcome::Even => self.even += 1,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counters for the whole run. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalStats {
    pub won: u32,
    pub lost: u32,
    pub even: u32,
}

impl TotalStats {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Won => self.won += 1,
            Outcome::Lost => self.lost += 1,
            Outcome::Even => self.even += 1,
        }
    }

    pub fn closed(&self) -> u32 {
        self.won + self.lost + self.even
    }
}

/// What happened on the last processed bar. Cleared at the start of every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarFlags {
    pub stopped: bool,
    pub closed: bool,
    pub won: bool,
    pub lost: bool,
    pub even: bool,
}

impl BarFlags {
    pub fn closed_with(outcome: Outcome, stopped: bool) -> Self {
        Self {
            stopped,
            closed: true,
            won: outcome == Outcome::Won,
            lost: outcome == Outcome::Lost,
            even: outcome == Outcome::Even,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_sign() {
        assert_eq!(Outcome::classify(0.01), Outcome::Won);
        assert_eq!(Outcome::classify(-1e-12), Outcome::Lost);
        assert_eq!(Outcome::classify(0.0), Outcome::Even);
        assert_eq!(Outcome::classify(-0.0), Outcome::Even);
    }

    #[test]
    fn daily_reset_clears_everything() {
        let mut daily = DailyStats::default();
        daily.record(Outcome::Won);
        daily.record(Outcome::Lost);
        daily.trades = 2;
        daily.reset();
        assert_eq!(daily, DailyStats::default());
    }

    #[test]
    fn totals_count_closed() {
        let mut totals = TotalStats::default();
        totals.record(Outcome::Won);
        totals.record(Outcome::Even);
        totals.record(Outcome::Lost);
        totals.record(Outcome::Lost);
        assert_eq!(totals.closed(), 4);
        assert_eq!(totals.lost, 2);
    }

    #[test]
    fn flags_reflect_outcome() {
        let flags = BarFlags::closed_with(Outcome::Lost, true);
        assert!(flags.closed && flags.stopped && flags.lost);
        assert!(!flags.won && !flags.even);
    }
}
