//! Risk gate: decides whether a new position may be opened.
//!
//! Rules are checked in a fixed order and the first failing one is reported:
//! - AccountRuined: balance went non-positive
//! - PositionOpen: only one position at a time
//! - DailyWinLimit: stop trading for the day after enough wins
//! - DailyLossLimit: stop trading for the day after too many losses

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::Account;

/// Why an entry was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    AccountRuined,
    PositionOpen,
    DailyWinLimit,
    DailyLossLimit,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::AccountRuined => write!(f, "AccountRuined"),
            DenialReason::PositionOpen => write!(f, "PositionOpen"),
            DenialReason::DailyWinLimit => write!(f, "DailyWinLimit"),
            DenialReason::DailyLossLimit => write!(f, "DailyLossLimit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Permitted,
    Denied(DenialReason),
}

impl GateDecision {
    pub fn is_permitted(self) -> bool {
        matches!(self, GateDecision::Permitted)
    }
}

/// Daily win/loss throttle.
///
/// Trading stops for the rest of the UTC day once `max_daily_wins` winners
/// have closed, or once losses exceed `max_daily_losses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskGate {
    pub max_daily_wins: u32,
    pub max_daily_losses: u32,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self {
            max_daily_wins: 1,
            max_daily_losses: 3,
        }
    }
}

impl RiskGate {
    pub fn new(max_daily_wins: u32, max_daily_losses: u32) -> Self {
        Self {
            max_daily_wins,
            max_daily_losses,
        }
    }

    pub fn evaluate(&self, account: &Account) -> GateDecision {
        let daily = account.daily();
        if account.is_ruined() {
            GateDecision::Denied(DenialReason::AccountRuined)
        } else if account.has_position() {
            GateDecision::Denied(DenialReason::PositionOpen)
        } else if daily.won >= self.max_daily_wins {
            GateDecision::Denied(DenialReason::DailyWinLimit)
        } else if daily.lost > self.max_daily_losses {
            GateDecision::Denied(DenialReason::DailyLossLimit)
        } else {
            GateDecision::Permitted
        }
    }

    pub fn permits(&self, account: &Account) -> bool {
        self.evaluate(account).is_permitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{EntryRequest, FeeSchedule, Liquidity};
    use crate::domain::Bar;

    const DAY0: i64 = 1_613_779_200;

    fn losing_trade(acc: &mut Account, timestamp: i64) {
        acc.update(&Bar::new(timestamp, 100.0, 100.0, 100.0, 100.0, 1.0))
            .unwrap();
        acc.open(EntryRequest::long(100.0).stop(90.0).risk(1.0).at(timestamp))
            .unwrap();
        acc.close(95.0, Liquidity::Taker, timestamp).unwrap();
    }

    #[test]
    fn fresh_account_is_permitted() {
        let acc = Account::new(1.0).unwrap();
        assert_eq!(RiskGate::default().evaluate(&acc), GateDecision::Permitted);
    }

    #[test]
    fn live_position_denies() {
        let mut acc = Account::new(1.0).unwrap();
        acc.open(EntryRequest::long(100.0).stop(90.0)).unwrap();
        assert_eq!(
            RiskGate::default().evaluate(&acc),
            GateDecision::Denied(DenialReason::PositionOpen)
        );
    }

    #[test]
    fn one_win_ends_the_day() {
        let mut acc = Account::new(1.0).unwrap();
        acc.open(EntryRequest::long(100.0).stop(90.0)).unwrap();
        acc.close(110.0, Liquidity::Maker, 0).unwrap();
        assert_eq!(
            RiskGate::default().evaluate(&acc),
            GateDecision::Denied(DenialReason::DailyWinLimit)
        );
    }

    #[test]
    fn losses_must_exceed_limit() {
        let gate = RiskGate::default();
        let mut acc = Account::new(1.0).unwrap();
        for i in 0..3 {
            losing_trade(&mut acc, DAY0 + i * 60);
        }
        // Three losses: still allowed, the comparison is strict.
        assert!(gate.permits(&acc));

        losing_trade(&mut acc, DAY0 + 180);
        assert_eq!(
            gate.evaluate(&acc),
            GateDecision::Denied(DenialReason::DailyLossLimit)
        );
    }

    #[test]
    fn rollover_lifts_the_daily_limit() {
        let gate = RiskGate::new(1, 0);
        let mut acc = Account::new(1.0).unwrap();
        losing_trade(&mut acc, DAY0);
        assert!(!gate.permits(&acc));

        acc.update(&Bar::new(DAY0 + 86_400, 100.0, 100.0, 100.0, 100.0, 1.0))
            .unwrap();
        assert!(gate.permits(&acc));
        assert_eq!(acc.totals().lost, 1);
    }

    #[test]
    fn ruin_takes_precedence() {
        let mut acc = Account::new(1.0)
            .unwrap()
            .with_fees(FeeSchedule::zero());
        acc.open(EntryRequest::long(10_000.0).stop(9_900.0).risk(50.0))
            .unwrap();
        assert!(acc.close(5_000.0, Liquidity::Taker, 0).is_err());
        assert_eq!(
            RiskGate::default().evaluate(&acc),
            GateDecision::Denied(DenialReason::AccountRuined)
        );
    }

    #[test]
    fn denial_reason_displays() {
        assert_eq!(DenialReason::DailyLossLimit.to_string(), "DailyLossLimit");
    }
}
