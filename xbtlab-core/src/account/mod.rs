//! Account: balance, the single live position, closed trades and running statistics.
//!
//! All mutation goes through four calls issued by the replay loop:
//! - `open`: size and seed a new position
//! - `update`: once per bar; day rollover, then stop/take-profit checks
//! - `close`: manual exit
//! - `tighten_stop` / `take_profits_partial`: in-trade management
//!
//! Order of operations on every close is fixed: entry seed + inverse PnL + exit
//! fee, balance mutation, drawdown tracking, outcome classification, result.

pub mod fees;
pub mod pnl;
pub mod ratchet;
pub mod stats;

pub use fees::{FeeSchedule, Liquidity};
pub use pnl::{inverse_contract_pnl, percent_change, size_by_balance, size_by_stop_risk};
pub use ratchet::ratchet_stop;
pub use stats::{BarFlags, DailyStats, Outcome, TotalStats};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn, Span};

use crate::domain::{same_day, BalanceChange, Bar, PartialExit, Position, Side, TradeResult};

/// Errors from account operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountError {
    #[error("cannot open: a {side} position entered at {entry} is still live")]
    InvalidState { side: Side, entry: f64 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("account ruined: balance {balance} is not positive")]
    DegenerateBalance { balance: f64 },
}

/// What `open` does when a position is already live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Fail with `InvalidState`. Strategies must close before opening.
    #[default]
    Reject,
    /// Close the live position at the new entry price (taker) before opening.
    ForceClose,
}

/// Parameters for opening a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryRequest {
    pub side: Side,
    pub price: f64,
    pub stop: Option<f64>,
    pub take_profit: Option<f64>,
    /// Percent of balance to risk.
    pub risk: f64,
    pub liquidity: Liquidity,
    pub timestamp: i64,
}

impl EntryRequest {
    /// A taker entry risking 5% with no stop or target.
    pub fn new(side: Side, price: f64) -> Self {
        Self {
            side,
            price,
            stop: None,
            take_profit: None,
            risk: 5.0,
            liquidity: Liquidity::Taker,
            timestamp: 0,
        }
    }

    pub fn long(price: f64) -> Self {
        Self::new(Side::Long, price)
    }

    pub fn short(price: f64) -> Self {
        Self::new(Side::Short, price)
    }

    pub fn stop(mut self, stop: f64) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn take_profit(mut self, take_profit: f64) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn risk(mut self, risk: f64) -> Self {
        self.risk = risk;
        self
    }

    pub fn liquidity(mut self, liquidity: Liquidity) -> Self {
        self.liquidity = liquidity;
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn validate(&self) -> Result<(), AccountError> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "entry price must be finite and positive, got {}",
                self.price
            )));
        }
        if !self.risk.is_finite() || self.risk <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "risk must be finite and positive, got {}",
                self.risk
            )));
        }
        if let Some(stop) = self.stop {
            if !stop.is_finite() || stop <= 0.0 || !self.side.is_protective_stop(self.price, stop)
            {
                return Err(AccountError::InvalidParameter(format!(
                    "stop {stop} is not on the losing side of a {} entry at {}",
                    self.side, self.price
                )));
            }
        }
        if let Some(tp) = self.take_profit {
            if !tp.is_finite() || tp <= 0.0 || !self.side.is_profit_target(self.price, tp) {
                return Err(AccountError::InvalidParameter(format!(
                    "take-profit {tp} is not on the winning side of a {} entry at {}",
                    self.side, self.price
                )));
            }
        }
        Ok(())
    }
}

/// Simulated inverse-contract account for one backtest run.
#[derive(Debug, Clone)]
pub struct Account {
    balance: f64,
    start_balance: f64,
    max_balance: f64,
    /// Most negative peak-to-current change seen, in percent (0 or below).
    max_drawdown: f64,
    fees: FeeSchedule,
    reentry: ReentryPolicy,
    position: Option<Position>,
    trades: Vec<Position>,
    daily: DailyStats,
    totals: TotalStats,
    last_bar_timestamp: Option<i64>,
    flags: BarFlags,
    ruined: bool,
    span: Span,
}

impl Account {
    /// Create an account with the default fee schedule and `Reject` re-entry.
    pub fn new(start_balance: f64) -> Result<Self, AccountError> {
        if !start_balance.is_finite() || start_balance <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "start balance must be finite and positive, got {start_balance}"
            )));
        }
        Ok(Self {
            balance: start_balance,
            start_balance,
            max_balance: start_balance,
            max_drawdown: 0.0,
            fees: FeeSchedule::default(),
            reentry: ReentryPolicy::default(),
            position: None,
            trades: Vec::new(),
            daily: DailyStats::default(),
            totals: TotalStats::default(),
            last_bar_timestamp: None,
            flags: BarFlags::default(),
            ruined: false,
            span: Span::none(),
        })
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_reentry(mut self, reentry: ReentryPolicy) -> Self {
        self.reentry = reentry;
        self
    }

    /// Parent span for every event this account emits.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn start_balance(&self) -> f64 {
        self.start_balance
    }

    pub fn max_balance(&self) -> f64 {
        self.max_balance
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    pub fn reentry(&self) -> ReentryPolicy {
        self.reentry
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn trades(&self) -> &[Position] {
        &self.trades
    }

    pub fn last_trade(&self) -> Option<&Position> {
        self.trades.last()
    }

    pub fn daily(&self) -> DailyStats {
        self.daily
    }

    pub fn totals(&self) -> TotalStats {
        self.totals
    }

    /// Flags for the bar most recently passed to `update` (or the last close).
    pub fn flags(&self) -> BarFlags {
        self.flags
    }

    pub fn is_ruined(&self) -> bool {
        self.ruined
    }

    /// Open a position sized so that a stop-out loses `risk` percent of balance.
    pub fn open(&mut self, req: EntryRequest) -> Result<(), AccountError> {
        if self.ruined {
            return Err(AccountError::DegenerateBalance {
                balance: self.balance,
            });
        }
        req.validate()?;

        if let Some(live) = self.position.take() {
            match self.reentry {
                ReentryPolicy::Reject => {
                    let err = AccountError::InvalidState {
                        side: live.side,
                        entry: live.entry,
                    };
                    self.position = Some(live);
                    return Err(err);
                }
                ReentryPolicy::ForceClose => {
                    debug!(parent: &self.span, side = %live.side, entry = live.entry, "force-closing live position before re-entry");
                    self.close_position(live, req.price, Liquidity::Taker, req.timestamp, false)?;
                }
            }
        }

        let size = match req.stop {
            Some(stop) => size_by_stop_risk(self.balance, req.risk, req.price, stop),
            None => size_by_balance(self.balance, req.risk),
        };
        if !size.is_finite() || size <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "derived size {size} is not finite and positive"
            )));
        }

        let seed = self.fees.adjustment(req.liquidity, size, req.price);
        self.daily.trades += 1;

        info!(
            parent: &self.span,
            side = %req.side,
            entry = req.price,
            stop = ?req.stop,
            take_profit = ?req.take_profit,
            size,
            timestamp = req.timestamp,
            "opened position"
        );

        self.position = Some(Position {
            side: req.side,
            entry: req.price,
            stop: req.stop,
            take_profit: req.take_profit,
            initial_stop: req.stop,
            risk: req.risk,
            size,
            pnl: seed,
            opened_at: req.timestamp,
            partial_exits: Vec::new(),
            result: None,
        });
        Ok(())
    }

    /// Close the live position at `price`.
    ///
    /// Without a live position this is a no-op and `price` is not inspected.
    pub fn close(
        &mut self,
        price: f64,
        liquidity: Liquidity,
        timestamp: i64,
    ) -> Result<Option<TradeResult>, AccountError> {
        if self.position.is_none() {
            debug!(parent: &self.span, price, "close: nothing to close");
            return Ok(None);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "exit price must be finite and positive, got {price}"
            )));
        }
        match self.position.take() {
            Some(pos) => self
                .close_position(pos, price, liquidity, timestamp, false)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Process one bar: day rollover, flag reset, then stop/take-profit checks.
    ///
    /// The stop is checked before the take-profit: a bar that spans both levels
    /// is assumed to have hit the adverse one first.
    pub fn update(&mut self, bar: &Bar) -> Result<BarFlags, AccountError> {
        if let Some(last) = self.last_bar_timestamp {
            if !same_day(last, bar.timestamp) {
                debug!(parent: &self.span, timestamp = bar.timestamp, daily = ?self.daily, "day rollover");
                self.daily.reset();
            }
        }
        self.last_bar_timestamp = Some(bar.timestamp);
        self.flags = BarFlags::default();

        let exit = self.position.as_ref().and_then(|pos| triggered_exit(pos, bar));
        if let Some((price, liquidity, stopped)) = exit {
            if let Some(pos) = self.position.take() {
                debug!(
                    parent: &self.span,
                    side = %pos.side,
                    price,
                    stopped,
                    timestamp = bar.timestamp,
                    "exit level hit"
                );
                self.close_position(pos, price, liquidity, bar.timestamp, stopped)?;
            }
        }
        Ok(self.flags)
    }

    /// Move the stop toward the market. Never loosens it.
    ///
    /// Returns the resulting stop level, or `None` without a live position.
    pub fn tighten_stop(&mut self, price: f64) -> Result<Option<f64>, AccountError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "stop must be finite and positive, got {price}"
            )));
        }
        let Some(pos) = self.position.as_mut() else {
            return Ok(None);
        };
        let stop = ratchet_stop(pos.side, pos.stop, price);
        pos.stop = Some(stop);
        Ok(Some(stop))
    }

    /// Close `portion` of the live position at `price` with a taker fill.
    ///
    /// Taking the whole remaining size finalizes the position through the
    /// regular close path so that it lands in the trade list. So does a partial
    /// that leaves the balance at or below zero: the rest is closed at `price`
    /// and `DegenerateBalance` is reported once. Without a live position only
    /// `portion` is checked.
    pub fn take_profits_partial(
        &mut self,
        price: f64,
        portion: f64,
        timestamp: i64,
    ) -> Result<Option<PartialExit>, AccountError> {
        if !(portion > 0.0 && portion <= 1.0) {
            return Err(AccountError::InvalidParameter(format!(
                "portion must be in (0, 1], got {portion}"
            )));
        }
        if self.position.is_none() {
            return Ok(None);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(AccountError::InvalidParameter(format!(
                "exit price must be finite and positive, got {price}"
            )));
        }
        let Some(pos) = self.position.as_mut() else {
            return Ok(None);
        };
        if pos.size <= 0.0 {
            return Ok(None);
        }

        let quantity = if portion >= 1.0 {
            pos.size
        } else {
            pos.size * portion
        };
        pos.size -= quantity;

        let profit = inverse_contract_pnl(pos.side, pos.entry, price, quantity)
            + self.fees.adjustment(Liquidity::Taker, quantity, price);
        let exit = PartialExit {
            timestamp,
            price,
            portion,
            size: quantity,
            profit,
        };
        pos.partial_exits.push(exit);
        let remaining = pos.size;

        self.balance += profit;
        self.track_drawdown();
        info!(parent: &self.span, price, portion, size = quantity, profit, remaining, "partial exit");

        // A fully taken position, or one the account can no longer carry, is
        // finalized at the partial's price.
        if remaining <= 0.0 || self.balance <= 0.0 {
            if let Some(pos) = self.position.take() {
                self.close_position(pos, price, Liquidity::Taker, timestamp, false)?;
            }
        }
        Ok(Some(exit))
    }

    fn close_position(
        &mut self,
        mut pos: Position,
        price: f64,
        liquidity: Liquidity,
        timestamp: i64,
        stopped: bool,
    ) -> Result<TradeResult, AccountError> {
        let profit = pos.pnl
            + inverse_contract_pnl(pos.side, pos.entry, price, pos.size)
            + self.fees.adjustment(liquidity, pos.size, price);

        let before = self.balance;
        self.balance += profit;
        self.track_drawdown();

        let outcome = Outcome::classify(profit);
        self.daily.record(outcome);
        self.totals.record(outcome);
        self.flags = BarFlags::closed_with(outcome, stopped);

        let result = TradeResult {
            closed_at: timestamp,
            stopped,
            exit: price,
            profit,
            percent: (before > 0.0).then(|| percent_change(before, self.balance)),
            balance: BalanceChange {
                before,
                after: self.balance,
            },
        };
        pos.result = Some(result);

        info!(
            parent: &self.span,
            side = %pos.side,
            entry = pos.entry,
            exit = price,
            profit,
            stopped,
            balance = self.balance,
            timestamp,
            "closed position"
        );

        self.trades.push(pos);
        self.check_solvency()?;
        Ok(result)
    }

    fn track_drawdown(&mut self) {
        self.max_balance = self.max_balance.max(self.balance);
        self.max_drawdown = self
            .max_drawdown
            .min(percent_change(self.max_balance, self.balance));
    }

    fn check_solvency(&mut self) -> Result<(), AccountError> {
        if self.balance > 0.0 {
            return Ok(());
        }
        if !self.ruined {
            warn!(parent: &self.span, balance = self.balance, "account ruined");
        }
        self.ruined = true;
        Err(AccountError::DegenerateBalance {
            balance: self.balance,
        })
    }
}

/// Exit level hit by `bar`, if any: (price, liquidity, stopped).
fn triggered_exit(pos: &Position, bar: &Bar) -> Option<(f64, Liquidity, bool)> {
    let (stop_hit, tp_hit) = match pos.side {
        Side::Long => (
            pos.stop.filter(|&stop| bar.low <= stop),
            pos.take_profit.filter(|&tp| bar.high >= tp),
        ),
        Side::Short => (
            pos.stop.filter(|&stop| bar.high >= stop),
            pos.take_profit.filter(|&tp| bar.low <= tp),
        ),
    };
    match (stop_hit, tp_hit) {
        (Some(stop), _) => Some((stop, Liquidity::Taker, true)),
        (None, Some(tp)) => Some((tp, Liquidity::Maker, false)),
        (None, None) => None,
    }
}
