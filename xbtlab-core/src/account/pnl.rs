//! Inverse-contract arithmetic.
//!
//! Inverse perpetuals are quoted in USD but settle in the base currency, so
//! profit is the size times the difference of reciprocal prices:
//!
//! ```text
//! long:  (1/entry - 1/exit) * size
//! short: (1/exit - 1/entry) * size
//! ```

use crate::domain::Side;

/// Realized profit, in base currency, of moving `size` contracts from `entry` to `exit`.
pub fn inverse_contract_pnl(side: Side, entry: f64, exit: f64, size: f64) -> f64 {
    let entry_inv = 1.0 / entry;
    let exit_inv = 1.0 / exit;
    match side {
        Side::Long => (entry_inv - exit_inv) * size,
        Side::Short => (exit_inv - entry_inv) * size,
    }
}

/// Contracts such that hitting `stop` loses `risk` percent of `balance`.
///
/// The stop distance is measured in reciprocal-price space, which is where
/// inverse PnL is linear.
pub fn size_by_stop_risk(balance: f64, risk: f64, entry: f64, stop: f64) -> f64 {
    let risk_amount = balance * (risk / 100.0);
    risk_amount / (1.0 / entry - 1.0 / stop).abs()
}

/// Fallback sizing when no stop is known: a plain fraction of balance.
pub fn size_by_balance(balance: f64, risk: f64) -> f64 {
    balance * (risk / 100.0)
}

/// Percent change from `from` to `to`.
pub fn percent_change(from: f64, to: f64) -> f64 {
    (to - from) / from * 100.0
}
