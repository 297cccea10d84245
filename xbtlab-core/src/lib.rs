//! xbtlab core: inverse-contract account simulation and bar replay.
//!
//! This crate contains the backtesting engine proper:
//! - Domain types (bars, sides, positions, trade results)
//! - Account: one position at a time, inverse-contract PnL, maker/taker fees,
//!   daily and total statistics, drawdown tracking
//! - Risk gate: daily win/loss throttle
//! - Signal feed boundary with a column-table implementation
//! - Replay loop driving all of the above bar by bar
//! - Result summary
//!
//! No I/O happens here. Bars and signal tables come in as values; logging goes
//! through `tracing` spans supplied by the caller.

pub mod account;
pub mod domain;
pub mod engine;
pub mod report;
pub mod risk;
pub mod signals;
