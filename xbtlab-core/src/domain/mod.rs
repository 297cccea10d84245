//! Domain types for xbtlab

pub mod bar;
pub mod position;

pub use bar::{day_index, hour_of_day, same_day, Bar, BarError, SECONDS_PER_DAY, SECONDS_PER_HOUR};
pub use position::{BalanceChange, PartialExit, Position, Side, TradeResult};
