//! Exchange fee schedule for inverse contracts.

use serde::{Deserialize, Serialize};

/// Whether a fill adds liquidity (maker) or removes it (taker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Maker,
    Taker,
}

impl Liquidity {
    pub fn from_maker(is_maker: bool) -> Self {
        if is_maker {
            Liquidity::Maker
        } else {
            Liquidity::Taker
        }
    }

    pub fn is_maker(self) -> bool {
        matches!(self, Liquidity::Maker)
    }
}

/// Maker rebate and taker cost as fractions of notional (0.00075 = 0.075%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub maker: f64,
    pub taker: f64,
}

impl Default for FeeSchedule {
    /// Bybit inverse perpetual schedule: 0.025% maker rebate, 0.075% taker fee.
    fn default() -> Self {
        Self {
            maker: 0.025 / 100.0,
            taker: 0.075 / 100.0,
        }
    }
}

impl FeeSchedule {
    pub fn zero() -> Self {
        Self {
            maker: 0.0,
            taker: 0.0,
        }
    }

    /// Balance adjustment in base currency for filling `size` contracts at `price`.
    ///
    /// Positive for a maker rebate, negative for a taker cost.
    pub fn adjustment(&self, liquidity: Liquidity, size: f64, price: f64) -> f64 {
        let notional = size / price;
        match liquidity {
            Liquidity::Maker => notional * self.maker,
            Liquidity::Taker => -notional * self.taker,
        }
    }
}
