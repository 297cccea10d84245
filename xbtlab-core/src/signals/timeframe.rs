//! Candle intervals that signal columns can be computed on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H2 => 7_200,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Open time of the candle of this timeframe containing `timestamp`.
    pub fn bucket_start(self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.seconds())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| format!("unknown timeframe '{s}' (expected one of 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 1d)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY0: i64 = 1_613_779_200;

    #[test]
    fn buckets_floor_to_open_time() {
        let ts = DAY0 + 3 * 3_600 + 17 * 60 + 5;
        assert_eq!(Timeframe::H1.bucket_start(ts), DAY0 + 3 * 3_600);
        assert_eq!(Timeframe::M15.bucket_start(ts), DAY0 + 3 * 3_600 + 15 * 60);
        assert_eq!(Timeframe::H4.bucket_start(ts), DAY0);
        assert_eq!(Timeframe::D1.bucket_start(ts), DAY0);
        assert_eq!(Timeframe::M1.bucket_start(ts), ts - 5);
    }

    #[test]
    fn parses_and_displays() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string().parse::<Timeframe>().unwrap(), tf);
        }
        assert_eq!("1H".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert!("6h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn serde_uses_short_names() {
        assert_eq!(serde_json::to_string(&Timeframe::M15).unwrap(), "\"15m\"");
        let tf: Timeframe = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(tf, Timeframe::H4);
    }
}
