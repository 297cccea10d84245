//! Serializable strategy configuration.
//!
//! A strategy file is TOML:
//!
//! ```toml
//! name = "hma-aroon"
//! no_trade_hours = [3, 4, 5]
//! tp_atr = 2.0
//! stop_atr = 2.0
//! risk = 1.0
//!
//! [[signals]]
//! name = "hma"
//! timeframe = "1h"
//!
//! [[signals]]
//! name = "aroon"
//! timeframe = "15m"
//!
//! [volatility]
//! column = "atr"
//! timeframe = "1h"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use xbtlab_core::account::{Account, AccountError, FeeSchedule, Liquidity, ReentryPolicy};
use xbtlab_core::engine::{ReplayConfig, ReplayError, StopMode};
use xbtlab_core::risk::RiskGate;
use xbtlab_core::signals::Timeframe;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ReplayError> for ConfigError {
    fn from(e: ReplayError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

impl From<AccountError> for ConfigError {
    fn from(e: AccountError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

/// A signal column and the timeframe it was computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub name: String,
    pub timeframe: Timeframe,
}

/// The volatility (ATR-like) column used to place stops and targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySpec {
    pub column: String,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub signals: Vec<SignalSpec>,
    pub volatility: VolatilitySpec,
    #[serde(default = "default_no_trade_hours")]
    pub no_trade_hours: Vec<u32>,
    #[serde(default = "default_atr_multiple")]
    pub tp_atr: f64,
    #[serde(default = "default_atr_multiple")]
    pub stop_atr: f64,
    #[serde(default)]
    pub stop_mode: StopMode,
    #[serde(default = "default_risk")]
    pub risk: f64,
    /// Enter with maker fills instead of taker.
    #[serde(default)]
    pub entry_maker: bool,
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,
    #[serde(default = "default_max_daily_wins")]
    pub max_daily_wins: u32,
    #[serde(default = "default_max_daily_losses")]
    pub max_daily_losses: u32,
    #[serde(default)]
    pub reentry: ReentryPolicy,
    #[serde(default = "default_start_balance")]
    pub start_balance: f64,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub close_at_end: bool,
}

fn default_name() -> String {
    "strategy".to_string()
}

fn default_no_trade_hours() -> Vec<u32> {
    vec![3, 4, 5]
}

fn default_atr_multiple() -> f64 {
    2.0
}

fn default_risk() -> f64 {
    1.0
}

fn default_price_decimals() -> u32 {
    2
}

fn default_max_daily_wins() -> u32 {
    RiskGate::default().max_daily_wins
}

fn default_max_daily_losses() -> u32 {
    RiskGate::default().max_daily_losses
}

fn default_start_balance() -> f64 {
    1.0
}

impl StrategyConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn signal_names(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.name.clone()).collect()
    }

    /// Timeframes that must have a signal table loaded.
    pub fn timeframes(&self) -> Vec<Timeframe> {
        let mut tfs: Vec<Timeframe> = self
            .signals
            .iter()
            .map(|s| s.timeframe)
            .chain(std::iter::once(self.volatility.timeframe))
            .collect();
        tfs.sort();
        tfs.dedup();
        tfs
    }

    pub fn replay_config(&self) -> ReplayConfig {
        ReplayConfig {
            signals: self.signal_names(),
            no_trade_hours: self.no_trade_hours.clone(),
            stop_atr: self.stop_atr,
            tp_atr: self.tp_atr,
            stop_mode: self.stop_mode,
            risk: self.risk,
            entry_liquidity: Liquidity::from_maker(self.entry_maker),
            price_decimals: self.price_decimals,
            gate: RiskGate::new(self.max_daily_wins, self.max_daily_losses),
            close_at_end: self.close_at_end,
        }
    }

    pub fn account(&self) -> Result<Account, ConfigError> {
        Ok(Account::new(self.start_balance)?
            .with_fees(self.fees)
            .with_reentry(self.reentry))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        if let Some(dup) = self.signals.iter().find(|s| !seen.insert(s.name.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "signal '{}' listed twice",
                dup.name
            )));
        }
        if self.signals.iter().any(|s| s.name == self.volatility.column) {
            return Err(ConfigError::Invalid(format!(
                "'{}' cannot be both a signal and the volatility column",
                self.volatility.column
            )));
        }
        for (name, fee) in [("maker", self.fees.maker), ("taker", self.fees.taker)] {
            if !fee.is_finite() || fee < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} fee must be finite and non-negative, got {fee}"
                )));
            }
        }
        self.replay_config().validate()?;
        self.account()?;
        Ok(())
    }
}

/// Everything that determines a run's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub strategy: StrategyConfig,
    /// BLAKE3 hash of the bar file the run replays.
    pub dataset_hash: String,
}

impl RunConfig {
    /// Deterministic hash ID for this configuration.
    ///
    /// Two runs with identical strategy and data share the same id.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[signals]]
        name = "hma"
        timeframe = "1h"

        [volatility]
        column = "atr"
        timeframe = "1h"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = StrategyConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.name, "strategy");
        assert_eq!(cfg.no_trade_hours, vec![3, 4, 5]);
        assert_eq!(cfg.tp_atr, 2.0);
        assert_eq!(cfg.stop_atr, 2.0);
        assert_eq!(cfg.risk, 1.0);
        assert_eq!(cfg.max_daily_wins, 1);
        assert_eq!(cfg.max_daily_losses, 3);
        assert_eq!(cfg.reentry, ReentryPolicy::Reject);
        assert_eq!(cfg.fees, FeeSchedule::default());
        assert!(!cfg.entry_maker);
        assert!(!cfg.close_at_end);
    }

    #[test]
    fn full_config_parses() {
        let cfg = StrategyConfig::from_toml_str(
            r#"
            name = "hma-aroon"
            no_trade_hours = []
            tp_atr = 0.95
            stop_atr = 1.0
            stop_mode = "volatility_or_hour_extreme"
            risk = 5.0
            entry_maker = true
            reentry = "force_close"
            start_balance = 2.5
            close_at_end = true

            [[signals]]
            name = "hma"
            timeframe = "1h"

            [[signals]]
            name = "aroon"
            timeframe = "15m"

            [volatility]
            column = "atr"
            timeframe = "1h"

            [fees]
            maker = 0.0
            taker = 0.0006
            "#,
        )
        .unwrap();

        assert_eq!(cfg.signal_names(), vec!["hma", "aroon"]);
        assert_eq!(cfg.timeframes(), vec![Timeframe::M15, Timeframe::H1]);
        let replay = cfg.replay_config();
        assert_eq!(replay.stop_mode, StopMode::VolatilityOrHourExtreme);
        assert_eq!(replay.entry_liquidity, Liquidity::Maker);
        assert!(replay.close_at_end);
        assert_eq!(cfg.fees.taker, 0.0006);
        assert_eq!(cfg.account().unwrap().start_balance(), 2.5);
    }

    #[test]
    fn missing_signals_is_a_parse_error() {
        let err = StrategyConfig::from_toml_str("[volatility]\ncolumn = \"atr\"\ntimeframe = \"1h\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_hour = format!("no_trade_hours = [25]\n{MINIMAL}");
        assert!(matches!(
            StrategyConfig::from_toml_str(&bad_hour),
            Err(ConfigError::Invalid(_))
        ));

        let bad_balance = format!("start_balance = 0.0\n{MINIMAL}");
        assert!(StrategyConfig::from_toml_str(&bad_balance).is_err());

        let no_signals = "signals = []\n[volatility]\ncolumn = \"atr\"\ntimeframe = \"1h\"";
        assert!(StrategyConfig::from_toml_str(no_signals).is_err());
    }

    #[test]
    fn rejects_duplicate_signals() {
        let dup = format!("{MINIMAL}\n[[signals]]\nname = \"hma\"\ntimeframe = \"15m\"");
        let err = StrategyConfig::from_toml_str(&dup).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn run_id_is_deterministic_and_sensitive() {
        let strategy = StrategyConfig::from_toml_str(MINIMAL).unwrap();
        let a = RunConfig {
            strategy: strategy.clone(),
            dataset_hash: "abc".into(),
        };
        let b = a.clone();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        assert_eq!(a.run_id().unwrap().len(), 64);

        let mut c = a.clone();
        c.strategy.risk = 2.0;
        assert_ne!(a.run_id().unwrap(), c.run_id().unwrap());

        let d = RunConfig {
            strategy,
            dataset_hash: "abd".into(),
        };
        assert_ne!(a.run_id().unwrap(), d.run_id().unwrap());
    }
}
