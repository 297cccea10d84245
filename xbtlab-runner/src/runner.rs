//! Backtest runner: wires configuration, loaded data, and the replay engine.
//!
//! Two entry points:
//! - `run_single()`: one strategy against pre-loaded market data.
//! - `run_batch()`: many strategies against the same data, in parallel.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span};

use xbtlab_core::engine::{Replay, ReplayError, ReplayReport};

use crate::config::{ConfigError, RunConfig, RunId, StrategyConfig};
use crate::data_loader::{build_feed, LoadError, MarketData};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy: StrategyConfig,
    pub dataset_hash: String,
    pub report: ReplayReport,
}

/// Replay one strategy over `data`. No I/O.
pub fn run_single(strategy: &StrategyConfig, data: &MarketData) -> Result<RunResult, RunError> {
    strategy.validate()?;
    let run_id = RunConfig {
        strategy: strategy.clone(),
        dataset_hash: data.dataset_hash.clone(),
    }
    .run_id()?;

    let span = info_span!("run", strategy = %strategy.name, run_id = &run_id[..12]);
    let feed = build_feed(strategy, &data.tables)?;
    let replay = Replay::new(strategy.replay_config(), strategy.account()?).with_span(span.clone());
    let report = replay.run(&data.bars, &feed)?;

    span.in_scope(|| {
        info!(
            trades = report.summary.trades,
            balance = report.summary.balance,
            faults = report.faults.len(),
            "run finished"
        )
    });

    Ok(RunResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        strategy: strategy.clone(),
        dataset_hash: data.dataset_hash.clone(),
        report,
    })
}

/// Replay each strategy independently over the same data.
///
/// Results come back in input order. One failing strategy does not stop the others.
pub fn run_batch(
    strategies: &[StrategyConfig],
    data: &MarketData,
) -> Vec<Result<RunResult, RunError>> {
    strategies
        .par_iter()
        .map(|strategy| run_single(strategy, data))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SignalSpec, VolatilitySpec};
    use crate::data_loader::SignalTable;
    use std::collections::BTreeMap;
    use xbtlab_core::domain::Bar;
    use xbtlab_core::signals::Timeframe;

    const DAY0: i64 = 1_613_779_200;

    fn strategy(signal: &str) -> StrategyConfig {
        StrategyConfig::from_toml_str(&format!(
            r#"
            name = "{signal}-only"
            no_trade_hours = []

            [[signals]]
            name = "{signal}"
            timeframe = "1h"

            [volatility]
            column = "atr"
            timeframe = "1h"
            "#
        ))
        .unwrap()
    }

    fn data() -> MarketData {
        // Long entry on the second bar (open above the day's open), target
        // 50_220 is reached in hour 1.
        let bars = vec![
            Bar::new(DAY0, 50_000.0, 50_050.0, 49_950.0, 50_000.0, 1.0),
            Bar::new(DAY0 + 60, 50_020.0, 50_100.0, 49_900.0, 50_050.0, 1.0),
            Bar::new(DAY0 + 3_600, 50_100.0, 50_300.0, 50_050.0, 50_250.0, 1.0),
        ];
        let mut columns = BTreeMap::new();
        columns.insert("up".to_string(), vec!["true".to_string(), "".to_string()]);
        columns.insert("down".to_string(), vec!["false".to_string(), "".to_string()]);
        columns.insert("atr".to_string(), vec!["100".to_string(), "100".to_string()]);
        MarketData {
            bars,
            dataset_hash: "hash".into(),
            tables: vec![SignalTable {
                timeframe: Timeframe::H1,
                timestamps: vec![DAY0, DAY0 + 3_600],
                columns,
            }],
        }
    }

    #[test]
    fn single_run_reports_a_winner() {
        let result = run_single(&strategy("up"), &data()).unwrap();
        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.run_id.len(), 64);
        assert_eq!(result.report.summary.trades, 1);
        assert_eq!(result.report.summary.won, 1);
        assert!(result.report.summary.balance > 1.0);
    }

    #[test]
    fn batch_keeps_input_order() {
        let strategies = vec![strategy("up"), strategy("down"), strategy("missing")];
        let results = run_batch(&strategies, &data());
        assert_eq!(results.len(), 3);

        let up = results[0].as_ref().unwrap();
        assert_eq!(up.strategy.name, "up-only");
        assert_eq!(up.report.summary.won, 1);

        // Price never trades below the day's open, so no short.
        let down = results[1].as_ref().unwrap();
        assert_eq!(down.report.summary.trades, 0);
        assert_eq!(down.report.entries, 0);

        assert!(matches!(
            results[2],
            Err(RunError::Data(LoadError::MissingColumn { .. }))
        ));
        assert_ne!(up.run_id, down.run_id);
    }

    #[test]
    fn missing_timeframe_is_a_data_error() {
        let mut cfg = strategy("up");
        cfg.signals = vec![SignalSpec {
            name: "up".into(),
            timeframe: Timeframe::M15,
        }];
        cfg.volatility = VolatilitySpec {
            column: "atr".into(),
            timeframe: Timeframe::H1,
        };
        let err = run_single(&cfg, &data()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Data(LoadError::MissingTimeframe(Timeframe::M15))
        ));
    }
}
