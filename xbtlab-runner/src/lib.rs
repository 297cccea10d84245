//! xbtlab runner: everything around the replay engine.
//!
//! This crate builds on `xbtlab-core` to provide:
//! - TOML strategy configuration and content-addressed run ids
//! - CSV loading for bars and per-timeframe signal tables
//! - Single and parallel batch runs over shared market data
//! - Artifact export (trade tape CSV, summary and report JSON)

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;

pub use config::{ConfigError, RunConfig, RunId, SignalSpec, StrategyConfig, VolatilitySpec};
pub use data_loader::{
    build_feed, load_bars, load_market_data, load_signal_table, read_bars, read_signal_table,
    BarSet, LoadError, MarketData, SignalTable,
};
pub use export::{export_report_json, export_summary_json, export_trades_csv, save_artifacts};
pub use runner::{run_batch, run_single, RunError, RunResult, SCHEMA_VERSION};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn market_data_is_send_sync() {
        assert_send::<MarketData>();
        assert_sync::<MarketData>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<StrategyConfig>();
        assert_sync::<StrategyConfig>();
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn run_result_is_send_sync() {
        assert_send::<RunResult>();
        assert_sync::<RunResult>();
    }
}
