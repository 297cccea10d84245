//! Artifact export: trade tape CSV, summary JSON, and the full run report.
//!
//! Every run gets its own directory `{strategy}_{run_id prefix}/` holding
//! `trades.csv`, `summary.json` and `report.json`. The directory name is
//! derived from the run id, so re-running identical inputs overwrites the
//! same artifacts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use xbtlab_core::domain::Position;
use xbtlab_core::report::Summary;

use crate::runner::RunResult;

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn format_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(String::new, |v| format!("{v:.decimals$}"))
}

/// Export closed trades as CSV.
///
/// Columns: opened_at, closed_at, side, entry, exit, stop, initial_stop,
/// take_profit, size, risk, partial_exits, partial_profit, profit, percent,
/// stopped, balance_before, balance_after
pub fn export_trades_csv(trades: &[Position]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "opened_at",
        "closed_at",
        "side",
        "entry",
        "exit",
        "stop",
        "initial_stop",
        "take_profit",
        "size",
        "risk",
        "partial_exits",
        "partial_profit",
        "profit",
        "percent",
        "stopped",
        "balance_before",
        "balance_after",
    ])?;

    for t in trades {
        let Some(result) = t.result.as_ref() else {
            continue;
        };
        wtr.write_record([
            format_timestamp(t.opened_at),
            format_timestamp(result.closed_at),
            t.side.to_string(),
            format!("{:.2}", t.entry),
            format!("{:.2}", result.exit),
            format_opt(t.stop, 2),
            format_opt(t.initial_stop, 2),
            format_opt(t.take_profit, 2),
            format!("{:.2}", t.initial_size()),
            format!("{:.2}", t.risk),
            t.partial_exits.len().to_string(),
            format!("{:.8}", t.partial_profit()),
            format!("{:.8}", result.profit),
            format_opt(result.percent, 4),
            result.stopped.to_string(),
            format!("{:.8}", result.balance.before),
            format!("{:.8}", result.balance.after),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_summary_json(summary: &Summary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize summary to JSON")
}

pub fn export_report_json(result: &RunResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize run result to JSON")
}

/// Write the artifact set for one run under `output_dir`.
///
/// Returns the path to the run directory.
pub fn save_artifacts(result: &RunResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix = result.run_id.get(..12).unwrap_or(&result.run_id);
    let run_dir = output_dir.join(format!("{}_{}", sanitize(&result.strategy.name), prefix));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let write = |name: &str, content: String| -> Result<()> {
        let path = run_dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))
    };
    write("trades.csv", export_trades_csv(&result.report.trades)?)?;
    write("summary.json", export_summary_json(&result.report.summary)?)?;
    write("report.json", export_report_json(result)?)?;

    info!(dir = %run_dir.display(), "saved artifacts");
    Ok(run_dir)
}

/// Strategy names become directory names; keep them portable.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "strategy".to_string()
    } else {
        cleaned
    }
}
