//! Serialization of backtest output for the dashboard
//!
//! - Equity curve: CSV, header `index,equity`, ISO-8601 UTC timestamps
//! - Summary / report: JSON via serde

use chrono::SecondsFormat;
use std::path::Path;
use thiserror::Error;

use crate::types::{BacktestReport, BacktestSummary, EquityPoint};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Equity curve as CSV text, one row per bar in chronological order
pub fn equity_curve_csv(curve: &[EquityPoint]) -> ExportResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["index", "equity"])?;

    for point in curve {
        wtr.write_record([
            point.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            point.equity.to_string(),
        ])?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn summary_json(summary: &BacktestSummary) -> ExportResult<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Write the equity CSV and/or the summary JSON of a report to disk
pub fn write_report_files(
    report: &BacktestReport,
    equity_csv: Option<&Path>,
    summary: Option<&Path>,
) -> ExportResult<()> {
    if let Some(path) = equity_csv {
        std::fs::write(path, equity_curve_csv(&report.equity_curve)?)?;
    }
    if let Some(path) = summary {
        std::fs::write(path, summary_json(&report.summary)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProfitFactor;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_equity_csv_layout() {
        let curve = vec![
            EquityPoint {
                time: Utc.timestamp_opt(1_704_067_200, 0).unwrap(),
                equity: 10_000.0,
            },
            EquityPoint {
                time: Utc.timestamp_opt(1_704_070_800, 0).unwrap(),
                equity: 9_990.5,
            },
        ];
        let csv = equity_curve_csv(&curve).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "index,equity");
        assert_eq!(lines[1], "2024-01-01T00:00:00Z,10000");
        assert_eq!(lines[2], "2024-01-01T01:00:00Z,9990.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_summary_json_field_names() {
        let summary = BacktestSummary {
            final_equity: 10_100.0,
            total_return_pct: 0.01,
            n_trades: 4,
            wins: 3,
            win_rate: 0.75,
            avg_win: 12.0,
            avg_loss: -8.0,
            profit_factor: ProfitFactor::Infinite,
            max_consecutive_losses: 0,
            max_drawdown: 0.02,
            sharpe: 1.3,
        };
        let value: serde_json::Value =
            serde_json::from_str(&summary_json(&summary).unwrap()).unwrap();
        for field in [
            "final_equity",
            "total_return_pct",
            "n_trades",
            "wins",
            "win_rate",
            "avg_win",
            "avg_loss",
            "profit_factor",
            "max_consecutive_losses",
            "max_drawdown",
            "sharpe",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(value["profit_factor"], "inf");
    }
}
