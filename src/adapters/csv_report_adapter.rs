//! CSV report adapter: one file per output table.

use crate::domain::error::EnsembleError;
use crate::ports::report_port::{ReportPort, RunReport};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

pub const EQUITY_CURVE_FILE: &str = "equity_curve.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const SELECTIONS_FILE: &str = "selections.csv";
pub const CORRELATION_FILE: &str = "correlation.csv";
pub const METRICS_FILE: &str = "metrics.csv";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct SelectionRow<'a> {
    date: NaiveDate,
    rank: usize,
    ticker: &'a str,
    weight: f64,
    score: f64,
}

#[derive(Serialize)]
struct CorrelationRow<'a> {
    strategy_a: &'a str,
    strategy_b: &'a str,
    correlation: f64,
}

fn write_rows<T, I>(path: &Path, rows: I) -> Result<(), EnsembleError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::Writer::from_path(path).map_err(to_io)?;
    for row in rows {
        writer.serialize(row).map_err(to_io)?;
    }
    writer.flush()?;
    Ok(())
}

fn to_io(err: csv::Error) -> EnsembleError {
    EnsembleError::Io(std::io::Error::other(err))
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &RunReport<'_>, out_dir: &Path) -> Result<(), EnsembleError> {
        fs::create_dir_all(out_dir)?;

        write_rows(&out_dir.join(EQUITY_CURVE_FILE), &report.backtest.equity_curve)?;
        write_rows(&out_dir.join(TRADES_FILE), &report.backtest.trades)?;

        let selections = report.ensemble.selections.iter().flat_map(|sel| {
            sel.entries.iter().enumerate().map(move |(i, e)| SelectionRow {
                date: sel.date,
                rank: i + 1,
                ticker: &e.ticker,
                weight: e.weight,
                score: e.score,
            })
        });
        write_rows(&out_dir.join(SELECTIONS_FILE), selections)?;

        let corr = &report.ensemble.correlation;
        let pairs = corr.strategies.iter().enumerate().flat_map(|(i, a)| {
            corr.strategies
                .iter()
                .enumerate()
                .map(move |(j, b)| CorrelationRow {
                    strategy_a: a,
                    strategy_b: b,
                    correlation: corr.values[i][j],
                })
        });
        write_rows(&out_dir.join(CORRELATION_FILE), pairs)?;

        write_rows(&out_dir.join(METRICS_FILE), [&report.backtest.metrics])?;

        info!(dir = %out_dir.display(), "report written");
        Ok(())
    }
}
