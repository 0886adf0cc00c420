//! Report output port trait.

use crate::domain::backtest::BacktestRun;
use crate::domain::ensemble::EnsembleResult;
use crate::domain::error::EnsembleError;
use std::path::Path;

/// The pieces of one pipeline run a report is built from.
#[derive(Debug, Clone, Copy)]
pub struct RunReport<'a> {
    pub ensemble: &'a EnsembleResult,
    pub backtest: &'a BacktestRun,
}

/// Port for persisting a completed run.
pub trait ReportPort {
    fn write(&self, report: &RunReport<'_>, out_dir: &Path) -> Result<(), EnsembleError>;
}
