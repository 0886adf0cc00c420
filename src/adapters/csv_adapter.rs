//! CSV price panel adapter.
//!
//! Reads one long-format CSV (one row per date and ticker) with the canonical
//! header `date,ticker,open,high,low,close,volume`. Extra columns are ignored.

use crate::domain::error::EnsembleError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::price_panel::{PricePanel, check_canonical_columns};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct CsvPanelAdapter {
    path: PathBuf,
}

impl CsvPanelAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_bars(&self) -> Result<Vec<OhlcvBar>, EnsembleError> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::Reader::from_reader(file);

        let headers = rdr.headers().map_err(|e| self.malformed(&e))?.clone();
        check_canonical_columns(&headers.iter().collect::<Vec<_>>())?;

        let mut bars = Vec::new();
        for result in rdr.deserialize::<OhlcvBar>() {
            bars.push(result.map_err(|e| self.malformed(&e))?);
        }
        debug!(path = %self.path.display(), rows = bars.len(), "read price csv");
        Ok(bars)
    }

    fn malformed(&self, err: &csv::Error) -> EnsembleError {
        let location = err
            .position()
            .map(|p| format!(" line {}", p.line()))
            .unwrap_or_default();
        EnsembleError::MalformedData {
            reason: format!("{}{}: {}", self.path.display(), location, err),
        }
    }
}

impl DataPort for CsvPanelAdapter {
    fn load_panel(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PricePanel, EnsembleError> {
        let bars: Vec<OhlcvBar> = self
            .read_bars()?
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.date >= s) && end.is_none_or(|e| b.date <= e))
            .collect();

        let panel = PricePanel::from_bars(bars)?;
        info!(
            path = %self.path.display(),
            tickers = panel.ticker_count(),
            dates = panel.dates().len(),
            "loaded price panel"
        );
        Ok(panel)
    }

    fn list_tickers(&self) -> Result<Vec<String>, EnsembleError> {
        let tickers: BTreeSet<String> = self.read_bars()?.into_iter().map(|b| b.ticker).collect();
        Ok(tickers.into_iter().collect())
    }
}
