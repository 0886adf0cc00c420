#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use ensemble_trader::domain::error::EnsembleError;
pub use ensemble_trader::domain::ohlcv::OhlcvBar;
use ensemble_trader::domain::price_panel::PricePanel;
use ensemble_trader::domain::ranking::{PortfolioSelection, SelectionEntry};
use ensemble_trader::domain::strategy::{Signal, SignalSet};
use ensemble_trader::ports::data_port::DataPort;
use std::collections::BTreeSet;
use std::io::Write;

pub struct MockDataPort {
    pub bars: Vec<OhlcvBar>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(bars: Vec<OhlcvBar>) -> Self {
        Self { bars, error: None }
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_panel(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PricePanel, EnsembleError> {
        if let Some(reason) = &self.error {
            return Err(EnsembleError::MalformedData {
                reason: reason.clone(),
            });
        }
        let bars = self
            .bars
            .iter()
            .filter(|b| start.is_none_or(|s| b.date >= s) && end.is_none_or(|e| b.date <= e))
            .cloned()
            .collect();
        PricePanel::from_bars(bars)
    }

    fn list_tickers(&self) -> Result<Vec<String>, EnsembleError> {
        let tickers: BTreeSet<String> = self.bars.iter().map(|b| b.ticker.clone()).collect();
        Ok(tickers.into_iter().collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` calendar days after 2024-01-01.
pub fn day(n: u64) -> NaiveDate {
    date(2024, 1, 1).checked_add_days(Days::new(n)).unwrap()
}

pub fn make_bar(ticker: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        date,
        ticker: ticker.to_string(),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000,
    }
}

/// Bars for each ticker on consecutive days starting at `day(0)`.
pub fn bars_from_closes(series: &[(&str, &[f64])]) -> Vec<OhlcvBar> {
    series
        .iter()
        .flat_map(|(ticker, closes)| {
            closes
                .iter()
                .enumerate()
                .map(move |(i, &c)| make_bar(ticker, day(i as u64), c))
        })
        .collect()
}

pub fn panel_from_closes(series: &[(&str, &[f64])]) -> PricePanel {
    PricePanel::from_bars(bars_from_closes(series)).unwrap()
}

/// Deterministic wandering price path.
pub fn wave(len: usize, base: f64, phase: f64) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64;
            base + 0.05 * t * base / 100.0 + base * 0.08 * ((t / 7.0) + phase).sin()
        })
        .collect()
}

pub fn selection(date: NaiveDate, weights: &[(&str, f64)]) -> PortfolioSelection {
    PortfolioSelection {
        date,
        entries: weights
            .iter()
            .map(|(t, w)| SelectionEntry {
                ticker: t.to_string(),
                weight: *w,
                score: 0.0,
            })
            .collect(),
    }
}

/// Signal set with one row of values per panel date, in ticker order.
pub fn signal_set(strategy: &str, tickers: &[&str], rows: &[&[f64]]) -> SignalSet {
    let mut set = SignalSet::new(strategy);
    for (i, row) in rows.iter().enumerate() {
        for (ticker, &value) in tickers.iter().zip(row.iter()) {
            set.insert(day(i as u64), ticker, Signal::new(value, 1.0));
        }
    }
    set
}

pub fn write_temp_file(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn prices_csv(bars: &[OhlcvBar]) -> String {
    let mut out = String::from("date,ticker,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            b.date, b.ticker, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    out
}
