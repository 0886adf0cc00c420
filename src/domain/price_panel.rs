//! Price panel keyed by (date, ticker) and its unified timeline.

use crate::domain::error::EnsembleError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Column names a price source must use. Anything else is rejected.
pub const CANONICAL_COLUMNS: [&str; 7] =
    ["date", "ticker", "open", "high", "low", "close", "volume"];

/// Check that every canonical column is present by its exact name.
/// Extra columns are allowed and ignored by the loaders.
pub fn check_canonical_columns<S: AsRef<str>>(columns: &[S]) -> Result<(), EnsembleError> {
    let found: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
    let missing = CANONICAL_COLUMNS
        .iter()
        .any(|canonical| !found.iter().any(|f| f == canonical));
    if missing {
        return Err(EnsembleError::NonCanonicalColumns {
            expected: CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            found,
        });
    }
    Ok(())
}

/// All bars of one ticker, strictly increasing by date.
#[derive(Debug, Clone)]
pub struct TickerSeries {
    pub ticker: String,
    pub bars: Vec<OhlcvBar>,
    date_index: HashMap<NaiveDate, usize>,
}

impl TickerSeries {
    fn new(ticker: String, bars: Vec<OhlcvBar>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            ticker,
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }
}

/// Immutable (date, ticker) price panel shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct PricePanel {
    series: BTreeMap<String, TickerSeries>,
    dates: Vec<NaiveDate>,
}

impl PricePanel {
    /// Build a panel from bars in any order.
    ///
    /// Bars are grouped per ticker and sorted by date. A repeated (date,
    /// ticker) pair or a malformed bar is a data error.
    pub fn from_bars(bars: Vec<OhlcvBar>) -> Result<Self, EnsembleError> {
        if bars.is_empty() {
            return Err(EnsembleError::EmptyPanel);
        }

        let mut grouped: BTreeMap<String, Vec<OhlcvBar>> = BTreeMap::new();
        for bar in bars {
            if bar.ticker.trim().is_empty() {
                return Err(EnsembleError::MalformedData {
                    reason: format!("empty ticker on {}", bar.date),
                });
            }
            if !bar.is_well_formed() {
                return Err(EnsembleError::MalformedData {
                    reason: format!("invalid bar for {} on {}", bar.ticker, bar.date),
                });
            }
            grouped.entry(bar.ticker.clone()).or_default().push(bar);
        }

        let mut series = BTreeMap::new();
        for (ticker, mut ticker_bars) in grouped {
            ticker_bars.sort_by_key(|b| b.date);
            if let Some(dup) = ticker_bars.windows(2).find(|w| w[0].date == w[1].date) {
                return Err(EnsembleError::DuplicateBar {
                    ticker,
                    date: dup[0].date,
                });
            }
            series.insert(ticker.clone(), TickerSeries::new(ticker, ticker_bars));
        }

        let dates = build_unified_timeline(series.values());
        Ok(Self { series, dates })
    }

    /// Sorted union of every ticker's dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Tickers in ascending order.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn ticker_count(&self) -> usize {
        self.series.len()
    }

    pub fn bar_count(&self) -> usize {
        self.series.values().map(TickerSeries::bar_count).sum()
    }

    pub fn series(&self, ticker: &str) -> Option<&TickerSeries> {
        self.series.get(ticker)
    }

    pub fn iter_series(&self) -> impl Iterator<Item = &TickerSeries> {
        self.series.values()
    }

    pub fn bar(&self, date: NaiveDate, ticker: &str) -> Option<&OhlcvBar> {
        self.series.get(ticker).and_then(|s| s.get_bar(date))
    }

    pub fn close(&self, date: NaiveDate, ticker: &str) -> Option<f64> {
        self.bar(date, ticker).map(|b| b.close)
    }

    /// Tickers with a bar on `date`, ascending.
    pub fn tickers_on(&self, date: NaiveDate) -> Vec<&str> {
        self.series
            .values()
            .filter(|s| s.get_bar(date).is_some())
            .map(|s| s.ticker.as_str())
            .collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Copy of the panel restricted to `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Result<Self, EnsembleError> {
        let bars: Vec<OhlcvBar> = self
            .series
            .values()
            .flat_map(|s| s.bars.iter())
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect();
        Self::from_bars(bars)
    }
}

fn build_unified_timeline<'a>(series: impl Iterator<Item = &'a TickerSeries>) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
