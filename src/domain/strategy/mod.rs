//! Signal-generating strategies.
//!
//! A strategy turns a [`PricePanel`] into one [`Signal`] for every (date,
//! ticker) the panel holds. Dates inside a strategy's lookback window get
//! [`Signal::NEUTRAL`] instead of being left out, so every signal set a run
//! produces covers the same universe.
//!
//! The ensemble engine only ever sees `dyn Strategy`; adding a variant means
//! adding a module here and nothing else.

pub mod benchmark;
pub mod mean_reversion;
pub mod momentum;
pub mod trend_following;

pub use benchmark::Benchmark;
pub use mean_reversion::MeanReversion;
pub use momentum::Momentum;
pub use trend_following::TrendFollowing;

use crate::domain::price_panel::{PricePanel, TickerSeries};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Relative size below which a deviation or volatility is treated as zero.
/// Keeps rounding noise on flat prices from turning into full-strength signals.
pub(crate) const FLAT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signal {
    pub value: f64,
    pub confidence: f64,
}

impl Signal {
    pub const NEUTRAL: Signal = Signal {
        value: 0.0,
        confidence: 0.0,
    };

    /// Clamp into `[-1, 1]` x `[0, 1]`. Non-finite input collapses to neutral.
    pub fn new(value: f64, confidence: f64) -> Self {
        if !value.is_finite() || !confidence.is_finite() {
            return Signal::NEUTRAL;
        }
        Signal {
            value: value.clamp(-1.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// A signal carries a view when its value is non-zero.
    pub fn is_informative(&self) -> bool {
        self.value != 0.0
    }
}

/// Flattened view of one entry in a [`SignalSet`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub strategy: String,
    pub signal: f64,
    pub confidence: f64,
}

/// All signals one strategy produced over a panel, grouped by date.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSet {
    strategy: String,
    signals: BTreeMap<NaiveDate, BTreeMap<String, Signal>>,
}

impl SignalSet {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            signals: BTreeMap::new(),
        }
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn insert(&mut self, date: NaiveDate, ticker: &str, signal: Signal) {
        self.signals
            .entry(date)
            .or_default()
            .insert(ticker.to_string(), signal);
    }

    pub fn get(&self, date: NaiveDate, ticker: &str) -> Option<Signal> {
        self.signals.get(&date).and_then(|m| m.get(ticker)).copied()
    }

    /// Signals on `date`, keyed by ticker in ascending order.
    pub fn on_date(&self, date: NaiveDate) -> Option<&BTreeMap<String, Signal>> {
        self.signals.get(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.signals.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.signals.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in (date, ticker) order.
    pub fn records(&self) -> impl Iterator<Item = SignalRecord> + '_ {
        self.signals.iter().flat_map(move |(date, by_ticker)| {
            by_ticker.iter().map(move |(ticker, s)| SignalRecord {
                date: *date,
                ticker: ticker.clone(),
                strategy: self.strategy.clone(),
                signal: s.value,
                confidence: s.confidence,
            })
        })
    }
}

/// Capability contract every signal generator implements.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Unique name; used to key signal sets, weights and the correlation report.
    fn name(&self) -> &str;

    /// Bars of history a ticker needs before this strategy can express a view.
    fn lookback(&self) -> usize;

    fn generate_signals(&self, panel: &PricePanel) -> SignalSet;
}

/// Run every strategy over the same panel in parallel.
///
/// Output order matches `strategies`. The panel is only read, so no
/// synchronisation is needed beyond the join at the end of `collect`.
pub fn generate_all(strategies: &[Box<dyn Strategy>], panel: &PricePanel) -> Vec<SignalSet> {
    let dates = panel.dates().len();
    strategies
        .par_iter()
        .map(|strategy| {
            let lookback = strategy.lookback();
            if dates < lookback {
                warn!(
                    strategy = strategy.name(),
                    lookback, dates, "panel shorter than lookback; signals stay neutral"
                );
            }
            let set = strategy.generate_signals(panel);
            debug!(
                strategy = strategy.name(),
                lookback,
                signals = set.len(),
                "generated signals"
            );
            set
        })
        .collect()
}

/// Build a signal set from a per-ticker function returning one signal per bar.
pub(crate) fn from_series_fn<F>(name: &str, panel: &PricePanel, per_series: F) -> SignalSet
where
    F: Fn(&TickerSeries) -> Vec<Signal>,
{
    let mut set = SignalSet::new(name);
    for series in panel.iter_series() {
        let signals = per_series(series);
        for (bar, signal) in series.bars.iter().zip(signals) {
            set.insert(bar.date, &series.ticker, signal);
        }
    }
    set
}
