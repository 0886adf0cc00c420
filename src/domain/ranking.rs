//! Cross-sectional normalization, score combination, ranking and selection.
//!
//! Signals from different strategies live on different scales, so each
//! strategy's signals are z-scored across tickers on every date before being
//! summed into a combined score. Ranking puts tickers with at least one
//! non-zero raw signal ahead of the rest, then orders by score. Selection
//! turns the head of that ranking into portfolio weights.

use crate::domain::error::EnsembleError;
use crate::domain::price_panel::PricePanel;
use crate::domain::strategy::{FLAT_TOLERANCE, Signal, SignalSet};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Offset added to proportional weights so the lowest selected score still
/// gets a small positive weight.
pub const PROPORTIONAL_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightingMode {
    #[default]
    Equal,
    Proportional,
}

impl fmt::Display for WeightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingMode::Equal => write!(f, "equal"),
            WeightingMode::Proportional => write!(f, "proportional"),
        }
    }
}

impl FromStr for WeightingMode {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" | "equal_weight" => Ok(WeightingMode::Equal),
            "proportional" => Ok(WeightingMode::Proportional),
            other => Err(EnsembleError::invalid_parameter(
                "weighting",
                format!("expected equal or proportional, got '{other}'"),
            )),
        }
    }
}

/// Z-score one date's signals across tickers (population std).
/// A flat cross-section normalizes to 0 for every ticker.
pub fn normalize_cross_section(signals: &BTreeMap<String, Signal>) -> BTreeMap<String, f64> {
    let n = signals.len() as f64;
    if signals.is_empty() {
        return BTreeMap::new();
    }
    let mean = signals.values().map(|s| s.value).sum::<f64>() / n;
    let variance = signals
        .values()
        .map(|s| (s.value - mean).powi(2))
        .sum::<f64>()
        / n;
    let std = variance.sqrt();

    signals
        .iter()
        .map(|(ticker, s)| {
            let z = if std > FLAT_TOLERANCE {
                (s.value - mean) / std
            } else {
                0.0
            };
            (ticker.clone(), z)
        })
        .collect()
}

/// One strategy's signals after cross-sectional normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSignals {
    pub strategy: String,
    pub values: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl NormalizedSignals {
    pub fn from_set(set: &SignalSet) -> Self {
        let values = set
            .dates()
            .filter_map(|date| set.on_date(date).map(|m| (date, normalize_cross_section(m))))
            .collect();
        Self {
            strategy: set.strategy().to_string(),
            values,
        }
    }

    /// Flattened values in (date, ticker) order.
    pub fn series(&self) -> Vec<f64> {
        self.values
            .values()
            .flat_map(|by_ticker| by_ticker.values().copied())
            .collect()
    }
}

/// Fail unless `set` holds exactly one signal per (date, ticker) in the panel.
pub fn check_universe(panel: &PricePanel, set: &SignalSet) -> Result<(), EnsembleError> {
    let mismatch = |date: NaiveDate, ticker: &str| EnsembleError::UniverseMismatch {
        strategy: set.strategy().to_string(),
        date,
        ticker: ticker.to_string(),
    };

    for &date in panel.dates() {
        let expected = panel.tickers_on(date);
        let Some(actual) = set.on_date(date) else {
            let first = expected.first().copied().unwrap_or_default();
            return Err(mismatch(date, first));
        };
        if let Some(missing) = expected.iter().find(|t| !actual.contains_key(**t)) {
            return Err(mismatch(date, missing));
        }
        if actual.len() != expected.len() {
            if let Some(extra) = actual.keys().find(|t| !expected.contains(&t.as_str())) {
                return Err(mismatch(date, extra));
            }
        }
    }

    if let Some(date) = set.dates().find(|d| panel.dates().binary_search(d).is_err()) {
        let ticker = set
            .on_date(date)
            .and_then(|m| m.keys().next().cloned())
            .unwrap_or_default();
        return Err(mismatch(date, &ticker));
    }

    Ok(())
}

/// Combined score for one (date, ticker).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickerScore {
    pub score: f64,
    /// At least one strategy emitted a non-zero raw signal.
    pub informative: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedScores {
    by_date: BTreeMap<NaiveDate, BTreeMap<String, TickerScore>>,
}

impl CombinedScores {
    /// Weighted sum of normalized signals. `sets`, `normalized` and `weights`
    /// are parallel, one entry per strategy, already checked against the
    /// same universe.
    pub fn combine(sets: &[SignalSet], normalized: &[NormalizedSignals], weights: &[f64]) -> Self {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, TickerScore>> = BTreeMap::new();

        for ((set, norm), &weight) in sets.iter().zip(normalized).zip(weights) {
            for (date, by_ticker) in &norm.values {
                let scores = by_date.entry(*date).or_default();
                for (ticker, z) in by_ticker {
                    let informative = set
                        .get(*date, ticker)
                        .is_some_and(|s| s.is_informative());
                    let entry = scores.entry(ticker.clone()).or_insert(TickerScore {
                        score: 0.0,
                        informative: false,
                    });
                    entry.score += weight * z;
                    entry.informative |= informative;
                }
            }
        }

        Self { by_date }
    }

    pub fn on_date(&self, date: NaiveDate) -> Option<&BTreeMap<String, TickerScore>> {
        self.by_date.get(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.by_date.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.by_date
            .values()
            .flat_map(|m| m.values().map(|s| s.score))
    }

    pub fn rank(&self, date: NaiveDate) -> Vec<RankedAsset> {
        self.on_date(date).map(rank_scores).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAsset {
    pub rank: usize,
    pub ticker: String,
    pub score: f64,
    pub informative: bool,
}

/// Informative tickers first, then score descending, then ticker ascending.
pub fn rank_scores(scores: &BTreeMap<String, TickerScore>) -> Vec<RankedAsset> {
    let mut entries: Vec<(&String, &TickerScore)> = scores.iter().collect();
    entries.sort_by(|(ta, a), (tb, b)| {
        b.informative
            .cmp(&a.informative)
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
            .then_with(|| ta.cmp(tb))
    });
    entries
        .into_iter()
        .enumerate()
        .map(|(i, (ticker, s))| RankedAsset {
            rank: i + 1,
            ticker: ticker.clone(),
            score: s.score,
            informative: s.informative,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionEntry {
    pub ticker: String,
    pub weight: f64,
    pub score: f64,
}

/// Target portfolio decided on `date`, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSelection {
    pub date: NaiveDate,
    pub entries: Vec<SelectionEntry>,
}

impl PortfolioSelection {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn weight_of(&self, ticker: &str) -> f64 {
        self.entries
            .iter()
            .find(|e| e.ticker == ticker)
            .map_or(0.0, |e| e.weight)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Take the top `top_n` tickers from a ranking and weight them. Under
/// `long_only` a strictly negative score is ineligible; nothing else is.
pub fn select(
    date: NaiveDate,
    ranked: &[RankedAsset],
    top_n: usize,
    long_only: bool,
    weighting: WeightingMode,
) -> PortfolioSelection {
    let chosen: Vec<&RankedAsset> = ranked
        .iter()
        .filter(|a| a.score.is_finite())
        .filter(|a| !long_only || a.score >= 0.0)
        .take(top_n)
        .collect();

    if chosen.is_empty() {
        return PortfolioSelection::empty(date);
    }

    let raw: Vec<f64> = match weighting {
        WeightingMode::Equal => vec![1.0; chosen.len()],
        WeightingMode::Proportional => {
            let min = chosen
                .iter()
                .map(|a| a.score)
                .fold(f64::INFINITY, f64::min);
            chosen
                .iter()
                .map(|a| a.score - min + PROPORTIONAL_EPSILON)
                .collect()
        }
    };
    let total: f64 = raw.iter().sum();

    PortfolioSelection {
        date,
        entries: chosen
            .iter()
            .zip(raw)
            .map(|(a, w)| SelectionEntry {
                ticker: a.ticker.clone(),
                weight: w / total,
                score: a.score,
            })
            .collect(),
    }
}
