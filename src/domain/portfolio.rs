//! Position state and the records a simulation appends to.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub num_positions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeEntry {
    pub date: NaiveDate,
    pub ticker: String,
    pub side: TradeSide,
    /// Signed share delta; negative for sells.
    pub shares: f64,
    pub price: f64,
    /// Absolute traded value.
    pub notional: f64,
    pub commission: f64,
    pub slippage: f64,
}

impl TradeEntry {
    pub fn cost(&self) -> f64 {
        self.commission + self.slippage
    }
}

/// Cash plus fractional share holdings, owned by one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    pub cash: f64,
    shares: BTreeMap<String, f64>,
}

impl PositionState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            shares: BTreeMap::new(),
        }
    }

    pub fn shares(&self, ticker: &str) -> f64 {
        self.shares.get(ticker).copied().unwrap_or(0.0)
    }

    /// Held tickers in ascending order.
    pub fn held(&self) -> impl Iterator<Item = (&str, f64)> {
        self.shares.iter().map(|(t, s)| (t.as_str(), *s))
    }

    pub fn position_count(&self) -> usize {
        self.shares.len()
    }

    /// Apply a share delta at `price`, charging `costs` to cash. A position
    /// whose remaining size is negligible is closed out entirely.
    pub fn apply_trade(&mut self, ticker: &str, delta: f64, price: f64, costs: f64) {
        self.cash -= delta * price + costs;
        let remaining = self.shares(ticker) + delta;
        if remaining.abs() <= 1e-9 {
            self.shares.remove(ticker);
        } else {
            self.shares.insert(ticker.to_string(), remaining);
        }
    }

    /// Value of holdings under `price_of`; tickers it cannot price count as 0.
    pub fn positions_value<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.shares
            .iter()
            .filter_map(|(t, s)| price_of(t).map(|p| p * s))
            .sum()
    }

    pub fn total_value<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.cash + self.positions_value(price_of)
    }
}
