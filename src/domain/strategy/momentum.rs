//! Momentum: buy recent winners, sell recent losers.
//!
//! signal = tanh(sensitivity * ROC(lookback)), confidence = min(|ROC|, 0.5) / 0.5

use super::{Signal, SignalSet, Strategy, from_series_fn};
use crate::domain::error::EnsembleError;
use crate::domain::indicator::roc::calculate_roc;
use crate::domain::price_panel::{PricePanel, TickerSeries};

const CONFIDENCE_SATURATION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
    name: String,
    pub lookback: usize,
    pub sensitivity: f64,
}

impl Momentum {
    pub const DEFAULT_NAME: &'static str = "Momentum";

    pub fn new(lookback: usize, sensitivity: f64) -> Result<Self, EnsembleError> {
        if lookback < 1 {
            return Err(EnsembleError::invalid_parameter(
                "momentum.lookback",
                "must be at least 1",
            ));
        }
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            return Err(EnsembleError::invalid_parameter(
                "momentum.sensitivity",
                "must be positive",
            ));
        }
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            lookback,
            sensitivity,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn series_signals(&self, series: &TickerSeries) -> Vec<Signal> {
        let roc = calculate_roc(&series.bars, self.lookback);
        (0..series.bar_count())
            .map(|i| match roc.value_at(i) {
                Some(r) => Signal::new(
                    (self.sensitivity * r).tanh(),
                    r.abs().min(CONFIDENCE_SATURATION) / CONFIDENCE_SATURATION,
                ),
                None => Signal::NEUTRAL,
            })
            .collect()
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            lookback: 20,
            sensitivity: 10.0,
        }
    }
}

impl Strategy for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.lookback + 1
    }

    fn generate_signals(&self, panel: &PricePanel) -> SignalSet {
        from_series_fn(&self.name, panel, |series| self.series_signals(series))
    }
}
