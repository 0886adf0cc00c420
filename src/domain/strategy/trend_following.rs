//! Trend following: ride the distance from a long moving average.
//!
//! distance = (close - SMA(sma_period)) / SMA(sma_period)
//! signal = tanh(sensitivity * distance)
//! confidence = min(|distance|, 0.2) / 0.2

use super::{FLAT_TOLERANCE, Signal, SignalSet, Strategy, from_series_fn};
use crate::domain::error::EnsembleError;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::price_panel::{PricePanel, TickerSeries};

const CONFIDENCE_SATURATION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendFollowing {
    name: String,
    pub sma_period: usize,
    pub sensitivity: f64,
}

impl TrendFollowing {
    pub const DEFAULT_NAME: &'static str = "TrendFollowing";

    pub fn new(sma_period: usize, sensitivity: f64) -> Result<Self, EnsembleError> {
        if sma_period < 1 {
            return Err(EnsembleError::invalid_parameter(
                "trend_following.sma_period",
                "must be at least 1",
            ));
        }
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            return Err(EnsembleError::invalid_parameter(
                "trend_following.sensitivity",
                "must be positive",
            ));
        }
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            sma_period,
            sensitivity,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn series_signals(&self, series: &TickerSeries) -> Vec<Signal> {
        let bars = &series.bars;
        let sma = calculate_sma(bars, self.sma_period);

        (0..bars.len())
            .map(|i| {
                let Some(ma) = sma.value_at(i) else {
                    return Signal::NEUTRAL;
                };
                if ma <= 0.0 {
                    return Signal::NEUTRAL;
                }
                let distance = (bars[i].close - ma) / ma;
                if distance.abs() <= FLAT_TOLERANCE {
                    return Signal::NEUTRAL;
                }
                Signal::new(
                    (self.sensitivity * distance).tanh(),
                    distance.abs().min(CONFIDENCE_SATURATION) / CONFIDENCE_SATURATION,
                )
            })
            .collect()
    }
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            sma_period: 100,
            sensitivity: 5.0,
        }
    }
}

impl Strategy for TrendFollowing {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.sma_period
    }

    fn generate_signals(&self, panel: &PricePanel) -> SignalSet {
        from_series_fn(&self.name, panel, |series| self.series_signals(series))
    }
}
