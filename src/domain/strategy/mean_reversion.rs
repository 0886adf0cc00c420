//! Mean reversion: lean against a stretched price.
//!
//! z = (close - SMA(lookback_ma)) / STDDEV(lookback_vol)
//! signal = -tanh(z)
//!
//! Confidence falls as recent return volatility rises above its longer-run
//! baseline: 1 / (1 + RETSTDDEV(lookback_vol) / RETSTDDEV(historical_vol_period)),
//! or 0.5 while the baseline is unavailable or zero.

use super::{FLAT_TOLERANCE, Signal, SignalSet, Strategy, from_series_fn};
use crate::domain::error::EnsembleError;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::stddev::{calculate_return_stddev, calculate_stddev};
use crate::domain::price_panel::{PricePanel, TickerSeries};

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversion {
    name: String,
    pub lookback_ma: usize,
    pub lookback_vol: usize,
    pub historical_vol_period: usize,
}

impl MeanReversion {
    pub const DEFAULT_NAME: &'static str = "MeanReversion";

    pub fn new(
        lookback_ma: usize,
        lookback_vol: usize,
        historical_vol_period: usize,
    ) -> Result<Self, EnsembleError> {
        if lookback_ma < 1 {
            return Err(EnsembleError::invalid_parameter(
                "mean_reversion.lookback_ma",
                "must be at least 1",
            ));
        }
        if lookback_vol < 2 {
            return Err(EnsembleError::invalid_parameter(
                "mean_reversion.lookback_vol",
                "must be at least 2",
            ));
        }
        if historical_vol_period < lookback_vol {
            return Err(EnsembleError::invalid_parameter(
                "mean_reversion.historical_vol_period",
                "must not be shorter than lookback_vol",
            ));
        }
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            lookback_ma,
            lookback_vol,
            historical_vol_period,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn series_signals(&self, series: &TickerSeries) -> Vec<Signal> {
        let bars = &series.bars;
        let sma = calculate_sma(bars, self.lookback_ma);
        let price_vol = calculate_stddev(bars, self.lookback_vol);
        let recent_vol = calculate_return_stddev(bars, self.lookback_vol);
        let baseline_vol = calculate_return_stddev(bars, self.historical_vol_period);

        (0..bars.len())
            .map(|i| {
                let (Some(ma), Some(vol)) = (sma.value_at(i), price_vol.value_at(i)) else {
                    return Signal::NEUTRAL;
                };
                if vol <= FLAT_TOLERANCE * ma.abs().max(1.0) {
                    return Signal::NEUTRAL;
                }

                let z = (bars[i].close - ma) / vol;
                let confidence = match (recent_vol.value_at(i), baseline_vol.value_at(i)) {
                    (Some(recent), Some(baseline)) if baseline > 0.0 => {
                        1.0 / (1.0 + recent / baseline)
                    }
                    _ => 0.5,
                };
                Signal::new(-z.tanh(), confidence)
            })
            .collect()
    }
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            lookback_ma: 50,
            lookback_vol: 20,
            historical_vol_period: 100,
        }
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.lookback_ma.max(self.lookback_vol)
    }

    fn generate_signals(&self, panel: &PricePanel) -> SignalSet {
        from_series_fn(&self.name, panel, |series| self.series_signals(series))
    }
}
