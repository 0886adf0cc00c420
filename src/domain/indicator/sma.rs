//! Simple moving average of closing prices.
//!
//! SMA(n)[i] = sum(C[i-j] for j in 0..n) / n
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut running_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        running_sum += bar.close;
        if period > 0 && i >= period {
            running_sum -= bars[i - period].close;
        }

        let valid = period > 0 && i + 1 >= period;
        let value = if valid {
            running_sum / period as f64
        } else {
            0.0
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
