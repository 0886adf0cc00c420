//! ROC (Rate of Change) as a fraction.
//!
//! ROC(n)[i] = (C[i] - C[i-n]) / C[i-n]
//! If C[i-n] == 0: ROC = 0
//! Warmup: first n bars invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_roc(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let valid = period > 0 && i >= period;

        let value = if valid {
            bar.return_from(bars[i - period].close)
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
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}
