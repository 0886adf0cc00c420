//! Rolling standard deviations.
//!
//! Population standard deviation over n closing prices:
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n) / n)
//! Warmup: first (n-1) bars are invalid.
//!
//! RETSTDDEV(n) is the same statistic over the last n simple daily returns.
//! Warmup: first n bars are invalid (bar 0 has no return).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

fn population_stddev(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

pub fn calculate_stddev(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let valid = period > 0 && i + 1 >= period;
        let value = if valid {
            population_stddev(&closes[i + 1 - period..=i])
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
        indicator_type: IndicatorType::Stddev(period),
        values,
    }
}

pub fn calculate_return_stddev(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    // returns[k] is the return into bar k + 1
    let returns: Vec<f64> = bars
        .windows(2)
        .map(|w| w[1].return_from(w[0].close))
        .collect();
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let valid = period > 0 && i >= period;
        let value = if valid {
            population_stddev(&returns[i - period..i])
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
        indicator_type: IndicatorType::ReturnStddev(period),
        values,
    }
}
