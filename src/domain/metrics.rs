//! Performance metrics over a completed equity curve.

use super::portfolio::{EquityPoint, TradeEntry};
use serde::Serialize;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub win_rate: f64,
    pub total_trades: usize,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub final_value: f64,
    pub average_positions: f64,
    pub trading_days: usize,
}

impl Metrics {
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[TradeEntry],
        risk_free_rate: f64,
    ) -> Self {
        let final_value = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            final_value / initial_capital - 1.0
        } else {
            0.0
        };

        let returns = daily_returns(equity_curve);
        let annualized_return = annualize(total_return, returns.len());

        let (mean, std) = mean_and_std(&returns);
        let annualized_volatility = std * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe_ratio = if annualized_volatility > 0.0 {
            (annualized_return - risk_free_rate) / annualized_volatility
        } else {
            0.0
        };
        let sortino_ratio = sortino(&returns, mean, risk_free_rate / TRADING_DAYS_PER_YEAR);

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let win_rate = if returns.is_empty() {
            0.0
        } else {
            returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
        };

        let average_positions = if equity_curve.is_empty() {
            0.0
        } else {
            equity_curve.iter().map(|p| p.num_positions as f64).sum::<f64>()
                / equity_curve.len() as f64
        };

        Metrics {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            win_rate,
            total_trades: trades.len(),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            total_slippage: trades.iter().map(|t| t.slippage).sum(),
            final_value,
            average_positions,
            trading_days: equity_curve.len(),
        }
    }
}

/// Simple period-over-period returns of the curve.
pub fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                w[1].equity / prev - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn annualize(total_return: f64, periods: usize) -> f64 {
    if periods == 0 || !total_return.is_finite() {
        return 0.0;
    }
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn sortino(returns: &[f64], mean: f64, daily_rf: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let downside_variance = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_std = downside_variance.sqrt();

    if downside_std > 0.0 {
        (mean - daily_rf) / downside_std * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline as a fraction of the peak, and the longest
/// run of consecutive points spent below a prior peak.
pub fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }

    (max_dd.clamp(0.0, 1.0), max_duration)
}
