//! Event-driven backtest simulator.
//!
//! The simulator walks the panel's dates in order. On each date it first
//! checks whether a selection dated strictly earlier is waiting to be
//! executed; if so it rebalances to that selection at the current close.
//! Every date then marks holdings to market and appends an equity point.

use crate::domain::error::EnsembleError;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::{EquityPoint, PositionState, TradeEntry, TradeSide};
use crate::domain::price_panel::PricePanel;
use crate::domain::ranking::PortfolioSelection;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What to do when a ticker that must be traded has no bar on a trading date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDataPolicy {
    Fail,
    CarryForward,
}

impl fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingDataPolicy::Fail => write!(f, "fail"),
            MissingDataPolicy::CarryForward => write!(f, "carry_forward"),
        }
    }
}

impl FromStr for MissingDataPolicy {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(MissingDataPolicy::Fail),
            "carry_forward" | "carry-forward" | "ffill" => Ok(MissingDataPolicy::CarryForward),
            other => Err(EnsembleError::invalid_parameter(
                "missing_data",
                format!("expected fail or carry_forward, got '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub risk_free_rate: f64,
    pub missing_data: MissingDataPolicy,
    /// Trades whose absolute notional is at or below this are skipped.
    pub min_trade_value: f64,
}

impl BacktestConfig {
    pub fn new(initial_capital: f64, missing_data: MissingDataPolicy) -> Self {
        Self {
            initial_capital,
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            risk_free_rate: 0.0,
            missing_data,
            min_trade_value: 0.01,
        }
    }

    pub fn validate(&self) -> Result<(), EnsembleError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(EnsembleError::invalid_parameter(
                "initial_capital",
                "must be positive",
            ));
        }
        for (name, rate) in [
            ("commission_rate", self.commission_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(EnsembleError::invalid_parameter(
                    name,
                    "must be a fraction in [0, 1)",
                ));
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(EnsembleError::invalid_parameter(
                "risk_free_rate",
                "must be finite",
            ));
        }
        if !self.min_trade_value.is_finite() || self.min_trade_value < 0.0 {
            return Err(EnsembleError::invalid_parameter(
                "min_trade_value",
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeEntry>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Idle,
    Running,
    Completed,
}

impl SimulatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatorState::Idle => "idle",
            SimulatorState::Running => "running",
            SimulatorState::Completed => "completed",
        }
    }
}

#[derive(Debug)]
pub struct Simulator {
    config: BacktestConfig,
    state: SimulatorState,
    result: Option<BacktestRun>,
}

impl Simulator {
    pub fn new(config: BacktestConfig) -> Result<Self, EnsembleError> {
        config.validate()?;
        Ok(Self {
            config,
            state: SimulatorState::Idle,
            result: None,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    /// Simulate `selections` over `panel`. A simulator runs at most once; a
    /// failed run leaves it Idle with nothing retained.
    pub fn run(
        &mut self,
        panel: &PricePanel,
        selections: &[PortfolioSelection],
    ) -> Result<&BacktestRun, EnsembleError> {
        if self.state != SimulatorState::Idle {
            return Err(EnsembleError::InvalidState {
                operation: "run",
                state: self.state.as_str(),
            });
        }
        if panel.dates().is_empty() {
            return Err(EnsembleError::EmptyPanel);
        }

        self.state = SimulatorState::Running;
        info!(
            dates = panel.dates().len(),
            selections = selections.len(),
            capital = self.config.initial_capital,
            "backtest started"
        );

        match simulate(&self.config, panel, selections) {
            Ok(run) => {
                info!(
                    final_value = run.metrics.final_value,
                    total_return = run.metrics.total_return,
                    trades = run.trades.len(),
                    "backtest completed"
                );
                self.state = SimulatorState::Completed;
                Ok(&*self.result.insert(run))
            }
            Err(e) => {
                warn!(error = %e, "backtest aborted");
                self.state = SimulatorState::Idle;
                Err(e)
            }
        }
    }

    pub fn result(&self) -> Result<&BacktestRun, EnsembleError> {
        self.completed("read results")
    }

    pub fn metrics(&self) -> Result<&Metrics, EnsembleError> {
        self.completed("read metrics").map(|r| &r.metrics)
    }

    pub fn equity_curve(&self) -> Result<&[EquityPoint], EnsembleError> {
        self.completed("read equity curve")
            .map(|r| r.equity_curve.as_slice())
    }

    pub fn trade_log(&self) -> Result<&[TradeEntry], EnsembleError> {
        self.completed("read trade log").map(|r| r.trades.as_slice())
    }

    pub fn into_result(self) -> Result<BacktestRun, EnsembleError> {
        match (self.state, self.result) {
            (SimulatorState::Completed, Some(run)) => Ok(run),
            (state, _) => Err(EnsembleError::InvalidState {
                operation: "read results",
                state: state.as_str(),
            }),
        }
    }

    fn completed(&self, operation: &'static str) -> Result<&BacktestRun, EnsembleError> {
        match (&self.state, &self.result) {
            (SimulatorState::Completed, Some(run)) => Ok(run),
            (state, _) => Err(EnsembleError::InvalidState {
                operation,
                state: state.as_str(),
            }),
        }
    }
}

fn simulate(
    config: &BacktestConfig,
    panel: &PricePanel,
    selections: &[PortfolioSelection],
) -> Result<BacktestRun, EnsembleError> {
    let mut ordered: Vec<&PortfolioSelection> = selections.iter().collect();
    ordered.sort_by_key(|s| s.date);

    let mut positions = PositionState::new(config.initial_capital);
    let mut last_close: HashMap<String, f64> = HashMap::new();
    let mut equity_curve = Vec::with_capacity(panel.dates().len());
    let mut trades = Vec::new();
    let mut next = 0;
    let mut pending: Option<&PortfolioSelection> = None;

    for &date in panel.dates() {
        while next < ordered.len() && ordered[next].date < date {
            pending = Some(ordered[next]);
            next += 1;
        }

        for ticker in panel.tickers_on(date) {
            if let Some(close) = panel.close(date, ticker) {
                last_close.insert(ticker.to_string(), close);
            }
        }

        if let Some(target) = pending.take() {
            let executed = rebalance(config, panel, date, target, &last_close, &mut positions)?;
            debug!(%date, decided = %target.date, trades = executed.len(), "rebalanced");
            trades.extend(executed);
        }

        let positions_value = positions.positions_value(|t| last_close.get(t).copied());
        equity_curve.push(EquityPoint {
            date,
            equity: positions.cash + positions_value,
            cash: positions.cash,
            positions_value,
            num_positions: positions.position_count(),
        });
    }

    let metrics = Metrics::compute(
        config.initial_capital,
        &equity_curve,
        &trades,
        config.risk_free_rate,
    );
    Ok(BacktestRun {
        equity_curve,
        trades,
        metrics,
    })
}

/// Trade from the current holdings to `target` at `date`'s close.
fn rebalance(
    config: &BacktestConfig,
    panel: &PricePanel,
    date: NaiveDate,
    target: &PortfolioSelection,
    last_close: &HashMap<String, f64>,
    positions: &mut PositionState,
) -> Result<Vec<TradeEntry>, EnsembleError> {
    let universe: BTreeSet<&str> = positions
        .held()
        .map(|(t, _)| t)
        .chain(target.entries.iter().map(|e| e.ticker.as_str()))
        .collect();

    let mut prices: Vec<(String, f64)> = Vec::with_capacity(universe.len());
    for ticker in universe {
        prices.push((ticker.to_string(), trade_price(config, panel, date, ticker, last_close)?));
    }

    let total_value = positions.cash
        + prices
            .iter()
            .map(|(t, p)| positions.shares(t) * p)
            .sum::<f64>();

    // (ticker, price, share delta)
    let mut sells = Vec::new();
    let mut buys = Vec::new();
    for (ticker, price) in prices {
        if price <= 0.0 {
            warn!(%date, ticker = %ticker, price, "skipping trade at non-positive price");
            continue;
        }
        let held = positions.shares(&ticker);
        let weight = target.weight_of(&ticker);
        let trade_value = weight * total_value - held * price;
        if trade_value.abs() <= config.min_trade_value {
            continue;
        }
        let delta = if weight == 0.0 { -held } else { trade_value / price };
        if delta < 0.0 {
            sells.push((ticker, price, delta));
        } else {
            buys.push((ticker, price, delta));
        }
    }

    let mut executed = Vec::with_capacity(sells.len() + buys.len());
    for (ticker, price, delta) in sells.into_iter().chain(buys) {
        let notional = (delta * price).abs();
        let commission = notional * config.commission_rate;
        let slippage = notional * config.slippage_rate;
        positions.apply_trade(&ticker, delta, price, commission + slippage);
        executed.push(TradeEntry {
            date,
            side: if delta < 0.0 { TradeSide::Sell } else { TradeSide::Buy },
            ticker,
            shares: delta,
            price,
            notional,
            commission,
            slippage,
        });
    }
    Ok(executed)
}

fn trade_price(
    config: &BacktestConfig,
    panel: &PricePanel,
    date: NaiveDate,
    ticker: &str,
    last_close: &HashMap<String, f64>,
) -> Result<f64, EnsembleError> {
    if let Some(close) = panel.close(date, ticker) {
        return Ok(close);
    }
    let missing = || EnsembleError::MissingPrice {
        ticker: ticker.to_string(),
        date,
    };
    match config.missing_data {
        MissingDataPolicy::Fail => Err(missing()),
        MissingDataPolicy::CarryForward => {
            let close = last_close.get(ticker).copied().ok_or_else(missing)?;
            warn!(%date, ticker, close, "no bar on trading date, using last close");
            Ok(close)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::ranking::SelectionEntry;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(day: u32, ticker: &str, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: d(day),
            ticker: ticker.to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }
    }

    fn selection(day: u32, weights: &[(&str, f64)]) -> PortfolioSelection {
        PortfolioSelection {
            date: d(day),
            entries: weights
                .iter()
                .map(|(t, w)| SelectionEntry {
                    ticker: t.to_string(),
                    weight: *w,
                    score: 0.0,
                })
                .collect(),
        }
    }

    fn config(commission: f64, slippage: f64) -> BacktestConfig {
        BacktestConfig {
            initial_capital: 10_000.0,
            commission_rate: commission,
            slippage_rate: slippage,
            risk_free_rate: 0.0,
            missing_data: MissingDataPolicy::Fail,
            min_trade_value: 0.01,
        }
    }

    #[test]
    fn config_validation() {
        assert!(config(0.001, 0.0005).validate().is_ok());
        assert!(config(-0.1, 0.0).validate().is_err());
        assert!(config(0.0, 1.0).validate().is_err());
        let mut c = config(0.0, 0.0);
        c.initial_capital = 0.0;
        assert!(c.validate().unwrap_err().is_configuration());
        assert!(Simulator::new(c).is_err());
    }

    #[test]
    fn policy_parse() {
        assert_eq!("fail".parse::<MissingDataPolicy>().unwrap(), MissingDataPolicy::Fail);
        assert_eq!(
            "carry_forward".parse::<MissingDataPolicy>().unwrap(),
            MissingDataPolicy::CarryForward
        );
        assert!("guess".parse::<MissingDataPolicy>().is_err());
    }

    #[test]
    fn ten_thousand_dollar_trade_costs_fifteen() {
        let panel = PricePanel::from_bars(vec![bar(1, "A", 100.0), bar(2, "A", 100.0)]).unwrap();
        let mut sim = Simulator::new(config(0.001, 0.0005)).unwrap();
        let run = sim.run(&panel, &[selection(1, &[("A", 1.0)])]).unwrap();

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.date, d(2));
        assert_relative_eq!(trade.notional, 10_000.0);
        assert_relative_eq!(trade.cost(), 15.0, epsilon = 1e-9);
        assert_relative_eq!(run.equity_curve[1].equity, 9_985.0, epsilon = 1e-9);
    }

    #[test]
    fn selection_executes_on_next_date_only() {
        let panel = PricePanel::from_bars(vec![
            bar(1, "A", 10.0),
            bar(2, "A", 20.0),
            bar(3, "A", 40.0),
        ])
        .unwrap();
        let mut sim = Simulator::new(config(0.0, 0.0)).unwrap();
        let run = sim.run(&panel, &[selection(2, &[("A", 1.0)])]).unwrap();

        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].date, d(3));
        assert_relative_eq!(run.trades[0].price, 40.0);
        assert!(run.equity_curve.iter().all(|p| (p.equity - 10_000.0).abs() < 1e-9));
    }

    #[test]
    fn non_trading_dates_mark_to_market() {
        let panel = PricePanel::from_bars(vec![
            bar(1, "A", 10.0),
            bar(2, "A", 10.0),
            bar(3, "A", 12.0),
        ])
        .unwrap();
        let mut sim = Simulator::new(config(0.0, 0.0)).unwrap();
        let run = sim.run(&panel, &[selection(1, &[("A", 1.0)])]).unwrap();
        assert_relative_eq!(run.equity_curve[2].equity, 12_000.0, epsilon = 1e-9);
        assert_eq!(run.equity_curve[2].num_positions, 1);
    }

    #[test]
    fn results_require_completion() {
        let mut sim = Simulator::new(config(0.0, 0.0)).unwrap();
        assert_eq!(sim.state(), SimulatorState::Idle);
        assert!(matches!(
            sim.metrics(),
            Err(EnsembleError::InvalidState { state: "idle", .. })
        ));
        assert!(sim.equity_curve().is_err());
        assert!(sim.trade_log().is_err());

        let panel = PricePanel::from_bars(vec![bar(1, "A", 10.0)]).unwrap();
        sim.run(&panel, &[]).unwrap();
        assert_eq!(sim.state(), SimulatorState::Completed);
        assert!(sim.metrics().is_ok());

        let again = sim.run(&panel, &[]);
        assert!(matches!(
            again,
            Err(EnsembleError::InvalidState { operation: "run", state: "completed" })
        ));
    }

    #[test]
    fn missing_price_fails_and_resets_to_idle() {
        let panel = PricePanel::from_bars(vec![
            bar(1, "A", 10.0),
            bar(1, "B", 10.0),
            bar(2, "A", 11.0),
        ])
        .unwrap();
        let mut sim = Simulator::new(config(0.0, 0.0)).unwrap();
        let err = sim.run(&panel, &[selection(1, &[("B", 1.0)])]).unwrap_err();
        assert!(matches!(err, EnsembleError::MissingPrice { ref ticker, .. } if ticker == "B"));
        assert_eq!(sim.state(), SimulatorState::Idle);
        assert!(sim.equity_curve().is_err());
    }

    #[test]
    fn carry_forward_uses_last_close() {
        let panel = PricePanel::from_bars(vec![
            bar(1, "A", 10.0),
            bar(1, "B", 5.0),
            bar(2, "A", 11.0),
        ])
        .unwrap();
        let mut cfg = config(0.0, 0.0);
        cfg.missing_data = MissingDataPolicy::CarryForward;
        let mut sim = Simulator::new(cfg).unwrap();
        let run = sim.run(&panel, &[selection(1, &[("B", 1.0)])]).unwrap();
        assert_relative_eq!(run.trades[0].price, 5.0);
        assert_relative_eq!(run.trades[0].shares, 2_000.0, epsilon = 1e-9);
    }

    #[test]
    fn never_priced_ticker_fails_even_with_carry_forward() {
        let panel = PricePanel::from_bars(vec![bar(1, "A", 10.0), bar(2, "A", 11.0)]).unwrap();
        let mut cfg = config(0.0, 0.0);
        cfg.missing_data = MissingDataPolicy::CarryForward;
        let mut sim = Simulator::new(cfg).unwrap();
        assert!(sim.run(&panel, &[selection(1, &[("ZZZ", 1.0)])]).is_err());
    }

    #[test]
    fn sells_execute_before_buys() {
        let panel = PricePanel::from_bars(vec![
            bar(1, "A", 10.0),
            bar(1, "B", 10.0),
            bar(2, "A", 10.0),
            bar(2, "B", 10.0),
            bar(3, "A", 10.0),
            bar(3, "B", 10.0),
        ])
        .unwrap();
        let mut sim = Simulator::new(config(0.001, 0.0)).unwrap();
        let run = sim
            .run(
                &panel,
                &[selection(1, &[("B", 1.0)]), selection(2, &[("A", 1.0)])],
            )
            .unwrap();
        let day3: Vec<(&str, TradeSide)> = run
            .trades
            .iter()
            .filter(|t| t.date == d(3))
            .map(|t| (t.ticker.as_str(), t.side))
            .collect();
        assert_eq!(day3, vec![("B", TradeSide::Sell), ("A", TradeSide::Buy)]);
    }
}
