//! End-to-end tests of the ensemble engine feeding the simulator.
//!
//! Tests cover:
//! - Rotation between assets when rankings flip (sell then buy, costs once)
//! - Transaction cost accounting on a single buy
//! - Flat signals ranking last yet still eligible
//! - Selection weights summing to one (or zero when nothing qualifies)
//! - No look-ahead: truncating the panel or shocking later prices never
//!   changes earlier output
//! - Seeded benchmark reproducibility
//! - Value conservation between trades and the equity curve
//! - Simulator state errors and missing-price policies
//! - Universe mismatches between strategies and the panel

mod common;

use approx::assert_relative_eq;
use common::*;
use ensemble_trader::domain::backtest::{BacktestConfig, MissingDataPolicy, Simulator, SimulatorState};
use ensemble_trader::domain::ensemble::{EnsembleConfig, EnsembleEngine};
use ensemble_trader::domain::error::EnsembleError;
use ensemble_trader::domain::portfolio::TradeSide;
use ensemble_trader::domain::price_panel::PricePanel;
use ensemble_trader::domain::ranking::{
    PortfolioSelection, TickerScore, WeightingMode, rank_scores, select,
};
use ensemble_trader::domain::rebalance::RebalanceFrequency;
use ensemble_trader::domain::strategy::{
    Benchmark, MeanReversion, Momentum, Signal, SignalSet, Strategy, TrendFollowing,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Replays a precomputed signal set.
#[derive(Debug)]
struct FixedSignals {
    set: SignalSet,
}

impl Strategy for FixedSignals {
    fn name(&self) -> &str {
        self.set.strategy()
    }

    fn lookback(&self) -> usize {
        0
    }

    fn generate_signals(&self, _panel: &PricePanel) -> SignalSet {
        self.set.clone()
    }
}

fn fixed(set: SignalSet) -> Vec<Box<dyn Strategy>> {
    vec![Box::new(FixedSignals { set })]
}

fn top_one_config() -> EnsembleConfig {
    EnsembleConfig {
        top_n: 1,
        ..EnsembleConfig::default()
    }
}

fn sample_bars(len: usize) -> Vec<OhlcvBar> {
    let a = wave(len, 100.0, 0.0);
    let b = wave(len, 50.0, 1.3);
    let c = wave(len, 20.0, 2.6);
    let d: Vec<f64> = (0..len).map(|i| 30.0 + 0.2 * i as f64).collect();
    bars_from_closes(&[("AAA", &a), ("BBB", &b), ("CCC", &c), ("DDD", &d)])
}

fn sample_universe(len: usize) -> PricePanel {
    PricePanel::from_bars(sample_bars(len)).unwrap()
}

fn sample_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(MeanReversion::new(10, 5, 20).unwrap()),
        Box::new(TrendFollowing::new(10, 5.0).unwrap()),
        Box::new(Momentum::new(5, 10.0).unwrap()),
        Box::new(Benchmark::new(11)),
    ]
}

mod rotation {
    use super::*;

    #[test]
    fn ranking_flip_rotates_out_of_a_into_b() {
        let panel = panel_from_closes(&[("A", &[10.0, 10.0, 10.0]), ("B", &[10.0, 10.0, 10.0])]);
        let set = signal_set("S", &["A", "B"], &[&[0.8, 0.2], &[0.2, 0.8], &[0.2, 0.8]]);
        let engine = EnsembleEngine::new(fixed(set), top_one_config()).unwrap();
        let ensemble = engine.run(&panel).unwrap();

        assert_eq!(ensemble.selections[0].entries[0].ticker, "A");
        assert_eq!(ensemble.selections[1].entries[0].ticker, "B");
        assert_eq!(ensemble.selection_on(day(1)), Some(&ensemble.selections[1]));

        let mut sim =
            Simulator::new(BacktestConfig::new(100_000.0, MissingDataPolicy::Fail)).unwrap();
        let run = sim.run(&panel, &ensemble.selections).unwrap();

        let first: Vec<_> = run.trades.iter().filter(|t| t.date == day(1)).collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].ticker, "A");
        assert_relative_eq!(first[0].shares, 10_000.0, epsilon = 1e-9);

        // The flip is decided on day(1) and fills at day(2)'s close.
        assert!(run.trades.iter().all(|t| t.date != day(1) || t.ticker == "A"));
        let flip: Vec<_> = run.trades.iter().filter(|t| t.date == day(2)).collect();
        assert_eq!(flip.len(), 2);
        assert_eq!(flip[0].ticker, "A");
        assert_eq!(flip[0].side, TradeSide::Sell);
        assert_relative_eq!(flip[0].shares, -10_000.0, epsilon = 1e-9);
        assert_relative_eq!(flip[0].commission, 100.0, epsilon = 1e-9);
        assert_eq!(flip[1].ticker, "B");
        assert_eq!(flip[1].side, TradeSide::Buy);
        assert_relative_eq!(flip[1].shares, 9_985.0, epsilon = 1e-9);

        // Three trades, each charged 0.15% once.
        let costs: f64 = run.trades.iter().map(|t| t.cost()).sum();
        assert_relative_eq!(costs, 150.0 + 150.0 + 149.775, epsilon = 1e-6);
        let last = run.equity_curve.last().unwrap();
        assert_relative_eq!(last.equity, 100_000.0 - costs, epsilon = 1e-6);
        assert_eq!(last.num_positions, 1);
    }
}

mod costs {
    use super::*;

    #[test]
    fn full_allocation_costs_fifteen_dollars() {
        let panel = panel_from_closes(&[("X", &[100.0, 100.0, 100.0])]);
        let mut sim =
            Simulator::new(BacktestConfig::new(10_000.0, MissingDataPolicy::Fail)).unwrap();
        let run = sim.run(&panel, &[selection(day(0), &[("X", 1.0)])]).unwrap();

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.date, day(1));
        assert_relative_eq!(trade.commission, 10.0, epsilon = 1e-9);
        assert_relative_eq!(trade.slippage, 5.0, epsilon = 1e-9);
        assert_relative_eq!(run.equity_curve[1].equity, 9_985.0, epsilon = 1e-9);
        assert_relative_eq!(run.metrics.total_commission, 10.0, epsilon = 1e-9);
        assert_relative_eq!(run.metrics.total_slippage, 5.0, epsilon = 1e-9);
    }
}

mod flat_market {
    use super::*;

    #[test]
    fn constant_prices_hold_all_tickers_equally() {
        let flat = vec![50.0; 30];
        let panel = panel_from_closes(&[("A", &flat), ("B", &flat), ("C", &flat)]);
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(TrendFollowing::new(5, 5.0).unwrap()),
            Box::new(Momentum::new(3, 10.0).unwrap()),
            Box::new(MeanReversion::new(5, 3, 10).unwrap()),
        ];
        let ensemble = EnsembleEngine::new(strategies, EnsembleConfig::default())
            .unwrap()
            .run(&panel)
            .unwrap();

        // Every score is 0, which long-only still admits.
        for sel in &ensemble.selections {
            let tickers: Vec<&str> = sel.entries.iter().map(|e| e.ticker.as_str()).collect();
            assert_eq!(tickers, vec!["A", "B", "C"]);
            assert!(sel.entries.iter().all(|e| e.score == 0.0));
            assert_relative_eq!(sel.weight_of("B"), 1.0 / 3.0, epsilon = 1e-12);
        }

        let mut sim =
            Simulator::new(BacktestConfig::new(100_000.0, MissingDataPolicy::Fail)).unwrap();
        let run = sim.run(&panel, &ensemble.selections).unwrap();

        assert!(run.trades.iter().all(|t| t.date > day(0)));
        let opening: Vec<_> = run.trades.iter().filter(|t| t.date == day(1)).collect();
        assert_eq!(opening.len(), 3);
        assert!(opening.iter().all(|t| t.side == TradeSide::Buy));
        assert_relative_eq!(run.equity_curve[1].equity, 100_000.0 - 150.0, epsilon = 1e-6);

        // Flat prices: the only value change is trading cost.
        let costs: f64 = run.trades.iter().map(|t| t.cost()).sum();
        let last = run.equity_curve.last().unwrap();
        assert_relative_eq!(last.equity, 100_000.0 - costs, epsilon = 1e-6);
        assert!(run.equity_curve.iter().all(|p| p.equity <= 100_000.0));
        assert_eq!(last.num_positions, 3);
    }
}

mod selection_weights {
    use super::*;

    proptest! {
        #[test]
        fn weights_sum_to_one_or_zero(
            scores in prop::collection::vec((-3.0f64..3.0, any::<bool>()), 1..12),
            top_n in 1usize..6,
            long_only in any::<bool>(),
            proportional in any::<bool>(),
        ) {
            let by_ticker: BTreeMap<String, TickerScore> = scores
                .iter()
                .enumerate()
                .map(|(i, &(score, informative))| (format!("T{i:02}"), TickerScore { score, informative }))
                .collect();
            let weighting = if proportional { WeightingMode::Proportional } else { WeightingMode::Equal };
            let sel = select(day(0), &rank_scores(&by_ticker), top_n, long_only, weighting);

            let eligible = scores.iter().filter(|(s, _)| !long_only || *s >= 0.0).count();
            prop_assert_eq!(sel.entries.len(), eligible.min(top_n));
            if sel.is_empty() {
                prop_assert_eq!(sel.total_weight(), 0.0);
            } else {
                prop_assert!((sel.total_weight() - 1.0).abs() < 1e-9);
            }
            for entry in &sel.entries {
                prop_assert!(entry.weight > 0.0);
                if long_only {
                    prop_assert!(entry.score >= 0.0);
                }
            }
        }
    }
}

mod no_look_ahead {
    use super::*;

    #[test]
    fn truncated_panel_reproduces_earlier_output() {
        let full = sample_universe(80);
        let cut = full.between(day(0), day(49)).unwrap();
        let config = EnsembleConfig {
            top_n: 2,
            long_only: false,
            weighting: WeightingMode::Proportional,
            ..EnsembleConfig::default()
        };

        let full_ens = EnsembleEngine::new(sample_strategies(), config.clone())
            .unwrap()
            .run(&full)
            .unwrap();
        let cut_ens = EnsembleEngine::new(sample_strategies(), config)
            .unwrap()
            .run(&cut)
            .unwrap();

        assert_eq!(cut_ens.selections.len(), 50);
        assert_eq!(&full_ens.selections[..50], &cut_ens.selections[..]);

        let bt = || BacktestConfig::new(50_000.0, MissingDataPolicy::Fail);
        let mut full_sim = Simulator::new(bt()).unwrap();
        let full_run = full_sim.run(&full, &full_ens.selections).unwrap().clone();
        let mut cut_sim = Simulator::new(bt()).unwrap();
        let cut_run = cut_sim.run(&cut, &cut_ens.selections).unwrap();

        assert_eq!(&full_run.equity_curve[..50], &cut_run.equity_curve[..]);
        let cut_trades: Vec<_> = full_run
            .trades
            .iter()
            .filter(|t| t.date <= day(49))
            .cloned()
            .collect();
        assert_eq!(cut_trades, cut_run.trades);
    }
}

mod future_prices {
    use super::*;

    #[test]
    fn extreme_future_prices_do_not_change_earlier_decisions() {
        let len = 80;
        let shock_from = day(60);
        let calm = PricePanel::from_bars(sample_bars(len)).unwrap();
        let shocked_bars: Vec<OhlcvBar> = sample_bars(len)
            .into_iter()
            .map(|mut b| {
                if b.date >= shock_from {
                    b.open *= 100.0;
                    b.high *= 100.0;
                    b.low *= 100.0;
                    b.close *= 100.0;
                }
                b
            })
            .collect();
        let shocked = PricePanel::from_bars(shocked_bars).unwrap();
        let config = EnsembleConfig {
            top_n: 2,
            long_only: false,
            ..EnsembleConfig::default()
        };

        let calm_ens = EnsembleEngine::new(sample_strategies(), config.clone())
            .unwrap()
            .run(&calm)
            .unwrap();
        let shocked_ens = EnsembleEngine::new(sample_strategies(), config)
            .unwrap()
            .run(&shocked)
            .unwrap();

        let before = |sels: &[PortfolioSelection]| {
            sels.iter()
                .filter(|s| s.date < shock_from)
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(before(&calm_ens.selections), before(&shocked_ens.selections));

        let bt = || BacktestConfig::new(50_000.0, MissingDataPolicy::Fail);
        let mut calm_sim = Simulator::new(bt()).unwrap();
        let calm_run = calm_sim.run(&calm, &calm_ens.selections).unwrap().clone();
        let mut shocked_sim = Simulator::new(bt()).unwrap();
        let shocked_run = shocked_sim.run(&shocked, &shocked_ens.selections).unwrap();

        assert_eq!(&calm_run.equity_curve[..60], &shocked_run.equity_curve[..60]);
        assert_ne!(calm_run.equity_curve[79], shocked_run.equity_curve[79]);
    }
}

mod determinism {
    use super::*;

    fn benchmark_run(seed: u64) -> (Vec<SignalSet>, Vec<f64>) {
        let panel = sample_universe(40);
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(Benchmark::new(seed))];
        let ensemble = EnsembleEngine::new(strategies, top_one_config())
            .unwrap()
            .run(&panel)
            .unwrap();
        let mut sim =
            Simulator::new(BacktestConfig::new(10_000.0, MissingDataPolicy::Fail)).unwrap();
        let run = sim.run(&panel, &ensemble.selections).unwrap();
        (
            ensemble.signal_sets,
            run.equity_curve.iter().map(|p| p.equity).collect(),
        )
    }

    #[test]
    fn same_seed_same_equity_curve() {
        let (signals_a, equity_a) = benchmark_run(7);
        let (signals_b, equity_b) = benchmark_run(7);
        assert_eq!(signals_a, signals_b);
        assert_eq!(equity_a, equity_b);
    }

    #[test]
    fn different_seed_different_signals() {
        let (signals_a, _) = benchmark_run(7);
        let (signals_b, _) = benchmark_run(8);
        assert_ne!(signals_a, signals_b);
    }

    #[test]
    fn strategy_order_does_not_change_selections() {
        let panel = sample_universe(60);
        let mut reversed = sample_strategies();
        reversed.reverse();

        let forward = EnsembleEngine::new(sample_strategies(), EnsembleConfig::default())
            .unwrap()
            .run(&panel)
            .unwrap();
        let backward = EnsembleEngine::new(reversed, EnsembleConfig::default())
            .unwrap()
            .run(&panel)
            .unwrap();

        for (f, b) in forward.selections.iter().zip(&backward.selections) {
            let tickers = |s: &PortfolioSelection| {
                s.entries.iter().map(|e| e.ticker.clone()).collect::<Vec<_>>()
            };
            assert_eq!(tickers(f), tickers(b));
        }
    }
}

mod conservation {
    use super::*;

    #[test]
    fn final_equity_matches_cash_flows_and_holdings() {
        let panel = sample_universe(70);
        let config = EnsembleConfig {
            top_n: 2,
            rebalance: RebalanceFrequency::Weekly,
            long_only: false,
            ..EnsembleConfig::default()
        };
        let ensemble = EnsembleEngine::new(sample_strategies(), config)
            .unwrap()
            .run(&panel)
            .unwrap();
        let mut sim =
            Simulator::new(BacktestConfig::new(100_000.0, MissingDataPolicy::Fail)).unwrap();
        let run = sim.run(&panel, &ensemble.selections).unwrap();
        assert!(!run.trades.is_empty());

        let mut cash = 100_000.0;
        let mut held: HashMap<&str, f64> = HashMap::new();
        for t in &run.trades {
            cash -= t.shares * t.price + t.cost();
            *held.entry(t.ticker.as_str()).or_default() += t.shares;
        }
        let last_date = *panel.dates().last().unwrap();
        let holdings: f64 = held
            .iter()
            .map(|(ticker, shares)| shares * panel.close(last_date, ticker).unwrap())
            .sum();

        let last = run.equity_curve.last().unwrap();
        assert_relative_eq!(last.cash, cash, epsilon = 1e-6);
        assert_relative_eq!(last.equity, cash + holdings, epsilon = 1e-6);
        for point in &run.equity_curve {
            assert_relative_eq!(point.equity, point.cash + point.positions_value, epsilon = 1e-9);
        }
    }

    #[test]
    fn drawdown_metrics_are_bounded() {
        let panel = sample_universe(70);
        let ensemble = EnsembleEngine::new(sample_strategies(), EnsembleConfig::default())
            .unwrap()
            .run(&panel)
            .unwrap();
        let mut sim =
            Simulator::new(BacktestConfig::new(100_000.0, MissingDataPolicy::Fail)).unwrap();
        let run = sim.run(&panel, &ensemble.selections).unwrap();

        assert!((0.0..=1.0).contains(&run.metrics.max_drawdown));
        assert!(run.metrics.max_drawdown_duration <= run.equity_curve.len());
        assert!((0.0..=1.0).contains(&run.metrics.win_rate));
        assert_eq!(run.metrics.trading_days, 70);
        assert_eq!(run.metrics.total_trades, run.trades.len());
    }
}

mod simulator_state {
    use super::*;

    #[test]
    fn results_unavailable_until_completed() {
        let panel = panel_from_closes(&[("X", &[10.0, 11.0])]);
        let mut sim =
            Simulator::new(BacktestConfig::new(1_000.0, MissingDataPolicy::Fail)).unwrap();

        assert_eq!(sim.state(), SimulatorState::Idle);
        assert!(matches!(sim.metrics(), Err(EnsembleError::InvalidState { .. })));
        assert!(matches!(sim.trade_log(), Err(EnsembleError::InvalidState { .. })));

        sim.run(&panel, &[]).unwrap();
        assert_eq!(sim.state(), SimulatorState::Completed);
        assert_eq!(sim.equity_curve().unwrap().len(), 2);

        let err = sim.run(&panel, &[]).unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidState { operation: "run", .. }));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = BacktestConfig::new(1_000.0, MissingDataPolicy::Fail);
        config.commission_rate = -0.1;
        assert!(Simulator::new(config).unwrap_err().is_configuration());
    }
}

mod missing_data {
    use super::*;

    fn gapped_panel() -> PricePanel {
        let mut bars = bars_from_closes(&[("A", &[10.0, 10.0, 10.0, 10.0])]);
        bars.extend([
            make_bar("B", day(0), 20.0),
            make_bar("B", day(1), 22.0),
            make_bar("B", day(3), 24.0),
        ]);
        PricePanel::from_bars(bars).unwrap()
    }

    #[test]
    fn fail_policy_aborts_on_gap() {
        let panel = gapped_panel();
        let mut sim =
            Simulator::new(BacktestConfig::new(10_000.0, MissingDataPolicy::Fail)).unwrap();
        let err = sim
            .run(&panel, &[selection(day(1), &[("A", 0.5), ("B", 0.5)])])
            .unwrap_err();

        match err {
            EnsembleError::MissingPrice { ticker, date } => {
                assert_eq!(ticker, "B");
                assert_eq!(date, day(2));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(sim.state(), SimulatorState::Idle);
    }

    #[test]
    fn carry_forward_trades_at_last_close() {
        let panel = gapped_panel();
        let mut sim =
            Simulator::new(BacktestConfig::new(10_000.0, MissingDataPolicy::CarryForward))
                .unwrap();
        let run = sim
            .run(&panel, &[selection(day(1), &[("A", 0.5), ("B", 0.5)])])
            .unwrap();

        let b = run.trades.iter().find(|t| t.ticker == "B").unwrap();
        assert_eq!(b.date, day(2));
        assert_eq!(b.price, 22.0);
        // Marked at 22 on the gap day, then at 24.
        assert_relative_eq!(
            run.equity_curve[3].positions_value - run.equity_curve[2].positions_value,
            b.shares * 2.0,
            epsilon = 1e-9
        );
    }
}

mod universe {
    use super::*;

    #[test]
    fn strategy_missing_a_ticker_is_rejected() {
        let panel = panel_from_closes(&[("A", &[1.0, 2.0]), ("B", &[1.0, 2.0])]);
        let set = signal_set("Partial", &["A"], &[&[0.5], &[0.5]]);
        let err = EnsembleEngine::new(fixed(set), top_one_config())
            .unwrap()
            .run(&panel)
            .unwrap_err();

        match err {
            EnsembleError::UniverseMismatch {
                strategy, ticker, ..
            } => {
                assert_eq!(strategy, "Partial");
                assert_eq!(ticker, "B");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn run_with_signals_checks_every_set() {
        let panel = panel_from_closes(&[("A", &[1.0, 2.0]), ("B", &[1.0, 2.0])]);
        let good = signal_set("Good", &["A", "B"], &[&[0.5, -0.5], &[0.5, -0.5]]);
        let mut extra = good.clone();
        extra.insert(day(5), "A", Signal::new(0.1, 1.0));

        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(Benchmark::default())];
        let engine = EnsembleEngine::new(strategies, top_one_config()).unwrap();
        assert!(engine.run_with_signals(&panel, vec![good]).is_ok());
        let err = engine.run_with_signals(&panel, vec![extra]).unwrap_err();
        assert!(err.is_data());
    }
}
