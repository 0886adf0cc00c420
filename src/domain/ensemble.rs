//! Ensemble engine: signals in, per-rebalance-date portfolio selections out.

use crate::domain::correlation::CorrelationMatrix;
use crate::domain::error::EnsembleError;
use crate::domain::price_panel::PricePanel;
use crate::domain::ranking::{
    CombinedScores, NormalizedSignals, PortfolioSelection, RankedAsset, WeightingMode,
    check_universe, select,
};
use crate::domain::rebalance::RebalanceFrequency;
use crate::domain::strategy::{SignalSet, Strategy, generate_all};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    pub top_n: usize,
    pub rebalance: RebalanceFrequency,
    pub weighting: WeightingMode,
    pub long_only: bool,
    /// Multiplier per strategy name; strategies not listed weigh 1.0.
    pub strategy_weights: HashMap<String, f64>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            rebalance: RebalanceFrequency::Daily,
            weighting: WeightingMode::Equal,
            long_only: true,
            strategy_weights: HashMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct EnsembleEngine {
    strategies: Vec<Box<dyn Strategy>>,
    config: EnsembleConfig,
}

impl EnsembleEngine {
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        config: EnsembleConfig,
    ) -> Result<Self, EnsembleError> {
        if config.top_n < 1 {
            return Err(EnsembleError::invalid_parameter(
                "top_n_assets",
                "must be at least 1",
            ));
        }
        if strategies.is_empty() {
            return Err(EnsembleError::invalid_parameter(
                "strategies",
                "at least one strategy is required",
            ));
        }

        let mut seen = HashSet::new();
        for strategy in &strategies {
            if !seen.insert(strategy.name()) {
                return Err(EnsembleError::invalid_parameter(
                    "strategies",
                    format!("duplicate strategy name '{}'", strategy.name()),
                ));
            }
        }
        for (name, weight) in &config.strategy_weights {
            if !seen.contains(name.as_str()) {
                return Err(EnsembleError::invalid_parameter(
                    "strategy_weights",
                    format!("unknown strategy '{name}'"),
                ));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(EnsembleError::invalid_parameter(
                    "strategy_weights",
                    format!("weight for '{name}' must be finite and non-negative"),
                ));
            }
        }

        Ok(Self { strategies, config })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Generate, normalize, combine, rank and select over the whole panel.
    ///
    /// Every selection dated `t` only uses signals dated `t`, which the
    /// strategies compute from bars up to and including `t`.
    pub fn run(&self, panel: &PricePanel) -> Result<EnsembleResult, EnsembleError> {
        if panel.dates().is_empty() {
            return Err(EnsembleError::EmptyPanel);
        }

        let signal_sets = generate_all(&self.strategies, panel);
        for set in &signal_sets {
            check_universe(panel, set)?;
        }
        self.combine(panel, signal_sets)
    }

    /// Combine externally produced signal sets. Each set must cover the
    /// panel's universe; weights are looked up by the set's strategy name.
    pub fn run_with_signals(
        &self,
        panel: &PricePanel,
        signal_sets: Vec<SignalSet>,
    ) -> Result<EnsembleResult, EnsembleError> {
        if panel.dates().is_empty() {
            return Err(EnsembleError::EmptyPanel);
        }
        for set in &signal_sets {
            check_universe(panel, set)?;
        }
        self.combine(panel, signal_sets)
    }

    fn combine(
        &self,
        panel: &PricePanel,
        signal_sets: Vec<SignalSet>,
    ) -> Result<EnsembleResult, EnsembleError> {
        let weights: Vec<f64> = signal_sets
            .iter()
            .map(|set| self.config.strategy_weights.get(set.strategy()).copied().unwrap_or(1.0))
            .collect();

        let normalized: Vec<NormalizedSignals> =
            signal_sets.iter().map(NormalizedSignals::from_set).collect();
        let scores = CombinedScores::combine(&signal_sets, &normalized, &weights);

        let rebalance_dates = self.config.rebalance.rebalance_dates(panel.dates());
        let selections: Vec<PortfolioSelection> = rebalance_dates
            .iter()
            .map(|&date| {
                let ranked = scores.rank(date);
                let selection = select(
                    date,
                    &ranked,
                    self.config.top_n,
                    self.config.long_only,
                    self.config.weighting,
                );
                debug!(%date, selected = selection.entries.len(), "rebalance");
                selection
            })
            .collect();

        let correlation = CorrelationMatrix::from_series(
            &normalized
                .iter()
                .map(|n| (n.strategy.clone(), n.series()))
                .collect::<Vec<_>>(),
        );

        info!(
            strategies = signal_sets.len(),
            rebalances = selections.len(),
            non_empty = selections.iter().filter(|s| !s.is_empty()).count(),
            "ensemble run complete"
        );

        Ok(EnsembleResult {
            signal_sets,
            scores,
            selections,
            correlation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub num_strategies: usize,
    pub strategy_names: Vec<String>,
    pub mean_combined_score: f64,
    pub std_combined_score: f64,
    pub rebalance_count: usize,
}

#[derive(Debug, Clone)]
pub struct EnsembleResult {
    pub signal_sets: Vec<SignalSet>,
    pub scores: CombinedScores,
    pub selections: Vec<PortfolioSelection>,
    pub correlation: CorrelationMatrix,
}

impl EnsembleResult {
    pub fn summary(&self) -> EnsembleSummary {
        let scores: Vec<f64> = self.scores.values().collect();
        let (mean, std) = if scores.is_empty() {
            (0.0, 0.0)
        } else {
            let n = scores.len() as f64;
            let mean = scores.iter().sum::<f64>() / n;
            let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        };
        EnsembleSummary {
            num_strategies: self.signal_sets.len(),
            strategy_names: self
                .signal_sets
                .iter()
                .map(|s| s.strategy().to_string())
                .collect(),
            mean_combined_score: mean,
            std_combined_score: std,
            rebalance_count: self.selections.len(),
        }
    }

    /// The `n` best-ranked tickers on `date`.
    pub fn top_assets(&self, date: NaiveDate, n: usize) -> Vec<RankedAsset> {
        let mut ranked = self.scores.rank(date);
        ranked.truncate(n);
        ranked
    }

    pub fn selection_on(&self, date: NaiveDate) -> Option<&PortfolioSelection> {
        self.selections.iter().find(|s| s.date == date)
    }
}
