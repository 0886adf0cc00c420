//! Configuration loading and validation.
//!
//! Every value is parsed and range-checked before a run starts, so a bad
//! config fails with the section and key at fault instead of mid-backtest.

use crate::domain::backtest::{BacktestConfig, MissingDataPolicy};
use crate::domain::ensemble::EnsembleConfig;
use crate::domain::error::EnsembleError;
use crate::domain::ranking::WeightingMode;
use crate::domain::rebalance::RebalanceFrequency;
use crate::domain::strategy::{Benchmark, MeanReversion, Momentum, Strategy, TrendFollowing};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::warn;

pub const STRATEGY_KEYS: [&str; 4] = ["mean_reversion", "trend_following", "momentum", "benchmark"];
const DEFAULT_ENABLED: [&str; 2] = ["mean_reversion", "trend_following"];
const RUN_SECTIONS: [&str; 3] = ["ensemble", "strategies", "backtest"];

/// Everything needed to run the pipeline, built from one config source.
#[derive(Debug)]
pub struct RunSetup {
    pub strategies: Vec<Box<dyn Strategy>>,
    pub ensemble: EnsembleConfig,
    pub backtest: BacktestConfig,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub fn load_run_setup(config: &dyn ConfigPort) -> Result<RunSetup, EnsembleError> {
    for section in unknown_sections(config) {
        warn!(section = %section, "ignoring unknown config section");
    }
    let strategies = load_strategies(config)?;
    let ensemble = load_ensemble_config(config, &strategies)?;
    let backtest = load_backtest_config(config)?;
    let (start_date, end_date) = load_date_range(config)?;
    Ok(RunSetup {
        strategies,
        ensemble,
        backtest,
        start_date,
        end_date,
    })
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, EnsembleError> {
    let missing_data = match config.get_string("backtest", "missing_data") {
        Some(s) if !s.trim().is_empty() => {
            parse_enum::<MissingDataPolicy>("backtest", "missing_data", &s)?
        }
        _ => {
            return Err(EnsembleError::ConfigMissing {
                section: "backtest".to_string(),
                key: "missing_data".to_string(),
            });
        }
    };

    let bt = BacktestConfig {
        initial_capital: read_f64(config, "backtest", "initial_capital", 100_000.0)?,
        commission_rate: read_f64(config, "backtest", "commission_rate", 0.001)?,
        slippage_rate: read_f64(config, "backtest", "slippage_rate", 0.0005)?,
        risk_free_rate: read_f64(config, "backtest", "risk_free_rate", 0.0)?,
        missing_data,
        min_trade_value: read_f64(config, "backtest", "min_trade_value", 0.01)?,
    };
    bt.validate().map_err(in_section("backtest"))?;
    Ok(bt)
}

/// Ensemble settings. Per-strategy `weight` keys are keyed by the names of
/// the already built `strategies`.
pub fn load_ensemble_config(
    config: &dyn ConfigPort,
    strategies: &[Box<dyn Strategy>],
) -> Result<EnsembleConfig, EnsembleError> {
    let top_n = read_usize(config, "ensemble", "top_n_assets", 5)?;
    if top_n < 1 {
        return Err(invalid("ensemble", "top_n_assets", "top_n_assets must be at least 1"));
    }

    let rebalance = match config.get_string("ensemble", "rebalance_frequency") {
        Some(s) => parse_enum::<RebalanceFrequency>("ensemble", "rebalance_frequency", &s)?,
        None => RebalanceFrequency::Daily,
    };
    let weighting = match config.get_string("ensemble", "weighting") {
        Some(s) => parse_enum::<WeightingMode>("ensemble", "weighting", &s)?,
        None => WeightingMode::Equal,
    };
    let long_only = read_bool(config, "ensemble", "long_only", true)?;

    let mut strategy_weights = HashMap::new();
    for (key, strategy) in enabled_keys(config)?.iter().zip(strategies) {
        if config.get_string(key, "weight").is_some() {
            let weight = read_f64(config, key, "weight", 1.0)?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(key, "weight", "weight must be non-negative"));
            }
            strategy_weights.insert(strategy.name().to_string(), weight);
        }
    }

    Ok(EnsembleConfig {
        top_n,
        rebalance,
        weighting,
        long_only,
        strategy_weights,
    })
}

/// Build the strategies listed in `[strategies] enabled`, in listed order.
pub fn load_strategies(config: &dyn ConfigPort) -> Result<Vec<Box<dyn Strategy>>, EnsembleError> {
    enabled_keys(config)?
        .iter()
        .map(|key| build_strategy(config, key))
        .collect()
}

pub fn load_date_range(
    config: &dyn ConfigPort,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), EnsembleError> {
    let start = read_date(config, "backtest", "start_date")?;
    let end = read_date(config, "backtest", "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok((start, end))
}

/// Sections present in `config` that no loader reads.
pub fn unknown_sections(config: &dyn ConfigPort) -> Vec<String> {
    let mut unknown: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| !RUN_SECTIONS.contains(&s.as_str()) && !STRATEGY_KEYS.contains(&s.as_str()))
        .collect();
    unknown.sort();
    unknown
}

fn enabled_keys(config: &dyn ConfigPort) -> Result<Vec<String>, EnsembleError> {
    let keys: Vec<String> = match config.get_list("strategies", "enabled") {
        Some(items) => items.iter().map(|s| s.to_ascii_lowercase()).collect(),
        None => DEFAULT_ENABLED.iter().map(|s| s.to_string()).collect(),
    };

    if keys.is_empty() {
        return Err(invalid(
            "strategies",
            "enabled",
            "at least one strategy must be enabled",
        ));
    }
    let mut seen = HashSet::new();
    for key in &keys {
        if !STRATEGY_KEYS.contains(&key.as_str()) {
            return Err(invalid(
                "strategies",
                "enabled",
                &format!("unknown strategy '{key}' (expected one of {})", STRATEGY_KEYS.join(", ")),
            ));
        }
        if !seen.insert(key.as_str()) {
            return Err(invalid(
                "strategies",
                "enabled",
                &format!("strategy '{key}' listed twice"),
            ));
        }
    }
    Ok(keys)
}

fn build_strategy(config: &dyn ConfigPort, key: &str) -> Result<Box<dyn Strategy>, EnsembleError> {
    let strategy: Box<dyn Strategy> = match key {
        "mean_reversion" => {
            let d = MeanReversion::default();
            Box::new(
                MeanReversion::new(
                    read_usize(config, key, "lookback_ma", d.lookback_ma)?,
                    read_usize(config, key, "lookback_vol", d.lookback_vol)?,
                    read_usize(config, key, "historical_vol_period", d.historical_vol_period)?,
                )
                .map_err(in_section(key))?,
            )
        }
        "trend_following" => {
            let d = TrendFollowing::default();
            Box::new(
                TrendFollowing::new(
                    read_usize(config, key, "sma_period", d.sma_period)?,
                    read_f64(config, key, "sensitivity", d.sensitivity)?,
                )
                .map_err(in_section(key))?,
            )
        }
        "momentum" => {
            let d = Momentum::default();
            Box::new(
                Momentum::new(
                    read_usize(config, key, "lookback", d.lookback)?,
                    read_f64(config, key, "sensitivity", d.sensitivity)?,
                )
                .map_err(in_section(key))?,
            )
        }
        "benchmark" => Box::new(Benchmark::new(read_u64(
            config,
            key,
            "seed",
            Benchmark::default().seed,
        )?)),
        other => {
            return Err(invalid(
                "strategies",
                "enabled",
                &format!("unknown strategy '{other}'"),
            ));
        }
    };
    Ok(strategy)
}

fn invalid(section: &str, key: &str, reason: &str) -> EnsembleError {
    EnsembleError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Re-home a domain parameter error under the config section it came from.
fn in_section(section: &str) -> impl Fn(EnsembleError) -> EnsembleError + '_ {
    move |err| match err {
        EnsembleError::InvalidParameter { name, reason } => EnsembleError::ConfigInvalid {
            section: section.to_string(),
            key: name.rsplit('.').next().unwrap_or(&name).to_string(),
            reason,
        },
        other => other,
    }
}

fn read_parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, EnsembleError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| invalid(section, key, &format!("expected {expected}, got '{s}'"))),
    }
}

fn read_f64(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, EnsembleError> {
    let value = read_parsed(config, section, key, default, "a number")?;
    if !value.is_finite() {
        return Err(invalid(section, key, "must be finite"));
    }
    Ok(value)
}

fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, EnsembleError> {
    read_parsed(config, section, key, default, "a non-negative integer")
}

fn read_u64(config: &dyn ConfigPort, section: &str, key: &str, default: u64) -> Result<u64, EnsembleError> {
    read_parsed(config, section, key, default, "a non-negative integer")
}

fn read_bool(config: &dyn ConfigPort, section: &str, key: &str, default: bool) -> Result<bool, EnsembleError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(invalid(section, key, &format!("expected true or false, got '{s}'"))),
        },
    }
}

fn read_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, EnsembleError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, "invalid date format, expected YYYY-MM-DD")),
    }
}

fn parse_enum<T>(section: &str, key: &str, value: &str) -> Result<T, EnsembleError>
where
    T: FromStr<Err = EnsembleError>,
{
    value.parse::<T>().map_err(|e| match e {
        EnsembleError::InvalidParameter { reason, .. } => invalid(section, key, &reason),
        other => other,
    })
}
