//! Core domain types and logic.

pub mod ohlcv;
pub mod price_panel;
pub mod indicator;
pub mod strategy;
pub mod ranking;
pub mod rebalance;
pub mod correlation;
pub mod ensemble;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
