//! Rolling indicators the strategies are built from.
//!
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a time series of indicator values aligned to bars
//!
//! Points inside an indicator's warmup window are marked invalid rather
//! than omitted, so series stay index-aligned with the bars they came from.

pub mod roc;
pub mod sma;
pub mod stddev;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Stddev(usize),
    ReturnStddev(usize),
    Roc(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value at bar index `i`, or `None` inside the warmup window.
    pub fn value_at(&self, i: usize) -> Option<f64> {
        self.values
            .get(i)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::ReturnStddev(period) => write!(f, "RETSTDDEV({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
        }
    }
}
