//! OHLCV bar representation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// Simple return from `prev_close` to this bar's close; 0 when undefined.
    pub fn return_from(&self, prev_close: f64) -> f64 {
        if prev_close == 0.0 {
            0.0
        } else {
            self.close / prev_close - 1.0
        }
    }

    /// Rejects bars whose fields cannot describe a real trading session.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self.high >= self.low
            && self.volume >= 0
    }
}
