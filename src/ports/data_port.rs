//! Price data access port trait.

use crate::domain::error::EnsembleError;
use crate::domain::price_panel::PricePanel;
use chrono::NaiveDate;

pub trait DataPort {
    /// Load every ticker's bars within the inclusive `[start, end]` range.
    /// An open bound means no limit on that side.
    fn load_panel(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PricePanel, EnsembleError>;

    fn list_tickers(&self) -> Result<Vec<String>, EnsembleError>;
}
