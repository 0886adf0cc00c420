//! Rebalance calendar.

use crate::domain::error::EnsembleError;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl RebalanceFrequency {
    /// Pick the rebalance dates out of a sorted timeline.
    ///
    /// Weekly and monthly rebalance on the first available date of each ISO
    /// week or calendar month, so deciding whether a date rebalances never
    /// needs a later date.
    pub fn rebalance_dates(&self, dates: &[NaiveDate]) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        let mut prev: Option<NaiveDate> = None;
        for &date in dates {
            let new_period = match (self, prev) {
                (_, None) => true,
                (RebalanceFrequency::Daily, Some(_)) => true,
                (RebalanceFrequency::Weekly, Some(p)) => p.iso_week() != date.iso_week(),
                (RebalanceFrequency::Monthly, Some(p)) => {
                    (p.year(), p.month()) != (date.year(), date.month())
                }
            };
            if new_period {
                out.push(date);
            }
            prev = Some(date);
        }
        out
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Daily => write!(f, "daily"),
            RebalanceFrequency::Weekly => write!(f, "weekly"),
            RebalanceFrequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            other => Err(EnsembleError::invalid_parameter(
                "rebalance_frequency",
                format!("expected daily, weekly or monthly, got '{other}'"),
            )),
        }
    }
}
