//! Seeded random signals: the null hypothesis an ensemble has to beat.

use super::{Signal, SignalSet, Strategy};
use crate::domain::price_panel::PricePanel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    name: String,
    pub seed: u64,
}

impl Benchmark {
    pub const DEFAULT_NAME: &'static str = "Benchmark";

    pub fn new(seed: u64) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            seed,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for Benchmark {
    fn default() -> Self {
        Self::new(42)
    }
}

impl Strategy for Benchmark {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    /// Each ticker draws from its own stream seeded by `(seed, ticker)` and
    /// consumed in date order, so a signal never depends on later bars or on
    /// which other tickers are in the panel.
    fn generate_signals(&self, panel: &PricePanel) -> SignalSet {
        let mut set = SignalSet::new(self.name.as_str());
        for series in panel.iter_series() {
            let mut rng = StdRng::seed_from_u64(ticker_seed(self.seed, &series.ticker));
            for bar in &series.bars {
                let value = rng.gen_range(-1.0..=1.0);
                let confidence = rng.gen_range(0.3..=0.7);
                set.insert(bar.date, &series.ticker, Signal::new(value, confidence));
            }
        }
        set
    }
}

/// FNV-1a over the ticker, folded into the seed.
fn ticker_seed(seed: u64, ticker: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    ticker
        .bytes()
        .fold(FNV_OFFSET ^ seed, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}
