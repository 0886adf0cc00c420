//! INI file configuration adapter.
//!
//! The crate reads these sections:
//!
//! - `[ensemble]`: `top_n_assets`, `rebalance_frequency`, `weighting`,
//!   `long_only`
//! - `[strategies]`: `enabled`, a comma-separated list of strategy keys
//! - `[backtest]`: capital, cost rates, `risk_free_rate`, `missing_data`,
//!   optional `start_date` / `end_date`
//! - one section per strategy key (`[mean_reversion]`, `[trend_following]`,
//!   `[momentum]`, `[benchmark]`) holding its parameters and an optional
//!   `weight`
//!
//! Section and key names are case-insensitive. Anything else in the file is
//! ignored with a warning at load time.

use crate::domain::error::EnsembleError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EnsembleError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| EnsembleError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, EnsembleError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| EnsembleError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}
