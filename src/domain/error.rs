//! Domain error types.
//!
//! Configuration and data errors abort a run with enough context to diagnose
//! it. Numeric degeneracies (flat cross-sections, zero volatility) never show
//! up here: they are absorbed where they occur.

use chrono::NaiveDate;

/// Top-level error type for ensemble-trader.
#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("non-canonical price columns: expected {expected:?}, found {found:?}")]
    NonCanonicalColumns {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("duplicate bar for {ticker} on {date}")]
    DuplicateBar { ticker: String, date: NaiveDate },

    #[error("price panel is empty")]
    EmptyPanel,

    #[error("malformed price data: {reason}")]
    MalformedData { reason: String },

    #[error("signal universe mismatch in strategy {strategy} at {ticker} on {date}")]
    UniverseMismatch {
        strategy: String,
        date: NaiveDate,
        ticker: String,
    },

    #[error("no price for {ticker} on {date}")]
    MissingPrice { ticker: String, date: NaiveDate },

    #[error("cannot {operation} while simulator is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EnsembleError::ConfigParse { .. }
                | EnsembleError::ConfigMissing { .. }
                | EnsembleError::ConfigInvalid { .. }
                | EnsembleError::InvalidParameter { .. }
        )
    }

    pub fn is_data(&self) -> bool {
        matches!(
            self,
            EnsembleError::NonCanonicalColumns { .. }
                | EnsembleError::DuplicateBar { .. }
                | EnsembleError::EmptyPanel
                | EnsembleError::MalformedData { .. }
                | EnsembleError::UniverseMismatch { .. }
                | EnsembleError::MissingPrice { .. }
        )
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        EnsembleError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EnsembleError> for std::process::ExitCode {
    fn from(err: &EnsembleError) -> Self {
        let code: u8 = match err {
            EnsembleError::Io(_) => 1,
            EnsembleError::InvalidState { .. } => 4,
            e if e.is_configuration() => 2,
            _ => 3,
        };
        std::process::ExitCode::from(code)
    }
}
