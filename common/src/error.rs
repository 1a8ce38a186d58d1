use chrono::NaiveDate;
use thiserror::Error;

/// Error taxonomy for the signal engine.
///
/// Only `Configuration` is fatal to a run. `DataUnavailable` skips the
/// affected unit of work and `InsufficientHistory` excludes an instrument
/// silently; degraded sub-scores are not errors at all, they surface as
/// warnings on the score breakdown.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable bars for {ticker} within {walkback_days} days of {requested}")]
    DataUnavailable {
        ticker: String,
        requested: NaiveDate,
        walkback_days: u32,
    },

    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether the whole run must stop, as opposed to skipping one unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_is_fatal() {
        let cfg = EngineError::Configuration("bad threshold".into());
        assert!(cfg.is_fatal());

        let data = EngineError::DataUnavailable {
            ticker: "005930".into(),
            requested: NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
            walkback_days: 10,
        };
        assert!(!data.is_fatal());

        let history = EngineError::InsufficientHistory { have: 12, need: 60 };
        assert!(!history.is_fatal());
    }
}
