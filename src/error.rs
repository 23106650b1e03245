use chrono::NaiveDate;
use thiserror::Error;

/// Caller-supplied input the engine refuses to score.
///
/// Thin or missing history is not represented here: that surfaces as `None`
/// statistics or a failed quality verdict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Non-finite value {value} for metric '{metric_key}' in week {week_start}")]
    NonFiniteSample {
        metric_key: String,
        week_start: NaiveDate,
        value: f64,
    },

    #[error("Duplicate sample for metric '{metric_key}' in week {week_start}")]
    DuplicateSample {
        metric_key: String,
        week_start: NaiveDate,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
