//! Error types for the timeline

use thiserror::Error;

/// Timeline error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("Invalid tempo: {0} (must be finite and > 0)")]
    InvalidTempo(f64),

    #[error("Invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: i32, denominator: i32 },

    #[error("Index {index} out of range (len {len})")]
    IndexError { index: usize, len: usize },

    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Timeline mutation attempted from inside a change notification")]
    Reentrancy,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TimelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias
pub type TimelineResult<T> = Result<T, TimelineError>;
