//! Error types for recurrence-engine operations.

use thiserror::Error;

/// A recurrence rule that could not be parsed into a valid [`RecurrenceRule`].
///
/// Parsing never partially succeeds: any of these aborts the whole rule.
///
/// [`RecurrenceRule`]: crate::rule::RecurrenceRule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown rule key: {0}")]
    UnknownRuleKey(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidRuleValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("COUNT and UNTIL cannot both be set")]
    ConflictingTerminationRule,

    #[error("Rule has no FREQ")]
    MissingFrequency,
}

impl ParseError {
    pub(crate) fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        ParseError::InvalidRuleValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RecurrenceError {
    #[error("Invalid rule: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Open-ended window over an unbounded rule requires a cap (max occurrences or lookahead)")]
    UnboundedQuery,
}

pub type Result<T> = std::result::Result<T, RecurrenceError>;
