use thiserror::Error;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ClockError {
    #[error("invalid duration '{input}': {reason}")]
    Format { input: String, reason: String },

    #[error("cannot {operation}: {reason}")]
    InvalidTransition {
        operation: &'static str,
        reason: String,
    },
}

impl ClockError {
    pub fn format(input: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transition(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            operation,
            reason: reason.into(),
        }
    }
}
