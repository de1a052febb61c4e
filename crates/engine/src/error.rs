//! Error types for the backtest simulator

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Rejected before any simulation work starts
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A zero price was hit while computing bar returns
    #[error("Division by zero: price at bar {bar} is zero")]
    DivisionByZero { bar: usize },
}

impl SimError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SimError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            SimError::InvalidParameter { .. } => "invalid_parameter",
            SimError::DivisionByZero { .. } => "division_by_zero",
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
