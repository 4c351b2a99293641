//! Common error types

use thiserror::Error;

/// Errors raised while parsing or validating domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid tier: {0}")]
    InvalidTier(String),

    #[error("invalid billing cycle: {0}")]
    InvalidBillingCycle(String),

    #[error("invalid resource type: {0}")]
    InvalidResource(String),

    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    /// Limits are non-negative or the `-1` sentinel
    #[error("invalid limit value: {0}")]
    InvalidLimit(i64),

    #[error("invalid status: {0}")]
    InvalidStatus(String),
}
