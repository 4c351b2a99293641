//! Entitlement errors

use taskflow_db::DbError;
use taskflow_types::Tier;
use thiserror::Error;

/// Errors raised by the catalog, ledger and checker
#[derive(Error, Debug)]
pub enum EntitlementError {
    /// No catalog row exists for the tier
    #[error("plan not found: {0}")]
    PlanNotFound(Tier),

    /// Record store failure
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

impl EntitlementError {
    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PlanNotFound(_))
    }
}
