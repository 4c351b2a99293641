//! Shared handler utilities
//!
//! Request validation and metrics helpers used across handlers.

use std::time::Instant;

use taskflow_types::{BillingCycle, Tier};

use crate::error::ApiError;

// ============================================================================
// Input Validation
// ============================================================================

/// Maximum length for task titles
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum length for task descriptions
pub const MAX_DESCRIPTION_LEN: usize = 5000;

/// Maximum length for provider tokens and ids
pub const MAX_TOKEN_LEN: usize = 256;

/// Auto-archive window bounds, in days
pub const ARCHIVE_DAYS: std::ops::RangeInclusive<i64> = 1..=365;

/// Unwrap a required body field, rejecting absent or blank values.
pub fn require_field(value: Option<String>, field_name: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{field_name} is required"))),
    }
}

/// Validate a user-provided string is within safe bounds.
pub fn validate_string_length(value: &str, field_name: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{field_name} too long (max {max} chars)"
        )));
    }
    Ok(())
}

pub fn parse_tier(value: Option<String>) -> Result<Tier, ApiError> {
    let raw = require_field(value, "tier")?;
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown tier: {raw}")))
}

pub fn parse_cycle(value: Option<String>) -> Result<BillingCycle, ApiError> {
    let raw = require_field(value, "billing_cycle")?;
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown billing cycle: {raw}")))
}

/// Validate the auto-archive window
pub fn validate_archive_days(days: Option<i64>) -> Result<i64, ApiError> {
    match days {
        Some(d) if ARCHIVE_DAYS.contains(&d) => Ok(d),
        Some(_) => Err(ApiError::BadRequest(format!(
            "days must be between {} and {}",
            ARCHIVE_DAYS.start(),
            ARCHIVE_DAYS.end()
        ))),
        None => Err(ApiError::BadRequest("days is required".into())),
    }
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record HTTP operation duration with result label.
///
/// Labels: operation, result (ok/err)
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "taskflow_operation_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================
