//! Wire types shared by the HTTP surface

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Machine-readable denial reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    FeatureNotAvailable,
    RateLimitExceeded,
}

/// Body returned when a gated action is refused.
///
/// Carries enough usage data for a client to explain the refusal and offer
/// an upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenialBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<DenialCode>,
    /// Usage counters keyed by `tasks_used`, `storage_used_mb`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<BTreeMap<String, serde_json::Value>>,
    /// Plan limits keyed by `max_tasks_per_month`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_required: Option<bool>,
}

impl DenialBody {
    /// Bare error with no structured payload
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            usage: None,
            limits: None,
            upgrade_required: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_code_wire_format() {
        let json = serde_json::to_string(&DenialCode::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
    }

    #[test]
    fn test_bare_denial_omits_optional_fields() {
        let json = serde_json::to_value(DenialBody::message("Unauthorized")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Unauthorized" }));
    }
}
