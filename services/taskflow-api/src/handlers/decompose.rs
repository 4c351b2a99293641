//! AI task decomposition handler

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use taskflow_axum::{GateConfig, RequireAuth};
use taskflow_types::{Feature, ResourceType};

use super::shared::{
    record_op_duration, require_field, validate_string_length, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
};
use crate::ai::{fallback_breakdown, Subtask};
use crate::error::ApiResult;
use crate::state::AppState;

const AI_GATE: GateConfig =
    GateConfig::resource(ResourceType::AiRequests).with_feature(Feature::AiTaskDecomposition);

#[derive(Debug, Deserialize)]
pub struct DecomposeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecomposeResponse {
    pub subtasks: Vec<Subtask>,
    /// True when the provider failed and a canned breakdown was served
    pub fallback: bool,
}

/// POST /api/ai/decompose
///
/// Checks the feature flag, then reserves one AI request atomically before
/// calling the provider. A provider failure still consumes the reservation.
pub async fn decompose_task(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<DecomposeRequest>,
) -> ApiResult<Json<DecomposeResponse>> {
    let title = require_field(req.title, "title")?;
    validate_string_length(&title, "title", MAX_TITLE_LEN)?;
    if let Some(description) = &req.description {
        validate_string_length(description, "description", MAX_DESCRIPTION_LEN)?;
    }

    state.gates.check_rate_limit(Some(&auth), AI_GATE).await?;
    state
        .gates
        .reserve(&auth.user_id, AI_GATE.resource, 1)
        .await?;

    let start = Instant::now();
    let result = state
        .decomposer
        .decompose(&title, req.description.as_deref())
        .await;
    record_op_duration("decompose_task", start, result.is_ok());

    let response = match result {
        Ok(subtasks) => DecomposeResponse {
            subtasks,
            fallback: false,
        },
        Err(e) => {
            tracing::warn!(user_id = %auth.user_id, error = %e, "AI decomposition failed, serving fallback");
            DecomposeResponse {
                subtasks: fallback_breakdown(&title),
                fallback: true,
            }
        }
    };

    Ok(Json(response))
}
