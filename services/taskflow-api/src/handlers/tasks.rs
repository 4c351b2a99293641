//! Task handlers: the quota-gated create and the auto-archive batch

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taskflow_axum::RequireAuth;
use taskflow_db::{CreateTask, TaskRow};
use uuid::Uuid;

use super::shared::{
    record_op_duration, require_field, validate_archive_days, validate_string_length,
    MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
};
use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<TaskRow> for TaskResponse {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AutoArchiveRequest {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AutoArchiveResponse {
    pub archived: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/tasks
///
/// Mounted behind the `tasks` quota gate, which tracks usage on 201.
pub async fn create_task(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let title = require_field(req.title, "title")?;
    validate_string_length(&title, "title", MAX_TITLE_LEN)?;
    if let Some(description) = &req.description {
        validate_string_length(description, "description", MAX_DESCRIPTION_LEN)?;
    }

    let start = Instant::now();
    let result = state
        .repos
        .tasks
        .create(CreateTask {
            id: Uuid::new_v4(),
            user_id: auth.user_id.0,
            title: title.trim().to_string(),
            description: req.description,
        })
        .await;
    record_op_duration("create_task", start, result.is_ok());

    Ok((StatusCode::CREATED, Json(result?.into())))
}

/// POST /api/tasks/auto-archive
///
/// Archives the caller's completed tasks finished more than `days` ago.
pub async fn auto_archive(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<AutoArchiveRequest>,
) -> ApiResult<Json<AutoArchiveResponse>> {
    let days = validate_archive_days(req.days)?;
    let cutoff = Utc::now() - Duration::days(days);

    let start = Instant::now();
    let result = state
        .repos
        .tasks
        .archive_completed_before(auth.user_id.0, cutoff)
        .await;
    record_op_duration("auto_archive", start, result.is_ok());
    let archived = result?;

    tracing::info!(user_id = %auth.user_id, days, archived, "Completed tasks archived");
    Ok(Json(AutoArchiveResponse { archived }))
}
