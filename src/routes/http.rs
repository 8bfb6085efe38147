//! HTTP endpoint handlers. These are thin wrappers that forward to the repository and editor.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, EditError, StoreError};
use crate::normalize::to_legacy;
use crate::protocol::*;
use crate::repository::{Confirmation, DeleteOutcome};
use crate::state::AppState;

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) | ApiError::Edit(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Unavailable(_) | ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    let body = match &self {
      ApiError::Validation(v) => json!({ "error": self.to_string(), "rule": v.rule() }),
      _ => json!({ "error": self.to_string() }),
    };
    if status.is_server_error() {
      warn!(target: "casefile_backend", %status, error = %self, "Request failed");
    }
    (status, Json(body)).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_cases(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let snapshot = state.repo.snapshot();
  Json(snapshot.as_ref().clone())
}

#[instrument(level = "info", skip(state))]
pub async fn http_reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let snapshot = state.repo.load().await;
  info!(target: "catalog", mode = ?snapshot.mode, cases = snapshot.cases.len(), "HTTP reload done");
  Json(snapshot.as_ref().clone())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let case = state.repo.get(&id).ok_or(ApiError::NotFound(id))?;
  Ok(Json(case))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_legacy(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let case = state.repo.get(&id).ok_or(ApiError::NotFound(id))?;
  Ok(Json(to_legacy(&case)))
}

#[instrument(level = "info", skip(state, body), fields(commands = body.commands.len()))]
pub async fn http_create_case(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateCaseIn>,
) -> Result<impl IntoResponse, ApiError> {
  let mut editor = state.repo.new_case_editor();
  editor.update_details(body.details);
  let (case, created_ids) = state.apply_and_save(editor, body.commands).await?;
  info!(target: "catalog", id = %case.id, display_order = case.display_order, "HTTP case created");
  Ok((StatusCode::CREATED, Json(SaveOut { case, created_ids })))
}

#[instrument(level = "info", skip(state, raw))]
pub async fn http_put_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(raw): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
  let case = state.replace_from_document(&id, &raw).await?;
  info!(target: "catalog", %id, "HTTP case replaced");
  Ok(Json(case))
}

#[instrument(level = "info", skip(state, body), fields(commands = body.commands.len()))]
pub async fn http_edit_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<EditIn>,
) -> Result<impl IntoResponse, ApiError> {
  let editor = state.repo.editor_for(&id).ok_or_else(|| ApiError::NotFound(id.clone()))?;
  let (case, created_ids) = state.apply_and_save(editor, body.commands).await?;
  info!(target: "catalog", %id, created = created_ids.len(), "HTTP edit saved");
  Ok(Json(SaveOut { case, created_ids }))
}

#[instrument(level = "info", skip(state), fields(direction = ?body.direction))]
pub async fn http_move_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<MoveIn>,
) -> Result<impl IntoResponse, ApiError> {
  if state.repo.get(&id).is_none() {
    return Err(ApiError::NotFound(id));
  }
  let moved = state.repo.move_case(&id, body.direction).await?;
  Ok(Json(MoveOut { moved }))
}

#[instrument(level = "info", skip(state), fields(confirm = q.confirm))]
pub async fn http_delete_case(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
  let out = match state.repo.delete(&id, &Confirmation(q.confirm)).await? {
    DeleteOutcome::Declined => DeleteOut { deleted: false, reindexed: 0 },
    DeleteOutcome::Deleted { reindexed } => DeleteOut { deleted: true, reindexed },
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_export(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.repo.export())
}

/// Machine-readable reason reported to WebSocket clients.
pub(crate) fn describe(e: &ApiError) -> &'static str {
  match e {
    ApiError::NotFound(_) => "unknown_case",
    ApiError::Edit(EditError::UnknownMission(_)) => "unknown_mission",
    ApiError::Edit(EditError::UnknownSlide(_)) => "unknown_slide",
    ApiError::Edit(EditError::UnknownHint { .. }) => "unknown_hint",
    ApiError::BadRequest(_) => "bad_request",
    ApiError::Validation(v) => v.rule(),
    ApiError::Unavailable(_) => "read_only",
    ApiError::Store(_) => "store",
  }
}
