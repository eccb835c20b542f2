//! JSON API handlers organized by resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use aether_core::ids::{RoomId, RunId, TriggerId, UserId};
use aether_core::{AgentId, RunConfig};
use aether_engine::{EngineError, StartParams};
use aether_store::messages::{MessageRepo, MessageRow};
use aether_store::prompts::{PromptRepo, PromptRow, PromptScope};
use aether_store::rooms::{RoomRepo, RoomRow};
use aether_store::runs::{RunRepo, RunRow};
use aether_store::triggers::{TriggerRepo, TriggerRow};
use aether_store::users::{UserRepo, UserRole, UserRow};
use aether_store::StoreError;
use aether_telemetry::LogQuery;

use crate::server::AppState;

/// Error response shared by every endpoint: an HTTP status plus a
/// `{"message": "..."}` JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::InvalidInput(_) | EngineError::Config(_) => StatusCode::BAD_REQUEST,
            EngineError::RunNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// ── Users ──

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserRow>>, ApiError> {
    let users = UserRepo::new(state.db.clone()).list()?;
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    #[serde(default)]
    pub name: String,
    pub role: Option<UserRole>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserBody>,
) -> Result<Json<UserRow>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    let user = UserRepo::new(state.db.clone()).create(
        &body.name,
        body.role.unwrap_or(UserRole::User),
        false,
    )?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserBody {
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub disabled: Option<bool>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<UserRow>, ApiError> {
    let user = UserRepo::new(state.db.clone()).update(
        &UserId::from_raw(id),
        body.name.as_deref(),
        body.role,
        body.disabled,
    )?;
    Ok(Json(user))
}

// ── Rooms ──

pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<RoomRow>>, ApiError> {
    let rooms = RoomRepo::new(state.db.clone()).list()?;
    Ok(Json(rooms))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomBody {
    #[serde(default)]
    pub name: String,
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<Json<RoomRow>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    let room = RoomRepo::new(state.db.clone()).create(&body.name)?;
    Ok(Json(room))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomBody {
    pub name: Option<String>,
    pub archived: Option<bool>,
}

pub async fn update_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRoomBody>,
) -> Result<Json<RoomRow>, ApiError> {
    let room = RoomRepo::new(state.db.clone()).update(
        &RoomId::from_raw(id),
        body.name.as_deref(),
        body.archived,
    )?;
    Ok(Json(room))
}

pub async fn room_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageRow>>, ApiError> {
    let messages = MessageRepo::new(state.db.clone()).list_for_room(&RoomId::from_raw(id))?;
    Ok(Json(messages))
}

// ── Runs ──

#[derive(Debug, Deserialize)]
pub struct StartRunBody {
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub message: Option<String>,
    pub config: Option<RunConfig>,
}

pub async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (Some(room_id), Some(user_id), Some(message)) = (body.room_id, body.user_id, body.message)
    else {
        return Err(ApiError::bad_request(
            "room_id, user_id, and message are required",
        ));
    };

    let run_id = state.orchestrator.start(StartParams {
        room_id: RoomId::from_raw(room_id),
        user_id: UserId::from_raw(user_id),
        message,
        config: body.config,
    })?;
    Ok(Json(json!({ "run_id": run_id })))
}

#[derive(Debug, Deserialize)]
pub struct RunIdBody {
    pub run_id: Option<String>,
}

pub async fn stop_run(
    State(state): State<AppState>,
    Json(body): Json<RunIdBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(run_id) = body.run_id else {
        return Err(ApiError::bad_request("run_id is required"));
    };
    state.orchestrator.stop(&RunId::from_raw(run_id))?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn continue_run(
    State(state): State<AppState>,
    Json(body): Json<RunIdBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(run_id) = body.run_id else {
        return Err(ApiError::bad_request("run_id is required"));
    };
    let new_run_id = state.orchestrator.continue_run(&RunId::from_raw(run_id))?;
    Ok(Json(json!({ "run_id": new_run_id })))
}

pub async fn latest_run(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Option<RunRow>>, ApiError> {
    let run = RunRepo::new(state.db.clone()).latest_for_room(&RoomId::from_raw(room_id))?;
    Ok(Json(run))
}

// ── Prompts ──

pub async fn list_prompts(State(state): State<AppState>) -> Result<Json<Vec<PromptRow>>, ApiError> {
    let prompts = PromptRepo::new(state.db.clone()).list()?;
    Ok(Json(prompts))
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptBody {
    pub scope: Option<PromptScope>,
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub content: String,
    pub label: Option<String>,
}

pub async fn create_prompt(
    State(state): State<AppState>,
    Json(body): Json<CreatePromptBody>,
) -> Result<Json<PromptRow>, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }
    let prompt = PromptRepo::new(state.db.clone()).create(
        body.scope.unwrap_or(PromptScope::Global),
        body.agent_id,
        body.label.as_deref().unwrap_or(""),
        &body.content,
    )?;
    Ok(Json(prompt))
}

// ── Triggers ──

pub async fn list_triggers(
    State(state): State<AppState>,
) -> Result<Json<Vec<TriggerRow>>, ApiError> {
    let triggers = TriggerRepo::new(state.db.clone()).list()?;
    Ok(Json(triggers))
}

#[derive(Debug, Deserialize)]
pub struct CreateTriggerBody {
    #[serde(default)]
    pub name: String,
    pub config: Option<RunConfig>,
    pub prompt_overrides: Option<serde_json::Value>,
}

pub async fn create_trigger(
    State(state): State<AppState>,
    Json(body): Json<CreateTriggerBody>,
) -> Result<Json<TriggerRow>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    let trigger = TriggerRepo::new(state.db.clone()).create(
        &body.name,
        body.config.as_ref(),
        body.prompt_overrides.as_ref(),
    )?;
    Ok(Json(trigger))
}

pub async fn delete_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    TriggerRepo::new(state.db.clone()).delete(&TriggerId::from_raw(id))?;
    Ok(Json(json!({ "ok": true })))
}

// ── Logs ──

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub level: Option<String>,
    pub run_id: Option<String>,
    pub limit: Option<u32>,
}

/// Persisted warn+ logs, newest first. Empty when the server runs
/// without a log sink.
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(sink) = state.telemetry.as_ref().and_then(|t| t.logs()) else {
        return Ok(Json(json!({ "logs": [], "count": 0 })));
    };

    let records = sink
        .query(&LogQuery {
            level: params.level,
            run_id: params.run_id,
            limit: params.limit,
            ..Default::default()
        })
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let count = records.len();
    Ok(Json(json!({ "logs": records, "count": count })))
}
