//! Control/status API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! Everything under `/api` requires `Authorization: Bearer <token>`.
//! Registry mutations go through `BumpScheduler`, which uses the same
//! registry critical section as the background tick.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::delivery::{remind_after, DeliveryChannel};
use crate::engine::bumper::{bump_all_summary, BumpScheduler, Registration};
use crate::storage::{SettingsStore, WatermarkStore};
use crate::types::{BotError, BumpOutcome, BumpScheduleEntry, Settings};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub scheduler: Arc<BumpScheduler>,
    pub settings: Arc<SettingsStore>,
    pub watermark: WatermarkStore,
    pub channel: Arc<dyn DeliveryChannel>,
    pub chat_id: i64,
    pub started_at: DateTime<Utc>,
    pub auth_token: SecretString,
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error response: `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub message: String,
}

impl From<anyhow::Error> for ApiFailure {
    fn from(err: anyhow::Error) -> Self {
        let status = match err.downcast_ref::<BotError>() {
            Some(BotError::InvalidThread(_)) => StatusCode::BAD_REQUEST,
            Some(BotError::UnknownSetting(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "Control API request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Middleware: reject requests without the configured bearer token.
pub async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| token_matches(presented, state.auth_token.expose_secret()));

    if authorized {
        next.run(req).await
    } else {
        ApiFailure {
            status: StatusCode::UNAUTHORIZED,
            message: "missing or invalid bearer token".into(),
        }
        .into_response()
    }
}

/// Compare digests so the check does not short-circuit on a prefix.
fn token_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty()
        && Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub watermark: Option<String>,
    pub bumps_registered: usize,
    pub push_cards_enabled: bool,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Thread id or URL.
    pub thread: String,
    #[serde(default)]
    pub interval_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BumpRunResponse {
    pub outcomes: Vec<BumpOutcome>,
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingUpdate {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderRequest {
    pub delay_secs: u64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiFailure> {
    let watermark = state.watermark.get()?;
    let bumps = state.scheduler.list().await?;
    let settings = state.settings.get()?;
    Ok(Json(StatusResponse {
        watermark,
        bumps_registered: bumps.len(),
        push_cards_enabled: settings.push_cards_enabled,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    }))
}

/// GET /api/bumps
pub async fn list_bumps(
    State(state): State<AppState>,
) -> Result<Json<Vec<BumpScheduleEntry>>, ApiFailure> {
    Ok(Json(state.scheduler.list().await?))
}

/// POST /api/bumps
pub async fn register_bump(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Registration>), ApiFailure> {
    let reg = state.scheduler.register(&req.thread, req.interval_minutes).await?;
    let status = if reg.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(reg)))
}

/// DELETE /api/bumps/:thread_id
pub async fn deregister_bump(
    State(state): State<AppState>,
    Path(thread_id): Path<u64>,
) -> Result<StatusCode, ApiFailure> {
    if state.scheduler.deregister(thread_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiFailure {
            status: StatusCode::NOT_FOUND,
            message: format!("thread {thread_id} is not registered"),
        })
    }
}

/// POST /api/bumps/run
pub async fn run_bumps(State(state): State<AppState>) -> Result<Json<BumpRunResponse>, ApiFailure> {
    let outcomes = state.scheduler.bump_all_now().await?;
    let summary = bump_all_summary(&outcomes);
    Ok(Json(BumpRunResponse { outcomes, summary }))
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, ApiFailure> {
    Ok(Json(state.settings.get()?))
}

/// PUT /api/settings/:key
pub async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(update): Json<SettingUpdate>,
) -> Result<Json<Settings>, ApiFailure> {
    Ok(Json(state.settings.set(&key, update.enabled)?))
}

/// POST /api/reminders
pub async fn create_reminder(
    State(state): State<AppState>,
    Json(req): Json<ReminderRequest>,
) -> Result<StatusCode, ApiFailure> {
    if req.text.trim().is_empty() {
        return Err(ApiFailure {
            status: StatusCode::BAD_REQUEST,
            message: "reminder text is empty".into(),
        });
    }
    info!(delay_secs = req.delay_secs, "Reminder scheduled");
    remind_after(
        state.channel.clone(),
        Duration::from_secs(req.delay_secs),
        state.chat_id,
        req.text,
    );
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
