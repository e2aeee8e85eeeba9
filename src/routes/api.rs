// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Lesson, LessonKey, SyncStatus};
use crate::services::{SyncReport, TokenStatus};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route(
            "/api/credentials",
            put(set_credentials).delete(clear_credentials),
        )
        .route("/api/token/status", get(get_token_status))
        .route("/api/token/refresh", post(refresh_token))
        .route("/api/sync", post(sync_schedule))
        .route("/api/schedule", get(get_schedule))
        .route("/api/schedule/today", get(get_today))
        .route("/api/schedule/next", get(get_next))
        .route("/api/schedule/cancel", post(cancel_lesson))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    pub username: Option<String>,
    pub notify_daily: bool,
    pub notify_time: NaiveTime,
    pub has_credentials: bool,
    #[cfg_attr(feature = "binding-generation", ts(skip))]
    pub last_sync: Option<SyncStatus>,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(UserResponse {
        user_id: profile.user_id,
        username: profile.username,
        notify_daily: profile.notify_daily,
        notify_time: profile.notify_time,
        has_credentials: state.token_manager.has_credentials(user.user_id).await?,
        last_sync: state.sync_service.get_sync_status(user.user_id).await?,
    }))
}

// ─── Credentials ─────────────────────────────────────────────

/// Portal login submitted by the user.
#[derive(Deserialize, Validate)]
pub struct SetCredentialsRequest {
    #[validate(length(min = 1, max = 128, message = "login must be 1-128 characters"))]
    pub login: String,
    #[validate(length(min = 1, max = 256, message = "password must be 1-256 characters"))]
    pub password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

async fn set_credentials(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SetCredentialsRequest>,
) -> Result<Json<MessageResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .token_manager
        .set_credentials(user.user_id, &body.login, &body.password)
        .await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Credentials saved".to_string(),
    }))
}

async fn clear_credentials(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MessageResponse>> {
    let cleared = state.token_manager.clear_credentials(user.user_id).await?;

    Ok(Json(MessageResponse {
        success: cleared,
        message: if cleared {
            "Credentials cleared".to_string()
        } else {
            "No credentials stored".to_string()
        },
    }))
}

// ─── Token ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TokenStatusResponse {
    #[serde(flatten)]
    pub status: TokenStatus,
    /// Human-readable summary for the bot
    pub summary: String,
}

impl From<TokenStatus> for TokenStatusResponse {
    fn from(status: TokenStatus) -> Self {
        Self {
            summary: status.to_string(),
            status,
        }
    }
}

async fn get_token_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TokenStatusResponse>> {
    let status = state.token_manager.get_status(user.user_id).await?;
    Ok(Json(status.into()))
}

/// Force a fresh portal login. The token itself never leaves the server.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TokenStatusResponse>> {
    state.token_manager.get_token(user.user_id, true).await?;
    let status = state.token_manager.get_status(user.user_id).await?;
    Ok(Json(status.into()))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct SyncQuery {
    #[serde(default)]
    pub force: bool,
}

async fn sync_schedule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncReport>> {
    let report = state
        .sync_service
        .sync_schedule(user.user_id, query.force)
        .await?;
    Ok(Json(report))
}

// ─── Schedule ────────────────────────────────────────────────

/// Lessons of one day.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub lessons: Vec<Lesson>,
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub days: Vec<DaySchedule>,
}

#[derive(Deserialize)]
pub struct ScheduleQuery {
    /// First day (YYYY-MM-DD), default today
    pub start: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD), default start + 30 days
    pub end: Option<NaiveDate>,
}

async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ScheduleResponse>> {
    let schedule = state
        .sync_service
        .get_user_schedule(user.user_id, query.start, query.end)
        .await?;

    Ok(Json(ScheduleResponse {
        days: schedule
            .into_iter()
            .map(|(date, lessons)| DaySchedule { date, lessons })
            .collect(),
    }))
}

async fn get_today(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Lesson>>> {
    Ok(Json(
        state.sync_service.get_today_schedule(user.user_id).await?,
    ))
}

#[derive(Serialize)]
pub struct NextLessonResponse {
    pub lesson: Option<Lesson>,
}

async fn get_next(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<NextLessonResponse>> {
    let lesson = state
        .sync_service
        .get_next_lesson(user.user_id, state.sync_service.now())
        .await?;
    Ok(Json(NextLessonResponse { lesson }))
}

#[derive(Deserialize)]
pub struct CancelLessonRequest {
    pub date: NaiveDate,
    pub lesson_number: u32,
    pub subject: String,
    #[serde(default = "default_cancelled")]
    pub cancelled: bool,
}

fn default_cancelled() -> bool {
    true
}

async fn cancel_lesson(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CancelLessonRequest>,
) -> Result<Json<MessageResponse>> {
    let key = LessonKey {
        user_id: user.user_id,
        date: body.date,
        lesson_number: body.lesson_number,
        subject: body.subject,
    };
    state
        .sync_service
        .set_lesson_cancelled(user.user_id, &key, body.cancelled)
        .await?;

    Ok(Json(MessageResponse {
        success: true,
        message: if body.cancelled {
            "Lesson cancelled".to_string()
        } else {
            "Lesson restored".to_string()
        },
    }))
}
