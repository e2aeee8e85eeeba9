// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin and cron routes, protected by the shared admin token.
//!
//! The chat bot registers users here and receives a session JWT to act on
//! their behalf; an external scheduler triggers periodic syncs.

use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::User;
use crate::services::SyncAllReport;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Admin routes. The admin-token middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", post(register_user))
        .route("/tasks/sync", post(sync_all))
}

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub user_id: u64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterUserResponse {
    pub user: User,
    /// Session JWT for `/api/*`
    pub token: String,
}

/// Ensure the user exists and issue a session token for it.
async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterUserRequest>,
) -> Result<Json<RegisterUserResponse>> {
    if body.user_id == 0 {
        return Err(AppError::BadRequest("user_id must be positive".to_string()));
    }

    let user = state
        .token_manager
        .ensure_user(body.user_id, body.username)
        .await?;
    let token = create_jwt(user.user_id, &state.config.jwt_signing_key)?;

    Ok(Json(RegisterUserResponse { user, token }))
}

#[derive(Deserialize)]
pub struct SyncAllQuery {
    #[serde(default = "default_force")]
    pub force: bool,
}

/// Scheduled runs log in again when a token has lapsed.
fn default_force() -> bool {
    true
}

/// Sync all users (called by the external scheduler).
async fn sync_all(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncAllQuery>,
) -> Result<Json<SyncAllReport>> {
    tracing::info!(force = query.force, "Scheduled sync triggered");
    Ok(Json(state.sync_service.sync_all(query.force).await?))
}
