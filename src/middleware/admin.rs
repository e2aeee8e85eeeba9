// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared-secret authentication for admin and cron routes.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the admin token (alternative to `Authorization: Bearer`).
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        return Some(token);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Constant-time comparison of the presented and configured tokens.
fn token_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

/// Require the configured admin token for `/admin/*` and `/tasks/*` routes.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(presented) = presented_token(request.headers()) else {
        tracing::warn!(path = %request.uri().path(), "Blocked admin request without token");
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !token_matches(presented, &state.config.admin_token) {
        tracing::warn!(path = %request.uri().path(), "Blocked admin request with wrong token");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
