// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::AuthError;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Portal login/password missing or unusable.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Browser login failed; displays the authenticator's message verbatim.
    #[error("{0}")]
    Authentication(#[from] AuthError),

    /// No usable bearer token is stored for the user.
    #[error("Portal token expired: {0}")]
    TokenExpired(String),

    /// Schedule API unreachable or rejected the request.
    #[error("Schedule API error: {0}")]
    Fetch(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a retry (possibly after re-authentication) may succeed.
    ///
    /// Portal logins follow [`AuthError::is_retryable`]: wrong credentials
    /// and captchas stay failed until the user acts.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::TokenExpired(_) | AppError::Fetch(_) => true,
            AppError::Authentication(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Credential(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "credential_error",
                Some(msg.clone()),
            ),
            AppError::Authentication(e) => {
                let status = match e {
                    AuthError::InvalidCredentials(_) | AuthError::LoginRejected => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, "authentication_error", Some(e.to_string()))
            }
            AppError::TokenExpired(msg) => {
                (StatusCode::CONFLICT, "token_expired", Some(msg.clone()))
            }
            AppError::Fetch(msg) => (StatusCode::BAD_GATEWAY, "fetch_error", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
