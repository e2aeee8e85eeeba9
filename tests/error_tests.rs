// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use study_tracker::error::AppError;
use study_tracker::services::{AuthError, FetchError};

#[test]
fn test_retryable_errors() {
    assert!(AppError::TokenExpired("token not found".to_string()).is_retryable());
    assert!(AppError::Fetch("timeout".to_string()).is_retryable());
    assert!(AppError::from(AuthError::Browser("crashed".to_string())).is_retryable());
    assert!(AppError::from(AuthError::Timeout(std::time::Duration::from_secs(60))).is_retryable());
}

#[test]
fn test_login_refusals_are_not_retryable() {
    let refusals = [
        AuthError::InvalidCredentials("Неверный логин или пароль".to_string()),
        AuthError::BotChallenge,
        AuthError::LoginRejected,
        AuthError::TokenNotFound,
    ];
    for refusal in refusals {
        assert!(!AppError::from(refusal).is_retryable());
    }
}

#[test]
fn test_non_retryable_errors() {
    assert!(!AppError::Credential("not set".to_string()).is_retryable());
    assert!(!AppError::BadRequest("bad".to_string()).is_retryable());
    assert!(!AppError::Database("down".to_string()).is_retryable());
}

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        (AppError::Credential("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
        (
            AppError::from(AuthError::InvalidCredentials("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (AppError::from(AuthError::LoginRejected), StatusCode::UNPROCESSABLE_ENTITY),
        (AppError::from(AuthError::BotChallenge), StatusCode::BAD_GATEWAY),
        (
            AppError::from(AuthError::Timeout(std::time::Duration::from_secs(1))),
            StatusCode::BAD_GATEWAY,
        ),
        (AppError::TokenExpired("x".into()), StatusCode::CONFLICT),
        (AppError::Fetch("x".into()), StatusCode::BAD_GATEWAY),
        (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (error, expected) in cases {
        assert_eq!(error.into_response().status(), expected);
    }
}

#[test]
fn test_auth_error_message_passes_through() {
    let portal = AuthError::InvalidCredentials("Неверный логин или пароль".to_string());
    let error = AppError::from(portal);
    assert_eq!(error.to_string(), "Неверный логин или пароль");
}

#[test]
fn test_fetch_error_conversion_keeps_status() {
    let error: AppError = FetchError::Status {
        status: 503,
        body: "maintenance".to_string(),
    }
    .into();

    match error {
        AppError::Fetch(message) => {
            assert!(message.contains("503"));
            assert!(message.contains("maintenance"));
        }
        other => panic!("Expected fetch error, got {:?}", other),
    }
}

#[test]
fn test_auth_retryability() {
    assert!(AuthError::Timeout(std::time::Duration::from_secs(60)).is_retryable());
    assert!(AuthError::Browser("crashed".to_string()).is_retryable());
    assert!(!AuthError::BotChallenge.is_retryable());
    assert!(!AuthError::InvalidCredentials("no".to_string()).is_retryable());
}
