// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Study Tracker: class schedules pulled from the academy portal
//!
//! This crate provides the backend that logs into the student portal on a
//! user's behalf, keeps the resulting bearer token fresh, and mirrors the
//! user's schedule into local storage for the chat bot and web UI.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use error::AppError;
use services::{Authenticator, CredentialCipher, ScheduleClient, SyncService, TokenManager};
use std::sync::Arc;
use time_utils::SharedClock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Store,
    pub token_manager: TokenManager,
    pub sync_service: SyncService,
}

impl AppState {
    /// Wire the services together over the given store, login driver and clock.
    pub fn new(
        config: Config,
        db: Store,
        authenticator: Arc<dyn Authenticator>,
        clock: SharedClock,
    ) -> Result<Self, AppError> {
        let cipher = CredentialCipher::new(&config.credential_key)?;

        let token_manager = TokenManager::new(
            db.clone(),
            cipher,
            authenticator,
            clock.clone(),
            config.token_ttl,
        );

        let client = ScheduleClient::new(
            config.schedule_api_url.clone(),
            config.schedule_api_origin.clone(),
            config.fetch_timeout,
        )?;

        let sync_service = SyncService::new(
            db.clone(),
            token_manager.clone(),
            client,
            clock,
            config.schedule_offset,
        );

        Ok(Self {
            config,
            db,
            token_manager,
            sync_service,
        })
    }
}
