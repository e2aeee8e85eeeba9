// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schedule synchronization and the read side of stored lessons.
//!
//! A sync is: token, fetch, reconcile, record status. When `force` is set
//! a missing token triggers a login, and a failed fetch triggers one forced
//! re-login followed by one more fetch.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Lesson, LessonKey, SyncStatus};
use crate::services::reconcile::{Reconciler, RecordError};
use crate::services::schedule_api::ScheduleClient;
use crate::services::token::{user_lock, TokenManager, UserLocks};
use crate::time_utils::SharedClock;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default length of a schedule query.
const DEFAULT_RANGE_DAYS: i64 = 30;

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// True when every fetched record was stored
    pub success: bool,
    pub created: u32,
    pub updated: u32,
    pub total: usize,
    pub errors: Vec<RecordError>,
}

/// Result of syncing every user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncAllReport {
    /// Users with stored credentials
    pub users: u32,
    pub synced: u32,
    pub failed: u32,
}

/// Lessons grouped by date, each day ordered by lesson number.
pub type ScheduleByDate = BTreeMap<NaiveDate, Vec<Lesson>>;

/// Orchestrates schedule syncs and serves stored schedules.
#[derive(Clone)]
pub struct SyncService {
    store: Store,
    token_manager: TokenManager,
    client: ScheduleClient,
    reconciler: Reconciler,
    clock: SharedClock,
    /// Local time of the academy
    offset: FixedOffset,
    locks: UserLocks,
}

impl SyncService {
    pub fn new(
        store: Store,
        token_manager: TokenManager,
        client: ScheduleClient,
        clock: SharedClock,
        offset: FixedOffset,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone(), clock.clone()),
            store,
            token_manager,
            client,
            clock,
            offset,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Current time according to the service clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Academy-local wall time for `now`.
    fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.offset).naive_local()
    }

    fn today(&self) -> NaiveDate {
        self.local(self.clock.now()).date()
    }

    // ─── Sync ────────────────────────────────────────────────────────────────

    /// Pull the current month's schedule for a user and store it.
    pub async fn sync_schedule(&self, user_id: u64, force: bool) -> Result<SyncReport, AppError> {
        let lock = user_lock(&self.locks, user_id);
        let _guard = lock.lock().await;

        if !self.token_manager.has_credentials(user_id).await? {
            return Err(AppError::Credential(
                "Portal login/password not set".to_string(),
            ));
        }

        match self.fetch(user_id, force).await {
            Ok(records) => {
                let report = self.reconciler.reconcile(user_id, &records).await;
                let status = SyncStatus {
                    last_sync_at: Some(self.clock.now()),
                    success: report.is_clean(),
                    error: report
                        .errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                    created: report.created,
                    updated: report.updated,
                };
                self.store.set_sync_status(user_id, &status).await?;

                Ok(SyncReport {
                    success: report.is_clean(),
                    created: report.created,
                    updated: report.updated,
                    total: report.total,
                    errors: report.errors,
                })
            }
            Err(e) => {
                tracing::warn!(user_id, force, error = %e, "Schedule sync failed");
                let status = SyncStatus {
                    last_sync_at: Some(self.clock.now()),
                    success: false,
                    error: e.to_string(),
                    ..Default::default()
                };
                // The fetch error is what the caller needs to see.
                if let Err(store_error) = self.store.set_sync_status(user_id, &status).await {
                    tracing::warn!(user_id, error = %store_error, "Failed to record sync status");
                }
                Err(e)
            }
        }
    }

    /// Token plus fetch, with at most one forced re-login.
    async fn fetch(
        &self,
        user_id: u64,
        force: bool,
    ) -> Result<Vec<crate::services::schedule_api::LessonRecord>, AppError> {
        let token = match self.token_manager.stored_token(user_id).await? {
            Some(token) => token,
            None if force => self.token_manager.get_token(user_id, false).await?,
            None => return Err(AppError::TokenExpired("token not found".to_string())),
        };

        let month = Some(self.today());
        let first_error = match self.client.fetch_month(&token, month).await {
            Ok(records) => return Ok(records),
            Err(e) => e,
        };

        if !force {
            return Err(first_error.into());
        }

        tracing::info!(
            user_id,
            unauthorized = first_error.is_unauthorized(),
            error = %first_error,
            "Fetch failed, logging in again"
        );
        let token = self
            .token_manager
            .get_token(user_id, true)
            .await
            .map_err(|auth| {
                AppError::Fetch(format!(
                    "{}; re-authentication failed: {}",
                    first_error, auth
                ))
            })?;

        Ok(self.client.fetch_month(&token, month).await?)
    }

    /// Sync every user that has credentials, one after another.
    pub async fn sync_all(&self, force: bool) -> Result<SyncAllReport, AppError> {
        let mut report = SyncAllReport::default();

        for user in self.store.list_users().await? {
            if !self.token_manager.has_credentials(user.user_id).await? {
                continue;
            }
            report.users += 1;

            match self.sync_schedule(user.user_id, force).await {
                Ok(result) => {
                    report.synced += 1;
                    tracing::info!(
                        user_id = user.user_id,
                        created = result.created,
                        updated = result.updated,
                        "User synced"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(user_id = user.user_id, error = %e, "User sync failed");
                }
            }
        }

        tracing::info!(
            users = report.users,
            synced = report.synced,
            failed = report.failed,
            "Sync run complete"
        );
        Ok(report)
    }

    pub async fn get_sync_status(&self, user_id: u64) -> Result<Option<SyncStatus>, AppError> {
        self.store.get_sync_status(user_id).await
    }

    // ─── Schedule Queries ────────────────────────────────────────────────────

    /// Non-cancelled lessons between `start` (default today) and `end`
    /// (default `start` + 30 days), inclusive, grouped by date.
    pub async fn get_user_schedule(
        &self,
        user_id: u64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ScheduleByDate, AppError> {
        let start = start.unwrap_or_else(|| self.today());
        let end = end.unwrap_or(start + Duration::days(DEFAULT_RANGE_DAYS));
        if end < start {
            return Err(AppError::BadRequest(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }

        let mut lessons = self.store.lessons_between(user_id, start, end).await?;
        lessons.retain(|l| !l.is_cancelled);
        lessons.sort_by_key(|l| (l.date, l.lesson_number));

        let mut schedule = ScheduleByDate::new();
        for lesson in lessons {
            schedule.entry(lesson.date).or_default().push(lesson);
        }
        Ok(schedule)
    }

    pub async fn get_today_schedule(&self, user_id: u64) -> Result<Vec<Lesson>, AppError> {
        let today = self.today();
        Ok(self
            .get_user_schedule(user_id, Some(today), Some(today))
            .await?
            .remove(&today)
            .unwrap_or_default())
    }

    /// First lesson today that has not started yet, else the first one tomorrow.
    pub async fn get_next_lesson(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Lesson>, AppError> {
        let local = self.local(now);
        let today = local.date();
        let tomorrow = today + Duration::days(1);

        let schedule = self
            .get_user_schedule(user_id, Some(today), Some(tomorrow))
            .await?;

        let upcoming_today = schedule
            .get(&today)
            .into_iter()
            .flatten()
            .filter(|l| l.started_at >= local.time())
            .min_by_key(|l| l.started_at);
        if let Some(lesson) = upcoming_today {
            return Ok(Some(lesson.clone()));
        }

        Ok(schedule
            .get(&tomorrow)
            .into_iter()
            .flatten()
            .min_by_key(|l| l.started_at)
            .cloned())
    }

    /// Mark (or unmark) a lesson as cancelled. Sync never changes this flag.
    pub async fn set_lesson_cancelled(
        &self,
        user_id: u64,
        key: &LessonKey,
        cancelled: bool,
    ) -> Result<(), AppError> {
        if key.user_id != user_id || !self.store.set_lesson_cancelled(key, cancelled).await? {
            return Err(AppError::NotFound(format!(
                "Lesson {} on {}",
                key.lesson_number, key.date
            )));
        }

        tracing::info!(user_id, date = %key.date, lesson = key.lesson_number, cancelled, "Lesson cancellation changed");
        Ok(())
    }
}
