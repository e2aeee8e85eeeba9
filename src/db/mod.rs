//! Database layer (Firestore, or in-memory for local runs and tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Credential, Lesson, LessonKey, Reference, ReferenceKind, SyncStatus, User};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CREDENTIALS: &str = "credentials";
    pub const SYNC_STATUS: &str = "sync_status";
    pub const SUBJECTS: &str = "subjects";
    pub const TEACHERS: &str = "teachers";
    pub const ROOMS: &str = "rooms";
    pub const LESSONS: &str = "lessons";

    use crate::models::ReferenceKind;

    /// Collection holding references of the given kind.
    pub fn references(kind: ReferenceKind) -> &'static str {
        match kind {
            ReferenceKind::Subject => SUBJECTS,
            ReferenceKind::Teacher => TEACHERS,
            ReferenceKind::Room => ROOMS,
        }
    }
}

/// Whether an upsert inserted a new row or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Persistence for users, credentials, references and lessons.
///
/// Every method is atomic on its own: a crash mid-sync leaves each lesson
/// either in its old or its new state.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    // ─── Users ──────────────────────────────────────────────────
    async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError>;
    async fn upsert_user(&self, user: &User) -> Result<(), AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    // ─── Credentials ────────────────────────────────────────────
    async fn get_credential(&self, user_id: u64) -> Result<Option<Credential>, AppError>;
    /// Replace the whole credential document.
    async fn set_credential(&self, user_id: u64, credential: &Credential)
        -> Result<(), AppError>;

    // ─── Sync status ────────────────────────────────────────────
    async fn get_sync_status(&self, user_id: u64) -> Result<Option<SyncStatus>, AppError>;
    async fn set_sync_status(&self, user_id: u64, status: &SyncStatus) -> Result<(), AppError>;

    // ─── References ─────────────────────────────────────────────
    /// Return the reference named `name`, creating it if needed.
    ///
    /// The boolean is `true` when this call created it.
    async fn get_or_create_reference(
        &self,
        kind: ReferenceKind,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(Reference, bool), AppError>;

    // ─── Lessons ────────────────────────────────────────────────
    async fn get_lesson(&self, key: &LessonKey) -> Result<Option<Lesson>, AppError>;
    /// Insert or update by [`LessonKey`], keeping the stored cancellation flag.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<UpsertOutcome, AppError>;
    /// Returns `false` if no lesson has that key.
    async fn set_lesson_cancelled(&self, key: &LessonKey, cancelled: bool)
        -> Result<bool, AppError>;
    /// All lessons (cancelled included) with `start <= date <= end`.
    async fn lessons_between(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lesson>, AppError>;
}

/// Shared store handle held by services and `AppState`.
pub type Store = Arc<dyn ScheduleStore>;
