//! In-process store for local development and tests.
//!
//! A single mutex guards all collections; each trait method takes it once,
//! which gives the same per-operation atomicity as the Firestore transactions.

use crate::db::{ScheduleStore, UpsertOutcome};
use crate::error::AppError;
use crate::models::{Credential, Lesson, LessonKey, Reference, ReferenceKind, SyncStatus, User};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Collections {
    users: BTreeMap<u64, User>,
    credentials: HashMap<u64, Credential>,
    sync_status: HashMap<u64, SyncStatus>,
    references: HashMap<(ReferenceKind, String), Reference>,
    lessons: BTreeMap<LessonKey, Lesson>,
}

/// Memory-backed [`ScheduleStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        // A panic in another test thread must not wedge the store.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored lessons for a user (cancelled included).
    pub fn lesson_count(&self, user_id: u64) -> usize {
        self.lock()
            .lessons
            .keys()
            .filter(|k| k.user_id == user_id)
            .count()
    }

    /// Number of references of one kind.
    pub fn reference_count(&self, kind: ReferenceKind) -> usize {
        self.lock()
            .references
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.lock().users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.lock().users.values().cloned().collect())
    }

    async fn get_credential(&self, user_id: u64) -> Result<Option<Credential>, AppError> {
        Ok(self.lock().credentials.get(&user_id).cloned())
    }

    async fn set_credential(
        &self,
        user_id: u64,
        credential: &Credential,
    ) -> Result<(), AppError> {
        self.lock().credentials.insert(user_id, credential.clone());
        Ok(())
    }

    async fn get_sync_status(&self, user_id: u64) -> Result<Option<SyncStatus>, AppError> {
        Ok(self.lock().sync_status.get(&user_id).cloned())
    }

    async fn set_sync_status(&self, user_id: u64, status: &SyncStatus) -> Result<(), AppError> {
        self.lock().sync_status.insert(user_id, status.clone());
        Ok(())
    }

    async fn get_or_create_reference(
        &self,
        kind: ReferenceKind,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(Reference, bool), AppError> {
        let mut inner = self.lock();
        let key = (kind, name.to_string());
        if let Some(existing) = inner.references.get(&key) {
            return Ok((existing.clone(), false));
        }

        let reference = Reference {
            kind,
            name: name.to_string(),
            created_at: now,
        };
        inner.references.insert(key, reference.clone());
        Ok((reference, true))
    }

    async fn get_lesson(&self, key: &LessonKey) -> Result<Option<Lesson>, AppError> {
        Ok(self.lock().lessons.get(key).cloned())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<UpsertOutcome, AppError> {
        match self.lock().lessons.entry(lesson.key()) {
            Entry::Occupied(mut stored) => {
                stored.get_mut().apply_sync(lesson);
                Ok(UpsertOutcome::Updated)
            }
            Entry::Vacant(slot) => {
                slot.insert(lesson.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn set_lesson_cancelled(
        &self,
        key: &LessonKey,
        cancelled: bool,
    ) -> Result<bool, AppError> {
        match self.lock().lessons.get_mut(key) {
            Some(lesson) => {
                lesson.is_cancelled = cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lessons_between(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lesson>, AppError> {
        Ok(self
            .lock()
            .lessons
            .values()
            .filter(|l| l.user_id == user_id && l.date >= start && l.date <= end)
            .cloned()
            .collect())
    }
}
