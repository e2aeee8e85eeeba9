// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Lesson and reference (subject/teacher/room) models.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Kinds of shared reference entity a lesson points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Subject,
    Teacher,
    Room,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Teacher => "teacher",
            Self::Room => "room",
        }
    }
}

/// A subject, teacher or room, deduplicated by its natural name.
///
/// Created on first sighting during reconciliation and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Identity of a lesson: at most one stored row per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LessonKey {
    pub user_id: u64,
    pub date: NaiveDate,
    pub lesson_number: u32,
    pub subject: String,
}

impl LessonKey {
    /// Deterministic document ID, so upserts can never duplicate a key.
    pub fn document_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.user_id,
            self.date.format("%Y%m%d"),
            self.lesson_number,
            urlencoding::encode(&self.subject)
        )
    }
}

/// One scheduled class for one user on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Lesson {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    pub date: NaiveDate,
    /// Ordinal of the lesson within the day
    pub lesson_number: u32,
    pub started_at: NaiveTime,
    pub finished_at: NaiveTime,
    /// Subject name (reference key)
    pub subject: String,
    /// Teacher name (reference key)
    pub teacher: Option<String>,
    /// Room name (reference key)
    pub room: Option<String>,
    /// Only ever set explicitly, never by sync
    #[serde(default)]
    pub is_cancelled: bool,
    /// Held online rather than in a physical room
    #[serde(default)]
    pub is_remote: bool,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    pub fn key(&self) -> LessonKey {
        LessonKey {
            user_id: self.user_id,
            date: self.date,
            lesson_number: self.lesson_number,
            subject: self.subject.clone(),
        }
    }

    /// Copy the fields a sync is allowed to change from `incoming`.
    ///
    /// Keeps `created_at` and the cancellation flag of the stored row.
    pub fn apply_sync(&mut self, incoming: &Lesson) {
        self.started_at = incoming.started_at;
        self.finished_at = incoming.finished_at;
        self.teacher = incoming.teacher.clone();
        self.room = incoming.room.clone();
        self.is_remote = incoming.is_remote;
        self.last_sync = incoming.last_sync;
    }
}
