// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schedule reconciliation.
//!
//! Turns raw API records into stored lessons:
//! 1. Validate and parse the record
//! 2. Get or create its subject, teacher and room
//! 3. Upsert the lesson by (user, date, lesson number, subject)
//!
//! A bad record is reported and skipped; the rest of the batch still lands.

use crate::db::{Store, UpsertOutcome};
use crate::error::AppError;
use crate::models::{Lesson, ReferenceKind};
use crate::services::schedule_api::LessonRecord;
use crate::time_utils::SharedClock;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

/// Lowercased room names containing this are online lessons.
const REMOTE_MARKER: &str = "дистант";

/// A record that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    /// Position in the fetched batch
    pub index: usize,
    /// Raw date of the record, if it had one
    pub date: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lesson #{} ({}): {}",
            self.index,
            self.date.as_deref().unwrap_or("no date"),
            self.message
        )
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: u32,
    pub updated: u32,
    /// Subjects, teachers and rooms seen for the first time
    pub references_created: u32,
    /// Number of records received
    pub total: usize,
    pub errors: Vec<RecordError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A record that passed validation.
#[derive(Debug, Clone, PartialEq)]
struct ParsedRecord {
    date: NaiveDate,
    lesson_number: u32,
    started_at: NaiveTime,
    finished_at: NaiveTime,
    subject: String,
    teacher: Option<String>,
    room: Option<String>,
}

impl ParsedRecord {
    fn is_remote(&self) -> bool {
        self.room
            .as_deref()
            .is_some_and(|room| room.to_lowercase().contains(REMOTE_MARKER))
    }

    fn into_lesson(self, user_id: u64, now: DateTime<Utc>) -> Lesson {
        let is_remote = self.is_remote();
        Lesson {
            user_id,
            date: self.date,
            lesson_number: self.lesson_number,
            started_at: self.started_at,
            finished_at: self.finished_at,
            subject: self.subject,
            teacher: self.teacher,
            room: self.room,
            is_cancelled: false,
            is_remote,
            last_sync: now,
            created_at: now,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_time(field: &str, value: Option<&str>) -> Result<NaiveTime, String> {
    let raw = value
        .map(str::trim)
        .ok_or_else(|| format!("missing {}", field))?;
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| format!("invalid {} '{}'", field, raw))
}

fn parse_lesson_number(value: Option<&serde_json::Value>) -> Result<u32, String> {
    let number = match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        None | Some(serde_json::Value::Null) => return Err("missing lesson number".to_string()),
        Some(_) => None,
    };
    number
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            let raw = value.map(|v| v.to_string()).unwrap_or_default();
            format!("invalid lesson number {}", raw)
        })
}

fn parse_record(record: &LessonRecord) -> Result<ParsedRecord, String> {
    let raw_date = record
        .date
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| "missing date".to_string())?;
    let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}'", raw_date))?;

    Ok(ParsedRecord {
        date,
        lesson_number: parse_lesson_number(record.lesson.as_ref())?,
        started_at: parse_time("started_at", record.started_at.as_deref())?,
        finished_at: parse_time("finished_at", record.finished_at.as_deref())?,
        subject: non_empty(record.subject_name.as_deref())
            .ok_or_else(|| "missing subject".to_string())?,
        teacher: non_empty(record.teacher_name.as_deref()),
        room: non_empty(record.room_name.as_deref()),
    })
}

/// Stores fetched schedule records for a user.
#[derive(Clone)]
pub struct Reconciler {
    store: Store,
    clock: SharedClock,
}

impl Reconciler {
    pub fn new(store: Store, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Reconcile a fetched batch. Never fails as a whole.
    pub async fn reconcile(&self, user_id: u64, records: &[LessonRecord]) -> ReconcileReport {
        let now = self.clock.now();
        let mut report = ReconcileReport {
            total: records.len(),
            ..Default::default()
        };

        for (index, record) in records.iter().enumerate() {
            let result = match parse_record(record) {
                Ok(parsed) => self.store_record(user_id, parsed, now).await,
                Err(message) => Err(message),
            };

            match result {
                Ok((outcome, new_references)) => {
                    report.references_created += new_references;
                    match outcome {
                        UpsertOutcome::Created => report.created += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                    }
                }
                Err(message) => {
                    tracing::warn!(user_id, index, error = %message, "Skipping schedule record");
                    report.errors.push(RecordError {
                        index,
                        date: record.date.clone(),
                        message,
                    });
                }
            }
        }

        tracing::info!(
            user_id,
            created = report.created,
            updated = report.updated,
            references_created = report.references_created,
            total = report.total,
            errors = report.errors.len(),
            "Schedule reconciled"
        );
        report
    }

    async fn store_record(
        &self,
        user_id: u64,
        parsed: ParsedRecord,
        now: DateTime<Utc>,
    ) -> Result<(UpsertOutcome, u32), String> {
        let references = [
            (ReferenceKind::Subject, Some(parsed.subject.as_str())),
            (ReferenceKind::Teacher, parsed.teacher.as_deref()),
            (ReferenceKind::Room, parsed.room.as_deref()),
        ];
        let mut new_references = 0;
        for (kind, name) in references {
            if let Some(name) = name {
                let (_, created) = self
                    .store
                    .get_or_create_reference(kind, name, now)
                    .await
                    .map_err(|e: AppError| e.to_string())?;
                if created {
                    tracing::debug!(user_id, kind = kind.as_str(), name, "New reference");
                    new_references += 1;
                }
            }
        }

        let outcome = self
            .store
            .upsert_lesson(&parsed.into_lesson(user_id, now))
            .await
            .map_err(|e: AppError| e.to_string())?;
        Ok((outcome, new_references))
    }
}
