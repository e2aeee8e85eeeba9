// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with FIRESTORE_EMULATOR_HOST pointing at it; otherwise they skip.
//!
//! Each test works on its own user ID, so runs don't interfere.

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use study_tracker::db::{FirestoreDb, ScheduleStore, UpsertOutcome};
use study_tracker::error::AppError;
use study_tracker::models::{Credential, Lesson, ReferenceKind, SyncStatus, User};

mod common;
use common::{test_db, unique_user_id};

fn test_lesson(user_id: u64, day: u32, number: u32, subject: &str) -> Lesson {
    let now = Utc::now();
    Lesson {
        user_id,
        date: NaiveDate::from_ymd_opt(2025, 9, day).unwrap(),
        lesson_number: number,
        started_at: NaiveTime::from_hms_opt(8 + number, 0, 0).unwrap(),
        finished_at: NaiveTime::from_hms_opt(9 + number, 30, 0).unwrap(),
        subject: subject.to_string(),
        teacher: Some("Petrova A.".to_string()),
        room: Some("301".to_string()),
        is_cancelled: false,
        is_remote: false,
        last_sync: now,
        created_at: now,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// USER AND CREDENTIAL TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_user_roundtrip() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();

    assert!(db.get_user(user_id).await.unwrap().is_none());

    let user = User::new(user_id, Some("ivan".to_string()), Utc::now());
    db.upsert_user(&user).await.unwrap();

    let stored = db.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(stored.username.as_deref(), Some("ivan"));
    assert!(stored.notify_daily);

    let users = db.list_users().await.unwrap();
    assert!(users.iter().any(|u| u.user_id == user_id));
}

#[tokio::test]
async fn test_credential_replace_and_clear() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let expires = Utc::now() + Duration::hours(4);

    let mut credential = Credential {
        login_encrypted: "bG9naW4=".to_string(),
        password_encrypted: "cGFzcw==".to_string(),
        token_encrypted: "dG9rZW4=".to_string(),
        token_expires_at: Some(expires),
        is_active: true,
        login_attempts: 1,
        ..Default::default()
    };
    db.set_credential(user_id, &credential).await.unwrap();

    let stored = db.get_credential(user_id).await.unwrap().unwrap();
    assert!(stored.has_credentials());
    assert_eq!(stored.token_expires_at, Some(expires));
    assert_eq!(stored.login_attempts, 1);

    credential.clear_secrets();
    db.set_credential(user_id, &credential).await.unwrap();

    let stored = db.get_credential(user_id).await.unwrap().unwrap();
    assert!(!stored.has_credentials());
    assert!(!stored.has_token());
    assert!(stored.token_expires_at.is_none());
}

#[tokio::test]
async fn test_sync_status_roundtrip() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let status = SyncStatus {
        last_sync_at: Some(Utc::now()),
        success: false,
        error: "lesson #1 (no date): missing date".to_string(),
        created: 2,
        updated: 0,
    };

    db.set_sync_status(user_id, &status).await.unwrap();

    let stored = db.get_sync_status(user_id).await.unwrap().unwrap();
    assert!(!stored.success);
    assert_eq!(stored.error, status.error);
    assert_eq!(stored.created, 2);
    assert!(stored.last_sync_at.is_some());
}

// ═══════════════════════════════════════════════════════════════════════════
// REFERENCE AND LESSON TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_reference_created_once() {
    require_emulator!();

    let db = test_db().await;
    let name = format!("Room {}/A", unique_user_id());
    let now = Utc::now();

    let (first, created) = db
        .get_or_create_reference(ReferenceKind::Room, &name, now)
        .await
        .unwrap();
    let (second, created_again) = db
        .get_or_create_reference(ReferenceKind::Room, &name, now + Duration::hours(1))
        .await
        .unwrap();

    assert!(created);
    assert!(!created_again);
    assert_eq!(first.name, name);
    assert_eq!(second.created_at, first.created_at);
}

#[tokio::test]
async fn test_lesson_upsert_keeps_key_unique() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let lesson = test_lesson(user_id, 1, 1, "Databases / SQL");

    assert_eq!(
        db.upsert_lesson(&lesson).await.unwrap(),
        UpsertOutcome::Created
    );
    assert!(db.set_lesson_cancelled(&lesson.key(), true).await.unwrap());

    let mut moved = lesson.clone();
    moved.started_at = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
    moved.created_at = lesson.created_at + Duration::days(1);
    assert_eq!(
        db.upsert_lesson(&moved).await.unwrap(),
        UpsertOutcome::Updated
    );

    let stored = db.get_lesson(&lesson.key()).await.unwrap().unwrap();
    assert_eq!(stored.started_at, moved.started_at);
    assert_eq!(stored.created_at, lesson.created_at);
    assert!(stored.is_cancelled, "Sync must not clear cancellation");

    let day = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
    let lessons = db.lessons_between(user_id, day, day).await.unwrap();
    assert_eq!(lessons.len(), 1);
}

#[tokio::test]
async fn test_cancellation_survives_concurrent_sync() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();

    for number in 1..=5 {
        let lesson = test_lesson(user_id, 2, number, "Networks");
        db.upsert_lesson(&lesson).await.unwrap();

        // The sync's read-modify-write and the cancel race on one document.
        let mut resynced = lesson.clone();
        resynced.room = Some("Дистант".to_string());
        let lesson_key = lesson.key();
        let (synced, cancelled) = tokio::join!(
            db.upsert_lesson(&resynced),
            db.set_lesson_cancelled(&lesson_key, true)
        );
        assert_eq!(synced.unwrap(), UpsertOutcome::Updated);
        assert!(cancelled.unwrap());

        let stored = db.get_lesson(&lesson.key()).await.unwrap().unwrap();
        assert!(stored.is_cancelled, "lesson {} lost its cancellation", number);
    }
}

#[tokio::test]
async fn test_concurrent_reference_creation_reports_one_creator() {
    require_emulator!();

    let db = test_db().await;
    let name = format!("Teacher {}", unique_user_id());
    let now = Utc::now();

    let (a, b) = tokio::join!(
        db.get_or_create_reference(ReferenceKind::Teacher, &name, now),
        db.get_or_create_reference(ReferenceKind::Teacher, &name, now + Duration::hours(1))
    );
    let (a, a_created) = a.unwrap();
    let (b, b_created) = b.unwrap();

    assert!(a_created ^ b_created, "exactly one caller creates the reference");
    assert_eq!(a.created_at, b.created_at);
}

#[tokio::test]
async fn test_lessons_between_is_inclusive() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    for (day, number) in [(1, 2), (1, 1), (3, 1), (8, 1)] {
        db.upsert_lesson(&test_lesson(user_id, day, number, "Math"))
            .await
            .unwrap();
    }

    let lessons = db
        .lessons_between(
            user_id,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 3).unwrap(),
        )
        .await
        .unwrap();

    let keys: Vec<(u32, u32)> = lessons
        .iter()
        .map(|l| (chrono::Datelike::day(&l.date), l.lesson_number))
        .collect();
    assert_eq!(keys, vec![(1, 1), (1, 2), (3, 1)]);
}

#[tokio::test]
async fn test_offline_client_reports_database_error() {
    let db = FirestoreDb::new_mock();

    let result = db.get_user(1).await;

    assert!(matches!(result, Err(AppError::Database(_))));
}
