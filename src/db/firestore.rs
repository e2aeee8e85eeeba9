// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (chat identities)
//! - Credentials (encrypted portal login and bearer token)
//! - Subjects, teachers and rooms (shared references keyed by name)
//! - Lessons (keyed by user, date, lesson number and subject)

use crate::db::{collections, ScheduleStore, UpsertOutcome};
use crate::error::AppError;
use crate::models::{Credential, Lesson, LessonKey, Reference, ReferenceKind, SyncStatus, User};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use firestore::errors::FirestoreErrorInTransaction;
use futures_util::FutureExt;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Upsert a whole document.
    async fn put<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
    {
        let _: T = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch a document by ID.
    async fn get<T>(&self, collection: &str, doc_id: &str) -> Result<Option<T>, AppError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Document ID of a reference: its name, URL-encoded.
fn reference_doc_id(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

#[async_trait]
impl ScheduleStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        self.get(collections::USERS, &user_id.to_string()).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.put(collections::USERS, &user.user_id.to_string(), user)
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Credential Operations ───────────────────────────────────

    async fn get_credential(&self, user_id: u64) -> Result<Option<Credential>, AppError> {
        self.get(collections::CREDENTIALS, &user_id.to_string())
            .await
    }

    async fn set_credential(
        &self,
        user_id: u64,
        credential: &Credential,
    ) -> Result<(), AppError> {
        self.put(collections::CREDENTIALS, &user_id.to_string(), credential)
            .await
    }

    // ─── Sync Status ─────────────────────────────────────────────

    async fn get_sync_status(&self, user_id: u64) -> Result<Option<SyncStatus>, AppError> {
        self.get(collections::SYNC_STATUS, &user_id.to_string())
            .await
    }

    async fn set_sync_status(&self, user_id: u64, status: &SyncStatus) -> Result<(), AppError> {
        self.put(collections::SYNC_STATUS, &user_id.to_string(), status)
            .await
    }

    // ─── Reference Operations ────────────────────────────────────

    /// Get-or-create in one transaction; only the caller that commits the
    /// new document sees `created == true`.
    async fn get_or_create_reference(
        &self,
        kind: ReferenceKind,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(Reference, bool), AppError> {
        let collection = collections::references(kind);
        let doc_id = reference_doc_id(name);
        let name = name.to_string();

        let (reference, created) = self
            .get_client()?
            .run_transaction(move |db, transaction| {
                let doc_id = doc_id.clone();
                let name = name.clone();
                async move {
                    let existing: Option<Reference> = db
                        .fluent()
                        .select()
                        .by_id_in(collection)
                        .obj()
                        .one(&doc_id)
                        .await
                        .map_err(|e| FirestoreErrorInTransaction::transient(transaction, e))?;

                    if let Some(reference) = existing {
                        return Ok((reference, false));
                    }

                    let reference = Reference {
                        kind,
                        name,
                        created_at: now,
                    };
                    db.fluent()
                        .update()
                        .in_col(collection)
                        .document_id(&doc_id)
                        .object(&reference)
                        .add_to_transaction(transaction)?;
                    Ok((reference, true))
                }
                .boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("{} transaction failed: {}", collection, e)))?;

        if created {
            tracing::debug!(kind = kind.as_str(), name = %reference.name, "Created reference");
        }
        Ok((reference, created))
    }

    // ─── Lesson Operations ───────────────────────────────────────

    async fn get_lesson(&self, key: &LessonKey) -> Result<Option<Lesson>, AppError> {
        self.get(collections::LESSONS, &key.document_id()).await
    }

    /// Read-modify-write of one lesson document in a transaction. A
    /// concurrent cancellation either lands before the read (and is kept by
    /// `apply_sync`) or forces the transaction to retry.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<UpsertOutcome, AppError> {
        let doc_id = lesson.key().document_id();
        let lesson = lesson.clone();

        self.get_client()?
            .run_transaction(move |db, transaction| {
                let doc_id = doc_id.clone();
                let lesson = lesson.clone();
                async move {
                    let stored: Option<Lesson> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::LESSONS)
                        .obj()
                        .one(&doc_id)
                        .await
                        .map_err(|e| FirestoreErrorInTransaction::transient(transaction, e))?;

                    let (record, outcome) = match stored {
                        Some(mut existing) => {
                            existing.apply_sync(&lesson);
                            (existing, UpsertOutcome::Updated)
                        }
                        None => (lesson, UpsertOutcome::Created),
                    };

                    db.fluent()
                        .update()
                        .in_col(collections::LESSONS)
                        .document_id(&doc_id)
                        .object(&record)
                        .add_to_transaction(transaction)?;
                    Ok(outcome)
                }
                .boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Lesson upsert failed: {}", e)))
    }

    async fn set_lesson_cancelled(
        &self,
        key: &LessonKey,
        cancelled: bool,
    ) -> Result<bool, AppError> {
        let doc_id = key.document_id();

        self.get_client()?
            .run_transaction(move |db, transaction| {
                let doc_id = doc_id.clone();
                async move {
                    let stored: Option<Lesson> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::LESSONS)
                        .obj()
                        .one(&doc_id)
                        .await
                        .map_err(|e| FirestoreErrorInTransaction::transient(transaction, e))?;

                    let Some(mut lesson) = stored else {
                        return Ok(false);
                    };
                    lesson.is_cancelled = cancelled;

                    db.fluent()
                        .update()
                        .in_col(collections::LESSONS)
                        .document_id(&doc_id)
                        .object(&lesson)
                        .add_to_transaction(transaction)?;
                    Ok(true)
                }
                .boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Lesson cancel failed: {}", e)))
    }

    async fn lessons_between(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lesson>, AppError> {
        // Dates are stored as "YYYY-MM-DD", so string order is date order.
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        self.get_client()?
            .fluent()
            .select()
            .from(collections::LESSONS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("date").greater_than_or_equal(start.clone()),
                    q.field("date").less_than_or_equal(end.clone()),
                ])
            })
            .order_by([
                ("date", firestore::FirestoreQueryDirection::Ascending),
                ("lesson_number", firestore::FirestoreQueryDirection::Ascending),
            ])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
