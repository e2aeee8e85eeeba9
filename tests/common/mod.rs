// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use study_tracker::config::Config;
use study_tracker::db::{FirestoreDb, MemoryStore, ScheduleStore, Store, UpsertOutcome};
use study_tracker::error::AppError;
use study_tracker::models::{
    Credential, Lesson, LessonKey, Reference, ReferenceKind, SyncStatus, User,
};
use study_tracker::middleware::auth::create_jwt;
use study_tracker::routes::create_router;
use study_tracker::services::{AuthError, Authenticator, CredentialCipher};
use study_tracker::time_utils::{ManualClock, SharedClock};
use study_tracker::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Start of every test clock: Monday 2025-09-01, 06:00 UTC.
#[allow(dead_code)]
pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 6, 0, 0).unwrap()
}

/// Generate a unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

// ─── Authenticator ───────────────────────────────────────────

/// Authenticator that replays queued results, then hands out
/// `token-1`, `token-2`, ... once the queue is empty.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedAuthenticator {
    script: Mutex<VecDeque<Result<String, AuthError>>>,
    calls: AtomicUsize,
    logins: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl ScriptedAuthenticator {
    pub fn push(&self, result: Result<String, AuthError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Login/password pairs seen, in order.
    pub fn logins(&self) -> Vec<(String, String)> {
        self.logins.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn authenticate(&self, login: &str, password: &str) -> Result<String, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.logins
            .lock()
            .unwrap()
            .push((login.to_string(), password.to_string()));

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("token-{}", call)))
    }
}

// ─── Schedule API ────────────────────────────────────────────

#[allow(dead_code)]
#[derive(Default)]
struct MockApiState {
    records: Mutex<serde_json::Value>,
    rejected: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

/// Local stand-in for the academy schedule API.
#[allow(dead_code)]
#[derive(Clone)]
pub struct MockScheduleApi {
    pub url: String,
    state: Arc<MockApiState>,
}

#[allow(dead_code)]
impl MockScheduleApi {
    /// Bind an ephemeral port and serve until the test runtime shuts down.
    pub async fn start() -> Self {
        let state = Arc::new(MockApiState {
            records: Mutex::new(serde_json::json!([])),
            ..Default::default()
        });

        let app = axum::Router::new()
            .route("/schedule", get(serve_schedule))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/schedule", addr),
            state,
        }
    }

    /// Body returned to accepted requests.
    pub fn set_records(&self, records: serde_json::Value) {
        *self.state.records.lock().unwrap() = records;
    }

    /// Answer 401 to requests bearing `token`.
    pub fn reject_token(&self, token: &str) {
        self.state.rejected.lock().unwrap().insert(token.to_string());
    }

    /// `(bearer token, date_filter)` of every request received.
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.state.requests.lock().unwrap().clone()
    }
}

#[allow(dead_code)]
async fn serve_schedule(
    State(state): State<Arc<MockApiState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();

    state
        .requests
        .lock()
        .unwrap()
        .push((token.clone(), query.get("date_filter").cloned()));

    if token.is_empty() || state.rejected.lock().unwrap().contains(&token) {
        return (StatusCode::UNAUTHORIZED, "token rejected").into_response();
    }

    let records = state.records.lock().unwrap().clone();
    Json(records).into_response()
}

/// A schedule record as the API sends it.
#[allow(dead_code)]
pub fn api_record(date: &str, lesson: u32, subject: &str) -> serde_json::Value {
    let start_hour = 8 + lesson * 2;
    serde_json::json!({
        "date": date,
        "lesson": lesson,
        "started_at": format!("{:02}:00", start_hour),
        "finished_at": format!("{:02}:30", start_hour + 1),
        "subject_name": subject,
        "teacher_name": "Petrova A.",
        "room_name": "301",
    })
}

// ─── Store ───────────────────────────────────────────────────

/// In-memory store whose sync status writes can be made to fail.
#[allow(dead_code)]
pub struct SwitchableStore {
    inner: Arc<MemoryStore>,
    fail_status_writes: AtomicBool,
}

#[async_trait]
impl ScheduleStore for SwitchableStore {
    async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        self.inner.get_user(user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.inner.upsert_user(user).await
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.inner.list_users().await
    }

    async fn get_credential(&self, user_id: u64) -> Result<Option<Credential>, AppError> {
        self.inner.get_credential(user_id).await
    }

    async fn set_credential(
        &self,
        user_id: u64,
        credential: &Credential,
    ) -> Result<(), AppError> {
        self.inner.set_credential(user_id, credential).await
    }

    async fn get_sync_status(&self, user_id: u64) -> Result<Option<SyncStatus>, AppError> {
        self.inner.get_sync_status(user_id).await
    }

    async fn set_sync_status(&self, user_id: u64, status: &SyncStatus) -> Result<(), AppError> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("sync_status unavailable".to_string()));
        }
        self.inner.set_sync_status(user_id, status).await
    }

    async fn get_or_create_reference(
        &self,
        kind: ReferenceKind,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(Reference, bool), AppError> {
        self.inner.get_or_create_reference(kind, name, now).await
    }

    async fn get_lesson(&self, key: &LessonKey) -> Result<Option<Lesson>, AppError> {
        self.inner.get_lesson(key).await
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<UpsertOutcome, AppError> {
        self.inner.upsert_lesson(lesson).await
    }

    async fn set_lesson_cancelled(
        &self,
        key: &LessonKey,
        cancelled: bool,
    ) -> Result<bool, AppError> {
        self.inner.set_lesson_cancelled(key, cancelled).await
    }

    async fn lessons_between(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lesson>, AppError> {
        self.inner.lessons_between(user_id, start, end).await
    }
}

// ─── Application ─────────────────────────────────────────────

/// Full application over in-memory storage and scripted externals.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    switchable: Arc<SwitchableStore>,
    pub auth: Arc<ScriptedAuthenticator>,
    pub clock: Arc<ManualClock>,
    pub api: MockScheduleApi,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Like [`TestApp::new`], with test config adjusted by `tweak`.
    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let api = MockScheduleApi::start().await;
        let mut config = Config {
            schedule_api_url: api.url.clone(),
            ..Config::test_default()
        };
        tweak(&mut config);

        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(ScriptedAuthenticator::default());
        let clock = Arc::new(ManualClock::new(test_start()));

        let switchable = Arc::new(SwitchableStore {
            inner: store.clone(),
            fail_status_writes: AtomicBool::new(false),
        });
        let db: Store = switchable.clone();
        let shared_clock: SharedClock = clock.clone();
        let state = Arc::new(AppState::new(config, db, auth.clone(), shared_clock).unwrap());

        Self {
            router: create_router(state.clone()),
            state,
            store,
            switchable,
            auth,
            clock,
            api,
        }
    }

    /// Make every later sync status write fail with a database error.
    pub fn fail_status_writes(&self) {
        self.switchable
            .fail_status_writes
            .store(true, Ordering::SeqCst);
    }

    /// Register a user and return a session JWT for it.
    pub async fn register(&self, user_id: u64) -> String {
        self.state
            .token_manager
            .ensure_user(user_id, Some(format!("student{}", user_id)))
            .await
            .unwrap();
        create_jwt(user_id, &self.state.config.jwt_signing_key).unwrap()
    }

    /// Register a user and store portal credentials for it.
    pub async fn register_with_credentials(&self, user_id: u64) -> String {
        let jwt = self.register(user_id).await;
        self.state
            .token_manager
            .set_credentials(user_id, "student@academy", "hunter2")
            .await
            .unwrap();
        jwt
    }

    /// Cipher keyed like the application's.
    pub fn cipher(&self) -> CredentialCipher {
        CredentialCipher::new(&self.state.config.credential_key).unwrap()
    }
}
