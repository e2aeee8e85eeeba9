// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cipher;
pub mod portal;
pub mod reconcile;
pub mod schedule_api;
pub mod sync;
pub mod token;

pub use cipher::{CipherError, CredentialCipher};
pub use portal::{AuthError, Authenticator, BrowserAuthenticator};
pub use reconcile::{ReconcileReport, Reconciler, RecordError};
pub use schedule_api::{FetchError, LessonRecord, ScheduleClient};
pub use sync::{ScheduleByDate, SyncAllReport, SyncReport, SyncService};
pub use token::{TokenManager, TokenStatus};
