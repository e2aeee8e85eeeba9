// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod lesson;
pub mod sync;
pub mod user;

pub use lesson::{Lesson, LessonKey, Reference, ReferenceKind};
pub use sync::SyncStatus;
pub use user::{Credential, User};
