// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Portal token lifecycle for each user.
//!
//! Handles:
//! - Storing encrypted portal credentials
//! - Serving the cached bearer token while it is valid
//! - Logging in through the browser when it is missing or expired
//! - Counting failed logins

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Credential, User};
use crate::services::cipher::{decrypt_credentials, encrypt_credentials, CredentialCipher};
use crate::services::portal::{login_prefix, Authenticator};
use crate::time_utils::SharedClock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Decrypted bearer token with its expiry.
#[derive(Clone)]
pub struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// In-process cache of decrypted tokens, keyed by user ID.
pub type TokenCache = Arc<DashMap<u64, CachedToken>>;

/// Per-user mutexes.
pub type UserLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// Fetch (creating if needed) the mutex for `user_id`.
pub(crate) fn user_lock(locks: &UserLocks, user_id: u64) -> Arc<Mutex<()>> {
    locks
        .entry(user_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Where a user's token stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TokenStatus {
    /// No login/password stored
    NoCredentials,
    /// Credentials stored, but no token has been harvested
    NoToken { login_attempts: u32 },
    Expired {
        expired_at: DateTime<Utc>,
        login_attempts: u32,
    },
    Active {
        expires_at: DateTime<Utc>,
        /// Whole minutes left
        remaining_minutes: i64,
    },
}

impl TokenStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TokenStatus::Active { .. })
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attempts = |f: &mut fmt::Formatter<'_>, n: u32| {
            if n > 0 {
                write!(f, ", {} failed login attempt(s)", n)
            } else {
                Ok(())
            }
        };

        match self {
            TokenStatus::NoCredentials => write!(f, "Login/password not set"),
            TokenStatus::NoToken { login_attempts } => {
                write!(f, "No token yet")?;
                attempts(f, *login_attempts)
            }
            TokenStatus::Expired { login_attempts, .. } => {
                write!(f, "Token expired")?;
                attempts(f, *login_attempts)
            }
            TokenStatus::Active {
                remaining_minutes, ..
            } => write!(
                f,
                "Token active ({}h {}m)",
                remaining_minutes / 60,
                remaining_minutes % 60
            ),
        }
    }
}

/// Token manager: credential storage plus bearer-token acquisition.
///
/// Every credential write for a user happens under that user's lock, so a
/// login in progress can never overwrite a concurrent credential change.
#[derive(Clone)]
pub struct TokenManager {
    store: Store,
    cipher: CredentialCipher,
    authenticator: Arc<dyn Authenticator>,
    clock: SharedClock,
    ttl: Duration,
    token_cache: TokenCache,
    locks: UserLocks,
}

impl TokenManager {
    pub fn new(
        store: Store,
        cipher: CredentialCipher,
        authenticator: Arc<dyn Authenticator>,
        clock: SharedClock,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cipher,
            authenticator,
            clock,
            ttl,
            token_cache: Arc::new(DashMap::new()),
            locks: Arc::new(DashMap::new()),
        }
    }

    // ─── Users ───────────────────────────────────────────────────────────────

    /// Return the user, creating it on first contact.
    pub async fn ensure_user(
        &self,
        user_id: u64,
        username: Option<String>,
    ) -> Result<User, AppError> {
        if let Some(user) = self.store.get_user(user_id).await? {
            return Ok(user);
        }

        let user = User::new(user_id, username, self.clock.now());
        self.store.upsert_user(&user).await?;
        tracing::info!(user_id, user = %user.display_name(), "New user registered");
        Ok(user)
    }

    // ─── Credentials ─────────────────────────────────────────────────────────

    /// Store a new login/password, dropping any token from the old ones.
    pub async fn set_credentials(
        &self,
        user_id: u64,
        login: &str,
        password: &str,
    ) -> Result<(), AppError> {
        let (login, password) = (login.trim(), password.trim());
        if login.is_empty() || password.is_empty() {
            return Err(AppError::Credential(
                "Login and password must not be empty".to_string(),
            ));
        }
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }

        let lock = user_lock(&self.locks, user_id);
        let _guard = lock.lock().await;

        let mut credential = self
            .store
            .get_credential(user_id)
            .await?
            .unwrap_or_default();

        let (login_encrypted, password_encrypted) =
            encrypt_credentials(&self.cipher, user_id, login, password)?;
        credential.login_encrypted = login_encrypted;
        credential.password_encrypted = password_encrypted;
        credential.invalidate_token();
        credential.login_attempts = 0;
        credential.is_active = true;

        self.store.set_credential(user_id, &credential).await?;
        self.token_cache.remove(&user_id);

        tracing::info!(user_id, login = %login_prefix(login), "Portal credentials stored");
        Ok(())
    }

    /// Wipe login, password and token.
    ///
    /// Returns `false` when the user never stored credentials.
    pub async fn clear_credentials(&self, user_id: u64) -> Result<bool, AppError> {
        let lock = user_lock(&self.locks, user_id);
        let _guard = lock.lock().await;

        let Some(mut credential) = self.store.get_credential(user_id).await? else {
            return Ok(false);
        };

        credential.clear_secrets();
        self.store.set_credential(user_id, &credential).await?;
        self.token_cache.remove(&user_id);

        tracing::info!(user_id, "Portal credentials cleared");
        Ok(true)
    }

    pub async fn has_credentials(&self, user_id: u64) -> Result<bool, AppError> {
        Ok(self
            .store
            .get_credential(user_id)
            .await?
            .is_some_and(|c| c.has_credentials()))
    }

    /// Whether a stored token is present and unexpired.
    pub async fn is_token_valid(&self, user_id: u64) -> Result<bool, AppError> {
        let now = self.clock.now();
        Ok(self
            .store
            .get_credential(user_id)
            .await?
            .is_some_and(|c| c.has_credentials() && c.is_token_valid(now)))
    }

    /// Decrypted stored token, if any, regardless of expiry.
    pub(crate) async fn stored_token(&self, user_id: u64) -> Result<Option<String>, AppError> {
        let Some(credential) = self.store.get_credential(user_id).await? else {
            return Ok(None);
        };
        if !credential.has_token() {
            return Ok(None);
        }

        match self.cipher.decrypt(user_id, &credential.token_encrypted) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Stored token does not decrypt");
                Ok(None)
            }
        }
    }

    // ─── Token Acquisition ───────────────────────────────────────────────────

    /// Get a bearer token for the user.
    ///
    /// A valid cached token is returned without touching the portal unless
    /// `force_refresh` is set. Otherwise the browser logs in with the stored
    /// credentials and the harvested token is stored with a fresh expiry.
    pub async fn get_token(&self, user_id: u64, force_refresh: bool) -> Result<String, AppError> {
        if !force_refresh {
            if let Some(token) = self.cached(user_id) {
                return Ok(token);
            }
        }

        let lock = user_lock(&self.locks, user_id);
        let _guard = lock.lock().await;

        // Another task may have logged in while we waited.
        if !force_refresh {
            if let Some(token) = self.cached(user_id) {
                return Ok(token);
            }
        }

        let mut credential = self
            .store
            .get_credential(user_id)
            .await?
            .filter(Credential::has_credentials)
            .ok_or_else(|| {
                AppError::Credential("Portal login/password not set".to_string())
            })?;

        if !force_refresh && credential.is_token_valid(self.clock.now()) {
            match self.cipher.decrypt(user_id, &credential.token_encrypted) {
                Ok(token) => {
                    self.cache(user_id, &token, credential.token_expires_at);
                    return Ok(token);
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Stored token does not decrypt, logging in again");
                }
            }
        }

        let (login, password) = decrypt_credentials(
            &self.cipher,
            user_id,
            &credential.login_encrypted,
            &credential.password_encrypted,
        )
        .map_err(|e| {
            tracing::warn!(user_id, error = %e, "Stored credentials do not decrypt");
            AppError::Credential(
                "Stored credentials can no longer be read, please submit them again".to_string(),
            )
        })?;

        tracing::info!(user_id, force_refresh, "Acquiring portal token");

        match self.authenticator.authenticate(&login, &password).await {
            Ok(token) => {
                let now = self.clock.now();
                let expires_at = now + self.ttl;

                credential.token_encrypted = self.cipher.encrypt(user_id, &token)?;
                credential.token_expires_at = Some(expires_at);
                credential.last_login = Some(now);
                credential.login_attempts = 0;
                self.store.set_credential(user_id, &credential).await?;

                self.cache(user_id, &token, Some(expires_at));
                tracing::info!(user_id, expires_at = %expires_at, "Portal token acquired");
                Ok(token)
            }
            Err(e) => {
                credential.login_attempts += 1;
                self.store.set_credential(user_id, &credential).await?;

                tracing::warn!(
                    user_id,
                    attempts = credential.login_attempts,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Portal login failed"
                );
                Err(e.into())
            }
        }
    }

    /// Summarize the user's token state.
    pub async fn get_status(&self, user_id: u64) -> Result<TokenStatus, AppError> {
        let now = self.clock.now();
        let Some(credential) = self
            .store
            .get_credential(user_id)
            .await?
            .filter(Credential::has_credentials)
        else {
            return Ok(TokenStatus::NoCredentials);
        };

        let login_attempts = credential.login_attempts;
        Ok(match credential.token_expires_at {
            _ if !credential.has_token() => TokenStatus::NoToken { login_attempts },
            Some(expires_at) if expires_at > now => TokenStatus::Active {
                expires_at,
                remaining_minutes: (expires_at - now).num_minutes(),
            },
            Some(expired_at) => TokenStatus::Expired {
                expired_at,
                login_attempts,
            },
            None => TokenStatus::NoToken { login_attempts },
        })
    }

    fn cached(&self, user_id: u64) -> Option<String> {
        let cached = self.token_cache.get(&user_id)?;
        (cached.expires_at > self.clock.now()).then(|| cached.token.clone())
    }

    fn cache(&self, user_id: u64, token: &str, expires_at: Option<DateTime<Utc>>) {
        if let Some(expires_at) = expires_at {
            self.token_cache.insert(
                user_id,
                CachedToken {
                    token: token.to_string(),
                    expires_at,
                },
            );
        }
    }
}
