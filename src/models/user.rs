//! User model for storage and API.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Chat (Telegram) user ID, also used as document ID
    pub user_id: u64,
    /// Chat username, if the user has one
    pub username: Option<String>,
    /// Whether the bot should push the daily schedule
    #[serde(default = "default_notify_daily")]
    pub notify_daily: bool,
    /// Local time of the daily push
    #[serde(default = "default_notify_time")]
    pub notify_time: NaiveTime,
    /// When the user first contacted us
    pub created_at: DateTime<Utc>,
}

fn default_notify_daily() -> bool {
    true
}

fn default_notify_time() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default()
}

impl User {
    pub fn new(user_id: u64, username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username,
            notify_daily: default_notify_daily(),
            notify_time: default_notify_time(),
            created_at: now,
        }
    }

    /// Name for log lines and status output.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) if !name.is_empty() => format!("@{}", name),
            _ => format!("@{}", self.user_id),
        }
    }
}

/// Portal credentials and the cached bearer token (secrets encrypted).
///
/// Stored at `credentials/{user_id}`. Every change is a single document
/// write, so clearing or replacing the secrets is atomic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    /// Encrypted portal login (base64), empty when unset
    #[serde(default)]
    pub login_encrypted: String,
    /// Encrypted portal password (base64), empty when unset
    #[serde(default)]
    pub password_encrypted: String,
    /// Encrypted bearer token (base64), empty when none was harvested
    #[serde(default)]
    pub token_encrypted: String,
    /// When the cached token stops being trusted
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Last successful portal login
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    /// Failed logins since the last success
    #[serde(default)]
    pub login_attempts: u32,
}

fn default_active() -> bool {
    true
}

impl Credential {
    /// Both login and password are present.
    pub fn has_credentials(&self) -> bool {
        !self.login_encrypted.is_empty() && !self.password_encrypted.is_empty()
    }

    pub fn has_token(&self) -> bool {
        !self.token_encrypted.is_empty()
    }

    /// A token is valid iff it is non-empty and expires strictly after `now`.
    pub fn is_token_valid(&self, now: DateTime<Utc>) -> bool {
        self.has_token() && self.token_expires_at.is_some_and(|expires| expires > now)
    }

    /// Blank login, password and token together.
    pub fn clear_secrets(&mut self) {
        self.login_encrypted.clear();
        self.password_encrypted.clear();
        self.invalidate_token();
    }

    pub fn invalidate_token(&mut self) {
        self.token_encrypted.clear();
        self.token_expires_at = None;
    }
}
