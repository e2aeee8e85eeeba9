//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. The credential encryption key in
//! particular is never generated or replaced at runtime: rotating it is a
//! deliberate operator action, after which stored logins no longer decrypt
//! and users have to submit their credentials again.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default portal login page.
pub const DEFAULT_PORTAL_LOGIN_URL: &str = "https://journal.top-academy.ru/ru/auth/login/index";
/// Default portal page visited after login (where the SPA stores its token).
pub const DEFAULT_PORTAL_SCHEDULE_URL: &str =
    "https://journal.top-academy.ru/ru/main/schedule/page/index";
/// Default monthly schedule endpoint.
pub const DEFAULT_SCHEDULE_API_URL: &str =
    "https://magni.top-academy.ru/api/v2/schedule/operations/get-month";
/// Origin/Referer presented to the schedule API.
pub const DEFAULT_SCHEDULE_API_ORIGIN: &str = "https://journal.top-academy.ru";

/// Where lessons and credentials are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firestore => "firestore",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Portal login automation settings.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub login_url: String,
    pub schedule_url: String,
    /// Run Chromium without a window
    pub headless: bool,
    /// Upper bound for a whole login session
    pub timeout: Duration,
    /// Chromium binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    pub portal: PortalConfig,
    /// Monthly schedule endpoint
    pub schedule_api_url: String,
    pub schedule_api_origin: String,
    pub fetch_timeout: Duration,
    /// Lifetime assigned to a freshly harvested bearer token
    pub token_ttl: chrono::Duration,
    /// Offset of the academy's local time, which lesson times are given in
    pub schedule_offset: chrono::FixedOffset,

    // --- Secrets ---
    /// Secret the credential encryption key is derived from
    pub credential_key: Vec<u8>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Shared secret for admin and cron endpoints
    pub admin_token: String,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            portal: PortalConfig {
                login_url: DEFAULT_PORTAL_LOGIN_URL.to_string(),
                schedule_url: DEFAULT_PORTAL_SCHEDULE_URL.to_string(),
                headless: true,
                timeout: Duration::from_secs(60),
                chrome_path: None,
            },
            schedule_api_url: "http://127.0.0.1:9/schedule".to_string(),
            schedule_api_origin: DEFAULT_SCHEDULE_API_ORIGIN.to_string(),
            fetch_timeout: Duration::from_secs(10),
            token_ttl: chrono::Duration::hours(4),
            schedule_offset: chrono::Offset::fix(&chrono::Utc),
            credential_key: b"test_credential_key_32_bytes!!!!".to_vec(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            admin_token: "test_admin_token".to_string(),
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let credential_key = required("CREDENTIAL_KEY")?;
        if credential_key.len() < 16 {
            return Err(ConfigError::Invalid(
                "CREDENTIAL_KEY",
                "must be at least 16 bytes".to_string(),
            ));
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            store_backend: env::var("STORE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            portal: PortalConfig {
                login_url: env::var("PORTAL_LOGIN_URL")
                    .unwrap_or_else(|_| DEFAULT_PORTAL_LOGIN_URL.to_string()),
                schedule_url: env::var("PORTAL_SCHEDULE_URL")
                    .unwrap_or_else(|_| DEFAULT_PORTAL_SCHEDULE_URL.to_string()),
                headless: parse_or("BROWSER_HEADLESS", true)?,
                timeout: Duration::from_secs(parse_or("BROWSER_TIMEOUT_SECS", 60)?),
                chrome_path: env::var_os("CHROME_PATH").map(PathBuf::from),
            },
            schedule_api_url: env::var("SCHEDULE_API_URL")
                .unwrap_or_else(|_| DEFAULT_SCHEDULE_API_URL.to_string()),
            schedule_api_origin: env::var("SCHEDULE_API_ORIGIN")
                .unwrap_or_else(|_| DEFAULT_SCHEDULE_API_ORIGIN.to_string()),
            fetch_timeout: Duration::from_secs(parse_or("FETCH_TIMEOUT_SECS", 10)?),
            token_ttl: chrono::Duration::hours(parse_or("TOKEN_TTL_HOURS", 4)?),
            schedule_offset: utc_offset(parse_or("SCHEDULE_UTC_OFFSET_HOURS", 3)?)?,

            credential_key: credential_key.into_bytes(),
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            admin_token: required("ADMIN_TOKEN")?,
        })
    }
}

fn utc_offset(hours: i32) -> Result<chrono::FixedOffset, ConfigError> {
    chrono::FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| ConfigError::Invalid("SCHEDULE_UTC_OFFSET_HOURS", hours.to_string()))
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
