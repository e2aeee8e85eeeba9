// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Portal login automation.
//!
//! The portal has no API login: a real browser fills the login form, then
//! the bearer token the single-page app keeps client-side is harvested from
//! web storage, inline scripts or, failing that, a session cookie.

use crate::config::PortalConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

// Portal DOM selectors.
const LOGIN_INPUT: &str = r#"input[name="LoginForm[login]"]"#;
const PASSWORD_INPUT: &str = r#"input[name="LoginForm[password]"]"#;
const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
const ERROR_MESSAGE: &str = "div.alert-danger, .error-message, .help-block-error, .text-danger";
const BOT_CHALLENGE: &str = "div.g-recaptcha, iframe[src*='recaptcha']";

/// Present in the URL for as long as the login form is shown.
const LOGIN_PATH_MARKER: &str = "auth/login";

/// Time for the app to write its token after a page load.
const SETTLE_DELAY: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const HIDE_WEBDRIVER_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Every storage value that may hold a token, in key order.
const LOCAL_STORAGE_JS: &str = r#"(() => {
    const found = [];
    for (let i = 0; i < localStorage.length; i++) {
        const value = localStorage.getItem(localStorage.key(i));
        if (value && value.includes('eyJ')) found.push(value);
    }
    return found;
})()"#;

const SESSION_STORAGE_JS: &str = r#"(() => {
    const found = [];
    for (let i = 0; i < sessionStorage.length; i++) {
        const value = sessionStorage.getItem(sessionStorage.key(i));
        if (value && value.includes('eyJ')) found.push(value);
    }
    return found;
})()"#;

const SCRIPTS_JS: &str = r#"(() => {
    const found = [];
    for (const script of document.getElementsByTagName('script')) {
        const content = script.textContent || '';
        if (content.includes('eyJ')) found.push(content);
    }
    return found;
})()"#;

static BEARER_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"eyJ[A-Za-z0-9._-]+").expect("valid regex"));

/// Distinguishes concurrent sessions' profile directories.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Why a portal login did not yield a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The portal showed an error next to the form; its text is kept.
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Captcha detected: automated login blocked")]
    BotChallenge,

    #[error("Login form was not accepted")]
    LoginRejected,

    #[error("Logged in, but no bearer token was found")]
    TokenNotFound,

    #[error("Portal login timed out after {0:?}")]
    Timeout(Duration),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl AuthError {
    /// Transient failures worth another attempt later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Timeout(_) | AuthError::Browser(_))
    }
}

fn browser_err(e: impl std::fmt::Display) -> AuthError {
    AuthError::Browser(e.to_string())
}

/// Exchanges portal credentials for a bearer token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, login: &str, password: &str) -> Result<String, AuthError>;
}

/// First plausible bearer token in `text`.
///
/// The app's tokens are JWTs: a match must be longer than 100 characters
/// and have at least two `.` separators.
pub fn find_bearer_token(text: &str) -> Option<String> {
    BEARER_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| {
            candidate.len() > 100 && candidate.chars().filter(|c| *c == '.').count() >= 2
        })
        .map(str::to_string)
}

/// First plausible bearer token across several harvested values.
///
/// Values that only look like tokens are skipped, so a later value can
/// still supply the real one.
pub fn find_bearer_token_in<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    values.into_iter().find_map(find_bearer_token)
}

/// Value of the first non-empty cookie that looks like a session.
pub fn session_from_cookies<'a>(
    cookies: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    cookies
        .into_iter()
        .find(|(name, value)| {
            let name = name.to_lowercase();
            !value.is_empty()
                && ["session", "token", "auth"]
                    .iter()
                    .any(|keyword| name.contains(keyword))
        })
        .map(|(_, value)| value.to_string())
}

/// Log-safe prefix of a login.
pub(crate) fn login_prefix(login: &str) -> String {
    format!("{}...", login.chars().take(3).collect::<String>())
}

/// Drives a headless Chromium through the portal login form.
pub struct BrowserAuthenticator {
    config: PortalConfig,
}

impl BrowserAuthenticator {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig, AuthError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .user_data_dir(profile_dir)
            .args([
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--disable-blink-features=AutomationControlled",
            ]);
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(AuthError::Browser)
    }

    /// Launch Chromium on `profile_dir`, run the session and shut down.
    async fn launch_and_login(
        &self,
        profile_dir: &Path,
        login: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let config = self.browser_config(profile_dir)?;
        let (mut browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let result = tokio::time::timeout(
            self.config.timeout,
            self.run_session(&browser, login, password),
        )
        .await
        .unwrap_or(Err(AuthError::Timeout(self.config.timeout)));

        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser");
        }
        let _ = browser.wait().await;
        handler_task.abort();
        result
    }

    /// Log in and harvest the token. Runs under the session timeout.
    async fn run_session(
        &self,
        browser: &Browser,
        login: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let page = browser.new_page("about:blank").await.map_err(browser_err)?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_WEBDRIVER_JS,
        ))
        .await
        .map_err(browser_err)?;

        page.goto(&self.config.login_url)
            .await
            .map_err(browser_err)?;

        wait_for_element(&page, LOGIN_INPUT).await?;
        fill(&page, LOGIN_INPUT, login).await?;
        fill(&page, PASSWORD_INPUT, password).await?;

        page.find_element(SUBMIT_BUTTON)
            .await
            .map_err(browser_err)?
            .click()
            .await
            .map_err(browser_err)?;
        page.wait_for_navigation().await.map_err(browser_err)?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let current_url = page.url().await.map_err(browser_err)?.unwrap_or_default();
        tracing::debug!(url = %current_url, "Login form submitted");
        if current_url.contains(LOGIN_PATH_MARKER) {
            return Err(classify_login_failure(&page).await);
        }

        page.goto(&self.config.schedule_url)
            .await
            .map_err(browser_err)?;
        tokio::time::sleep(SETTLE_DELAY).await;

        for (source, script) in [
            ("localStorage", LOCAL_STORAGE_JS),
            ("sessionStorage", SESSION_STORAGE_JS),
            ("scripts", SCRIPTS_JS),
        ] {
            let values = evaluate_strings(&page, script).await;
            if let Some(token) = find_bearer_token_in(values.iter().map(String::as_str)) {
                tracing::info!(source, "Bearer token found");
                return Ok(token);
            }
        }

        let cookies = page.get_cookies().await.map_err(browser_err)?;
        session_from_cookies(cookies.iter().map(|c| (c.name.as_str(), c.value.as_str())))
            .inspect(|_| tracing::info!("Falling back to session cookie"))
            .ok_or(AuthError::TokenNotFound)
    }
}

#[async_trait]
impl Authenticator for BrowserAuthenticator {
    async fn authenticate(&self, login: &str, password: &str) -> Result<String, AuthError> {
        tracing::info!(login = %login_prefix(login), "Starting portal login");

        // Fresh profile per session
        let profile_dir = std::env::temp_dir().join(format!(
            "study-tracker-{}-{}",
            std::process::id(),
            SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        // Removed on every path, launch failures included.
        let result = match tokio::fs::create_dir_all(&profile_dir).await {
            Ok(()) => self.launch_and_login(&profile_dir, login, password).await,
            Err(e) => Err(browser_err(format!("profile directory: {}", e))),
        };
        if let Err(e) = tokio::fs::remove_dir_all(&profile_dir).await {
            tracing::debug!(error = %e, path = %profile_dir.display(), "Profile cleanup failed");
        }

        match &result {
            Ok(_) => tracing::info!(login = %login_prefix(login), "Portal login succeeded"),
            Err(e) => tracing::warn!(login = %login_prefix(login), error = %e, "Portal login failed"),
        }
        result
    }
}

async fn wait_for_element(page: &Page, selector: &str) -> Result<(), AuthError> {
    // The session timeout bounds this loop.
    loop {
        if page.find_element(selector).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn fill(page: &Page, selector: &str, text: &str) -> Result<(), AuthError> {
    page.find_element(selector)
        .await
        .map_err(browser_err)?
        .click()
        .await
        .map_err(browser_err)?
        .type_str(text)
        .await
        .map_err(browser_err)?;
    Ok(())
}

async fn evaluate_strings(page: &Page, script: &str) -> Vec<String> {
    match page.evaluate(script).await {
        Ok(result) => result.into_value::<Vec<String>>().unwrap_or_default(),
        Err(e) => {
            tracing::debug!(error = %e, "Token lookup script failed");
            Vec::new()
        }
    }
}

/// Decide why the form is still shown.
async fn classify_login_failure(page: &Page) -> AuthError {
    if let Ok(element) = page.find_element(ERROR_MESSAGE).await {
        let text = element
            .inner_text()
            .await
            .ok()
            .flatten()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        if !text.is_empty() {
            return AuthError::InvalidCredentials(text);
        }
    }

    if page.find_element(BOT_CHALLENGE).await.is_ok() {
        return AuthError::BotChallenge;
    }

    AuthError::LoginRejected
}
