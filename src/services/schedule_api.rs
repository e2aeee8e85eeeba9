// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the academy's monthly schedule endpoint.

use chrono::{NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Failure to get a schedule out of the API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Schedule API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection failure or timeout.
    #[error("Schedule API request failed: {0}")]
    Transport(String),

    #[error("Schedule API response could not be decoded: {0}")]
    Decode(String),
}

impl FetchError {
    /// The API rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Status { status: 401 | 403, .. })
    }
}

impl From<FetchError> for crate::error::AppError {
    fn from(err: FetchError) -> Self {
        crate::error::AppError::Fetch(err.to_string())
    }
}

/// One lesson as the API sends it.
///
/// Every field is optional here; the reconciler reports records that lack
/// what it needs instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LessonRecord {
    #[serde(default)]
    pub date: Option<String>,
    /// Lesson number, sent as a number or a numeric string
    #[serde(default)]
    pub lesson: Option<serde_json::Value>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
}

/// Schedule API client.
#[derive(Clone)]
pub struct ScheduleClient {
    http: reqwest::Client,
    url: String,
    origin: String,
}

impl ScheduleClient {
    pub fn new(url: String, origin: String, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { http, url, origin })
    }

    fn browser_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ru,en;q=0.9"));
        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.origin)) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    /// Fetch the lessons of the month containing `month_date` (default: today).
    pub async fn fetch_month(
        &self,
        token: &str,
        month_date: Option<NaiveDate>,
    ) -> Result<Vec<LessonRecord>, FetchError> {
        let month_date = month_date.unwrap_or_else(|| Utc::now().date_naive());
        let date_filter = month_date.format("%Y-%m-%d").to_string();

        let response = self
            .http
            .get(&self.url)
            .headers(self.browser_headers())
            .bearer_auth(token)
            .query(&[("date_filter", date_filter.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json(
        &self,
        response: reqwest::Response,
    ) -> Result<Vec<LessonRecord>, FetchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if matches!(status.as_u16(), 401 | 403) {
                tracing::warn!(status = status.as_u16(), "Schedule API rejected token");
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tolerates_missing_and_null_fields() {
        let records: Vec<LessonRecord> = serde_json::from_str(
            r#"[
                {"date": "2025-09-01", "lesson": 1, "started_at": "09:00",
                 "finished_at": "10:30", "subject_name": "Math",
                 "teacher_name": null, "room_name": "301", "extra": true},
                {"lesson": "2"}
            ]"#,
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject_name.as_deref(), Some("Math"));
        assert_eq!(records[0].teacher_name, None);
        assert_eq!(records[1].date, None);
        assert_eq!(records[1].lesson, Some(serde_json::json!("2")));
    }

    #[test]
    fn test_unauthorized_classification() {
        let unauthorized = FetchError::Status {
            status: 401,
            body: String::new(),
        };
        let server = FetchError::Status {
            status: 500,
            body: String::new(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(!server.is_unauthorized());
        assert!(!FetchError::Transport("timeout".into()).is_unauthorized());
    }
}
