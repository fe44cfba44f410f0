//! Forum API gateway.
//!
//! Defines the `ForumApi` trait (one generic `call`) and the typed
//! endpoint helpers the pipeline and scheduler use on top of it:
//! - `fetch_notifications` — `GET /notifications`
//! - `fetch_notification_content` — `GET /notifications/{id}/content`
//! - `bump_thread` — `POST /threads/{id}/bump`

pub mod client;
pub mod rate_limiter;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ApiError, RawNotification};

/// HTTP verbs the gateway needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, starting with `/`.
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Authenticated access to the forum backend.
///
/// Implementations are expected to enforce the process-wide call spacing
/// and the request timeout themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Perform a call and return the decoded JSON body on 2xx.
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// Fetch the most recent notifications, oldest first.
pub async fn fetch_notifications(
    api: &dyn ForumApi,
    limit: u32,
) -> Result<Vec<RawNotification>, ApiError> {
    let data = api
        .call(ApiRequest::get("/notifications").param("limit", limit))
        .await?;

    let mut items: Vec<RawNotification> = data
        .get("notifications")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .take(limit as usize)
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    // The API returns newest first; the poller walks oldest to newest.
    items.sort_by_key(|n| n.created_at);
    Ok(items)
}

/// Fetch the enriched content payload for one notification.
pub async fn fetch_notification_content(
    api: &dyn ForumApi,
    notification_id: u64,
) -> Result<Value, ApiError> {
    api.call(ApiRequest::get(format!("/notifications/{notification_id}/content")))
        .await
}

/// Raise a thread to the top of its forum section.
pub async fn bump_thread(api: &dyn ForumApi, thread_id: u64) -> Result<(), ApiError> {
    api.call(ApiRequest::post(format!("/threads/{thread_id}/bump")))
        .await
        .map(|_| ())
}
