//! reqwest-backed forum API client.
//!
//! Base URL: https://prod-api.lolz.live
//! Auth: `Authorization: Bearer {token}`
//! Rate limit: shared minimum spacing between calls (see `RateLimiter`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::{ApiRequest, ForumApi, Method};
use crate::types::ApiError;

pub struct ForumClient {
    http: Client,
    base_url: String,
    token: SecretString,
    limiter: RateLimiter,
}

impl ForumClient {
    /// Create a client bound to `base_url`.
    ///
    /// `limiter` should be the process-wide instance so that every client
    /// shares the same call spacing.
    pub fn new(
        base_url: &str,
        token: SecretString,
        timeout: Duration,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("lztbot/0.1.0")
            .build()
            .context("Failed to build HTTP client for forum API")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            limiter,
        })
    }
}

#[async_trait]
impl ForumApi for ForumClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = ?request.method, url = %url, "Forum API call");

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        builder = builder
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/json");
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = resp.status();
        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let body = decode_body(&text, is_json, status.as_u16());
        if status.is_success() {
            Ok(body)
        } else {
            Err(ApiError::status(status.as_u16(), body))
        }
    }
}

/// JSON bodies are parsed; anything else is wrapped so callers always get
/// a JSON value.
fn decode_body(text: &str, is_json: bool, status: u16) -> Value {
    if is_json {
        if let Ok(v) = serde_json::from_str(text) {
            return v;
        }
    }
    json!({ "raw": text, "status_code": status })
}
