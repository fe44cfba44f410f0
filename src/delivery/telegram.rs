//! Telegram Bot API delivery.
//!
//! Messages are sent with `parse_mode=HTML` and web previews disabled.
//! Link actions become an inline keyboard, two buttons per row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::DeliveryChannel;
use crate::types::{DeliveryError, LinkAction};

const BUTTONS_PER_ROW: usize = 2;

pub struct TelegramChannel {
    http: Client,
    api_base: String,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(api_base: &str, token: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Telegram")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret())
    }
}

/// Request body for `sendMessage`.
pub fn send_message_body(chat_id: i64, text: &str, actions: &[LinkAction]) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
        "disable_web_page_preview": true,
    });
    if !actions.is_empty() {
        body["reply_markup"] = inline_keyboard(actions);
    }
    body
}

fn inline_keyboard(actions: &[LinkAction]) -> Value {
    let rows: Vec<Value> = actions
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            Value::Array(
                row.iter()
                    .map(|a| json!({ "text": a.label, "url": a.url }))
                    .collect(),
            )
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[LinkAction],
    ) -> Result<(), DeliveryError> {
        let body = send_message_body(chat_id, text, actions);
        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let parsed: TelegramResponse = resp.json().await?;
        if !parsed.ok {
            return Err(DeliveryError::Rejected(format!(
                "{status}: {}",
                parsed.description.unwrap_or_default()
            )));
        }
        debug!(chat_id, buttons = actions.len(), "Telegram message sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
