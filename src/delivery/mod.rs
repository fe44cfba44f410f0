//! Message delivery.
//!
//! Defines the `DeliveryChannel` trait and provides:
//! - `TelegramChannel` — Bot API `sendMessage` with inline link buttons
//! - `remind_after` — one-shot delayed send

pub mod telegram;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{DeliveryError, LinkAction};

/// Where rendered messages go.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send `text` (HTML) to `chat_id` with up to two link buttons.
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[LinkAction],
    ) -> Result<(), DeliveryError>;

    /// Channel name for logging.
    fn name(&self) -> &str;
}

/// Send `text` once after `delay`. Delivery failures are logged and dropped.
pub fn remind_after(
    channel: Arc<dyn DeliveryChannel>,
    delay: Duration,
    chat_id: i64,
    text: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match channel.send(chat_id, &text, &[]).await {
            Ok(()) => debug!(chat_id, "Reminder delivered"),
            Err(e) => warn!(chat_id, error = %e, "Reminder delivery failed"),
        }
    })
}
