//! Notification poller.
//!
//! Each tick: fetch the latest notifications (oldest first), pick the ones
//! after the stored watermark, classify, drop kinds disabled in settings,
//! render and deliver. The watermark always advances to the newest fetched
//! item, even when some deliveries failed.
//!
//! Delivery is at-least-once at best: if the watermark scrolled out of the
//! fetch window the whole window is treated as new, and events older than
//! the window that arrived while the bot was down are lost.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sleep_or_cancel;
use crate::config::PollerConfig;
use crate::delivery::DeliveryChannel;
use crate::extract::{MarkupExtractor, StructuredContent};
use crate::forum::{self, ForumApi};
use crate::render::EventRenderer;
use crate::storage::{SettingsStore, WatermarkStore};
use crate::types::RawNotification;

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Master switch was off; nothing fetched.
    pub skipped: bool,
    /// First run: watermark seeded, nothing dispatched.
    pub seeded: bool,
    pub fetched: usize,
    pub new: usize,
    pub filtered: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct NotificationPoller {
    api: Arc<dyn ForumApi>,
    channel: Arc<dyn DeliveryChannel>,
    extractor: MarkupExtractor,
    renderer: EventRenderer,
    watermark: WatermarkStore,
    settings: Arc<SettingsStore>,
    chat_id: i64,
    cfg: PollerConfig,
}

/// Items strictly after the last one whose key equals `watermark`, or the
/// whole window when it is not present.
pub fn unseen<'a>(items: &'a [RawNotification], watermark: &str) -> &'a [RawNotification] {
    match items.iter().rposition(|n| n.watermark_key() == watermark) {
        Some(pos) => &items[pos + 1..],
        None => items,
    }
}

impl NotificationPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn ForumApi>,
        channel: Arc<dyn DeliveryChannel>,
        extractor: MarkupExtractor,
        renderer: EventRenderer,
        watermark: WatermarkStore,
        settings: Arc<SettingsStore>,
        chat_id: i64,
        cfg: PollerConfig,
    ) -> Self {
        Self {
            api,
            channel,
            extractor,
            renderer,
            watermark,
            settings,
            chat_id,
            cfg,
        }
    }

    /// Loop until cancelled. Tick errors are logged and the loop carries on.
    pub async fn run(&self, cancel: CancellationToken) {
        if !sleep_or_cancel(&cancel, Duration::from_secs(self.cfg.startup_delay_secs)).await {
            return;
        }
        info!(interval_secs = self.cfg.interval_secs, "Notification poller started");

        loop {
            match self.tick().await {
                Ok(report) if report.delivered > 0 || report.failed > 0 => {
                    info!(
                        new = report.new,
                        delivered = report.delivered,
                        failed = report.failed,
                        filtered = report.filtered,
                        "Notifications dispatched"
                    );
                }
                Ok(report) => debug!(?report, "Poll tick"),
                Err(e) => warn!(error = %e, "Poll tick failed"),
            }

            if !sleep_or_cancel(&cancel, Duration::from_secs(self.cfg.interval_secs)).await {
                break;
            }
        }
        info!("Notification poller stopped");
    }

    pub async fn tick(&self) -> Result<PollReport> {
        let mut report = PollReport::default();

        let settings = self.settings.get()?;
        if !settings.push_cards_enabled {
            report.skipped = true;
            return Ok(report);
        }

        let items = forum::fetch_notifications(self.api.as_ref(), self.cfg.fetch_limit).await?;
        report.fetched = items.len();
        let Some(newest) = items.last() else {
            return Ok(report);
        };
        let newest_key = newest.watermark_key();

        let Some(last_key) = self.watermark.get()? else {
            self.watermark.set(&newest_key)?;
            report.seeded = true;
            info!(watermark = %newest_key, "Watermark seeded, skipping backlog");
            return Ok(report);
        };

        let enabled = settings.enabled_kinds();
        for item in unseen(&items, &last_key) {
            report.new += 1;
            let content = self.fetch_content(item).await;
            let event = self.extractor.extract(&item.html_markup, content.as_ref());
            if event.is_degraded() {
                debug!(id = ?item.id, "Notification not classified");
            }
            if !enabled.contains(&event.kind) {
                report.filtered += 1;
                continue;
            }

            let msg = self.renderer.render(&event, item.created_at);
            match self.channel.send(self.chat_id, &msg.text, &msg.actions).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(id = ?item.id, kind = %event.kind, error = %e, "Notification delivery failed");
                }
            }
        }

        if newest_key != last_key {
            self.watermark.set(&newest_key)?;
        }
        Ok(report)
    }

    /// Best effort: any failure falls back to markup-only extraction.
    async fn fetch_content(&self, item: &RawNotification) -> Option<StructuredContent> {
        if !self.cfg.fetch_content {
            return None;
        }
        let id = item.id?;
        match forum::fetch_notification_content(self.api.as_ref(), id).await {
            Ok(value) => Some(StructuredContent::from_value(&value)),
            Err(e) => {
                debug!(id, error = %e, "Notification content unavailable");
                None
            }
        }
    }
}
