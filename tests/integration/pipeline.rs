//! Notification pipeline: feed → extract → filter → render → deliver.

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use lztbot::config::PollerConfig;
use lztbot::engine::poller::NotificationPoller;
use lztbot::extract::MarkupExtractor;
use lztbot::render::EventRenderer;
use lztbot::storage::{JsonFileStore, SettingsStore, WatermarkDoc, WatermarkStore, WATERMARK_FILE};
use lztbot::types::{EventKind, Settings};

use crate::mock_forum::{MockForum, RecordingChannel};

const CHAT: i64 = 777;

const MENTION: &str = r#"<div class="contentRow-main"><a href="https://lolz.live/members/4242/" class="username" data-user-id="4242"><span class="style2">Seller</span></a> упомянул(а) вас в теме <a href="https://lolz.live/threads/9070000/" class="PreviewTooltip">Продажа аккаунтов Steam</a><div class="contentRow-snippet">Смотри лот выше, @buyer</div></div>"#;

const TRANSFER: &str = r#"<a href="https://lolz.live/members/55/">Payer</a> отправил(а) вам 1&nbsp;234,56 ₽ с комментарием «за аккаунт»"#;

const LIKE: &str = r#"<a href="https://lolz.live/members/8/">Fan</a>: вам нравится ваше сообщение в теме <a href="https://lolz.live/threads/1/">Флуд</a>"#;

const UNKNOWN: &str = "<b>Системное</b> событие без шаблона";

struct Harness {
    forum: Arc<MockForum>,
    channel: Arc<RecordingChannel>,
    settings: Arc<SettingsStore>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            forum: Arc::new(MockForum::new()),
            channel: Arc::new(RecordingChannel::new()),
            settings: Arc::new(SettingsStore::in_memory()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn watermark(&self) -> WatermarkStore {
        WatermarkStore::new(Arc::new(JsonFileStore::<WatermarkDoc>::new(
            self.dir.path().join(WATERMARK_FILE),
        )))
    }

    /// A fresh poller over the same files, as after a restart.
    fn poller(&self) -> NotificationPoller {
        NotificationPoller::new(
            self.forum.clone(),
            self.channel.clone(),
            MarkupExtractor::new("https://lolz.live", "https://prod-api.lolz.live"),
            EventRenderer::with_offset_hours(3),
            self.watermark(),
            self.settings.clone(),
            CHAT,
            PollerConfig::default(),
        )
    }
}

#[tokio::test]
async fn test_first_run_does_not_replay_history() {
    let h = Harness::new();
    h.forum.push_notification(1, 1_700_000_001, MENTION);
    h.forum.push_notification(2, 1_700_000_002, LIKE);

    let report = h.poller().tick().await.unwrap();
    assert!(report.seeded);
    assert!(h.channel.delivered().is_empty());
    assert_eq!(h.watermark().get().unwrap().as_deref(), Some("id:2"));
}

#[tokio::test]
async fn test_new_mention_is_rendered_with_buttons() {
    let h = Harness::new();
    h.forum.push_notification(1, 1_700_000_001, LIKE);
    h.poller().tick().await.unwrap();

    h.forum.push_notification(2, 1_704_067_200, MENTION);
    let report = h.poller().tick().await.unwrap();
    assert_eq!(report.delivered, 1);

    let sent = h.channel.delivered();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, CHAT);
    let text = &sent[0].text;
    assert!(text.starts_with("🕒 01.01 03:00\n"), "{text}");
    assert!(text.contains(
        "🏷️ <a href=\"https://lolz.live/members/4242/\">Seller</a> упомянул(а) вас"
    ));
    assert!(text.contains("🧵 <a href=\"https://lolz.live/threads/9070000/\">Продажа аккаунтов Steam</a>"));
    assert!(text.ends_with("«Смотри лот выше, @buyer»"));

    assert_eq!(sent[0].actions.len(), 1);
    assert_eq!(sent[0].actions[0].label, "К теме");
    assert_eq!(sent[0].actions[0].url, "https://lolz.live/threads/9070000/");
}

#[tokio::test]
async fn test_transfer_amount_in_action_line() {
    let h = Harness::new();
    h.forum.push_notification(1, 1, LIKE);
    h.poller().tick().await.unwrap();

    h.forum.push_notification(2, 2, TRANSFER);
    h.poller().tick().await.unwrap();

    let text = &h.channel.delivered()[0].text;
    assert!(text.contains("💵"));
    assert!(text.contains("перевёл(а) вам +1234,56 ₽"), "{text}");
    assert!(text.contains("«за аккаунт»"));
}

#[tokio::test]
async fn test_no_redelivery_across_restarts() {
    let h = Harness::new();
    h.forum.push_notification(1, 1, LIKE);
    h.poller().tick().await.unwrap();

    h.forum.push_notification(2, 2, MENTION);
    h.forum.push_notification(3, 3, TRANSFER);
    h.poller().tick().await.unwrap();
    assert_eq!(h.channel.delivered().len(), 2);

    // Restart twice with no new items.
    h.poller().tick().await.unwrap();
    h.poller().tick().await.unwrap();
    assert_eq!(h.channel.delivered().len(), 2);

    h.forum.push_notification(4, 4, MENTION);
    let report = h.poller().tick().await.unwrap();
    assert_eq!(report.new, 1);
    assert_eq!(h.channel.delivered().len(), 3);
}

#[tokio::test]
async fn test_watermark_scrolled_out_delivers_whole_window() {
    let h = Harness::new();
    h.forum.push_notification(1, 1, LIKE);
    h.poller().tick().await.unwrap();

    for id in 2..=15 {
        h.forum.push_notification(id, id as i64, MENTION);
    }
    let report = h.poller().tick().await.unwrap();
    assert_eq!(report.fetched, 10);
    assert_eq!(report.new, 10);
    assert_eq!(h.watermark().get().unwrap().as_deref(), Some("id:15"));
}

#[tokio::test]
async fn test_settings_filter_and_degraded_events() {
    let h = Harness::new();
    h.forum.push_notification(1, 1, MENTION);
    h.poller().tick().await.unwrap();

    h.settings.set("notify_likes", false).unwrap();
    h.forum.push_notification(2, 2, LIKE);
    h.forum.push_notification(3, 3, UNKNOWN);
    let report = h.poller().tick().await.unwrap();
    assert_eq!(report.filtered, 1);
    assert_eq!(report.delivered, 1);

    let text = &h.channel.delivered()[0].text;
    assert!(text.contains("🔔 Пользователь Системное событие без шаблона"), "{text}");

    h.settings.set("notify_other", false).unwrap();
    h.forum.push_notification(4, 4, UNKNOWN);
    let report = h.poller().tick().await.unwrap();
    assert_eq!(report.filtered, 1);
    assert_eq!(h.channel.delivered().len(), 1);
}

#[test]
fn test_payment_flag_covers_transfers() {
    let mut settings = Settings::default();
    settings.notify_payment_in = false;
    let kinds = settings.enabled_kinds();
    assert!(!kinds.contains(&EventKind::TransferIn));
    assert!(!kinds.contains(&EventKind::TransferInHold));
    assert!(kinds.contains(&EventKind::Mention));
}

#[tokio::test]
async fn test_master_switch_off_makes_no_api_calls() {
    let h = Harness::new();
    h.settings.set("push_cards_enabled", false).unwrap();
    h.forum.push_notification(1, 1, MENTION);

    let report = h.poller().tick().await.unwrap();
    assert!(report.skipped);
    assert_eq!(h.forum.call_count(), 0);
}

#[tokio::test]
async fn test_failed_delivery_is_not_retried() {
    let h = Harness::new();
    h.forum.push_notification(1, 1, LIKE);
    h.poller().tick().await.unwrap();

    h.channel.fail_next(1);
    h.forum.push_notification(2, 2, MENTION);
    h.forum.push_notification(3, 3, TRANSFER);
    let report = h.poller().tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);

    h.poller().tick().await.unwrap();
    assert_eq!(h.channel.delivered().len(), 1);
}

#[tokio::test]
async fn test_content_payload_overrides_markup() {
    let h = Harness::new();
    h.forum.push_notification(1, 1, LIKE);
    h.poller().tick().await.unwrap();

    h.forum.push_notification(2, 2, MENTION);
    h.forum.set_content(
        2,
        json!({
            "sender": {"name": "RealSeller", "id": "4243"},
            "post": {"comment_id": 31337, "permalink": "https://prod-api.lolz.live/posts/31337/", "text": "Полный текст"}
        }),
    );
    h.poller().tick().await.unwrap();

    let sent = &h.channel.delivered()[0];
    assert!(sent.text.contains("RealSeller"));
    assert!(sent.text.contains("«Полный текст»"));
    assert_eq!(sent.actions[0].label, "К сообщению");
    assert_eq!(sent.actions[0].url, "https://lolz.live/posts/31337/");
    assert_eq!(sent.actions[1].label, "К теме");
}
