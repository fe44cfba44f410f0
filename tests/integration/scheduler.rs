//! Auto-bump scheduler against the mock forum and a file-backed registry.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use lztbot::config::BumpsConfig;
use lztbot::engine::bumper::BumpScheduler;
use lztbot::storage::{BumpRegistry, DocumentStore, JsonFileStore, BUMPS_FILE};
use lztbot::types::BumpScheduleEntry;

use crate::mock_forum::{MockForum, RecordingChannel};

const CHAT: i64 = 555;

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000, 0).unwrap()
}

struct Harness {
    forum: Arc<MockForum>,
    channel: Arc<RecordingChannel>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            forum: Arc::new(MockForum::new()),
            channel: Arc::new(RecordingChannel::new()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn store(&self) -> JsonFileStore<Vec<BumpScheduleEntry>> {
        JsonFileStore::new(self.dir.path().join(BUMPS_FILE))
    }

    /// A fresh scheduler over the same registry file, as after a restart.
    fn scheduler(&self) -> BumpScheduler {
        BumpScheduler::new(
            self.forum.clone(),
            Arc::new(BumpRegistry::new(Arc::new(self.store()))),
            self.channel.clone(),
            CHAT,
            &BumpsConfig::default(),
        )
    }
}

fn assert_within(actual: Option<DateTime<Utc>>, lo: DateTime<Utc>, hi: DateTime<Utc>) {
    let actual = actual.expect("next_run_at set");
    assert!(actual >= lo && actual <= hi, "{actual} not in [{lo}, {hi}]");
}

#[tokio::test]
async fn test_register_by_url_bumps_immediately() {
    let h = Harness::new();
    let s = h.scheduler();

    let reg = s
        .register_at("https://lolz.live/threads/9070000/", Some(15), t0())
        .await
        .unwrap();
    assert!(reg.created);
    assert_eq!(reg.thread_id, 9070000);
    assert_eq!(reg.interval_minutes, 15);
    assert!(reg.immediate.as_ref().unwrap().is_ok());
    assert_eq!(h.forum.bump_calls(), vec![9070000]);

    let base = t0() + Duration::minutes(15);
    assert_within(reg.next_run_at, base + Duration::seconds(7), base + Duration::seconds(25));

    let entries = s.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].last_run_at, Some(t0()));
}

#[tokio::test]
async fn test_reregister_updates_interval_without_bump() {
    let h = Harness::new();
    let s = h.scheduler();
    s.register_at("9070000", Some(15), t0()).await.unwrap();

    let later = t0() + Duration::minutes(3);
    let reg = s.register_at("9070000", Some(30), later).await.unwrap();
    assert!(!reg.created);
    assert!(reg.immediate.is_none());
    assert_eq!(reg.next_run_at, Some(later + Duration::minutes(30)));
    assert_eq!(h.forum.bump_calls().len(), 1);

    let entries = s.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].interval_minutes, 30);
}

#[tokio::test]
async fn test_interval_clamped_and_defaulted() {
    let h = Harness::new();
    let s = h.scheduler();
    assert_eq!(s.register_at("1", Some(1), t0()).await.unwrap().interval_minutes, 5);
    assert_eq!(s.register_at("2", None, t0()).await.unwrap().interval_minutes, 10);
}

#[tokio::test]
async fn test_failed_registration_retries_in_a_minute() {
    let h = Harness::new();
    h.forum.fail_bumps(&[429]);
    let s = h.scheduler();

    let reg = s.register_at("42", Some(15), t0()).await.unwrap();
    assert!(reg.created);
    assert_eq!(reg.immediate.as_ref().unwrap().error_status, Some(429));
    assert_eq!(reg.next_run_at, Some(t0() + Duration::seconds(60)));
    assert_eq!(s.list().await.unwrap()[0].last_run_at, None);
}

#[tokio::test]
async fn test_tick_backoff_rules() {
    let h = Harness::new();
    let s = h.scheduler();
    s.register_at("1", Some(15), t0()).await.unwrap();
    s.register_at("2", Some(15), t0()).await.unwrap();
    s.register_at("3", Some(15), t0()).await.unwrap();

    // All three due; thread 1 rate-limited, 2 fails transport, 3 ok.
    h.forum.fail_bumps(&[429, 0]);
    let now = t0() + Duration::minutes(20);
    let outcomes = s.tick_at(now).await.unwrap();
    assert_eq!(outcomes.len(), 3);

    assert_eq!(outcomes[0].error_status, Some(429));
    assert_eq!(outcomes[0].next_run_at, Some(now + Duration::seconds(300)));
    assert_eq!(outcomes[1].error_status, Some(0));
    assert_eq!(outcomes[1].next_run_at, Some(now + Duration::seconds(60)));
    assert!(outcomes[2].is_ok());
    let base = now + Duration::minutes(15);
    assert_within(outcomes[2].next_run_at, base + Duration::seconds(7), base + Duration::seconds(25));

    let summary = h.channel.delivered().last().unwrap().text.clone();
    assert_eq!(summary, "⏫ Автоподнятие:\n#1: err 429\n#2: err 0\n#3: ok");
}

#[tokio::test]
async fn test_forbidden_backs_off_by_interval() {
    let h = Harness::new();
    let s = h.scheduler();
    s.register_at("7", Some(5), t0()).await.unwrap();

    h.forum.fail_bumps(&[403]);
    let now = t0() + Duration::minutes(6);
    let outcomes = s.tick_at(now).await.unwrap();
    assert_eq!(outcomes[0].next_run_at, Some(now + Duration::minutes(5)));
}

#[tokio::test]
async fn test_tick_skips_entries_not_yet_due() {
    let h = Harness::new();
    let s = h.scheduler();
    s.register_at("1", Some(15), t0()).await.unwrap();
    let delivered_before = h.channel.delivered().len();

    let outcomes = s.tick_at(t0() + Duration::minutes(5)).await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(h.forum.bump_calls().len(), 1);
    assert_eq!(h.channel.delivered().len(), delivered_before);
}

#[tokio::test]
async fn test_unscheduled_entry_fires_on_first_tick() {
    let h = Harness::new();
    h.store()
        .save(&vec![BumpScheduleEntry::new(9070000, 15)])
        .unwrap();

    let outcomes = h.scheduler().tick_at(t0()).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(h.forum.bump_calls(), vec![9070000]);
}

#[tokio::test]
async fn test_registry_survives_restart() {
    let h = Harness::new();
    h.scheduler().register_at("100", Some(20), t0()).await.unwrap();
    h.scheduler().register_at("200", Some(30), t0()).await.unwrap();
    assert!(h.scheduler().deregister(100).await.unwrap());
    assert!(!h.scheduler().deregister(100).await.unwrap());

    let entries = h.scheduler().list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].thread_id, 200);
    assert_eq!(entries[0].interval_minutes, 30);
    assert_eq!(entries[0].last_run_at, Some(t0()));
}

#[tokio::test]
async fn test_bump_all_ignores_due_time() {
    let h = Harness::new();
    let s = h.scheduler();
    s.register_at("1", Some(60), t0()).await.unwrap();
    s.register_at("2", Some(60), t0()).await.unwrap();

    h.forum.fail_bumps(&[500]);
    let now = t0() + Duration::minutes(1);
    let outcomes = s.bump_all_at(now).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].next_run_at, Some(now + Duration::seconds(60)));
    assert_eq!(h.forum.bump_calls(), vec![1, 2, 1, 2]);

    let summary = h.channel.delivered().last().unwrap().text.clone();
    assert_eq!(summary, "⏫ #1 — err 500\n⏫ #2 — ok");
    assert_eq!(h.channel.delivered().last().unwrap().chat_id, CHAT);
}

#[tokio::test]
async fn test_invalid_thread_reference_rejected() {
    let h = Harness::new();
    let err = h.scheduler().register_at("привет", None, t0()).await.unwrap_err();
    assert!(err.to_string().contains("привет"));
    assert!(h.forum.bump_calls().is_empty());
}
