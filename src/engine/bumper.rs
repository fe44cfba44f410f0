//! Auto-bump scheduler.
//!
//! Every tick re-reads the registry inside its critical section and bumps
//! the threads that are due:
//! - success: `last = now`, `next = now + interval + jitter`
//! - 403/429: `next = now + min(interval, cap)`
//! - anything else: `next = now + retry`
//!
//! One summary message is sent per tick that processed at least one entry.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sleep_or_cancel;
use crate::config::BumpsConfig;
use crate::delivery::DeliveryChannel;
use crate::forum::{self, ForumApi};
use crate::storage::BumpRegistry;
use crate::types::{ApiError, BotError, BumpOutcome, BumpScheduleEntry};

static THREAD_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/threads/(\d+)").expect("thread url regex"));

/// Accept a bare numeric id or any URL containing `/threads/<id>`.
pub fn parse_thread_ref(text: &str) -> Result<u64, BotError> {
    let text = text.trim();
    let id = if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        text.parse().ok()
    } else {
        THREAD_URL_RE
            .captures(text)
            .and_then(|c| c[1].parse().ok())
    };
    id.filter(|id| *id > 0)
        .ok_or_else(|| BotError::InvalidThread(text.to_string()))
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Rescheduling rules.
#[derive(Debug, Clone)]
pub struct BumpPolicy {
    pub jitter_secs: (u64, u64),
    pub rate_limit_cap: ChronoDuration,
    pub retry: ChronoDuration,
    pub min_interval_minutes: u32,
    pub default_interval_minutes: u32,
}

impl Default for BumpPolicy {
    fn default() -> Self {
        Self::from_config(&BumpsConfig::default())
    }
}

impl BumpPolicy {
    pub fn from_config(cfg: &BumpsConfig) -> Self {
        let [lo, hi] = cfg.jitter_secs;
        Self {
            jitter_secs: (lo.min(hi), hi.max(lo)),
            rate_limit_cap: secs(cfg.rate_limit_cap_secs),
            retry: secs(cfg.retry_secs),
            min_interval_minutes: cfg.min_interval_minutes,
            default_interval_minutes: cfg.default_interval_minutes,
        }
    }

    /// Default when absent, never below the minimum.
    pub fn clamp_interval(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_interval_minutes)
            .max(self.min_interval_minutes)
    }

    fn interval(&self, entry: &BumpScheduleEntry) -> ChronoDuration {
        ChronoDuration::minutes(i64::from(entry.interval_minutes.max(self.min_interval_minutes)))
    }

    fn jitter(&self) -> ChronoDuration {
        let (lo, hi) = self.jitter_secs;
        secs(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Record a bump result on `entry` and return the outcome.
    pub fn apply(
        &self,
        entry: &mut BumpScheduleEntry,
        now: DateTime<Utc>,
        result: &Result<(), ApiError>,
    ) -> BumpOutcome {
        let next = match result {
            Ok(()) => {
                entry.last_run_at = Some(now);
                now + self.interval(entry) + self.jitter()
            }
            Err(e) if e.is_rate_limited() => now + self.interval(entry).min(self.rate_limit_cap),
            Err(_) => now + self.retry,
        };
        entry.next_run_at = Some(next);
        BumpOutcome {
            thread_id: entry.thread_id,
            error_status: result.as_ref().err().map(ApiError::status_code),
            next_run_at: Some(next),
        }
    }
}

fn secs(s: u64) -> ChronoDuration {
    ChronoDuration::seconds(i64::try_from(s).unwrap_or(i64::MAX / 1000))
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

pub fn tick_summary(outcomes: &[BumpOutcome]) -> String {
    let mut text = String::from("⏫ Автоподнятие:");
    for o in outcomes {
        match o.error_status {
            None => text.push_str(&format!("\n#{}: ok", o.thread_id)),
            Some(status) => text.push_str(&format!("\n#{}: err {status}", o.thread_id)),
        }
    }
    text
}

pub fn bump_all_summary(outcomes: &[BumpOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| match o.error_status {
            None => format!("⏫ #{} — ok", o.thread_id),
            Some(status) => format!("⏫ #{} — err {status}", o.thread_id),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Result of `register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub thread_id: u64,
    pub interval_minutes: u32,
    /// `false` when an existing entry was updated.
    pub created: bool,
    /// Immediate bump attempt, only for new entries.
    pub immediate: Option<BumpOutcome>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub next_run_at: Option<DateTime<Utc>>,
}

pub struct BumpScheduler {
    api: Arc<dyn ForumApi>,
    registry: Arc<BumpRegistry>,
    channel: Arc<dyn DeliveryChannel>,
    chat_id: i64,
    policy: BumpPolicy,
    tick_every: Duration,
    startup_delay: Duration,
}

impl BumpScheduler {
    pub fn new(
        api: Arc<dyn ForumApi>,
        registry: Arc<BumpRegistry>,
        channel: Arc<dyn DeliveryChannel>,
        chat_id: i64,
        cfg: &BumpsConfig,
    ) -> Self {
        Self {
            api,
            registry,
            channel,
            chat_id,
            policy: BumpPolicy::from_config(cfg),
            tick_every: Duration::from_secs(cfg.tick_secs),
            startup_delay: Duration::from_secs(cfg.startup_delay_secs),
        }
    }

    pub fn policy(&self) -> &BumpPolicy {
        &self.policy
    }

    /// Loop until cancelled. Tick errors are logged and the loop carries on.
    pub async fn run(&self, cancel: CancellationToken) {
        if !sleep_or_cancel(&cancel, self.startup_delay).await {
            return;
        }
        info!(tick_secs = self.tick_every.as_secs(), "Bump scheduler started");

        loop {
            match self.tick_at(Utc::now()).await {
                Ok(outcomes) if !outcomes.is_empty() => {
                    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
                    info!(processed = outcomes.len(), failed, "Bump tick complete");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Bump tick failed"),
            }

            if !sleep_or_cancel(&cancel, self.tick_every).await {
                break;
            }
        }
        info!("Bump scheduler stopped");
    }

    /// Bump every entry due at `now`, persist, and report.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Vec<BumpOutcome>> {
        let mut txn = self.registry.begin().await?;
        let mut outcomes = Vec::new();

        for entry in txn.entries.iter_mut() {
            if now < entry.due_at(now) {
                continue;
            }
            let result = forum::bump_thread(self.api.as_ref(), entry.thread_id).await;
            log_result(entry.thread_id, &result);
            outcomes.push(self.policy.apply(entry, now, &result));
        }

        if outcomes.is_empty() {
            return Ok(outcomes);
        }
        txn.commit()?;

        self.notify(&tick_summary(&outcomes)).await;
        Ok(outcomes)
    }

    /// Bump every registered thread regardless of due time.
    pub async fn bump_all_now(&self) -> Result<Vec<BumpOutcome>> {
        self.bump_all_at(Utc::now()).await
    }

    pub async fn bump_all_at(&self, now: DateTime<Utc>) -> Result<Vec<BumpOutcome>> {
        let mut txn = self.registry.begin().await?;
        let mut outcomes = Vec::with_capacity(txn.entries.len());
        for entry in txn.entries.iter_mut() {
            let result = forum::bump_thread(self.api.as_ref(), entry.thread_id).await;
            log_result(entry.thread_id, &result);
            outcomes.push(self.policy.apply(entry, now, &result));
        }
        txn.commit()?;

        if !outcomes.is_empty() {
            self.notify(&bump_all_summary(&outcomes)).await;
        }
        Ok(outcomes)
    }

    pub async fn register(&self, thread_ref: &str, interval: Option<u32>) -> Result<Registration> {
        self.register_at(thread_ref, interval, Utc::now()).await
    }

    /// Add a thread, or update the interval of one already registered.
    ///
    /// A new thread is bumped immediately; if that fails the first
    /// scheduled attempt is one retry delay away.
    pub async fn register_at(
        &self,
        thread_ref: &str,
        interval: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Registration> {
        let thread_id = parse_thread_ref(thread_ref)?;
        let interval_minutes = self.policy.clamp_interval(interval);
        let mut txn = self.registry.begin().await?;

        if let Some(entry) = txn.get_mut(thread_id) {
            entry.interval_minutes = interval_minutes;
            let next = now + entry.interval();
            entry.next_run_at = Some(next);
            txn.commit()?;
            info!(thread_id, interval_minutes, "Bump entry updated");
            return Ok(Registration {
                thread_id,
                interval_minutes,
                created: false,
                immediate: None,
                next_run_at: Some(next),
            });
        }

        let mut entry = BumpScheduleEntry::new(thread_id, interval_minutes);
        let result = forum::bump_thread(self.api.as_ref(), thread_id).await;
        log_result(thread_id, &result);
        let outcome = match &result {
            Ok(()) => self.policy.apply(&mut entry, now, &result),
            Err(e) => {
                let next = now + self.policy.retry;
                entry.next_run_at = Some(next);
                BumpOutcome {
                    thread_id,
                    error_status: Some(e.status_code()),
                    next_run_at: Some(next),
                }
            }
        };
        let next_run_at = entry.next_run_at;
        txn.entries.push(entry);
        txn.commit()?;
        info!(thread_id, interval_minutes, ok = outcome.is_ok(), "Bump entry added");

        Ok(Registration {
            thread_id,
            interval_minutes,
            created: true,
            immediate: Some(outcome),
            next_run_at,
        })
    }

    /// Remove a thread. `false` when it was not registered.
    pub async fn deregister(&self, thread_id: u64) -> Result<bool> {
        let mut txn = self.registry.begin().await?;
        let removed = txn.remove(thread_id);
        if removed {
            txn.commit()?;
            info!(thread_id, "Bump entry removed");
        } else {
            debug!(thread_id, "Bump entry not found");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<BumpScheduleEntry>> {
        self.registry.snapshot().await
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.channel.send(self.chat_id, text, &[]).await {
            warn!(error = %e, "Bump summary delivery failed");
        }
    }
}

fn log_result(thread_id: u64, result: &Result<(), ApiError>) {
    match result {
        Ok(()) => debug!(thread_id, "Thread bumped"),
        Err(e) => warn!(
            thread_id,
            status = e.status_code(),
            message = e.human_message().unwrap_or_default(),
            "Thread bump failed"
        ),
    }
}
