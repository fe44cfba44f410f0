//! Shared types for the bot.
//!
//! These types form the data model used across all modules: raw forum
//! records, classified events, link actions, bump schedule entries and
//! the notification settings. The error taxonomy lives at the bottom.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Raw notifications
// ---------------------------------------------------------------------------

/// A notification record as returned by `GET /notifications`.
///
/// Only the fields the pipeline needs are deserialized. Ids arrive as
/// numbers on the current API but older payloads used strings, so both
/// are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNotification {
    #[serde(rename = "notification_id", default, deserialize_with = "de_opt_id")]
    pub id: Option<u64>,
    /// Unix seconds.
    #[serde(rename = "notification_create_date", default)]
    pub created_at: i64,
    #[serde(rename = "notification_html", default)]
    pub html_markup: String,
}

impl RawNotification {
    /// Stable identity used as the poller watermark.
    ///
    /// `id:<n>` when the backend supplied an id, otherwise a content hash
    /// over the creation date and markup.
    pub fn watermark_key(&self) -> String {
        match self.id {
            Some(id) => format!("id:{id}"),
            None => {
                let mut hasher = Sha256::new();
                hasher.update(format!("{}-{}", self.created_at, self.html_markup).as_bytes());
                format!("h:{}", hex::encode(hasher.finalize()))
            }
        }
    }
}

/// Parse an id that may be encoded as a JSON number or a numeric string.
pub fn value_as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_id).filter(|id| *id > 0))
}

// ---------------------------------------------------------------------------
// Classified events
// ---------------------------------------------------------------------------

/// Closed set of notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Comment,
    Mention,
    Like,
    PaymentIn,
    TransferIn,
    TransferInHold,
    HoldReleased,
    ProfilePost,
    ProfileComment,
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Comment,
        EventKind::Mention,
        EventKind::Like,
        EventKind::PaymentIn,
        EventKind::TransferIn,
        EventKind::TransferInHold,
        EventKind::HoldReleased,
        EventKind::ProfilePost,
        EventKind::ProfileComment,
        EventKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Comment => "comment",
            EventKind::Mention => "mention",
            EventKind::Like => "like",
            EventKind::PaymentIn => "payment_in",
            EventKind::TransferIn => "transfer_in",
            EventKind::TransferInHold => "transfer_in_hold",
            EventKind::HoldReleased => "hold_released",
            EventKind::ProfilePost => "profile_post",
            EventKind::ProfileComment => "profile_comment",
            EventKind::Other => "other",
        }
    }

    /// Verb phrase shown after the actor name.
    ///
    /// `Other` has no fixed phrase: the extractor uses the cleaned markup.
    pub fn default_action(&self) -> &'static str {
        match self {
            EventKind::HoldReleased => "холд закончился",
            EventKind::Like => "поставил(а) ❤️ либо 👍 вашему сообщению",
            EventKind::Mention => "упомянул(а) вас",
            EventKind::Comment => "прокомментировал(а) ваше сообщение",
            EventKind::ProfileComment => "прокомментировал(а) запись в вашем профиле",
            EventKind::ProfilePost => "написал(а) сообщение в вашем профиле",
            EventKind::PaymentIn => "зачисление на баланс",
            EventKind::TransferIn | EventKind::TransferInHold => "перевёл(а) вам",
            EventKind::Other => "",
        }
    }

    /// Money-related kinds get amount extraction.
    pub fn is_financial(&self) -> bool {
        matches!(
            self,
            EventKind::PaymentIn
                | EventKind::TransferIn
                | EventKind::TransferInHold
                | EventKind::HoldReleased
        )
    }

    /// Kinds that live on a profile wall rather than in a thread.
    pub fn is_profile_wall(&self) -> bool {
        matches!(self, EventKind::ProfilePost | EventKind::ProfileComment)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown event kind: {s}"))
    }
}

/// Placeholder name used when no actor could be resolved.
pub const UNKNOWN_ACTOR: &str = "Пользователь";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    /// Empty when unresolved.
    pub profile_url: String,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            name: UNKNOWN_ACTOR.to_string(),
            profile_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: Option<u64>,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostRef {
    pub id: Option<u64>,
    pub url: String,
}

/// A raw notification after heuristic extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub actor: Actor,
    pub kind: EventKind,
    pub thread: Option<ThreadRef>,
    pub post: Option<PostRef>,
    /// At most 300 characters, never equal to the thread title.
    pub snippet: String,
    pub action_text: String,
}

impl ClassifiedEvent {
    /// True when classification fell back to `Other`.
    pub fn is_degraded(&self) -> bool {
        self.kind == EventKind::Other
    }

    pub fn thread_title(&self) -> &str {
        self.thread.as_ref().map(|t| t.title.as_str()).unwrap_or("")
    }

    pub fn thread_url(&self) -> &str {
        self.thread.as_ref().map(|t| t.url.as_str()).unwrap_or("")
    }

    pub fn post_url(&self) -> &str {
        self.post.as_ref().map(|p| p.url.as_str()).unwrap_or("")
    }
}

/// A link button attached to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAction {
    pub label: String,
    pub url: String,
}

impl LinkAction {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bump schedule
// ---------------------------------------------------------------------------

/// One auto-bumped thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BumpScheduleEntry {
    pub thread_id: u64,
    pub interval_minutes: u32,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl BumpScheduleEntry {
    pub fn new(thread_id: u64, interval_minutes: u32) -> Self {
        Self {
            thread_id,
            interval_minutes,
            last_run_at: None,
            next_run_at: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes))
    }

    /// When the entry should next fire.
    ///
    /// An unset `next_run_at` is derived from the last run, or is `now`
    /// for an entry that has never run.
    pub fn due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match (self.next_run_at, self.last_run_at) {
            (Some(next), _) => next,
            (None, Some(last)) => last + self.interval(),
            (None, None) => now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at(now)
    }
}

/// Outcome of a single bump attempt, used in summaries and API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BumpOutcome {
    pub thread_id: u64,
    /// `None` on success, HTTP status (0 for transport) on failure.
    pub error_status: Option<u16>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl BumpOutcome {
    pub fn is_ok(&self) -> bool {
        self.error_status.is_none()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// User-facing notification toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Master switch: when off the poller skips fetch and dispatch.
    #[serde(default = "default_true")]
    pub push_cards_enabled: bool,
    #[serde(default = "default_true")]
    pub notify_comments: bool,
    #[serde(default = "default_true")]
    pub notify_mentions: bool,
    #[serde(default = "default_true")]
    pub notify_likes: bool,
    #[serde(default = "default_true")]
    pub notify_payment_in: bool,
    #[serde(default = "default_true")]
    pub notify_hold_released: bool,
    #[serde(default = "default_true")]
    pub notify_profile_post: bool,
    #[serde(default = "default_true")]
    pub notify_profile_comment: bool,
    #[serde(default = "default_true")]
    pub notify_other: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            push_cards_enabled: true,
            notify_comments: true,
            notify_mentions: true,
            notify_likes: true,
            notify_payment_in: true,
            notify_hold_released: true,
            notify_profile_post: true,
            notify_profile_comment: true,
            notify_other: true,
        }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 9] = [
        "push_cards_enabled",
        "notify_comments",
        "notify_mentions",
        "notify_likes",
        "notify_payment_in",
        "notify_hold_released",
        "notify_profile_post",
        "notify_profile_comment",
        "notify_other",
    ];

    /// Kinds currently allowed through the poller filter.
    pub fn enabled_kinds(&self) -> BTreeSet<EventKind> {
        let mut kinds = BTreeSet::new();
        let mut allow = |flag: bool, list: &[EventKind]| {
            if flag {
                kinds.extend(list.iter().copied());
            }
        };
        allow(self.notify_comments, &[EventKind::Comment]);
        allow(self.notify_mentions, &[EventKind::Mention]);
        allow(self.notify_likes, &[EventKind::Like]);
        allow(
            self.notify_payment_in,
            &[EventKind::PaymentIn, EventKind::TransferIn, EventKind::TransferInHold],
        );
        allow(self.notify_hold_released, &[EventKind::HoldReleased]);
        allow(self.notify_profile_post, &[EventKind::ProfilePost]);
        allow(self.notify_profile_comment, &[EventKind::ProfileComment]);
        allow(self.notify_other, &[EventKind::Other]);
        kinds
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let flag = match key {
            "push_cards_enabled" => self.push_cards_enabled,
            "notify_comments" => self.notify_comments,
            "notify_mentions" => self.notify_mentions,
            "notify_likes" => self.notify_likes,
            "notify_payment_in" => self.notify_payment_in,
            "notify_hold_released" => self.notify_hold_released,
            "notify_profile_post" => self.notify_profile_post,
            "notify_profile_comment" => self.notify_profile_comment,
            "notify_other" => self.notify_other,
            _ => return None,
        };
        Some(flag)
    }

    /// Set a flag by key. Returns `false` for an unknown key.
    pub fn set(&mut self, key: &str, value: bool) -> bool {
        let slot = match key {
            "push_cards_enabled" => &mut self.push_cards_enabled,
            "notify_comments" => &mut self.notify_comments,
            "notify_mentions" => &mut self.notify_mentions,
            "notify_likes" => &mut self.notify_likes,
            "notify_payment_in" => &mut self.notify_payment_in,
            "notify_hold_released" => &mut self.notify_hold_released,
            "notify_profile_post" => &mut self.notify_profile_post,
            "notify_profile_comment" => &mut self.notify_profile_comment,
            "notify_other" => &mut self.notify_other,
            _ => return false,
        };
        *slot = value;
        true
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of a forum API call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// No response at all (DNS, connect, timeout, bad header).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Non-2xx response.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: Value },
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        ApiError::Transport {
            message: message.into(),
        }
    }

    pub fn status(status: u16, body: Value) -> Self {
        ApiError::Status { status, body }
    }

    /// HTTP status, 0 for transport failures.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Transport { .. } => 0,
            ApiError::Status { status, .. } => *status,
        }
    }

    /// Throttling or anti-flood rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status_code(), 403 | 429)
    }

    /// First human-readable message found in the error payload.
    pub fn human_message(&self) -> Option<String> {
        let body = match self {
            ApiError::Transport { message } => return Some(message.clone()),
            ApiError::Status { body, .. } => body,
        };
        if let Some(s) = body.as_str() {
            return Some(s.to_string());
        }
        ["errors", "error", "message"].iter().find_map(|key| match body.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => items.first().map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            _ => None,
        })
    }
}

/// Failure to deliver a message to the user.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    Http(reqwest::Error),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Request URLs can embed a bot token, so they never reach the message.
impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Http(err.without_url())
    }
}

/// Domain-specific errors for the bot.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid thread reference: {0}")]
    InvalidThread(String),

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
