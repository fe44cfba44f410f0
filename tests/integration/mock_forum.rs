//! In-memory forum and delivery channel for integration testing.
//!
//! `MockForum` implements `ForumApi` over a controllable notification feed,
//! per-notification content payloads and a queue of scripted bump results.
//! `RecordingChannel` captures every delivered message.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use lztbot::delivery::DeliveryChannel;
use lztbot::forum::{ApiRequest, ForumApi, Method};
use lztbot::types::{ApiError, DeliveryError, LinkAction};

// ---------------------------------------------------------------------------
// Forum
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockForum {
    feed: Mutex<Vec<Value>>,
    contents: Mutex<HashMap<u64, Value>>,
    /// Status codes for upcoming bumps; empty means success.
    bump_script: Mutex<VecDeque<u16>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockForum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notification to the feed (newest first, like the real API).
    pub fn push_notification(&self, id: u64, created_at: i64, html: &str) {
        self.feed.lock().unwrap().insert(
            0,
            json!({
                "notification_id": id,
                "notification_create_date": created_at,
                "notification_html": html,
            }),
        );
    }

    pub fn set_content(&self, id: u64, content: Value) {
        self.contents.lock().unwrap().insert(id, content);
    }

    /// Make the next bumps fail with these statuses, in order.
    pub fn fail_bumps(&self, statuses: &[u16]) {
        self.bump_script.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn bump_calls(&self) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == Method::Post)
            .filter_map(|r| thread_id_of(&r.path))
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn thread_id_of(path: &str) -> Option<u64> {
    path.strip_prefix("/threads/")?
        .strip_suffix("/bump")?
        .parse()
        .ok()
}

fn content_id_of(path: &str) -> Option<u64> {
    path.strip_prefix("/notifications/")?
        .strip_suffix("/content")?
        .parse()
        .ok()
}

#[async_trait]
impl ForumApi for MockForum {
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(request.clone());

        match request.method {
            Method::Get if request.path == "/notifications" => {
                let limit = request
                    .params
                    .iter()
                    .find(|(k, _)| k == "limit")
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let feed = self.feed.lock().unwrap();
                let page: Vec<Value> = feed.iter().take(limit).cloned().collect();
                Ok(json!({ "notifications": page }))
            }
            Method::Get => match content_id_of(&request.path) {
                Some(id) => self
                    .contents
                    .lock()
                    .unwrap()
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| ApiError::status(404, json!({"errors": ["not found"]}))),
                None => Err(ApiError::status(404, json!({"errors": ["no route"]}))),
            },
            Method::Post => {
                if thread_id_of(&request.path).is_none() {
                    return Err(ApiError::status(404, json!({"errors": ["no route"]})));
                }
                match self.bump_script.lock().unwrap().pop_front() {
                    None => Ok(json!({"status": "ok"})),
                    Some(0) => Err(ApiError::transport("connection reset")),
                    Some(status) => Err(ApiError::status(
                        status,
                        json!({"errors": ["Вы не можете поднимать тему так часто"]}),
                    )),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Delivered {
    pub chat_id: i64,
    pub text: String,
    pub actions: Vec<LinkAction>,
}

#[derive(Default)]
pub struct RecordingChannel {
    delivered: Mutex<Vec<Delivered>>,
    fail_remaining: Mutex<usize>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: usize) {
        *self.fail_remaining.lock().unwrap() = n;
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[LinkAction],
    ) -> Result<(), DeliveryError> {
        {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DeliveryError::Rejected("chat not found".into()));
            }
        }
        self.delivered.lock().unwrap().push(Delivered {
            chat_id,
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
