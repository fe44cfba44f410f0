//! Notification markup extraction.
//!
//! Turns a notification's HTML (plus the optional enriched content
//! payload) into a `ClassifiedEvent`. Extraction never fails: when nothing
//! recognisable is found the event degrades to `EventKind::Other` with the
//! cleaned markup as its action text, so every notification still shows up.
//!
//! Resolution order:
//! 1. actor/thread/post fields from the structured content, verbatim
//! 2. actor = member link closest before the action verb
//! 3. thread link, then post link, then the `threads/N/#post-M` form
//! 4. kind via the ordered rule table in [`rules`]
//! 5. snippet from snippet/message/blockquote containers or «quotes»
//! 6. amounts and hold deadlines for money events

pub mod rules;
pub mod text;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::types::{
    value_as_id, Actor, ClassifiedEvent, EventKind, PostRef, ThreadRef, UNKNOWN_ACTOR,
};
use text::{anchors, clean_text, truncate_chars, Anchor};

/// Snippets are cut to this many characters.
pub const SNIPPET_MAX_CHARS: usize = 300;

static MEMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/members/\d+").expect("member regex"));
static THREAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/threads/(\d+)").expect("thread regex"));
static POST_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/posts/(?:comments/)?|/profile-posts/(?:comments/)?)(\d+)/?$|#post-(\d+)$")
        .expect("post link regex")
});
static THREAD_POST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/threads/(\d+)/?#post-(\d+)").expect("thread post regex"));
static SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]+class="[^"]*\bcontentRow-snippet\b[^"]*"[^>]*>(.*?)</div>"#)
        .expect("snippet regex")
});
static MESSAGE_DIV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<div[^>]+class="[^"]*(?:message-body|message-content|message-cell|bbWrapper|bbCodeBlock-content)[^"]*"[^>]*>(.*?)</div>"#,
    )
    .expect("message div regex")
});
static MESSAGE_ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<article[^>]+class="[^"]*(?:message-body|message-content|message-cell|bbWrapper|bbCodeBlock-content)[^"]*"[^>]*>(.*?)</article>"#,
    )
    .expect("message article regex")
});
static BLOCKQUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<blockquote[^>]*>(.*?)</blockquote>").expect("blockquote regex")
});
static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"«([^»]+)»").expect("quote regex"));
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d\s.,]*)\s*₽").expect("amount regex"));
static HOLD_DEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(холд\s+(?:закончится|до)\s+[^\n]+)").expect("hold deadline regex")
});

// ---------------------------------------------------------------------------
// Structured content
// ---------------------------------------------------------------------------

/// Fields read from `GET /notifications/{id}/content`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredContent {
    pub actor_name: Option<String>,
    pub actor_id: Option<u64>,
    pub thread_title: Option<String>,
    pub thread_id: Option<u64>,
    pub post_id: Option<u64>,
    pub post_permalink: Option<String>,
    /// Raw post body markup.
    pub post_body: Option<String>,
}

impl StructuredContent {
    /// Read the loosely-shaped content payload. Unknown shapes yield an
    /// empty value rather than an error.
    pub fn from_value(value: &Value) -> Self {
        let mut out = Self::default();

        let obj = |keys: &[&str]| -> Option<&Value> {
            keys.iter().find_map(|k| value.get(k).filter(|v| v.is_object()))
        };
        let string = |v: &Value, keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|k| {
                v.get(k)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            })
        };
        let id = |v: &Value, keys: &[&str]| -> Option<u64> {
            keys.iter()
                .find_map(|k| v.get(k).and_then(value_as_id))
                .filter(|id| *id > 0)
        };

        if let Some(actor) = obj(&["actor", "user", "from_user", "author", "sender"]) {
            out.actor_name = string(actor, &["username", "name"]);
            out.actor_id = id(actor, &["user_id", "id"]);
        }
        if let Some(thread) = obj(&["thread"]) {
            out.thread_title = string(thread, &["title"]);
            out.thread_id = id(thread, &["thread_id", "id"]);
        }
        if let Some(post) = obj(&["post", "comment"]) {
            out.post_id = id(post, &["post_id", "comment_id", "id"]);
            out.post_permalink = string(post, &["permalink"]);
            out.post_body = string(post, &["body", "message", "text"]);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Stateless markup → event extractor.
#[derive(Debug, Clone)]
pub struct MarkupExtractor {
    site_base: String,
    site_host: String,
    api_host: String,
}

impl Default for MarkupExtractor {
    fn default() -> Self {
        Self::new("https://lolz.live", "https://prod-api.lolz.live")
    }
}

/// Mutable working state while extracting a single notification.
#[derive(Debug, Default)]
struct Draft {
    actor_name: String,
    actor_url: String,
    thread_id: Option<u64>,
    thread_title: String,
    thread_url: String,
    post_id: Option<u64>,
    post_url: String,
    snippet: String,
}

impl MarkupExtractor {
    /// `site_base` is the public site; links pointing at the host of
    /// `api_base` are rewritten to it.
    pub fn new(site_base: &str, api_base: &str) -> Self {
        let site_base = site_base.trim_end_matches('/').to_string();
        Self {
            site_host: host_of(&site_base),
            api_host: host_of(api_base),
            site_base,
        }
    }

    pub fn extract(&self, markup: &str, content: Option<&StructuredContent>) -> ClassifiedEvent {
        let mut d = Draft::default();
        if let Some(c) = content {
            self.apply_content(&mut d, c);
        }

        let norm = markup.replace(['\u{2009}', '\u{a0}'], " ");
        let cleaned = self.clean(&norm);
        let lowered = cleaned.to_lowercase();
        let links: Vec<Anchor> = anchors(&norm)
            .into_iter()
            .map(|a| Anchor {
                href: self.normalize_url(&a.href),
                ..a
            })
            .collect();

        if d.actor_url.is_empty() || d.actor_name.is_empty() {
            self.resolve_actor(&mut d, &norm, &lowered, &links);
        }
        self.resolve_thread_and_post(&mut d, &norm, &links);

        let (kind, mut action_text) = match rules::classify(&lowered) {
            Some(kind) => (kind, kind.default_action().to_string()),
            None => (EventKind::Other, cleaned.clone()),
        };

        if d.snippet.is_empty() {
            d.snippet = self.find_snippet(&norm, &cleaned, &d.thread_title);
        }

        if kind.is_financial() {
            let plain = self.clean(markup);
            if let Some(amount) = extract_amount(&plain) {
                match kind {
                    EventKind::TransferIn | EventKind::TransferInHold => {
                        if !action_text.contains(&amount) {
                            action_text = format!("{} +{amount} ₽", kind.default_action());
                            if kind == EventKind::TransferInHold {
                                action_text.push_str(" (холд)");
                            }
                        }
                    }
                    EventKind::HoldReleased if d.snippet.is_empty() => {
                        d.snippet = format!("Сумма: {amount} ₽");
                    }
                    EventKind::PaymentIn if d.snippet.is_empty() => {
                        d.snippet = format!("Сумма: +{amount} ₽");
                    }
                    _ => {}
                }
            }
            if kind == EventKind::TransferInHold {
                if let Some(deadline) = grab_hold_deadline(&plain) {
                    d.snippet = deadline;
                }
            }
        }

        if !d.snippet.is_empty() && d.snippet.trim() == d.thread_title.trim() {
            d.snippet.clear();
        }

        d.into_event(kind, action_text)
    }

    fn apply_content(&self, d: &mut Draft, c: &StructuredContent) {
        if let Some(name) = &c.actor_name {
            d.actor_name = name.clone();
        }
        if let Some(uid) = c.actor_id {
            d.actor_url = format!("{}/members/{uid}", self.site_base);
        }
        if let Some(title) = &c.thread_title {
            d.thread_title = title.clone();
        }
        if let Some(tid) = c.thread_id {
            d.thread_id = Some(tid);
            d.thread_url = format!("{}/threads/{tid}/", self.site_base);
        }
        if let Some(pid) = c.post_id {
            d.post_id = Some(pid);
            d.post_url = match &c.post_permalink {
                Some(link) => self.normalize_url(link),
                None => format!("{}/posts/{pid}/", self.site_base),
            };
        }
        if let Some(body) = &c.post_body {
            d.snippet = truncate_chars(&self.clean(body), SNIPPET_MAX_CHARS);
        }
    }

    fn resolve_actor(&self, d: &mut Draft, norm: &str, lowered: &str, links: &[Anchor]) {
        let members: Vec<&Anchor> = links.iter().filter(|a| MEMBER_RE.is_match(&a.href)).collect();

        let chosen = rules::first_verb_position(lowered)
            .and_then(|verb_pos| {
                members
                    .iter()
                    .filter(|a| self.text_position(norm, a.start) < verb_pos)
                    .last()
            })
            .or_else(|| members.first());

        if let Some(a) = chosen {
            d.actor_url = a.href.clone();
            let name = self.clean(&a.inner);
            if !name.is_empty() {
                d.actor_name = name;
            }
        }

        if d.actor_url.is_empty() || d.actor_name.is_empty() {
            if let Some(first) = links.first() {
                d.actor_url = first.href.clone();
                let name = self.clean(&first.inner);
                if !name.is_empty() {
                    d.actor_name = name;
                }
            }
        }
    }

    /// Char offset in the cleaned, lower-cased text at which markup byte
    /// offset `byte_start` lands.
    fn text_position(&self, norm: &str, byte_start: usize) -> usize {
        self.clean(&norm[..byte_start]).to_lowercase().chars().count()
    }

    fn resolve_thread_and_post(&self, d: &mut Draft, norm: &str, links: &[Anchor]) {
        if d.thread_url.is_empty() {
            if let Some((a, caps)) = links
                .iter()
                .find_map(|a| THREAD_RE.captures(&a.href).map(|c| (a, c)))
            {
                d.thread_url = a.href.clone();
                if d.thread_title.is_empty() {
                    d.thread_title = self.clean(&a.inner);
                }
                d.thread_id = d.thread_id.or_else(|| caps[1].parse().ok());
            }
        }

        if d.post_url.is_empty() {
            if let Some((a, caps)) = links
                .iter()
                .find_map(|a| POST_LINK_RE.captures(&a.href).map(|c| (a, c)))
            {
                d.post_url = a.href.clone();
                d.post_id = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .and_then(|m| m.as_str().parse().ok());
            }
        }

        if d.post_url.is_empty() {
            if let Some(caps) = THREAD_POST_RE.captures(norm) {
                let tid: Option<u64> = caps[1].parse().ok();
                let pid: Option<u64> = caps[2].parse().ok();
                d.thread_id = d.thread_id.or(tid);
                if d.thread_url.is_empty() {
                    if let Some(tid) = d.thread_id {
                        d.thread_url = format!("{}/threads/{tid}/", self.site_base);
                    }
                }
                if let Some(pid) = pid {
                    d.post_id = Some(pid);
                    d.post_url = format!("{}/posts/{pid}/", self.site_base);
                }
            }
        }
    }

    fn find_snippet(&self, norm: &str, cleaned: &str, thread_title: &str) -> String {
        let containers = [&*SNIPPET_RE, &*MESSAGE_DIV_RE, &*MESSAGE_ARTICLE_RE, &*BLOCKQUOTE_RE];
        for re in containers {
            if let Some(caps) = re.captures(norm) {
                let snippet = truncate_chars(&self.clean(&caps[1]), SNIPPET_MAX_CHARS);
                if !snippet.is_empty() {
                    return snippet;
                }
            }
        }

        let title = thread_title.trim();
        QUOTE_RE
            .captures_iter(cleaned)
            .map(|c| c[1].trim().to_string())
            .filter(|q| !q.is_empty() && q != title && q.chars().count() <= SNIPPET_MAX_CHARS)
            .fold(String::new(), |best, q| {
                if q.chars().count() > best.chars().count() {
                    q
                } else {
                    best
                }
            })
    }

    /// `clean_text` plus API-host → site-host rewriting.
    fn clean(&self, markup: &str) -> String {
        let s = clean_text(markup);
        if self.api_host.is_empty() {
            s
        } else {
            s.replace(&self.api_host, &self.site_host)
        }
    }

    fn normalize_url(&self, url: &str) -> String {
        let url = url.trim();
        if url.starts_with('/') && !url.starts_with("//") {
            return format!("{}{url}", self.site_base);
        }
        if self.api_host.is_empty() {
            url.to_string()
        } else {
            url.replace(&self.api_host, &self.site_host)
        }
    }
}

impl Draft {
    fn into_event(self, kind: EventKind, action_text: String) -> ClassifiedEvent {
        let thread = (self.thread_id.is_some()
            || !self.thread_title.is_empty()
            || !self.thread_url.is_empty())
        .then(|| ThreadRef {
            id: self.thread_id,
            title: self.thread_title,
            url: self.thread_url,
        });
        let post = (self.post_id.is_some() || !self.post_url.is_empty()).then(|| PostRef {
            id: self.post_id,
            url: self.post_url,
        });
        let name = if self.actor_name.is_empty() {
            UNKNOWN_ACTOR.to_string()
        } else {
            self.actor_name
        };

        ClassifiedEvent {
            actor: Actor {
                name,
                profile_url: self.actor_url,
            },
            kind,
            thread,
            post,
            snippet: self.snippet,
            action_text,
        }
    }
}

fn host_of(base: &str) -> String {
    let no_scheme = base.split_once("://").map_or(base, |(_, rest)| rest);
    no_scheme.split('/').next().unwrap_or("").to_string()
}

/// Amount before a ruble sign with thousands separators removed,
/// e.g. `"1 234,56 ₽"` → `"1234,56"`.
pub fn extract_amount(text: &str) -> Option<String> {
    let normalized = text.replace('\u{a0}', " ");
    let caps = AMOUNT_RE.captures(&normalized)?;
    let amount: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    let amount = amount.trim_end_matches(['.', ',']).to_string();
    (!amount.is_empty()).then_some(amount)
}

/// The "Холд закончится ..." / "Холд до ..." line, if present.
pub fn grab_hold_deadline(text: &str) -> Option<String> {
    HOLD_DEADLINE_RE
        .captures(text)
        .map(|c| truncate_chars(c[1].trim(), SNIPPET_MAX_CHARS))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
