//! Event rendering.
//!
//! Formats a `ClassifiedEvent` into Telegram-HTML text plus up to two link
//! buttons. Output depends only on the event, the timestamp and the
//! configured display offset. Free-text parts are capped so a message stays
//! under Telegram's 4096-character limit.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::extract::text::truncate_chars;
use crate::extract::SNIPPET_MAX_CHARS;
use crate::types::{ClassifiedEvent, EventKind, LinkAction, UNKNOWN_ACTOR};

/// Telegram's limit on message text after entity parsing.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Cap on the action line; degraded events carry the whole cleaned markup here.
pub const MAX_ACTION_CHARS: usize = 1000;

/// Cap on actor names and thread titles.
const MAX_LABEL_CHARS: usize = 200;

/// Text and buttons ready for a delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
    /// At most two entries, post link first.
    pub actions: Vec<LinkAction>,
}

pub struct EventRenderer {
    utc_offset: FixedOffset,
}

impl EventRenderer {
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self { utc_offset }
    }

    /// Renderer for a whole-hour offset from UTC. Out-of-range values fall
    /// back to UTC.
    pub fn with_offset_hours(hours: i32) -> Self {
        let offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self::new(offset)
    }

    pub fn render(&self, event: &ClassifiedEvent, timestamp: i64) -> RenderedMessage {
        let mut lines = vec![format!("🕒 {}", self.format_ts(timestamp))];

        let head = format!(
            "{} {} {}",
            icon(event.kind),
            actor_link(&event.actor.name, &event.actor.profile_url),
            html_escape(&truncate_chars(&event.action_text, MAX_ACTION_CHARS))
        );
        lines.push(head.trim().to_string());

        let title = truncate_chars(event.thread_title(), MAX_LABEL_CHARS);
        if !title.is_empty() {
            let url = event.thread_url();
            if url.is_empty() {
                lines.push(format!("🧵 {}", html_escape(&title)));
            } else {
                lines.push(format!(
                    "🧵 <a href=\"{}\">{}</a>",
                    html_escape(url),
                    html_escape(&title)
                ));
            }
        }

        if !event.snippet.trim().is_empty() {
            let snippet = truncate_chars(&event.snippet, SNIPPET_MAX_CHARS);
            lines.push(format!("«{}»", html_escape(&snippet)));
        }

        RenderedMessage {
            text: lines.join("\n"),
            actions: actions(event),
        }
    }

    fn format_ts(&self, timestamp: i64) -> String {
        DateTime::from_timestamp(timestamp, 0)
            .map(|dt| dt.with_timezone(&self.utc_offset).format("%d.%m %H:%M").to_string())
            .unwrap_or_else(|| timestamp.to_string())
    }
}

/// Fixed marker per kind.
pub fn icon(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Like => "❤️",
        EventKind::Comment => "💬",
        EventKind::Mention => "🏷️",
        EventKind::PaymentIn => "✅",
        EventKind::TransferIn | EventKind::TransferInHold => "💵",
        EventKind::HoldReleased => "🟢",
        EventKind::ProfilePost => "🧱",
        EventKind::ProfileComment => "🧩",
        EventKind::Other => "🔔",
    }
}

fn actions(event: &ClassifiedEvent) -> Vec<LinkAction> {
    let mut out = Vec::with_capacity(2);
    let post_url = event.post_url();
    if !post_url.is_empty() {
        let label = if event.kind.is_profile_wall() {
            "К записи"
        } else {
            "К сообщению"
        };
        out.push(LinkAction::new(label, post_url));
    }
    let thread_url = event.thread_url();
    if !thread_url.is_empty() {
        out.push(LinkAction::new("К теме", thread_url));
    }
    out
}

fn actor_link(name: &str, url: &str) -> String {
    let name = if name.is_empty() {
        UNKNOWN_ACTOR.to_string()
    } else {
        truncate_chars(name, MAX_LABEL_CHARS)
    };
    if url.is_empty() {
        html_escape(&name)
    } else {
        format!("<a href=\"{}\">{}</a>", html_escape(url), html_escape(&name))
    }
}

/// Minimal escaping for Telegram's HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, PostRef, ThreadRef};

    fn renderer() -> EventRenderer {
        EventRenderer::with_offset_hours(3)
    }

    fn mention() -> ClassifiedEvent {
        ClassifiedEvent {
            actor: Actor {
                name: "Bob".into(),
                profile_url: "https://lolz.live/members/1/".into(),
            },
            kind: EventKind::Mention,
            thread: Some(ThreadRef {
                id: Some(2),
                title: "A & B".into(),
                url: "https://lolz.live/threads/2/".into(),
            }),
            post: Some(PostRef {
                id: Some(3),
                url: "https://lolz.live/posts/3/".into(),
            }),
            snippet: "<hi>".into(),
            action_text: "упомянул(а) вас".into(),
        }
    }

    #[test]
    fn test_render_line_order() {
        // 2024-01-01 00:00:00 UTC
        let msg = renderer().render(&mention(), 1_704_067_200);
        let lines: Vec<&str> = msg.text.lines().collect();
        assert_eq!(lines[0], "🕒 01.01 03:00");
        assert_eq!(
            lines[1],
            "🏷️ <a href=\"https://lolz.live/members/1/\">Bob</a> упомянул(а) вас"
        );
        assert_eq!(lines[2], "🧵 <a href=\"https://lolz.live/threads/2/\">A &amp; B</a>");
        assert_eq!(lines[3], "«&lt;hi&gt;»");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_render_is_deterministic() {
        let r = renderer();
        assert_eq!(r.render(&mention(), 42), r.render(&mention(), 42));
    }

    #[test]
    fn test_buttons_post_then_thread() {
        let msg = renderer().render(&mention(), 0);
        assert_eq!(
            msg.actions,
            vec![
                LinkAction::new("К сообщению", "https://lolz.live/posts/3/"),
                LinkAction::new("К теме", "https://lolz.live/threads/2/"),
            ]
        );
    }

    #[test]
    fn test_profile_wall_button_label() {
        let mut ev = mention();
        ev.kind = EventKind::ProfileComment;
        ev.thread = None;
        let msg = renderer().render(&ev, 0);
        assert_eq!(msg.actions, vec![LinkAction::new("К записи", "https://lolz.live/posts/3/")]);
        assert!(msg.text.starts_with("🕒"));
        assert!(msg.text.contains("🧩"));
    }

    #[test]
    fn test_minimal_other_event() {
        let ev = ClassifiedEvent {
            actor: Actor::default(),
            kind: EventKind::Other,
            thread: None,
            post: None,
            snippet: String::new(),
            action_text: "Что-то случилось".into(),
        };
        let msg = renderer().render(&ev, 0);
        assert_eq!(msg.text, "🕒 01.01 03:00\n🔔 Пользователь Что-то случилось");
        assert!(msg.actions.is_empty());
    }

    #[test]
    fn test_oversized_other_event_fits_telegram_limit() {
        let ev = ClassifiedEvent {
            actor: Actor {
                name: "n".repeat(5000),
                ..Actor::default()
            },
            kind: EventKind::Other,
            thread: Some(ThreadRef {
                id: None,
                title: "t".repeat(5000),
                url: String::new(),
            }),
            post: None,
            snippet: "s".repeat(5000),
            action_text: "ж".repeat(20_000),
        };
        let msg = renderer().render(&ev, 0);
        assert!(msg.text.chars().count() <= MAX_MESSAGE_CHARS);
        let head = msg.text.lines().nth(1).unwrap();
        assert!(head.ends_with(&"ж".repeat(MAX_ACTION_CHARS)));
        assert!(!head.contains(&"ж".repeat(MAX_ACTION_CHARS + 1)));
    }

    #[test]
    fn test_title_without_url_is_plain() {
        let mut ev = mention();
        ev.thread = Some(ThreadRef {
            id: None,
            title: "Только имя".into(),
            url: String::new(),
        });
        let msg = renderer().render(&ev, 0);
        assert!(msg.text.contains("\n🧵 Только имя"));
        assert_eq!(msg.actions.len(), 1);
    }

    #[test]
    fn test_every_kind_has_icon() {
        for kind in EventKind::ALL {
            assert!(!icon(kind).is_empty());
        }
        assert_eq!(icon(EventKind::Other), "🔔");
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let msg = EventRenderer::with_offset_hours(99).render(&mention(), 0);
        assert!(msg.text.starts_with("🕒 01.01 00:00"));
    }
}
