//! Markup cleaning helpers shared by the extractor.

use regex::Regex;
use std::sync::LazyLock;

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href=(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a>"#)
        .expect("anchor regex")
});
static BLOCK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:br|p|li|ul|ol|div)\b[^>]*>").expect("block tag regex"));
static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static TRAILING_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("trailing ws regex"));
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank lines regex"));
static HSPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("hspace regex"));

/// An `<a href=...>` element found in markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Byte offset of the opening tag in the scanned markup.
    pub start: usize,
    pub href: String,
    /// Inner markup, uncleaned.
    pub inner: String,
}

/// All anchors in document order.
pub fn anchors(markup: &str) -> Vec<Anchor> {
    ANCHOR_RE
        .captures_iter(markup)
        .map(|c| Anchor {
            start: c.get(0).map_or(0, |m| m.start()),
            href: c
                .get(1)
                .or_else(|| c.get(2))
                .map_or("", |m| m.as_str())
                .trim()
                .to_string(),
            inner: c.get(3).map_or("", |m| m.as_str()).to_string(),
        })
        .collect()
}

/// Turn a markup fragment into plain display text.
///
/// Block tags become line breaks, other tags are dropped, entities are
/// decoded, blank-line runs collapse to one empty line and horizontal
/// whitespace runs collapse to one space.
pub fn clean_text(markup: &str) -> String {
    let s = BLOCK_TAG_RE.replace_all(markup, "\n");
    let s = ANY_TAG_RE.replace_all(&s, "");
    let s = htmlize::unescape(&*s).replace(['\u{a0}', '\u{2009}', '\u{202f}'], " ");
    let s = s.replace("\r\n", "\n");
    let s = TRAILING_WS_RE.replace_all(&s, "\n");
    let s = BLANK_LINES_RE.replace_all(&s, "\n\n");
    let s = HSPACE_RE.replace_all(&s, " ");
    s.trim().to_string()
}

/// First `max` characters of `s`, trimmed.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim().to_string()
}
