//! Card content normalization.
//!
//! Anki renders card sides as HTML, often with an embedded `<style>` block
//! and audio directives. Clients of this server only want the readable text,
//! so [`normalize`] reduces the markup to trimmed, non-empty lines.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(?:div|p|li|tr|h[1-6])\s*>").unwrap());

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// `[sound:file.mp3]`, `[anki:play:q:0]` and `[media:play:a:1]` playback directives.
static PLAY_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:sound:|(?:anki|media):play:)[^\]]*\]").unwrap());

static ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(nbsp|amp|lt|gt|quot);").unwrap());

/// Reduce card markup to plain text with one meaningful line per line.
///
/// Entities are decoded in a single left-to-right pass, so `&amp;lt;`
/// becomes the literal text `&lt;` and is never decoded a second time.
pub fn normalize(markup: &str) -> String {
    let text = STYLE_BLOCK.replace_all(markup, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, " ");
    let text = PLAY_DIRECTIVE.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| match &caps[1] {
        "nbsp" => " ",
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        _ => "\"",
    });

    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
