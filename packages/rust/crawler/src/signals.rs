//! Best-effort name and profile signals.
//!
//! None of these are guaranteed to describe a person; they are hints that
//! give the drafter something to work with.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use onleads_markdown::{collapse_spaces, truncate_chars};

/// Longest profile snippet taken from a page.
pub const MAX_PROFILE_CHARS: usize = 300;

/// Minimum words a text snippet needs to count as a profile.
const MIN_PROFILE_WORDS: usize = 3;

/// Display name: `author` meta, then `og:title`, first `<h1>`, then `<title>`.
pub fn page_name(doc: &Html, title: Option<&str>) -> Option<String> {
    meta_content(doc, r#"meta[name="author"]"#)
        .or_else(|| meta_content(doc, r#"meta[property="og:title"]"#))
        .or_else(|| first_text(doc, "h1"))
        .or_else(|| title.map(collapse_spaces).filter(|t| !t.is_empty()))
}

/// `description` meta, then `og:description`.
pub fn page_description(doc: &Html) -> Option<String> {
    meta_content(doc, r#"meta[name="description"]"#)
        .or_else(|| meta_content(doc, r#"meta[property="og:description"]"#))
        .map(|d| truncate_chars(&d, MAX_PROFILE_CHARS).to_string())
}

/// The text line mentioning `address`, with the address itself and
/// markdown syntax removed. `None` if little else is on that line.
pub fn context_near(text: &str, address: &str) -> Option<String> {
    let pattern = Regex::new(&format!("(?i){}", regex::escape(address))).ok()?;

    let line = text.lines().find(|line| pattern.is_match(line))?;
    let without_address = pattern.replace_all(line, " ");
    let cleaned = strip_markdown(&without_address);
    let cleaned = cleaned
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | ',' | '-' | '–' | '(' | ')'))
        .to_string();

    (cleaned.split_whitespace().count() >= MIN_PROFILE_WORDS)
        .then(|| truncate_chars(&cleaned, MAX_PROFILE_CHARS).to_string())
}

/// First prose-looking line of `text` (not a heading, table, or list item).
pub fn first_paragraph(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with(['#', '|', '-', '*', '>']))
        .map(strip_markdown)
        .find(|line| line.split_whitespace().count() >= MIN_PROFILE_WORDS * 2)
        .map(|line| truncate_chars(&line, MAX_PROFILE_CHARS).to_string())
}

/// Reduce markdown to plain words: links keep their label, emphasis and
/// table markers are dropped, whitespace is collapsed.
fn strip_markdown(line: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    let unlinked = LINK_RE.replace_all(line, "$1");
    let plain: String = unlinked
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '|' | '>' | '`'))
        .collect();
    collapse_spaces(&plain)
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_spaces)
        .find(|c| !c.is_empty())
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .map(|el| collapse_spaces(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}
