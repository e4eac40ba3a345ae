//! Email address scanning.
//!
//! Addresses are matched with a deliberately small RFC-5322 subset
//! (`local@domain.tld`), normalized, and deduplicated in first-seen order.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use onleads_shared::normalize_email;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[a-z0-9._%+\-]+@(?:[a-z0-9](?:[a-z0-9\-]{0,61}[a-z0-9])?\.)+[a-z]{2,24}",
    )
    .expect("valid regex")
});

/// File extensions that show up as a "TLD" in asset names like `logo@2x.png`.
const ASSET_SUFFIXES: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp", "css", "js",
];

/// All distinct addresses in `text`, normalized, in order of first appearance.
pub fn scan_text(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for m in EMAIL_RE.find_iter(text) {
        push_candidate(m.as_str(), &mut seen, &mut found);
    }
    found
}

/// Addresses from `mailto:` links, normalized, in document order.
pub fn scan_mailto_links(doc: &Html) -> Vec<String> {
    let sel = Selector::parse("a[href]").expect("valid selector");
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.len() < 7 || !href[..7].eq_ignore_ascii_case("mailto:") {
            continue;
        }

        let targets = href[7..].split('?').next().unwrap_or_default();
        let decoded = urlencoding::decode(targets)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| targets.to_string());

        for target in decoded.split(',') {
            if let Some(m) = EMAIL_RE.find(target.trim()) {
                push_candidate(m.as_str(), &mut seen, &mut found);
            }
        }
    }

    found
}

/// Merge address lists, keeping first-seen order and dropping repeats.
pub fn merge(primary: Vec<String>, secondary: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(secondary)
        .filter(|addr| seen.insert(addr.clone()))
        .collect()
}

fn push_candidate(raw: &str, seen: &mut HashSet<String>, found: &mut Vec<String>) {
    let Some(address) = clean_candidate(raw) else {
        return;
    };
    if seen.insert(address.clone()) {
        found.push(address);
    }
}

/// Normalize a regex match and drop things that only look like addresses.
fn clean_candidate(raw: &str) -> Option<String> {
    let address = normalize_email(raw.trim_matches('.'));
    let (local, domain) = address.split_once('@')?;

    if local.is_empty() || local.starts_with('.') || local.contains("..") {
        return None;
    }

    let tld = domain.rsplit('.').next()?;
    if ASSET_SUFFIXES.contains(&tld) {
        return None;
    }

    Some(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_address_yields_one_candidate() {
        let found = scan_text("Contact: jane@example.com and jane@example.com");
        assert_eq!(found, vec!["jane@example.com"]);
    }

    #[test]
    fn normalizes_case_and_keeps_order() {
        let found = scan_text("Sales: Bob@Acme.IO, support: help@acme.io, again bob@acme.io.");
        assert_eq!(found, vec!["bob@acme.io", "help@acme.io"]);
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_the_address() {
        let found = scan_text("Write to john_doe@mail.example.org.");
        assert_eq!(found, vec!["john_doe@mail.example.org"]);
    }

    #[test]
    fn asset_names_are_ignored() {
        let found = scan_text("<img src=\"logo@2x.png\"> hero@3x.webp real@acme.com");
        assert_eq!(found, vec!["real@acme.com"]);
    }

    #[test]
    fn no_addresses_is_empty() {
        assert!(scan_text("Nothing to see here @ all").is_empty());
    }

    #[test]
    fn mailto_links_are_decoded() {
        let doc = Html::parse_document(
            r#"<a href="MAILTO:Jane%40Example.com?subject=Hi">Mail</a>
               <a href="mailto:a@acme.io,b@acme.io">Both</a>
               <a href="/contact">Contact</a>"#,
        );
        let found = scan_mailto_links(&doc);
        assert_eq!(found, vec!["jane@example.com", "a@acme.io", "b@acme.io"]);
    }

    #[test]
    fn merge_keeps_first_seen_order() {
        let merged = merge(
            vec!["a@x.io".into(), "b@x.io".into()],
            vec!["b@x.io".into(), "c@x.io".into()],
        );
        assert_eq!(merged, vec!["a@x.io", "b@x.io", "c@x.io"]);
    }
}
