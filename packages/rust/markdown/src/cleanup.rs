//! Post-conversion cleanup pipeline for page text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = drop_images(&result);
    result = unescape_punctuation(&result);
    result = strip_leftover_html(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Drop images
// ---------------------------------------------------------------------------

/// Remove `![alt](src)` images; they carry no contact text and their file
/// names (`logo@2x.png`) look like addresses.
fn drop_images(md: &str) -> String {
    static IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Undo markdown escaping
// ---------------------------------------------------------------------------

/// `htmd` escapes characters such as `_` that are common in addresses
/// (`john\_doe@acme.io`). The text is read, not rendered, so unescape them.
fn unescape_punctuation(md: &str) -> String {
    static ESCAPE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\\([_*\[\]#.+\-`~|!()])").expect("valid regex"));

    ESCAPE_RE.replace_all(md, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray container tags that survived the conversion, preserving content.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|address)(?:\s[^>]*)?>")
            .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Normalize whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into one.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: Ensure trailing newline
// ---------------------------------------------------------------------------

fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_images_removes_asset_names() {
        let input = "Logo ![acme](/img/logo@2x.png) here";
        assert_eq!(drop_images(input), "Logo  here");
    }

    #[test]
    fn unescape_restores_underscored_addresses() {
        let input = r"Write to john\_doe@acme.io \- thanks";
        assert_eq!(unescape_punctuation(input), "Write to john_doe@acme.io - thanks");
    }

    #[test]
    fn strip_leftover_html_keeps_content() {
        let input = "<div class=\"card\">Jane Doe</div>";
        assert_eq!(strip_leftover_html(input), "Jane Doe");
    }

    #[test]
    fn clean_blank_lines_collapses_excess() {
        let input = "Line 1\n\n\n\n\nLine 2";
        assert_eq!(clean_blank_lines(input), "Line 1\n\nLine 2");
    }

    #[test]
    fn full_pipeline_cleans_text() {
        let input = "\n\n# Team   \n\n\n\n<span>jane\\_doe@example.com</span>\n\n![x](a.png)\n\n\n";
        let result = run_pipeline(input);
        assert_eq!(result, "# Team\n\njane_doe@example.com\n");
    }
}
