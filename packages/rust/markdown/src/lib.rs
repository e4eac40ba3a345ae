//! HTML-to-text conversion for crawled contact pages.
//!
//! Converts a raw HTML page to readable Markdown using the `htmd` crate, then
//! applies cleanup passes. The result is what the extractor scans for
//! addresses and what the drafter may quote as context. Unlike a docs
//! converter, page chrome such as headers and footers is kept: contact
//! details usually live there.

mod cleanup;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use onleads_shared::{OnLeadsError, Result};

/// Tags whose content never carries readable text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "svg", "template"];

/// Readable text of an HTML page.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Cleaned Markdown body.
    pub markdown: String,
    /// `<title>` of the document, if any.
    pub title: Option<String>,
    /// Approximate word count of the body.
    pub word_count: usize,
}

/// Convert an HTML document to cleaned Markdown text.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn page_text(html: &str) -> Result<PageText> {
    let doc = Html::parse_document(html);
    let title = document_title(&doc);

    let body_html = body_html(&doc).unwrap_or_else(|| html.to_string());
    let body_html = preprocess_tables(&body_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();

    let raw_markdown = converter
        .convert(&body_html)
        .map_err(|e| OnLeadsError::parse(format!("htmd conversion failed: {e}")))?;

    let markdown = cleanup::run_pipeline(&raw_markdown);
    let word_count = markdown.split_whitespace().count();

    debug!(word_count, final_len = markdown.len(), "page text ready");

    Ok(PageText {
        markdown,
        title,
        word_count,
    })
}

/// Truncate text to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Trimmed text of `<title>`.
fn document_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").expect("valid selector");
    doc.select(&sel)
        .next()
        .map(|el| collapse_spaces(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn body_html(doc: &Html) -> Option<String> {
    let sel = Selector::parse("body").expect("valid selector");
    doc.select(&sel).next().map(|body| body.inner_html())
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Convert HTML `<table>` elements to markdown table syntax before htmd conversion.
///
/// `htmd` 0.1 doesn't support table conversion, and staff directories are
/// frequently laid out as tables.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").expect("valid selector");

    if doc.select(&table_sel).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table_el in doc.select(&table_sel) {
        let md_table = table_to_markdown(&table_el);
        result = result.replacen(&table_el.html(), &md_table, 1);
    }
    result
}

fn table_to_markdown(table: &ElementRef) -> String {
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("th, td").expect("valid selector");

    let rows: Vec<Vec<String>> = table
        .select(&tr_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| collapse_spaces(&cell.text().collect::<String>()))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    let mut md = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(col_count, String::new());
        md.push_str("| ");
        md.push_str(&cells.join(" | "));
        md.push_str(" |\n");
        if i == 0 {
            md.push_str("| ");
            md.push_str(&vec!["---"; col_count].join(" | "));
            md.push_str(" |\n");
        }
    }
    md.push('\n');
    md
}
