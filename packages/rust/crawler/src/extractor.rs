//! URL → contact signals.

use std::sync::Arc;

use scraper::Html;
use tracing::{debug, info, instrument};

use onleads_markdown::truncate_chars;
use onleads_shared::{CrawlSettings, OnLeadsError, Result};

use crate::emails;
use crate::fetch::{FetchedPage, HttpFetcher, PageFetcher, validate_url};
use crate::signals;

/// Contact signals found on one page. An empty `emails` list is a valid
/// outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    /// The requested URL.
    pub url: String,
    /// Distinct normalized addresses, in order of first appearance.
    pub emails: Vec<String>,
    pub name: Option<String>,
    pub profile: Option<String>,
    pub title: Option<String>,
    /// Words of page text that were scanned.
    pub word_count: usize,
}

impl ExtractionResult {
    /// The address that identifies the lead (the first one found).
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

/// Fetches a page and pulls addresses, a name and a profile out of it.
pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    settings: CrawlSettings,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: CrawlSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Build an extractor backed by [`HttpFetcher`].
    pub fn from_settings(settings: CrawlSettings) -> Result<Self> {
        let fetcher = HttpFetcher::new(settings.timeout())?;
        Ok(Self::new(Arc::new(fetcher), settings))
    }

    /// Fetch `url` and extract contact signals.
    ///
    /// Malformed or private URLs fail with `InvalidInput` before any network
    /// access; network problems surface as `Fetch`, undecodable bodies as `Parse`.
    #[instrument(skip(self))]
    pub async fn extract(&self, url: &str) -> Result<ExtractionResult> {
        let parsed = validate_url(url, self.settings.allow_private_hosts)?;
        let page = self.fetcher.fetch(&parsed).await?;
        let body = decode_body(&page)?;

        let result = if looks_like_html(&page, &body) {
            self.extract_html(url, &body)?
        } else {
            self.extract_text(url, &body)
        };

        info!(
            emails = result.emails.len(),
            has_name = result.name.is_some(),
            has_profile = result.profile.is_some(),
            "extraction complete"
        );
        Ok(result)
    }

    fn extract_html(&self, url: &str, body: &str) -> Result<ExtractionResult> {
        let doc = Html::parse_document(body);
        let text = onleads_markdown::page_text(body)?;
        let scanned = truncate_chars(&text.markdown, self.settings.max_content_chars);

        let found = emails::merge(emails::scan_text(scanned), emails::scan_mailto_links(&doc));
        debug!(candidates = found.len(), "scanned page text");

        let profile = found
            .first()
            .and_then(|addr| signals::context_near(scanned, addr))
            .or_else(|| signals::page_description(&doc))
            .or_else(|| signals::first_paragraph(scanned));

        Ok(ExtractionResult {
            url: url.to_string(),
            name: signals::page_name(&doc, text.title.as_deref()),
            profile,
            title: text.title,
            word_count: scanned.split_whitespace().count(),
            emails: found,
        })
    }

    fn extract_text(&self, url: &str, body: &str) -> ExtractionResult {
        let scanned = truncate_chars(body, self.settings.max_content_chars);
        let found = emails::scan_text(scanned);

        let profile = found
            .first()
            .and_then(|addr| signals::context_near(scanned, addr))
            .or_else(|| signals::first_paragraph(scanned));

        ExtractionResult {
            url: url.to_string(),
            name: None,
            profile,
            title: None,
            word_count: scanned.split_whitespace().count(),
            emails: found,
        }
    }
}

/// Content types we are willing to read as text.
fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || mime == "application/xhtml+xml"
        || mime == "application/xml"
        || mime == "application/json"
}

fn decode_body(page: &FetchedPage) -> Result<String> {
    if let Some(ct) = page.content_type.as_deref() {
        if !is_textual(ct) {
            return Err(OnLeadsError::parse(format!(
                "{}: unsupported content type '{ct}'",
                page.url
            )));
        }
    }

    String::from_utf8(page.body.clone())
        .map_err(|_| OnLeadsError::parse(format!("{}: body is not valid UTF-8 text", page.url)))
}

fn looks_like_html(page: &FetchedPage, body: &str) -> bool {
    match page.content_type.as_deref() {
        Some(ct) if ct.to_ascii_lowercase().contains("html") => true,
        Some(ct) if ct.to_ascii_lowercase().starts_with("text/plain") => false,
        _ => body.trim_start().starts_with('<'),
    }
}
