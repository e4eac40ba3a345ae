//! Crawl capability: fetch a URL's raw content.
//!
//! Also hosts URL validation, which runs before any network access and
//! refuses targets on loopback or private networks.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use onleads_shared::{OnLeadsError, Result};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("OnLeads/", env!("CARGO_PKG_VERSION"));

/// Raw response of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    /// `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Anything that can turn a URL into page content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`. Network errors, timeouts and non-2xx responses are
    /// reported as [`OnLeadsError::Fetch`].
    async fn fetch(&self, url: &Url) -> Result<FetchedPage>;
}

/// [`PageFetcher`] over plain HTTP(S) with `reqwest`.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| OnLeadsError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        debug!("fetching page");

        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                OnLeadsError::Fetch(format!("{url}: request timed out"))
            } else {
                OnLeadsError::Fetch(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OnLeadsError::Fetch(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| OnLeadsError::Fetch(format!("{url}: body read failed: {e}")))?;

        debug!(status = status.as_u16(), len = body.len(), "page fetched");

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Parse and vet a crawl target. Fails with [`OnLeadsError::InvalidInput`]
/// for malformed URLs, non-HTTP schemes, and (unless `allow_private_hosts`)
/// loopback/private targets.
pub fn validate_url(raw: &str, allow_private_hosts: bool) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OnLeadsError::invalid_input("URL is empty"));
    }

    let url = Url::parse(raw).map_err(|e| OnLeadsError::invalid_input(format!("invalid URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(OnLeadsError::invalid_input(format!(
                "unsupported URL scheme '{other}' (expected http or https)"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(OnLeadsError::invalid_input(format!("URL '{raw}' has no host")));
    }

    if !allow_private_hosts && is_private_target(&url) {
        return Err(OnLeadsError::invalid_input(format!(
            "refusing to crawl private or local address '{raw}'"
        )));
    }

    Ok(url)
}

/// Check if a URL targets a loopback, private, or local-only host.
fn is_private_target(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            let host = host.to_ascii_lowercase();
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_and_non_http() {
        assert!(matches!(
            validate_url("not a url", false),
            Err(OnLeadsError::InvalidInput { .. })
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd", false),
            Err(OnLeadsError::InvalidInput { .. })
        ));
        assert!(matches!(
            validate_url("   ", false),
            Err(OnLeadsError::InvalidInput { .. })
        ));
    }

    #[test]
    fn rejects_private_targets() {
        for raw in [
            "http://127.0.0.1:8080/",
            "http://10.0.0.1/",
            "http://192.168.1.1/admin",
            "http://localhost:3000/api",
            "http://printer.local/",
            "http://[::1]/",
        ] {
            assert!(validate_url(raw, false).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn private_targets_allowed_when_configured() {
        assert!(validate_url("http://127.0.0.1:8080/team", true).is_ok());
    }

    #[test]
    fn accepts_public_pages() {
        let url = validate_url(" https://acme.example.com/team ", false).unwrap();
        assert_eq!(url.host_str(), Some("acme.example.com"));
    }

    #[tokio::test]
    async fn fetch_reports_non_success_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/gone"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, OnLeadsError::Fetch(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn fetch_returns_body_and_content_type() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/team"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw("<p>hi</p>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/team", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.body, b"<p>hi</p>");
        assert!(page.content_type.unwrap().starts_with("text/html"));
    }
}
