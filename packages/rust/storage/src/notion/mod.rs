//! Notion REST backend.
//!
//! Leads and emails are pages in two Notion databases. Every call is a plain
//! JSON request against the public API; responses are mapped onto
//! [`StoreError`] by HTTP status.

mod properties;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use onleads_shared::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    NotionConfig, OnLeadsError, RecordId, Result, StoreError, normalize_email,
};

use crate::{EmailStore, LeadStore, StoreResult};

/// Largest page size the query endpoint accepts.
const PAGE_SIZE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Notion-backed CRM store.
pub struct NotionStore {
    client: Client,
    api_base: String,
    leads_database: String,
    emails_database: String,
}

/// Error body returned by the Notion API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl NotionStore {
    /// Build a store from config, reading the token and database ids from
    /// their env vars.
    pub fn from_config(config: &NotionConfig) -> Result<Self> {
        Self::new(
            &config.api_base,
            &config.api_version,
            &config.token()?,
            config.leads_database()?,
            config.emails_database()?,
        )
    }

    pub fn new(
        api_base: &str,
        api_version: &str,
        token: &str,
        leads_database: String,
        emails_database: String,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| OnLeadsError::config("Notion token contains invalid characters"))?;
        headers.insert(header::AUTHORIZATION, auth);
        let version = header::HeaderValue::from_str(api_version)
            .map_err(|_| OnLeadsError::config(format!("invalid Notion API version '{api_version}'")))?;
        headers.insert("Notion-Version", version);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OnLeadsError::config(format!("failed to build Notion client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            leads_database,
            emails_database,
        })
    }

    // -----------------------------------------------------------------------
    // HTTP plumbing
    // -----------------------------------------------------------------------

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> StoreResult<Value> {
        let url = format!("{}{path}", self.api_base);
        debug!(%method, %url, "notion request");

        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Notion request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = resp.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after, &text));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| StoreError::Unavailable(format!("invalid Notion response: {e}")))
    }

    /// Query a database, following `next_cursor` until all pages are read.
    async fn query(&self, database: &str, filter: Option<Value>, sorts: Value) -> StoreResult<Vec<Value>> {
        let path = format!("/databases/{database}/query");
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE, "sorts": sorts.clone() });
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let resp = self.request(Method::POST, &path, Some(body)).await?;
            if let Some(results) = resp.get("results").and_then(Value::as_array) {
                pages.extend(results.iter().cloned());
            }

            let has_more = resp.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = resp
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }

        debug!(database, count = pages.len(), "notion query complete");
        Ok(pages)
    }

    async fn query_leads(&self, filter: Option<Value>) -> StoreResult<Vec<Lead>> {
        let sorts = json!([{ "property": properties::ID, "direction": "ascending" }]);
        self.query(&self.leads_database, filter, sorts)
            .await?
            .iter()
            .map(properties::decode_lead)
            .collect()
    }

    async fn create_page(&self, database: &str, props: Value) -> StoreResult<Value> {
        let body = json!({ "parent": { "database_id": database }, "properties": props });
        self.request(Method::POST, "/pages", Some(body)).await
    }

    async fn update_page(&self, page: &RecordId, props: Value) -> StoreResult<Value> {
        let path = format!("/pages/{page}");
        self.request(Method::PATCH, &path, Some(json!({ "properties": props })))
            .await
    }

    async fn get_page(&self, page: &RecordId) -> StoreResult<Value> {
        self.request(Method::GET, &format!("/pages/{page}"), None).await
    }

    /// Every id of a relation property on `page`.
    ///
    /// Page objects carry at most 25 relation entries and set `has_more`
    /// when there are more; the rest is read from the property endpoint.
    async fn full_relation(&self, page: &Value, name: &str) -> StoreResult<Vec<RecordId>> {
        let Some(prop) = page.pointer(&format!("/properties/{name}")) else {
            return Ok(Vec::new());
        };
        if !prop.get("has_more").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(properties::relation_ids(prop));
        }

        let page_id = page.get("id").and_then(Value::as_str).unwrap_or_default();
        let property_id = prop.get("id").and_then(Value::as_str).ok_or_else(|| {
            StoreError::SchemaViolation(format!("page {page_id}: '{name}' has more items but no property id"))
        })?;

        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("/pages/{page_id}/properties/{property_id}?page_size={PAGE_SIZE}");
            if let Some(cursor) = &cursor {
                path.push_str("&start_cursor=");
                path.push_str(&urlencoding::encode(cursor));
            }

            let resp = self.request(Method::GET, &path, None).await?;
            if let Some(items) = resp.get("results").and_then(Value::as_array) {
                ids.extend(items.iter().filter_map(properties::relation_item_id));
            }

            let has_more = resp.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = resp
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }

        debug!(page = page_id, property = name, count = ids.len(), "relation paged");
        Ok(ids)
    }
}

/// Map a non-success Notion response onto a store error.
fn map_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> StoreError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(err) => (err.code, err.message),
        None => (String::new(), body.trim().to_string()),
    };
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {message}")
    };

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited {
            message,
            retry_after,
        },
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT if code == "validation_error" => {
            StoreError::SchemaViolation(message)
        }
        _ => StoreError::Unavailable(message),
    }
}

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LeadStore for NotionStore {
    #[instrument(skip_all)]
    async fn find_lead_by_email(&self, address: &str) -> StoreResult<Option<Lead>> {
        let filter = json!({
            "property": properties::EMAIL_ADDRESS,
            "email": { "equals": normalize_email(address) }
        });
        Ok(self.query_leads(Some(filter)).await?.into_iter().next())
    }

    #[instrument(skip_all, fields(%id))]
    async fn get_lead(&self, id: LeadId) -> StoreResult<Option<Lead>> {
        let filter = json!({
            "property": properties::ID,
            "unique_id": { "equals": id.0 }
        });
        Ok(self.query_leads(Some(filter)).await?.into_iter().next())
    }

    #[instrument(skip_all)]
    async fn list_leads(&self, status: Option<ContactStatus>) -> StoreResult<Vec<Lead>> {
        let filter = status.map(|s| {
            json!({
                "property": properties::CONTACT_STATUS,
                "select": { "equals": s.as_str() }
            })
        });
        self.query_leads(filter).await
    }

    #[instrument(skip_all)]
    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        let page = self
            .create_page(&self.leads_database, properties::encode_new_lead(&lead))
            .await?;
        let created = properties::decode_lead(&page)?;
        info!(lead_id = %created.id, "notion lead created");
        Ok(created)
    }

    #[instrument(skip_all, fields(%record))]
    async fn update_lead(&self, record: &RecordId, update: LeadUpdate) -> StoreResult<Lead> {
        let page = if update.is_empty() {
            self.get_page(record).await?
        } else {
            self.update_page(record, properties::encode_lead_update(&update))
                .await?
        };
        properties::decode_lead(&page)
    }

    #[instrument(skip_all, fields(%lead, %email))]
    async fn link_email_to_lead(&self, lead: &RecordId, email: &RecordId) -> StoreResult<()> {
        // The relation is replaced wholesale, so read all of it first.
        let page = self.get_page(lead).await?;
        let mut emails = self.full_relation(&page, properties::EMAILS).await?;
        if emails.contains(email) {
            debug!("email already linked");
            return Ok(());
        }

        emails.push(email.clone());
        let mut props = serde_json::Map::new();
        props.insert(properties::EMAILS.into(), properties::relation(&emails));
        self.update_page(lead, Value::Object(props)).await?;
        Ok(())
    }

    async fn company_names(&self, lead: &Lead) -> StoreResult<Vec<String>> {
        let mut names = Vec::with_capacity(lead.company.len());
        for company in &lead.company {
            match self.get_page(company).await {
                Ok(page) => names.extend(properties::page_title(&page)),
                Err(StoreError::NotFound(_)) => {
                    warn!(%company, "company page not shared with integration");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// EmailStore
// ---------------------------------------------------------------------------

#[async_trait]
impl EmailStore for NotionStore {
    #[instrument(skip_all, fields(recipient = %email.recipient))]
    async fn create_email(&self, email: NewEmail) -> StoreResult<Email> {
        let page = self
            .create_page(&self.emails_database, properties::encode_new_email(&email))
            .await?;
        let created = properties::decode_email(&page)?;
        info!(email = %created.id, "notion email created");
        Ok(created)
    }

    #[instrument(skip_all, fields(%lead))]
    async fn find_emails_for_lead(
        &self,
        lead: &RecordId,
        email_type: Option<EmailType>,
    ) -> StoreResult<Vec<Email>> {
        let recipient = json!({
            "property": properties::RECIPIENT,
            "relation": { "contains": lead.as_str() }
        });
        let filter = match email_type {
            Some(t) => json!({
                "and": [
                    recipient,
                    { "property": properties::TYPE, "select": { "equals": t.as_str() } }
                ]
            }),
            None => recipient,
        };
        let sorts = json!([{ "timestamp": "created_time", "direction": "ascending" }]);

        self.query(&self.emails_database, Some(filter), sorts)
            .await?
            .iter()
            .map(properties::decode_email)
            .collect()
    }

    #[instrument(skip_all, fields(%email))]
    async fn set_email_status(&self, email: &RecordId, status: EmailStatus) -> StoreResult<()> {
        self.update_page(email, properties::encode_email_status(status))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header as header_eq, method, path, query_param};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    /// Matches query bodies that carry no `start_cursor`.
    struct FirstPage;

    impl Match for FirstPage {
        fn matches(&self, request: &Request) -> bool {
            serde_json::from_slice::<Value>(&request.body)
                .map(|body| body.get("start_cursor").is_none())
                .unwrap_or(false)
        }
    }

    /// Matches GETs that carry no `start_cursor` query parameter.
    struct NoCursor;

    impl Match for NoCursor {
        fn matches(&self, request: &Request) -> bool {
            !request.url.query_pairs().any(|(key, _)| key == "start_cursor")
        }
    }

    /// Matches a PATCH whose `Emails` relation is exactly `ids`.
    struct EmailsRelation(Vec<String>);

    impl Match for EmailsRelation {
        fn matches(&self, request: &Request) -> bool {
            let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
                return false;
            };
            let sent: Vec<&str> = body
                .pointer("/properties/Emails/relation")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|i| i["id"].as_str()).collect())
                .unwrap_or_default();
            sent == self.0.iter().map(String::as_str).collect::<Vec<_>>()
        }
    }

    fn store(server: &MockServer) -> NotionStore {
        NotionStore::new(
            &server.uri(),
            "2022-06-28",
            "secret-token",
            "leads-db".into(),
            "emails-db".into(),
        )
        .unwrap()
    }

    fn lead_page(id: u64, page_id: &str, email: &str, emails: &[&str]) -> Value {
        let relation: Vec<Value> = emails.iter().map(|e| json!({ "id": e })).collect();
        json!({
            "object": "page",
            "id": page_id,
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": "Jane Doe" }] },
                "Contact_Status": { "type": "select", "select": { "name": "New" } },
                "Profile": { "type": "rich_text", "rich_text": [{ "plain_text": "VP of Sales at Acme" }] },
                "Linkedin": { "type": "url", "url": null },
                "Company": { "type": "relation", "relation": [] },
                "ID": { "type": "unique_id", "unique_id": { "prefix": null, "number": id } },
                "Emails": { "type": "relation", "relation": relation },
                "Email_Address": { "type": "email", "email": email }
            }
        })
    }

    fn error_body(status: u16, code: &str) -> Value {
        json!({ "object": "error", "status": status, "code": code, "message": "nope" })
    }

    #[tokio::test]
    async fn get_lead_filters_by_unique_id_and_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/databases/leads-db/query"))
            .and(header_eq("Notion-Version", "2022-06-28"))
            .and(header_eq("Authorization", "Bearer secret-token"))
            .and(body_partial_json(json!({
                "filter": { "property": "ID", "unique_id": { "equals": 42 } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [lead_page(42, "page-42", "jane@example.com", &[])],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let lead = store(&server).get_lead(LeadId(42)).await.unwrap().unwrap();
        assert_eq!(lead.id, LeadId(42));
        assert_eq!(lead.profile.as_deref(), Some("VP of Sales at Acme"));
    }

    #[tokio::test]
    async fn list_follows_pagination_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/databases/leads-db/query"))
            .and(FirstPage)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [lead_page(1, "page-1", "a@acme.io", &[])],
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/databases/leads-db/query"))
            .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [lead_page(2, "page-2", "b@acme.io", &[])],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;

        let leads = store(&server).list_leads(None).await.unwrap();
        let ids: Vec<u64> = leads.iter().map(|l| l.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn create_lead_sends_crm_properties() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pages"))
            .and(body_partial_json(json!({
                "parent": { "database_id": "leads-db" },
                "properties": {
                    "Contact_Status": { "select": { "name": "New" } },
                    "Email_Address": { "email": "jane@example.com" }
                }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(lead_page(7, "page-7", "jane@example.com", &[])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let lead = store(&server)
            .create_lead(NewLead {
                name: Some("Jane Doe".into()),
                email_address: Some("Jane@Example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(lead.id, LeadId(7));
    }

    #[tokio::test]
    async fn link_appends_to_existing_relation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/page-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(lead_page(1, "page-1", "a@acme.io", &["email-0"])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/pages/page-1"))
            .and(body_partial_json(json!({
                "properties": { "Emails": { "relation": [{ "id": "email-0" }, { "id": "email-1" }] } }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(lead_page(1, "page-1", "a@acme.io", &["email-0", "email-1"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server);
        store
            .link_email_to_lead(&RecordId::from("page-1"), &RecordId::from("email-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn link_reads_truncated_relation_in_full() {
        let server = MockServer::start().await;
        let all: Vec<String> = (0..30).map(|i| format!("email-{i}")).collect();
        let first_25: Vec<&str> = all[..25].iter().map(String::as_str).collect();
        let mut page = lead_page(1, "page-1", "a@acme.io", &first_25);
        page["properties"]["Emails"]["id"] = json!("emls");
        page["properties"]["Emails"]["has_more"] = json!(true);
        let item = |id: &String| json!({ "object": "property_item", "type": "relation", "relation": { "id": id } });

        Mock::given(method("GET"))
            .and(path("/pages/page-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages/page-1/properties/emls"))
            .and(NoCursor)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": all[..20].iter().map(item).collect::<Vec<_>>(),
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages/page-1/properties/emls"))
            .and(query_param("start_cursor", "cursor-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": all[20..].iter().map(item).collect::<Vec<_>>(),
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut expected = all.clone();
        expected.push("email-new".into());
        Mock::given(method("PATCH"))
            .and(path("/pages/page-1"))
            .and(EmailsRelation(expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .link_email_to_lead(&RecordId::from("page-1"), &RecordId::from("email-new"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn link_skips_email_found_past_first_25() {
        let server = MockServer::start().await;
        let all: Vec<String> = (0..30).map(|i| format!("email-{i}")).collect();
        let first_25: Vec<&str> = all[..25].iter().map(String::as_str).collect();
        let mut page = lead_page(1, "page-1", "a@acme.io", &first_25);
        page["properties"]["Emails"]["id"] = json!("emls");
        page["properties"]["Emails"]["has_more"] = json!(true);

        Mock::given(method("GET"))
            .and(path("/pages/page-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages/page-1/properties/emls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": all
                    .iter()
                    .map(|id| json!({ "type": "relation", "relation": { "id": id } }))
                    .collect::<Vec<_>>(),
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        store(&server)
            .link_email_to_lead(&RecordId::from("page-1"), &RecordId::from("email-28"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unmanaged_contact_status_lists_without_error() {
        let server = MockServer::start().await;
        let mut lost = lead_page(2, "page-2", "b@acme.io", &[]);
        lost["properties"]["Contact_Status"]["select"]["name"] = json!("Lost");
        Mock::given(method("POST"))
            .and(path("/databases/leads-db/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [lead_page(1, "page-1", "a@acme.io", &[]), lost],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;

        let leads = store(&server).list_leads(None).await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].contact_status, ContactStatus::New);
        assert_eq!(leads[1].contact_status, ContactStatus::Other("Lost".into()));
        assert_eq!(leads[1].contact_status.as_str(), "Lost");
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "2")
                    .set_body_json(error_body(429, "rate_limited")),
            )
            .mount(&server)
            .await;

        let err = store(&server).list_leads(None).await.unwrap_err();
        match err {
            StoreError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validation_errors_are_schema_violations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(error_body(400, "validation_error")))
            .mount(&server)
            .await;

        let err = store(&server)
            .create_email(NewEmail {
                object: "Hi".into(),
                text: "Body".into(),
                email_type: EmailType::FirstContact,
                email_status: EmailStatus::Draft,
                recipient: RecordId::from("page-1"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn missing_page_is_not_found_and_auth_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/pages/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "object_not_found")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/pages/locked"))
            .respond_with(ResponseTemplate::new(401).set_body_json(error_body(401, "unauthorized")))
            .mount(&server)
            .await;

        let store = store(&server);
        let err = store
            .set_email_status(&RecordId::from("gone"), EmailStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .set_email_status(&RecordId::from("locked"), EmailStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn conflict_without_validation_code_is_unavailable() {
        let err = map_status(StatusCode::CONFLICT, None, r#"{"code":"conflict_error","message":"busy"}"#);
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = map_status(StatusCode::BAD_GATEWAY, None, "upstream down");
        assert!(err.to_string().contains("upstream down"));
    }
}
