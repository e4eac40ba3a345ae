//! In-memory doubles for service tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use url::Url;

use onleads_crawler::{FetchedPage, PageFetcher};
use onleads_shared::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    OnLeadsError, RecordId, Result, StoreError, normalize_email,
};
use onleads_storage::{EmailStore, LeadStore, StoreResult};

use crate::generation::{GeneratedEmail, GenerationRequest, TextGenerator};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    leads: Vec<Lead>,
    emails: Vec<Email>,
    next_id: u64,
}

/// Lead and email store in memory that counts writes.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    writes: AtomicUsize,
    fail_listing: bool,
}

impl MemoryStore {
    pub(crate) fn failing_listing() -> Self {
        Self {
            fail_listing: true,
            ..Default::default()
        }
    }

    /// Insert a lead with a chosen id, bypassing the write counter.
    pub(crate) fn seed(&self, id: u64, name: &str, profile: &str, status: ContactStatus) -> Lead {
        let lead = Lead {
            id: LeadId(id),
            record_id: RecordId(format!("lead-{id}")),
            name: Some(name.to_string()),
            profile: Some(profile.to_string()),
            email_address: Some(format!("lead{id}@example.com")),
            source_url: None,
            contact_status: status,
            company: Vec::new(),
            emails: Vec::new(),
        };
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.max(id);
        state.leads.push(lead.clone());
        lead
    }

    /// Change a lead's status as another CRM user would, bypassing the
    /// write counter.
    pub(crate) fn set_status(&self, id: u64, status: ContactStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(lead) = state.leads.iter_mut().find(|l| l.id == LeadId(id)) {
            lead.contact_status = status;
        }
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn lead(&self, id: u64) -> Lead {
        let state = self.state.lock().unwrap();
        state
            .leads
            .iter()
            .find(|l| l.id == LeadId(id))
            .cloned()
            .unwrap()
    }

    pub(crate) fn leads(&self) -> Vec<Lead> {
        self.state.lock().unwrap().leads.clone()
    }

    pub(crate) fn emails(&self) -> Vec<Email> {
        self.state.lock().unwrap().emails.clone()
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn find_lead_by_email(&self, address: &str) -> StoreResult<Option<Lead>> {
        let address = normalize_email(address);
        let state = self.state.lock().unwrap();
        Ok(state
            .leads
            .iter()
            .find(|l| l.email_address.as_deref() == Some(address.as_str()))
            .cloned())
    }

    async fn get_lead(&self, id: LeadId) -> StoreResult<Option<Lead>> {
        let state = self.state.lock().unwrap();
        Ok(state.leads.iter().find(|l| l.id == id).cloned())
    }

    async fn list_leads(&self, status: Option<ContactStatus>) -> StoreResult<Vec<Lead>> {
        if self.fail_listing {
            return Err(StoreError::Unavailable("listing failed".into()));
        }
        let state = self.state.lock().unwrap();
        let mut leads: Vec<Lead> = state
            .leads
            .iter()
            .filter(|l| status.as_ref().is_none_or(|s| &l.contact_status == s))
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.id);
        Ok(leads)
    }

    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        self.write();
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let created = Lead {
            id: LeadId(id),
            record_id: RecordId(format!("lead-{id}")),
            name: lead.name,
            profile: lead.profile,
            email_address: lead.email_address.as_deref().map(normalize_email),
            source_url: lead.source_url,
            contact_status: lead.contact_status.unwrap_or(ContactStatus::New),
            company: Vec::new(),
            emails: Vec::new(),
        };
        state.leads.push(created.clone());
        Ok(created)
    }

    async fn update_lead(&self, record: &RecordId, update: LeadUpdate) -> StoreResult<Lead> {
        self.write();
        let mut state = self.state.lock().unwrap();
        let lead = state
            .leads
            .iter_mut()
            .find(|l| &l.record_id == record)
            .ok_or_else(|| StoreError::NotFound(record.to_string()))?;
        if let Some(name) = update.name {
            lead.name = Some(name);
        }
        if let Some(profile) = update.profile {
            lead.profile = Some(profile);
        }
        if let Some(url) = update.source_url {
            lead.source_url = Some(url);
        }
        if let Some(status) = update.contact_status {
            lead.contact_status = status;
        }
        Ok(lead.clone())
    }

    async fn link_email_to_lead(&self, lead: &RecordId, email: &RecordId) -> StoreResult<()> {
        self.write();
        let mut state = self.state.lock().unwrap();
        let target = state
            .leads
            .iter_mut()
            .find(|l| &l.record_id == lead)
            .ok_or_else(|| StoreError::NotFound(lead.to_string()))?;
        if !target.emails.contains(email) {
            target.emails.push(email.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    async fn create_email(&self, email: NewEmail) -> StoreResult<Email> {
        self.write();
        let mut state = self.state.lock().unwrap();
        if !state.leads.iter().any(|l| l.record_id == email.recipient) {
            return Err(StoreError::NotFound(email.recipient.to_string()));
        }
        let created = Email {
            id: RecordId(format!("email-{}", state.emails.len() + 1)),
            object: email.object,
            text: email.text,
            email_type: email.email_type,
            email_status: email.email_status,
            recipient: email.recipient,
            created_at: None,
        };
        state.emails.push(created.clone());
        Ok(created)
    }

    async fn find_emails_for_lead(
        &self,
        lead: &RecordId,
        email_type: Option<EmailType>,
    ) -> StoreResult<Vec<Email>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .emails
            .iter()
            .filter(|e| &e.recipient == lead && email_type.is_none_or(|t| e.email_type == t))
            .cloned()
            .collect())
    }

    async fn set_email_status(&self, email: &RecordId, status: EmailStatus) -> StoreResult<()> {
        self.write();
        let mut state = self.state.lock().unwrap();
        let target = state
            .emails
            .iter_mut()
            .find(|e| &e.id == email)
            .ok_or_else(|| StoreError::NotFound(email.to_string()))?;
        target.email_status = status;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Serves fixed HTML per URL; unknown URLs are a fetch error.
#[derive(Default)]
pub(crate) struct CannedFetcher {
    pages: HashMap<String, String>,
}

impl CannedFetcher {
    pub(crate) fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for CannedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let html = self
            .pages
            .get(url.as_str())
            .ok_or_else(|| OnLeadsError::Fetch(format!("{url}: HTTP 404 Not Found")))?;
        Ok(FetchedPage {
            url: url.clone(),
            status: 200,
            content_type: Some("text/html".into()),
            body: html.as_bytes().to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Echoes part of the prompt back so tests can see what was sent.
#[derive(Default)]
pub(crate) struct EchoGenerator {
    /// Prompts containing this text fail.
    pub(crate) fail_on: Option<String>,
    pub(crate) calls: AtomicUsize,
}

impl EchoGenerator {
    pub(crate) fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedEmail> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_on {
            if request.prompt.contains(needle.as_str()) {
                return Err(OnLeadsError::Generation("model unavailable".into()));
            }
        }
        Ok(GeneratedEmail {
            object: "Quick question".into(),
            body: format!("Hello!\n\n{}", request.prompt.lines().next().unwrap_or_default()),
        })
    }
}
