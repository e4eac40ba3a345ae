//! CRM storage layer.
//!
//! Leads and email drafts live behind two traits, [`LeadStore`] and
//! [`EmailStore`], with two backends:
//!
//! - [`NotionStore`]: the Notion REST API (the production CRM)
//! - [`LocalStore`]: a libSQL file database for offline use and tests
//!
//! [`RetryingStore`] wraps either backend and retries rate-limited calls.

mod local;
mod migrations;
mod notion;
mod retry;

use async_trait::async_trait;

use onleads_shared::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    RecordId, StoreError,
};

pub use local::LocalStore;
pub use notion::NotionStore;
pub use retry::RetryingStore;

/// Result of a store call.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lead records in the CRM.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Lead whose normalized address equals `address`, if any.
    async fn find_lead_by_email(&self, address: &str) -> StoreResult<Option<Lead>>;

    /// Lead with the CRM-assigned numeric id, if any.
    async fn get_lead(&self, id: LeadId) -> StoreResult<Option<Lead>>;

    /// All leads, optionally only those in `status`, in id order.
    async fn list_leads(&self, status: Option<ContactStatus>) -> StoreResult<Vec<Lead>>;

    /// Create a lead. `contact_status` defaults to `New`.
    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead>;

    /// Apply the set fields of `update` and return the stored lead.
    async fn update_lead(&self, record: &RecordId, update: LeadUpdate) -> StoreResult<Lead>;

    /// Append `email` to the lead's email relation. Linking twice is a no-op.
    async fn link_email_to_lead(&self, lead: &RecordId, email: &RecordId) -> StoreResult<()>;

    /// Display names of the lead's companies. Backends whose company
    /// references are already names return them as-is.
    async fn company_names(&self, lead: &Lead) -> StoreResult<Vec<String>> {
        Ok(lead.company.iter().map(|c| c.to_string()).collect())
    }
}

/// Email records in the CRM.
#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn create_email(&self, email: NewEmail) -> StoreResult<Email>;

    /// Emails whose recipient is `lead`, optionally of one type.
    async fn find_emails_for_lead(
        &self,
        lead: &RecordId,
        email_type: Option<EmailType>,
    ) -> StoreResult<Vec<Email>>;

    async fn set_email_status(&self, email: &RecordId, status: EmailStatus) -> StoreResult<()>;
}
