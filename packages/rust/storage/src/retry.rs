//! Rate-limit retries around any store backend.

use std::future::Future;

use async_trait::async_trait;
use tracing::warn;

use onleads_shared::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    RecordId, RetryConfig, StoreError,
};

use crate::{EmailStore, LeadStore, StoreResult};

/// Store decorator that retries calls failing with
/// [`StoreError::RateLimited`]. Every other error surfaces immediately.
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retrying<T, F, Fut>(&self, op: &'static str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Err(StoreError::RateLimited {
                    message,
                    retry_after,
                }) if attempt < max_attempts => {
                    let backoff = self.config.delay_for(attempt);
                    let delay = retry_after.map_or(backoff, |hint| hint.max(backoff));
                    warn!(
                        op,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %message,
                        "store rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: LeadStore> LeadStore for RetryingStore<S> {
    async fn find_lead_by_email(&self, address: &str) -> StoreResult<Option<Lead>> {
        self.retrying("find_lead_by_email", || self.inner.find_lead_by_email(address))
            .await
    }

    async fn get_lead(&self, id: LeadId) -> StoreResult<Option<Lead>> {
        self.retrying("get_lead", || self.inner.get_lead(id)).await
    }

    async fn list_leads(&self, status: Option<ContactStatus>) -> StoreResult<Vec<Lead>> {
        self.retrying("list_leads", || self.inner.list_leads(status.clone()))
            .await
    }

    async fn create_lead(&self, lead: NewLead) -> StoreResult<Lead> {
        self.retrying("create_lead", || self.inner.create_lead(lead.clone()))
            .await
    }

    async fn update_lead(&self, record: &RecordId, update: LeadUpdate) -> StoreResult<Lead> {
        self.retrying("update_lead", || {
            self.inner.update_lead(record, update.clone())
        })
        .await
    }

    async fn link_email_to_lead(&self, lead: &RecordId, email: &RecordId) -> StoreResult<()> {
        self.retrying("link_email_to_lead", || {
            self.inner.link_email_to_lead(lead, email)
        })
        .await
    }

    async fn company_names(&self, lead: &Lead) -> StoreResult<Vec<String>> {
        self.retrying("company_names", || self.inner.company_names(lead))
            .await
    }
}

#[async_trait]
impl<S: EmailStore> EmailStore for RetryingStore<S> {
    async fn create_email(&self, email: NewEmail) -> StoreResult<Email> {
        self.retrying("create_email", || self.inner.create_email(email.clone()))
            .await
    }

    async fn find_emails_for_lead(
        &self,
        lead: &RecordId,
        email_type: Option<EmailType>,
    ) -> StoreResult<Vec<Email>> {
        self.retrying("find_emails_for_lead", || {
            self.inner.find_emails_for_lead(lead, email_type)
        })
        .await
    }

    async fn set_email_status(&self, email: &RecordId, status: EmailStatus) -> StoreResult<()> {
        self.retrying("set_email_status", || {
            self.inner.set_email_status(email, status)
        })
        .await
    }
}
