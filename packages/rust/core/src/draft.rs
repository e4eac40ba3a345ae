//! First-contact email drafting, for one lead or a batch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use onleads_shared::{
    ContactStatus, Eligibility, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate,
    NewEmail, OnLeadsError, Result,
};
use onleads_storage::{EmailStore, LeadStore};

use crate::generation::TextGenerator;
use crate::prompt::first_contact_request;

/// Progress callbacks for batch drafting.
pub trait DraftProgress: Send + Sync {
    /// Called once the eligible leads are known.
    fn started(&self, total: usize);
    /// Called after each lead, successful or not.
    fn lead_done(&self, lead: LeadId, outcome: &Result<Email>, current: usize, total: usize);
    /// Called when the batch ends, including on cancellation.
    fn finished(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl DraftProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn lead_done(&self, _lead: LeadId, _outcome: &Result<Email>, _current: usize, _total: usize) {}
    fn finished(&self, _report: &BatchReport) {}
}

/// Per-lead results of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(LeadId, Result<Email>)>,
    /// The run stopped early because the token was cancelled.
    pub cancelled: bool,
    /// Eligible leads never attempted because of cancellation.
    pub not_started: usize,
}

impl BatchReport {
    pub fn drafted(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_ok()).count()
    }

    /// Leads that already had a first-contact email.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, r)| matches!(r, Err(OnLeadsError::AlreadyDrafted(_))))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.drafted() - self.skipped()
    }

    pub fn emails(&self) -> impl Iterator<Item = &Email> {
        self.outcomes.iter().filter_map(|(_, r)| r.as_ref().ok())
    }
}

/// Drafts first-contact emails and records them in the CRM.
pub struct DraftService {
    leads: Arc<dyn LeadStore>,
    emails: Arc<dyn EmailStore>,
    generator: Arc<dyn TextGenerator>,
    eligibility: Eligibility,
}

impl DraftService {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        emails: Arc<dyn EmailStore>,
        generator: Arc<dyn TextGenerator>,
        eligibility: Eligibility,
    ) -> Self {
        Self {
            leads,
            emails,
            generator,
            eligibility,
        }
    }

    /// Draft, store, and link a first-contact email for one lead.
    ///
    /// Unknown leads and leads that already have a first-contact email fail
    /// before anything is written.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn draft_for_lead(&self, lead_id: LeadId, prompt: &str) -> Result<Email> {
        check_prompt(prompt)?;
        let lead = self
            .leads
            .get_lead(lead_id)
            .await?
            .ok_or(OnLeadsError::LeadNotFound(lead_id))?;
        self.draft(&lead, prompt).await
    }

    /// Draft for every eligible lead with no progress reporting.
    pub async fn draft_for_all(&self, prompt: &str, cancel: &CancellationToken) -> Result<BatchReport> {
        self.draft_for_all_with_progress(prompt, cancel, &SilentProgress)
            .await
    }

    /// Draft for every eligible lead, one at a time.
    ///
    /// A listing failure fails the whole run; per-lead failures are
    /// collected in the report. `cancel` is checked between leads.
    #[instrument(skip_all, fields(eligibility = ?self.eligibility))]
    pub async fn draft_for_all_with_progress(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        progress: &dyn DraftProgress,
    ) -> Result<BatchReport> {
        check_prompt(prompt)?;

        let filter = match self.eligibility {
            Eligibility::NewOnly => Some(ContactStatus::New),
            Eligibility::All => None,
        };
        let leads = self.leads.list_leads(filter).await?;
        let total = leads.len();
        progress.started(total);

        let mut report = BatchReport::default();
        for (index, lead) in leads.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.not_started = total - index;
                info!(done = index, not_started = report.not_started, "batch cancelled");
                break;
            }

            let outcome = self.draft(lead, prompt).await;
            if let Err(e) = &outcome {
                warn!(lead_id = %lead.id, error = %e, "draft failed");
            }
            progress.lead_done(lead.id, &outcome, index + 1, total);
            report.outcomes.push((lead.id, outcome));
        }

        info!(
            drafted = report.drafted(),
            skipped = report.skipped(),
            failed = report.failed(),
            not_started = report.not_started,
            "batch complete"
        );
        progress.finished(&report);
        Ok(report)
    }

    async fn draft(&self, lead: &Lead, prompt: &str) -> Result<Email> {
        let existing = self
            .emails
            .find_emails_for_lead(&lead.record_id, Some(EmailType::FirstContact))
            .await?;
        if let Some(email) = existing.first() {
            self.finish(lead, email).await?;
            return Err(OnLeadsError::AlreadyDrafted(lead.id));
        }

        let companies = self.leads.company_names(lead).await?;
        let request = first_contact_request(lead, &companies, prompt);
        let generated = self.generator.generate(&request).await?;

        let email = self
            .emails
            .create_email(NewEmail {
                object: generated.object,
                text: generated.body,
                email_type: EmailType::FirstContact,
                email_status: EmailStatus::Draft,
                recipient: lead.record_id.clone(),
            })
            .await?;
        self.finish(lead, &email).await?;

        info!(lead_id = %lead.id, email = %email.id, "first contact drafted");
        Ok(email)
    }

    /// Link `email` to `lead` and mark the lead contacted, skipping steps
    /// already done. Completes runs that stopped after creating the email.
    ///
    /// Re-reads the lead first: it may have changed in the CRM while the
    /// email was being generated.
    async fn finish(&self, lead: &Lead, email: &Email) -> Result<()> {
        let lead = self
            .leads
            .get_lead(lead.id)
            .await?
            .ok_or(OnLeadsError::LeadNotFound(lead.id))?;

        if !lead.emails.contains(&email.id) {
            self.leads
                .link_email_to_lead(&lead.record_id, &email.id)
                .await?;
        }

        if let Some(next) = lead.contact_status.advance_to(ContactStatus::Contacted) {
            self.leads
                .update_lead(
                    &lead.record_id,
                    LeadUpdate {
                        contact_status: Some(next),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(())
    }
}

fn check_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(OnLeadsError::invalid_input("prompt must not be empty"));
    }
    Ok(())
}
