//! Lead ingestion: crawl a URL and create or merge the lead it describes.

use std::sync::Arc;

use tracing::{info, instrument};

use onleads_crawler::{ContentExtractor, ExtractionResult};
use onleads_shared::{ContactStatus, Lead, LeadUpdate, NewLead, Result};
use onleads_storage::LeadStore;

/// Whether ingestion created a lead or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestAction {
    Created,
    Merged,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub lead: Lead,
    pub action: IngestAction,
    /// Every address found on the page, primary first.
    pub extracted_emails: Vec<String>,
    /// `<title>` of the crawled page.
    pub page_title: Option<String>,
    /// Words of page text that were scanned.
    pub word_count: usize,
}

/// Turns crawled pages into lead records.
pub struct IngestionService {
    extractor: ContentExtractor,
    leads: Arc<dyn LeadStore>,
}

impl IngestionService {
    pub fn new(extractor: ContentExtractor, leads: Arc<dyn LeadStore>) -> Self {
        Self { extractor, leads }
    }

    /// Crawl `url` and create or merge a lead from it.
    ///
    /// Performs exactly one create-or-update write. Extraction errors are
    /// returned unchanged and leave the store untouched.
    #[instrument(skip(self))]
    pub async fn ingest_from_url(&self, url: &str) -> Result<IngestOutcome> {
        let extracted = self.extractor.extract(url).await?;

        let mut existing = None;
        for address in &extracted.emails {
            if let Some(lead) = self.leads.find_lead_by_email(address).await? {
                existing = Some(lead);
                break;
            }
        }

        let (lead, action) = match existing {
            Some(lead) => {
                let update = merge_update(&lead, &extracted);
                let merged = self.leads.update_lead(&lead.record_id, update).await?;
                (merged, IngestAction::Merged)
            }
            None => {
                let created = self.leads.create_lead(new_lead(&extracted)).await?;
                (created, IngestAction::Created)
            }
        };

        info!(
            lead_id = %lead.id,
            action = ?action,
            emails = extracted.emails.len(),
            words = extracted.word_count,
            secondary = ?extracted.emails.iter().skip(1).collect::<Vec<_>>(),
            "lead ingested"
        );

        Ok(IngestOutcome {
            lead,
            action,
            extracted_emails: extracted.emails,
            page_title: extracted.title,
            word_count: extracted.word_count,
        })
    }
}

fn new_lead(extracted: &ExtractionResult) -> NewLead {
    NewLead {
        name: extracted.name.clone(),
        profile: extracted.profile.clone(),
        email_address: extracted.primary_email().map(str::to_string),
        source_url: Some(extracted.url.clone()),
        contact_status: Some(ContactStatus::New),
    }
}

/// Fields to change on an existing lead. Never touches `contact_status`.
fn merge_update(lead: &Lead, extracted: &ExtractionResult) -> LeadUpdate {
    LeadUpdate {
        name: match (&lead.name, &extracted.name) {
            (None, Some(name)) => Some(name.clone()),
            _ => None,
        },
        profile: merged_profile(lead.profile.as_deref(), extracted.profile.as_deref()),
        source_url: Some(extracted.url.clone()),
        contact_status: None,
    }
}

/// Existing profile with `incoming` appended after a blank line, or `None`
/// if there is nothing new to add.
fn merged_profile(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let incoming = incoming.map(str::trim).filter(|p| !p.is_empty())?;
    match existing.map(str::trim).filter(|p| !p.is_empty()) {
        None => Some(incoming.to_string()),
        Some(current) if current.contains(incoming) => None,
        Some(current) => Some(format!("{current}\n\n{incoming}")),
    }
}
