//! Chat command parsing and reply rendering.
//!
//! Each input line becomes one [`ChatCommand`]; [`Dispatcher::handle`] runs
//! it against the services and always produces exactly one reply.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use onleads_shared::{LeadId, OnLeadsError, Result};

use crate::draft::{BatchReport, DraftService};
use crate::ingest::{IngestAction, IngestOutcome, IngestionService};

/// Supported commands, with their help descriptions.
pub const COMMANDS: &[(&str, &str)] = &[
    ("start", "Start OnLeads and show the welcome message"),
    ("help", "Show this help message"),
    (
        "crawl",
        "Extract email contacts from a webpage and store them in the CRM. Usage: /crawl <url>",
    ),
    (
        "draft",
        "Draft a first contact email for a specific lead. Usage: /draft <lead_id> <prompt>",
    ),
    (
        "draft_all",
        "Draft first contact emails for all eligible leads. Usage: /draft_all <prompt>",
    ),
];

const CRAWL_USAGE: &str = "Please provide the webpage URL. Usage: /crawl <url>";
const DRAFT_USAGE: &str = "Please provide lead ID and prompt. Usage: /draft <lead_id> <prompt>";
const DRAFT_ALL_USAGE: &str = "Please provide a prompt. Usage: /draft_all <prompt>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Help,
    Crawl { url: String },
    Draft { lead_id: LeadId, prompt: String },
    DraftAll { prompt: String },
}

impl ChatCommand {
    /// Parse one line such as `/draft 42 Say hello`. The leading `/` is optional.
    pub fn parse(input: &str) -> Result<Self> {
        let mut words = input.split_whitespace();
        let Some(head) = words.next() else {
            return Err(OnLeadsError::invalid_input(
                "Empty command. Use /help to see the list of available commands.",
            ));
        };
        let name = head.strip_prefix('/').unwrap_or(head).to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        match name.as_str() {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "crawl" => match args.as_slice() {
                [url] => Ok(Self::Crawl {
                    url: (*url).to_string(),
                }),
                _ => Err(OnLeadsError::invalid_input(CRAWL_USAGE)),
            },
            "draft" => {
                let [id, prompt @ ..] = args.as_slice() else {
                    return Err(OnLeadsError::invalid_input(DRAFT_USAGE));
                };
                if prompt.is_empty() {
                    return Err(OnLeadsError::invalid_input(DRAFT_USAGE));
                }
                let lead_id = id
                    .parse::<u64>()
                    .map_err(|_| OnLeadsError::invalid_input("Lead ID must be a number"))?;
                Ok(Self::Draft {
                    lead_id: LeadId(lead_id),
                    prompt: prompt.join(" "),
                })
            }
            "draft_all" | "draft-all" => {
                if args.is_empty() {
                    return Err(OnLeadsError::invalid_input(DRAFT_ALL_USAGE));
                }
                Ok(Self::DraftAll {
                    prompt: args.join(" "),
                })
            }
            other => Err(OnLeadsError::invalid_input(format!(
                "Unknown command /{other}. Use /help to see the list of available commands."
            ))),
        }
    }
}

/// Routes chat commands to the ingestion and drafting services.
pub struct Dispatcher {
    ingest: IngestionService,
    drafts: DraftService,
}

impl Dispatcher {
    pub fn new(ingest: IngestionService, drafts: DraftService) -> Self {
        Self { ingest, drafts }
    }

    /// Parse and run one command, returning the reply to show the operator.
    #[instrument(skip_all)]
    pub async fn handle(&self, input: &str, cancel: &CancellationToken) -> String {
        let command = match ChatCommand::parse(input) {
            Ok(command) => command,
            Err(OnLeadsError::InvalidInput { message }) => return message,
            Err(e) => return e.to_string(),
        };
        info!(command = ?command, "dispatching");

        match command {
            ChatCommand::Start => welcome_text(),
            ChatCommand::Help => help_text(),
            ChatCommand::Crawl { url } => match self.ingest.ingest_from_url(&url).await {
                Ok(outcome) => crawl_reply(&url, &outcome),
                Err(e) => {
                    warn!(%url, error = %e, "crawl failed");
                    format!("Error while extracting email contacts from {url}: {e}")
                }
            },
            ChatCommand::Draft { lead_id, prompt } => {
                match self.drafts.draft_for_lead(lead_id, &prompt).await {
                    Ok(email) => format!(
                        "Email drafted successfully!\n\nSubject: {}\n\nBody:\n{}",
                        email.object, email.text
                    ),
                    Err(OnLeadsError::AlreadyDrafted(_)) => {
                        "First contact email already exists for this lead.".to_string()
                    }
                    Err(OnLeadsError::LeadNotFound(id)) => format!("No lead with ID {id}."),
                    Err(e) => {
                        warn!(lead_id = %lead_id, error = %e, "draft failed");
                        format!("Error while drafting email: {e}")
                    }
                }
            }
            ChatCommand::DraftAll { prompt } => {
                match self.drafts.draft_for_all(&prompt, cancel).await {
                    Ok(report) => batch_reply(&report),
                    Err(e) => {
                        warn!(error = %e, "batch draft failed");
                        format!("Error while drafting emails: {e}")
                    }
                }
            }
        }
    }
}

pub fn welcome_text() -> String {
    "Hello! I am OnLeads, your assistant for CRM management.\n\
I can help you gather and manage contacts in your CRM.\n\
Use /help to see the list of available commands."
        .to_string()
}

pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n\n");
    for (command, description) in COMMANDS {
        text.push_str(&format!("/{command} - {description}\n"));
    }
    text
}

fn crawl_reply(url: &str, outcome: &IngestOutcome) -> String {
    let verb = match outcome.action {
        IngestAction::Created => "Created",
        IngestAction::Merged => "Updated",
    };
    let mut reply = format!(
        "Email extraction completed for {url}.\n{verb} lead {}",
        outcome.lead.id
    );
    if let Some(name) = &outcome.lead.name {
        reply.push_str(&format!(" ({name})"));
    }
    reply.push('.');
    match &outcome.page_title {
        Some(title) => reply.push_str(&format!(
            "\nScanned \"{title}\" ({} words).",
            outcome.word_count
        )),
        None => reply.push_str(&format!("\nScanned {} words.", outcome.word_count)),
    }

    if outcome.extracted_emails.is_empty() {
        reply.push_str("\nNo email addresses were found on the page.");
    } else {
        reply.push_str(&format!(
            "\nFound {} address(es): {}",
            outcome.extracted_emails.len(),
            outcome.extracted_emails.join(", ")
        ));
    }
    reply
}

fn batch_reply(report: &BatchReport) -> String {
    let mut reply = format!(
        "Successfully drafted {} new first contact emails.",
        report.drafted()
    );
    if report.skipped() > 0 {
        reply.push_str(&format!(
            "\n{} lead(s) already had a first contact email.",
            report.skipped()
        ));
    }
    if report.failed() > 0 {
        reply.push_str(&format!("\n{} lead(s) failed:", report.failed()));
        for (id, outcome) in &report.outcomes {
            if let Err(e) = outcome {
                if !matches!(e, OnLeadsError::AlreadyDrafted(_)) {
                    reply.push_str(&format!("\n- lead {id}: {e}"));
                }
            }
        }
    }
    if report.cancelled {
        reply.push_str(&format!(
            "\nCancelled before {} lead(s) were started.",
            report.not_started
        ));
    }
    reply
}
