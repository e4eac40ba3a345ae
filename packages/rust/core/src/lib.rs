//! Core services and domain logic for OnLeads.
//!
//! This crate ties together extraction, the CRM stores, and text generation
//! into the operator-facing workflows: ingesting a lead from a URL and
//! drafting first-contact emails.

pub mod dispatch;
pub mod draft;
pub mod generation;
pub mod ingest;
pub mod prompt;

#[cfg(test)]
mod testing;

pub use dispatch::{ChatCommand, Dispatcher};
pub use draft::{BatchReport, DraftProgress, DraftService, SilentProgress};
pub use generation::{ChatCompletionsGenerator, GeneratedEmail, GenerationRequest, TextGenerator};
pub use ingest::{IngestAction, IngestOutcome, IngestionService};
