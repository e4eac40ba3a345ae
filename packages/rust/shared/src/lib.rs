//! Shared types, error model, and configuration for OnLeads.
//!
//! This crate is the foundation depended on by all other OnLeads crates.
//! It provides:
//! - [`OnLeadsError`]: the unified error type, with [`StoreError`] for the CRM boundary
//! - Domain types ([`Lead`], [`Email`], [`ContactStatus`], [`LeadId`], [`RecordId`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlSettings, DraftingConfig, Eligibility, GenerationConfig, NotionConfig,
    RetryConfig, StoreBackend, StoreConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, read_secret,
};
pub use error::{OnLeadsError, Result, StoreError};
pub use types::{
    ContactStatus, Email, EmailStatus, EmailType, Lead, LeadId, LeadUpdate, NewEmail, NewLead,
    RecordId, normalize_email,
};
