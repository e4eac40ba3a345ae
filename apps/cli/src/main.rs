//! OnLeads CLI: lead ingestion and first-contact drafting for a CRM.
//!
//! Crawls pages for contacts into the CRM and drafts personalized
//! outreach emails with an LLM.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
