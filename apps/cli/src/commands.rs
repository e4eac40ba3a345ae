//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

use onleads_core::{
    BatchReport, ChatCompletionsGenerator, Dispatcher, DraftProgress, DraftService, IngestAction,
    IngestionService,
};
use onleads_crawler::ContentExtractor;
use onleads_shared::{
    AppConfig, ContactStatus, Email, LeadId, StoreBackend, init_config, load_config,
    load_config_from,
};
use onleads_storage::{EmailStore, LeadStore, LocalStore, NotionStore, RetryingStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// OnLeads: gather leads from the web and draft first-contact emails.
#[derive(Parser)]
#[command(
    name = "onleads",
    version,
    about = "Gather leads from web pages into your CRM and draft first-contact emails.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.onleads/onleads.toml).
    #[arg(long, global = true, env = "ONLEADS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured store backend.
    #[arg(long, global = true)]
    pub backend: Option<BackendArg>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum BackendArg {
    Notion,
    Local,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Notion => StoreBackend::Notion,
            BackendArg::Local => StoreBackend::Local,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Extract email contacts from a webpage and store them as a lead.
    Crawl {
        /// Page to crawl.
        url: String,
    },

    /// Draft a first-contact email for one lead.
    Draft {
        /// Numeric lead ID.
        lead_id: u64,

        /// Instructions for the email (what to pitch, tone, ...).
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },

    /// Draft first-contact emails for every eligible lead. Ctrl-C stops
    /// after the current lead.
    DraftAll {
        /// Instructions for the emails.
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },

    /// List leads in the store.
    Leads {
        /// Only leads with this contact status (new, contacted, replied).
        #[arg(long, value_parser = parse_status)]
        status: Option<ContactStatus>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Read chat commands (/crawl, /draft, ...) from stdin, one per line.
    Chat,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_status(s: &str) -> std::result::Result<ContactStatus, String> {
    ContactStatus::parse(s).ok_or_else(|| format!("unknown status '{s}': expected new, contacted or replied"))
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "onleads=info",
        1 => "onleads=debug",
        _ => "onleads=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(&cli)?),
        };
    }

    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Crawl { url } => cmd_crawl(&config, &url).await,
        Command::Draft { lead_id, prompt } => {
            cmd_draft(&config, LeadId(lead_id), &prompt.join(" ")).await
        }
        Command::DraftAll { prompt } => cmd_draft_all(&config, &prompt.join(" ")).await,
        Command::Leads { status, json } => cmd_leads(&config, status, json).await,
        Command::Chat => cmd_chat(&config).await,
        Command::Config { .. } => Ok(()),
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(backend) = cli.backend {
        config.store.backend = backend.into();
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Service wiring
// ---------------------------------------------------------------------------

struct Stores {
    leads: Arc<dyn LeadStore>,
    emails: Arc<dyn EmailStore>,
}

async fn open_stores(config: &AppConfig) -> Result<Stores> {
    match config.store.backend {
        StoreBackend::Notion => {
            let store = Arc::new(RetryingStore::new(
                NotionStore::from_config(&config.notion)?,
                config.retry.clone(),
            ));
            info!(backend = "notion", "store ready");
            Ok(Stores {
                leads: store.clone(),
                emails: store,
            })
        }
        StoreBackend::Local => {
            let path = config.store.resolved_local_path()?;
            let store = Arc::new(RetryingStore::new(
                LocalStore::open(&path).await?,
                config.retry.clone(),
            ));
            info!(backend = "local", path = %path.display(), "store ready");
            Ok(Stores {
                leads: store.clone(),
                emails: store,
            })
        }
    }
}

fn ingestion_service(config: &AppConfig, stores: &Stores) -> Result<IngestionService> {
    let extractor = ContentExtractor::from_settings(config.crawl.clone())?;
    Ok(IngestionService::new(extractor, stores.leads.clone()))
}

fn draft_service(config: &AppConfig, stores: &Stores) -> Result<DraftService> {
    let generator = ChatCompletionsGenerator::from_config(&config.generation)?;
    info!(model = generator.model(), "generator ready");
    Ok(DraftService::new(
        stores.leads.clone(),
        stores.emails.clone(),
        Arc::new(generator),
        config.drafting.eligibility,
    ))
}

/// Resolves on Ctrl-C. Never resolves if the handler can't be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `work` with a token that the first `interrupt` cancels. Later
/// interrupts are ignored until `work` returns.
async fn run_cancellable<W, Fut, I, IFut, T>(work: W, interrupt: &I) -> T
where
    W: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
    I: Fn() -> IFut,
    IFut: Future<Output = ()>,
{
    let cancel = CancellationToken::new();
    let work = work(cancel.clone());
    tokio::pin!(work);
    loop {
        tokio::select! {
            biased;
            out = &mut work => return out,
            _ = interrupt(), if !cancel.is_cancelled() => {
                eprintln!("\n  Stopping after the current step...");
                cancel.cancel();
            }
        }
    }
}

/// Read commands line by line and emit one reply each.
///
/// An interrupt while a command runs cancels that command; one while
/// waiting for input ends the session, as does end of input.
async fn chat_loop<R, H, HFut, I, IFut>(
    input: R,
    handle: H,
    interrupt: I,
    mut emit: impl FnMut(&str),
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    H: Fn(String, CancellationToken) -> HFut,
    HFut: Future<Output = String>,
    I: Fn() -> IFut,
    IFut: Future<Output = ()>,
{
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            biased;
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => return Ok(()),
            },
            _ = interrupt() => {
                eprintln!();
                return Ok(());
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = run_cancellable(|cancel| handle(line, cancel), &interrupt).await;
        emit(&reply);
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_crawl(config: &AppConfig, url: &str) -> Result<()> {
    let stores = open_stores(config).await?;
    let ingest = ingestion_service(config, &stores)?;

    let spinner = spinner()?;
    spinner.set_message(format!("Crawling {url}"));
    let result = ingest.ingest_from_url(url).await;
    spinner.finish_and_clear();
    let outcome = result?;

    let action = match outcome.action {
        IngestAction::Created => "created",
        IngestAction::Merged => "updated",
    };
    println!();
    println!("  Lead {action}!");
    println!("  ID:      {}", outcome.lead.id);
    println!("  Name:    {}", outcome.lead.name.as_deref().unwrap_or("-"));
    println!(
        "  Email:   {}",
        outcome.lead.email_address.as_deref().unwrap_or("-")
    );
    println!("  Status:  {}", outcome.lead.contact_status);
    println!(
        "  Page:    {} ({} words)",
        outcome.page_title.as_deref().unwrap_or("-"),
        outcome.word_count
    );
    if outcome.extracted_emails.len() > 1 {
        println!("  Also on page: {}", outcome.extracted_emails[1..].join(", "));
    }
    println!();
    Ok(())
}

async fn cmd_draft(config: &AppConfig, lead_id: LeadId, prompt: &str) -> Result<()> {
    let stores = open_stores(config).await?;
    let drafts = draft_service(config, &stores)?;

    let spinner = spinner()?;
    spinner.set_message(format!("Drafting first contact email for lead {lead_id}"));
    let result = drafts.draft_for_lead(lead_id, prompt).await;
    spinner.finish_and_clear();
    let email = result?;

    print_email(&email);
    Ok(())
}

async fn cmd_draft_all(config: &AppConfig, prompt: &str) -> Result<()> {
    let stores = open_stores(config).await?;
    let drafts = draft_service(config, &stores)?;

    let progress = CliProgress::new()?;
    let (drafts, progress_ref) = (&drafts, &progress);
    let result = run_cancellable(
        |cancel| async move {
            drafts
                .draft_for_all_with_progress(prompt, &cancel, progress_ref)
                .await
        },
        &ctrl_c,
    )
    .await;
    progress.spinner.finish_and_clear();
    let report = result?;

    println!();
    println!("  Drafted: {}", report.drafted());
    println!("  Skipped: {} (already drafted)", report.skipped());
    println!("  Failed:  {}", report.failed());
    for (id, outcome) in &report.outcomes {
        if let Err(e) = outcome {
            if !matches!(e, onleads_shared::OnLeadsError::AlreadyDrafted(_)) {
                println!("    lead {id}: {e}");
            }
        }
    }
    if report.cancelled {
        println!("  Cancelled: {} lead(s) not started", report.not_started);
    }
    println!();
    Ok(())
}

async fn cmd_leads(config: &AppConfig, status: Option<ContactStatus>, json: bool) -> Result<()> {
    let stores = open_stores(config).await?;
    let leads = stores.leads.list_leads(status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&leads)?);
        return Ok(());
    }

    if leads.is_empty() {
        println!("No leads.");
        return Ok(());
    }
    println!("{:>6}  {:<10}  {:<32}  NAME", "ID", "STATUS", "EMAIL");
    for lead in &leads {
        println!(
            "{:>6}  {:<10}  {:<32}  {}",
            lead.id.0,
            lead.contact_status.as_str(),
            lead.email_address.as_deref().unwrap_or("-"),
            lead.name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn cmd_chat(config: &AppConfig) -> Result<()> {
    let stores = open_stores(config).await?;
    let dispatcher = Dispatcher::new(
        ingestion_service(config, &stores)?,
        draft_service(config, &stores)?,
    );

    eprintln!("OnLeads chat. Type /help for commands, Ctrl-C or Ctrl-D to quit.");
    let dispatcher = &dispatcher;
    chat_loop(
        BufReader::new(tokio::io::stdin()),
        |line, cancel| async move { dispatcher.handle(&line, &cancel).await },
        ctrl_c,
        |reply| println!("{reply}\n"),
    )
    .await
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_email(email: &Email) {
    println!();
    println!("  Email drafted!");
    println!("  Record:  {}", email.id);
    println!("  Subject: {}", email.object);
    println!();
    for line in email.text.lines() {
        println!("  {line}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

/// Batch progress on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = spinner()?;
        spinner.set_message("Listing eligible leads");
        Ok(Self { spinner })
    }
}

impl DraftProgress for CliProgress {
    fn started(&self, total: usize) {
        self.spinner
            .set_message(format!("Drafting first contact emails for {total} lead(s)"));
    }

    fn lead_done(
        &self,
        lead: LeadId,
        outcome: &onleads_shared::Result<Email>,
        current: usize,
        total: usize,
    ) {
        let state = match outcome {
            Ok(_) => "drafted",
            Err(onleads_shared::OnLeadsError::AlreadyDrafted(_)) => "skipped",
            Err(_) => "failed",
        };
        self.spinner
            .set_message(format!("[{current}/{total}] lead {lead} {state}"));
    }

    fn finished(&self, report: &BatchReport) {
        self.spinner.set_message(format!(
            "Done: {} drafted, {} failed",
            report.drafted(),
            report.failed()
        ));
    }
}
