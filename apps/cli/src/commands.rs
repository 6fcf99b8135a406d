//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use papermill_core::batch::run_batch;
use papermill_core::pipeline::{Pipeline, ProgressReporter, RunOutcome};
use papermill_core::report;
use papermill_shared::{
    AppConfig, NewWorkItem, WorkItemStatus, expand_home, init_config, load_config,
    validate_api_key,
};
use papermill_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Papermill: research-backed text generation for writing orders.
#[derive(Parser)]
#[command(
    name = "papermill",
    version,
    about = "Search, scrape and generate articles or theses for writing orders.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Stage records `show` can print.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum View {
    Search,
    Sources,
    Selected,
    Structure,
    Content,
    Timeline,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create an order with one work item.
    Submit {
        /// Topic of the text.
        topic: String,

        /// Target length in characters.
        #[arg(short, long)]
        length: u32,

        /// Content type as written on the order (e.g. "blog article", "praca magisterska").
        #[arg(short = 't', long = "type", default_value = "article")]
        content_type: String,

        /// Language code of the text.
        #[arg(long, default_value = "en")]
        language: String,

        /// Writing style.
        #[arg(long)]
        style: Option<String>,

        /// Extra guidelines for the writer.
        #[arg(long)]
        guidelines: Option<String>,

        /// Keyword to weave in (repeatable).
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// URL to scrape before the search results (repeatable).
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Customer reference stored on the order.
        #[arg(long)]
        customer: Option<String>,

        /// Run the pipeline right away.
        #[arg(long)]
        run: bool,
    },

    /// Run (or resume) pipelines.
    Run {
        /// Work item ids.
        #[arg(required_unless_present = "pending", conflicts_with = "pending")]
        ids: Vec<String>,

        /// Run every pending work item.
        #[arg(long)]
        pending: bool,
    },

    /// Print the stage records of a work item as JSON.
    Show {
        /// Work item id.
        id: String,

        #[arg(long, value_enum, default_value = "timeline")]
        view: View,
    },

    /// Make a cancelled or failed work item runnable again.
    Reopen {
        /// Work item id.
        id: String,
    },

    /// List work items.
    List {
        /// Only items with this status (e.g. pending, completed, cancelled).
        #[arg(long)]
        status: Option<String>,
    },

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

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "papermill=info",
        1 => "papermill=debug",
        _ => "papermill=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Submit {
            topic,
            length,
            content_type,
            language,
            style,
            guidelines,
            keywords,
            sources,
            customer,
            run,
        } => {
            let new_item = NewWorkItem {
                topic,
                target_length: length,
                content_type,
                language,
                style,
                guidelines,
                keywords,
                source_hints: sources,
                ..Default::default()
            };
            cmd_submit(new_item, customer.as_deref(), run).await
        }
        Command::Run { ids, pending } => cmd_run(ids, pending).await,
        Command::Show { id, view } => cmd_show(&id, view).await,
        Command::Reopen { id } => cmd_reopen(&id).await,
        Command::List { status } => cmd_list(status.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.defaults.database_path)?;
    Ok(Arc::new(Storage::open(&path).await?))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_submit(mut new_item: NewWorkItem, customer: Option<&str>, run_now: bool) -> Result<()> {
    let config = load_config()?;
    if run_now {
        validate_api_key(&config)?;
    }
    new_item.validate()?;

    let storage = open_storage(&config).await?;
    let order = storage.create_order(customer).await?;
    let order_item = storage.create_order_item(&order.id).await?;
    new_item.order_id = Some(order.id.clone());
    new_item.order_item_id = Some(order_item.id.clone());

    let item = new_item.into_work_item()?;
    storage.create_work_item(&item).await?;

    info!(
        work_item_id = %item.id,
        order_id = %order.id,
        content_kind = %item.content_kind,
        "work item submitted"
    );

    println!();
    println!("  Work item submitted");
    println!("  ID:     {}", item.id);
    println!("  Order:  {}", order.id);
    println!("  Kind:   {}", item.content_kind);
    println!("  Length: {} characters", item.target_length);
    println!();

    if run_now {
        run_items(&config, storage, vec![item.id]).await?;
    }
    Ok(())
}

async fn cmd_run(ids: Vec<String>, pending: bool) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;
    let storage = open_storage(&config).await?;

    let ids = if pending {
        storage
            .list_work_items(Some(WorkItemStatus::Pending))
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect()
    } else {
        ids
    };

    if ids.is_empty() {
        println!("No work items to run.");
        return Ok(());
    }
    run_items(&config, storage, ids).await
}

async fn run_items(config: &AppConfig, storage: Arc<Storage>, ids: Vec<String>) -> Result<()> {
    let progress = Arc::new(CliProgress::new()?);
    let pipeline = Pipeline::from_config(storage, config)?.with_progress(progress.clone());

    if let [id] = ids.as_slice() {
        let result = pipeline.run(id).await;
        progress.finish();
        let outcome = result?;
        print_outcome(&outcome);
        return Ok(());
    }

    let summary = run_batch(
        Arc::new(pipeline),
        ids,
        config.defaults.max_concurrent_pipelines,
    )
    .await;
    progress.finish();

    println!();
    for outcome in &summary.succeeded {
        println!(
            "  ok      {}  {} characters",
            outcome.work_item_id, outcome.char_count
        );
    }
    for (id, message) in &summary.failed {
        println!("  failed  {id}  {message}");
    }
    println!();
    println!(
        "  {} of {} work items completed",
        summary.succeeded.len(),
        summary.total()
    );
    println!();

    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} work item(s) failed", summary.failed.len()))
    }
}

fn print_outcome(outcome: &RunOutcome) {
    println!();
    if outcome.already_completed {
        println!("  Work item was already completed");
    } else {
        println!("  Work item completed");
    }
    println!("  ID:      {}", outcome.work_item_id);
    println!("  Kind:    {}", outcome.content_kind);
    println!("  Text:    {} characters", outcome.char_count);
    println!("  Sources: {}", outcome.selected_sources);
    println!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
}

async fn cmd_show(id: &str, view: View) -> Result<()> {
    let config = load_config()?;
    let path = expand_home(&config.defaults.database_path)?;
    let storage = Storage::open_readonly(&path).await?;

    let json = match view {
        View::Search => serde_json::to_value(storage.get_search_result(id).await?)?,
        View::Sources => serde_json::to_value(storage.list_scraped_sources(id).await?)?,
        View::Selected => serde_json::json!({
            "selection": storage.get_selection(id).await?,
            "sources": storage.list_selected_sources(id).await?,
        }),
        View::Structure => serde_json::to_value(storage.get_structure(id).await?)?,
        View::Content => {
            let stages = report::stage_view(&storage, id).await?;
            match stages.content {
                Some(content) => serde_json::to_value(content)?,
                None => serde_json::to_value(stages.structure)?,
            }
        }
        View::Timeline => serde_json::to_value(report::timeline(&storage, id).await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn cmd_reopen(id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    storage.reopen_work_item(id).await?;
    let item = storage.require_work_item(id).await?;
    info!(work_item_id = id, status = %item.status, "work item reopened");
    println!("Work item {id} is {} again.", item.status);
    Ok(())
}

async fn cmd_list(status: Option<&str>) -> Result<()> {
    let status = status.map(str::parse::<WorkItemStatus>).transpose()?;
    let config = load_config()?;
    let path = expand_home(&config.defaults.database_path)?;
    let storage = Storage::open_readonly(&path).await?;

    let items = storage.list_work_items(status).await?;
    if items.is_empty() {
        println!("No work items.");
        return Ok(());
    }

    for item in items {
        println!(
            "{}  {:<22} {:<16} {:>7}  {}",
            item.id, item.status, item.content_kind, item.target_length, item.topic
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Ok(Self { spinner })
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, work_item_id: &str, stage: WorkItemStatus) {
        self.spinner
            .set_message(format!("[{}] {stage}", short_id(work_item_id)));
    }

    fn detail(&self, work_item_id: &str, message: &str) {
        self.spinner
            .set_message(format!("[{}] {message}", short_id(work_item_id)));
    }

    fn done(&self, outcome: &RunOutcome) {
        self.spinner.println(format!(
            "  done {} ({} characters)",
            outcome.work_item_id, outcome.char_count
        ));
    }
}

fn short_id(id: &str) -> &str {
    id.get(id.len().saturating_sub(8)..).unwrap_or(id)
}
