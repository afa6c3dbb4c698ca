//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use capwatch_core::pipeline::{CapabilityWatch, ProgressReporter, discover_sources};
use capwatch_core::{Classifier, FallbackClassifier, OpenRouterClassifier, Registry};
use capwatch_crawler::Fetcher;
use capwatch_discovery::DiscoveryOptions;
use capwatch_shared::{
    AppConfig, CapwatchError, CrawlConfig, CrawlResult, classifier_api_key, expand_home,
    init_config, load_config, validate_priority,
};
use capwatch_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// capwatch: track what competitors ship.
#[derive(Parser)]
#[command(
    name = "capwatch",
    version,
    about = "Crawl competitor release notes and docs, detect changes, and record capability events.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides `defaults.db_path`).
    #[arg(long, env = "CAPWATCH_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List registered competitors.
    Competitors {
        /// Only competitors at or above this tier (1 = most important).
        #[arg(short, long)]
        priority: Option<u8>,
    },

    /// Discover candidate sources per competitor without crawling.
    Discover {
        /// Highest priority tier to include.
        #[arg(short, long)]
        priority: Option<u8>,
    },

    /// Run one crawl: discover, fetch, diff, classify, store.
    Crawl {
        /// Highest priority tier to include.
        #[arg(short, long)]
        priority: Option<u8>,

        /// Crawl at most this many source URLs.
        #[arg(long)]
        max_urls: Option<usize>,

        /// Skip the LLM and store fallback classifications.
        #[arg(long)]
        no_llm: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show recent capability events.
    Events {
        /// Number of events to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Include summary bullets and evidence.
        #[arg(short, long)]
        detail: bool,

        /// Print events as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show event totals and the last completed run.
    Status,

    /// Crawl on a fixed interval until interrupted.
    Watch {
        /// Minutes between runs (overrides `schedule.interval_minutes`).
        #[arg(long)]
        interval_minutes: Option<u64>,

        /// Highest priority tier to include.
        #[arg(short, long)]
        priority: Option<u8>,

        /// Skip the LLM and store fallback classifications.
        #[arg(long)]
        no_llm: bool,
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
        0 => "capwatch=info",
        1 => "capwatch=debug",
        _ => "capwatch=trace",
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
    let db = cli.db;
    match cli.command {
        Command::Competitors { priority } => cmd_competitors(priority).await,
        Command::Discover { priority } => cmd_discover(priority).await,
        Command::Crawl {
            priority,
            max_urls,
            no_llm,
            json,
        } => cmd_crawl(db, priority, max_urls, no_llm, json).await,
        Command::Events {
            limit,
            detail,
            json,
        } => cmd_events(db, limit, detail, json).await,
        Command::Status => cmd_status(db).await,
        Command::Watch {
            interval_minutes,
            priority,
            no_llm,
        } => cmd_watch(db, interval_minutes, priority, no_llm).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// Resolve the database path: `--db`, then config, then default.
fn resolve_db_path(db: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(expand_home(&config.defaults.db_path)?),
    }
}

/// Resolve and check the priority tier: flag, then config default.
fn resolve_priority(priority: Option<u8>, config: &AppConfig) -> Result<u8> {
    let priority = priority.unwrap_or(config.defaults.priority);
    validate_priority(priority)?;
    Ok(priority)
}

/// Pick the classifier backend from config and flags.
fn build_classifier(config: &AppConfig, no_llm: bool) -> Result<Arc<dyn Classifier>> {
    if no_llm {
        info!("LLM classification disabled by --no-llm");
        return Ok(Arc::new(FallbackClassifier));
    }

    match config.classifier.provider.as_str() {
        "none" => Ok(Arc::new(FallbackClassifier)),
        "openrouter" => match classifier_api_key(config) {
            Some(key) => Ok(Arc::new(OpenRouterClassifier::new(&config.classifier, key)?)),
            None => {
                warn!(
                    env = %config.classifier.api_key_env,
                    "classifier API key not set, events will use fallback classification"
                );
                Ok(Arc::new(FallbackClassifier))
            }
        },
        other => Err(eyre!(
            "unknown classifier provider '{other}': expected 'openrouter' or 'none'"
        )),
    }
}

/// Open the store read-write and assemble the crawl service.
async fn open_watch(config: &AppConfig, db: Option<PathBuf>, no_llm: bool) -> Result<CapabilityWatch> {
    let db_path = resolve_db_path(db, config)?;
    let storage = Storage::open(&db_path).await?;
    let classifier = build_classifier(config, no_llm)?;
    info!(db = %db_path.display(), classifier = classifier.name(), "store opened");

    Ok(CapabilityWatch::new(
        Registry::from_config(config),
        storage,
        CrawlConfig::from(config),
        classifier,
    )?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_competitors(priority: Option<u8>) -> Result<()> {
    let config = load_config()?;
    let registry = Registry::from_config(&config);
    let max_priority = match priority {
        Some(p) => {
            validate_priority(p)?;
            p
        }
        None => capwatch_shared::MAX_PRIORITY,
    };

    println!();
    println!("  {:<24} {:<12} {:<9} {:<8} URL", "NAME", "CATEGORY", "PRIORITY", "ENABLED");
    for c in registry.all().iter().filter(|c| c.priority <= max_priority) {
        println!(
            "  {:<24} {:<12} {:<9} {:<8} {}",
            c.name,
            c.category,
            c.priority,
            if c.enabled { "yes" } else { "no" },
            c.base_url
        );
    }
    println!();
    Ok(())
}

async fn cmd_discover(priority: Option<u8>) -> Result<()> {
    let config = load_config()?;
    let priority = resolve_priority(priority, &config)?;
    let crawl_config = CrawlConfig::from(&config);
    let fetcher = Fetcher::new(&crawl_config)?;

    info!(priority, "discovering sources");

    let reporter = CliProgress::new();
    let groups = discover_sources(
        &Registry::from_config(&config),
        &fetcher,
        &DiscoveryOptions::from(&crawl_config),
        priority,
        &reporter,
    )
    .await?;
    reporter.finish();

    for group in &groups {
        let c = &group.competitor;
        println!();
        println!(
            "  {} ({}, priority {}): {}",
            c.name, c.category, c.priority, c.description
        );
        if let Some(reason) = &group.failure {
            println!("    discovery failed: {reason}");
        }
        if group.sources.is_empty() {
            println!("    no sources");
        }
        for source in &group.sources {
            println!("    [{}] {}  {}", source.category, source.label, source.url);
        }
    }
    println!();

    let failed = groups.iter().filter(|g| g.failure.is_some()).count();
    let total: usize = groups.iter().map(|g| g.sources.len()).sum();
    println!(
        "  {total} sources across {} competitors ({failed} discovery failures)",
        groups.len()
    );
    println!();
    Ok(())
}

async fn cmd_crawl(
    db: Option<PathBuf>,
    priority: Option<u8>,
    max_urls: Option<usize>,
    no_llm: bool,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let priority = resolve_priority(priority, &config)?;
    let watch = open_watch(&config, db, no_llm).await?;

    let reporter = CliProgress::new();
    let result = watch.crawl(priority, max_urls, &reporter).await;
    reporter.finish();
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_crawl_result(&result);
    }
    Ok(())
}

fn print_crawl_result(result: &CrawlResult) {
    println!();
    println!("  Crawl {}", result.status);
    println!("  Competitors: {}", result.competitors.join(", "));
    println!("  Events:      {}", result.events_created);
    println!("  Crawled:     {}", result.sources_crawled);
    println!("  Failed:      {}", result.sources_failed);
    println!("  Time:        {:.1}s", result.duration_seconds);
    println!();
}

async fn cmd_events(db: Option<PathBuf>, limit: u32, detail: bool, json: bool) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&resolve_db_path(db, &config)?).await?;
    let events = storage.list_events(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No capability events recorded yet.");
        return Ok(());
    }

    println!();
    for event in &events {
        println!(
            "  {}  {:<22} {:<20} {:<15} {}",
            event.created_at.format("%Y-%m-%d %H:%M"),
            event.competitor,
            event.theme,
            event.change_type,
            event.claim
        );
        if detail {
            if !event.heading.is_empty() {
                println!("      Section:  {} ({})", event.heading, event.change_origin);
            }
            for bullet in &event.beginner_summary {
                println!("      - {bullet}");
            }
            println!("      Evidence: {} [{}]", event.evidence_url, event.source_category);
            println!();
        }
    }
    if !detail {
        println!();
    }
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&resolve_db_path(db, &config)?).await?;
    let report = storage.status_report().await?;

    println!();
    println!("  Total events: {}", report.total_events);
    match report.last_run_at {
        Some(at) => println!("  Last run:     {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last run:     never"),
    }

    if !report.per_competitor.is_empty() {
        println!();
        println!("  By competitor:");
        for (name, count) in &report.per_competitor {
            println!("    {name:<24} {count}");
        }
    }
    if !report.per_theme.is_empty() {
        println!();
        println!("  Top themes:");
        for (theme, count) in &report.per_theme {
            println!("    {theme:<24} {count}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_watch(
    db: Option<PathBuf>,
    interval_minutes: Option<u64>,
    priority: Option<u8>,
    no_llm: bool,
) -> Result<()> {
    let config = load_config()?;
    let priority = resolve_priority(priority, &config)?;
    let minutes = interval_minutes.unwrap_or(config.schedule.interval_minutes);
    if minutes == 0 {
        return Err(eyre!("interval must be at least one minute"));
    }

    let watch = Arc::new(open_watch(&config, db, no_llm).await?);
    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(priority, interval_minutes = minutes, "watching, press Ctrl-C to stop");

    let mut in_flight = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(handle) = watch.spawn_scheduled_run(priority) {
                    in_flight = Some(handle);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                break;
            }
        }
    }

    if let Some(handle) = in_flight.filter(|h| !h.is_finished()) {
        info!("waiting for the in-flight crawl to finish");
        match handle.await {
            Ok(Err(CapwatchError::AlreadyRunning)) | Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "last crawl failed"),
            Err(e) => warn!(error = %e, "crawl task aborted"),
        }
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
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn competitor_discovered(&self, competitor: &str, sources: usize) {
        self.spinner
            .set_message(format!("{competitor}: {sources} sources"));
    }

    fn source_done(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Crawled [{current}/{total}] {url}"));
    }

    fn done(&self, _result: &CrawlResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_crawl_flags() {
        let cli = Cli::try_parse_from([
            "capwatch", "--db", "/tmp/x.db", "-vv", "crawl", "--priority", "2", "--max-urls", "5",
            "--no-llm",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Command::Crawl {
                priority,
                max_urls,
                no_llm,
                json,
            } => {
                assert_eq!(priority, Some(2));
                assert_eq!(max_urls, Some(5));
                assert!(no_llm);
                assert!(!json);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn priority_falls_back_to_config() {
        let mut config = AppConfig::default();
        config.defaults.priority = 2;
        assert_eq!(resolve_priority(None, &config).unwrap(), 2);
        assert_eq!(resolve_priority(Some(3), &config).unwrap(), 3);
        assert!(resolve_priority(Some(0), &config).is_err());
    }

    #[test]
    fn no_llm_and_missing_key_use_fallback() {
        let mut config = AppConfig::default();
        assert_eq!(build_classifier(&config, true).unwrap().name(), "fallback");

        config.classifier.api_key_env = "CAPWATCH_TEST_KEY_THAT_IS_NEVER_SET".into();
        assert_eq!(build_classifier(&config, false).unwrap().name(), "fallback");

        config.classifier.provider = "mystery".into();
        assert!(build_classifier(&config, false).is_err());
    }
}
