//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tokio::sync::watch;
use tracing::info;

use snapvault_core::{FetchPipeline, IndexPipeline};
use snapvault_encoder::Encoder;
use snapvault_runtime::RoundReport;
use snapvault_shared::{AppConfig, init_config, load_config};
use snapvault_store::SearchIndex;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Snapvault — fetch images, embed them, search them.
#[derive(Parser)]
#[command(
    name = "snapvault",
    version,
    about = "Ingest images by URL into a content-addressed vault and make them searchable.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the fetch pipeline: download listed URLs into the vault.
    Fetch {
        /// URL list file (overrides config).
        #[arg(long)]
        url_file: Option<String>,

        /// Vault directory (overrides config).
        #[arg(long)]
        vault: Option<String>,

        /// Run a single round and exit instead of polling forever.
        #[arg(long)]
        once: bool,
    },

    /// Run the index pipeline: embed vault objects into the search index.
    Index {
        /// Vault directory (overrides config).
        #[arg(long)]
        vault: Option<String>,

        /// Run a single round and exit instead of polling forever.
        #[arg(long)]
        once: bool,
    },

    /// Search indexed images with a text query.
    Search {
        /// Free-text query, embedded and matched by vector similarity.
        query: String,

        /// Number of results to return (overrides config).
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
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
        0 => "snapvault=info,snapvault_core=info,snapvault_runtime=info,snapvault_store=info,snapvault_encoder=info",
        1 => "snapvault=debug,snapvault_core=debug,snapvault_runtime=debug,snapvault_store=debug,snapvault_encoder=debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
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
        Command::Fetch {
            url_file,
            vault,
            once,
        } => cmd_fetch(url_file.as_deref(), vault.as_deref(), once).await,
        Command::Index { vault, once } => cmd_index(vault.as_deref(), once).await,
        Command::Search { query, top_k } => cmd_search(&query, top_k).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Summary printed after a `--once` round.
fn print_report(pipeline: &str, report: &RoundReport) {
    println!();
    println!("  {pipeline} round complete!");
    println!("  Written: {}", report.written);
    println!("  Skipped: {}", report.skipped);
    println!("  Failed:  {}", report.failed.len());
    for (item, error) in &report.failed {
        println!("    {item}: {error}");
    }
    println!();
}

/// Flip a shutdown signal on ctrl-c so in-flight rounds drain cleanly.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = tx.send(true);
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_fetch(url_file: Option<&str>, vault: Option<&str>, once: bool) -> Result<()> {
    let mut config = load_config()?;
    if let Some(path) = url_file {
        config.fetch.url_file = path.to_string();
    }
    if let Some(dir) = vault {
        config.fetch.vault_dir = dir.to_string();
    }
    config.validate()?;

    let pipeline = FetchPipeline::new(&config.fetch)?;

    if once {
        let report = pipeline.run_round().await?;
        print_report("fetch", &report);
        return Ok(());
    }

    info!(
        url_file = %config.fetch.url_file,
        vault = %config.fetch.vault_dir,
        concurrency = config.fetch.concurrency,
        poll_seconds = config.fetch.poll_seconds,
        "starting fetch daemon"
    );
    pipeline.run(shutdown_signal()).await;
    Ok(())
}

async fn cmd_index(vault: Option<&str>, once: bool) -> Result<()> {
    let mut config = load_config()?;
    if let Some(dir) = vault {
        config.index.vault_dir = dir.to_string();
    }
    config.validate()?;

    let encoder = Encoder::new(&config.encoder)?;
    let search_index = SearchIndex::new(&config.search_index)?;
    let pipeline = IndexPipeline::new(&config.index, encoder, search_index).await?;

    if once {
        let report = pipeline.run_round().await?;
        print_report("index", &report);
        return Ok(());
    }

    info!(
        vault = %config.index.vault_dir,
        concurrency = config.index.concurrency,
        poll_seconds = config.index.poll_seconds,
        "starting index daemon"
    );
    pipeline.run(shutdown_signal()).await;
    Ok(())
}

async fn cmd_search(query: &str, top_k: Option<usize>) -> Result<()> {
    let config = load_config()?;
    config.validate()?;
    let k = top_k.unwrap_or(config.search_index.top_k);

    let encoder = Encoder::new(&config.encoder)?;
    let search_index = SearchIndex::new(&config.search_index)?;

    let vector = encoder.encode_text(query).await?;
    let hits = search_index
        .knn_search(&vector, k, config.search_index.knn_candidates)
        .await?;

    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{:>3}. {:.4}  {}", rank + 1, hit.score, hit.path);
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
