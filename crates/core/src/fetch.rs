//! Fetch pipeline: URL list → content-addressed vault.
//!
//! The desired set is a newline-delimited URL file re-read in full every
//! round. Each pending URL is keyed by identity ([`ObjectKey`]) before any
//! I/O, filtered against the vault, downloaded under bounded concurrency,
//! and committed with the vault's create-once put.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use url::Url;

use snapvault_runtime::{ItemOutcome, PoolConfig, RoundReport, WorkerPool, run_convergence};
use snapvault_shared::{FetchConfig, ObjectKey, Result, SnapvaultError};
use snapvault_store::{PutOutcome, Vault};

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!("Snapvault/", env!("CARGO_PKG_VERSION"));

/// Long-lived fetch pipeline instance.
pub struct FetchPipeline {
    vault: Vault,
    client: reqwest::Client,
    url_file: PathBuf,
    pool: WorkerPool,
    interval: Duration,
}

impl FetchPipeline {
    /// Build the pipeline: open the vault, build the shared HTTP client,
    /// and validate pool settings. The only fatal failure point.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let vault = Vault::open(&config.vault_dir)?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SnapvaultError::Network(format!("failed to build HTTP client: {e}")))?;

        let pool = WorkerPool::new(PoolConfig {
            concurrency: config.concurrency,
            // Backstop over the whole item; the client timeout normally
            // fires first.
            item_timeout: Some(Duration::from_secs(config.request_timeout_secs + 5)),
        })?;

        Ok(Self {
            vault,
            client,
            url_file: PathBuf::from(&config.url_file),
            pool,
            interval: Duration::from_secs(config.poll_seconds),
        })
    }

    /// The vault this pipeline writes into.
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// One convergence round: re-read the URL list, filter out URLs whose
    /// key is already committed, download the rest.
    #[instrument(skip_all, fields(url_file = %self.url_file.display()))]
    pub async fn run_round(&self) -> Result<RoundReport> {
        let urls = read_url_list(&self.url_file)?;

        let pending: Vec<String> = urls
            .into_iter()
            .filter(|u| !self.vault.exists(&ObjectKey::from_identity(u)))
            .collect();

        debug!(pending = pending.len(), "computed pending work");

        let vault = self.vault.clone();
        let client = self.client.clone();
        let report = self
            .pool
            .run(pending, move |url: String| {
                let vault = vault.clone();
                let client = client.clone();
                async move { fetch_one(&client, &vault, &url).await }
            })
            .await;

        Ok(report)
    }

    /// Run rounds forever, sleeping `poll_seconds` between them, until
    /// `shutdown` flips true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        run_convergence("fetch", self.interval, shutdown, || self.run_round()).await;
    }
}

/// Download one URL and commit it under its identity key.
async fn fetch_one(client: &reqwest::Client, vault: &Vault, url: &str) -> Result<ItemOutcome> {
    let key = ObjectKey::from_identity(url);

    // Re-check right before the expensive work: a previous round, or a
    // sibling process instance, may have committed this key already.
    if vault.exists(&key) {
        return Ok(ItemOutcome::Skipped);
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SnapvaultError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SnapvaultError::Network(format!("{url}: HTTP {status}")));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SnapvaultError::Network(format!("{url}: body read failed: {e}")))?;

    match vault.put(&key, &bytes)? {
        PutOutcome::Created => Ok(ItemOutcome::Written),
        PutOutcome::AlreadyPresent => Ok(ItemOutcome::Skipped),
    }
}

/// Read the desired set: one URL per line, blank lines ignored, lines
/// that do not parse as URLs logged and dropped.
fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| SnapvaultError::io(path, e))?;

    let mut urls = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Url::parse(line) {
            Ok(_) => urls.push(line.to_string()),
            Err(e) => warn!(line, error = %e, "skipping malformed URL"),
        }
    }
    Ok(urls)
}
