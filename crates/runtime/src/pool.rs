//! Bounded worker pool with per-item failure isolation.
//!
//! The pool drains a pre-loaded queue of work items through a fixed number
//! of concurrent executors. One item failing (or timing out) never
//! disturbs its siblings, and [`WorkerPool::run`] returns only once every
//! item has reached a terminal outcome — the round barrier.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use snapvault_shared::{Result, SnapvaultError};

// ---------------------------------------------------------------------------
// Work items & outcomes
// ---------------------------------------------------------------------------

/// A unit of work submitted for one round. Only needs to name itself for
/// failure reporting; processing order across items is unspecified.
pub trait WorkItem: Send + 'static {
    /// Identity used in logs and failure reports.
    fn identity(&self) -> String;
}

impl WorkItem for String {
    fn identity(&self) -> String {
        self.clone()
    }
}

impl WorkItem for std::path::PathBuf {
    fn identity(&self) -> String {
        self.display().to_string()
    }
}

/// Terminal outcome of successfully processing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A new entry was committed to the durable store.
    Written,
    /// The entry already existed; nothing was written.
    Skipped,
}

// ---------------------------------------------------------------------------
// Pool configuration & round report
// ---------------------------------------------------------------------------

/// Worker pool tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum simultaneous in-flight items. Must be at least 1.
    pub concurrency: usize,
    /// Abandon an in-flight item after this long and count it failed.
    pub item_timeout: Option<Duration>,
}

/// Summary of one drained round.
#[derive(Debug, Default)]
pub struct RoundReport {
    /// Items that committed a new store entry.
    pub written: usize,
    /// Items skipped because their entry already existed.
    pub skipped: usize,
    /// Items that failed, with identity and error.
    pub failed: Vec<(String, SnapvaultError)>,
}

impl RoundReport {
    /// Total items that reached a terminal outcome this round.
    pub fn attempted(&self) -> usize {
        self.written + self.skipped + self.failed.len()
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Fixed-width executor pool shared by both pipelines.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    /// Create a pool. Zero concurrency is a configuration error and is
    /// rejected here, at startup, rather than surfacing mid-round.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(SnapvaultError::config("pool concurrency must be at least 1"));
        }
        Ok(Self { config })
    }

    /// Process every item through `process`, at most `concurrency` at a
    /// time. Returns after all items have terminated (success, failure,
    /// or timeout). `process` owns the existence check and idempotent
    /// write for its item's content key; the pool only bounds concurrency
    /// and guarantees exhaustive attempt.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, process: F) -> RoundReport
    where
        T: WorkItem,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ItemOutcome>> + Send + 'static,
    {
        if items.is_empty() {
            return RoundReport::default();
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let process = Arc::new(process);
        let written = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(Mutex::new(Vec::new()));
        let item_timeout = self.config.item_timeout;

        let mut executors = JoinSet::new();
        for _ in 0..self.config.concurrency {
            let queue = queue.clone();
            let process = process.clone();
            let written = written.clone();
            let skipped = skipped.clone();
            let failed = failed.clone();

            executors.spawn(async move {
                loop {
                    let item = { queue.lock().await.pop_front() };
                    let Some(item) = item else { break };
                    let identity = item.identity();

                    let result = match item_timeout {
                        Some(limit) => match tokio::time::timeout(limit, process(item)).await {
                            Ok(result) => result,
                            Err(_) => Err(SnapvaultError::Timeout(limit)),
                        },
                        None => process(item).await,
                    };

                    match result {
                        Ok(ItemOutcome::Written) => {
                            debug!(item = %identity, "written");
                            written.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ItemOutcome::Skipped) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => {
                            warn!(item = %identity, %error, "item failed");
                            failed.lock().await.push((identity, error));
                        }
                    }
                }
            });
        }

        // The barrier: every executor has drained out. A panicking
        // process future takes down only its executor; the queue keeps
        // draining through the remaining ones.
        while let Some(joined) = executors.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "executor aborted");
            }
        }

        RoundReport {
            written: written.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
            failed: Arc::try_unwrap(failed)
                .map(Mutex::into_inner)
                .unwrap_or_default(),
        }
    }
}
