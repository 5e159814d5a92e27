//! Poll-driven convergence loop shared by both pipelines.
//!
//! One round: rebuild the desired set from its external source, process
//! the pending work through the pool, report counts, sleep, repeat. The
//! loop only ever stops on the external shutdown signal; a round that
//! fails outright (for example the URL list is missing this poll) is
//! logged and retried after the usual sleep.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use snapvault_shared::Result;

use crate::pool::RoundReport;

/// Drive rounds of `round` every `interval` until `shutdown` flips true.
///
/// `round` re-reads the desired set in full on every call — there is no
/// cross-round cache, so a source that shrank or changed between polls is
/// always honored. Rounds are strictly sequential; a new one begins only
/// after the previous barrier and sleep have both completed.
pub async fn run_convergence<F, Fut>(
    pipeline: &str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut round: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RoundReport>>,
{
    info!(pipeline, interval_secs = interval.as_secs(), "convergence loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            result = round() => match result {
                Ok(report) => log_round(pipeline, &report),
                Err(error) => warn!(pipeline, %error, "round failed, will retry next poll"),
            },
            _ = shutdown.changed() => {
                // In-flight executors are aborted with the round future;
                // idempotent puts make abandoned items safe to retry.
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!(pipeline, "convergence loop stopped");
}

/// Per-round observability: zero-work rounds are normal, not errors.
fn log_round(pipeline: &str, report: &RoundReport) {
    if report.attempted() == 0 {
        debug!(pipeline, "round complete, nothing to do");
        return;
    }
    info!(
        pipeline,
        written = report.written,
        skipped = report.skipped,
        failed = report.failed.len(),
        "round complete"
    );
}
