//! Convergence runtime: worker pool and poll loop.
//!
//! This crate provides:
//! - [`pool`] — bounded concurrent executor pool with per-item failure
//!   isolation and a hard end-of-round barrier
//! - [`poll`] — the poll/sleep loop that drives repeated rounds against a
//!   freshly re-read desired set

pub mod poll;
pub mod pool;

pub use poll::run_convergence;
pub use pool::{ItemOutcome, PoolConfig, RoundReport, WorkItem, WorkerPool};
