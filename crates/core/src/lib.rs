//! The two Snapvault pipeline instantiations.
//!
//! Both are the same convergence shape — re-read a desired set, filter by
//! content key, drain the pending work through a bounded pool, sleep,
//! repeat — instantiated over different sources and sinks:
//! - [`fetch`] — URL list → local image vault, keyed by URL identity
//! - [`index`] — vault scan → vector document store, keyed by payload

pub mod fetch;
pub mod index;

pub use fetch::FetchPipeline;
pub use index::IndexPipeline;
