//! Application layer: the refresh pipeline and everything that drives it.
//!
//! Raw rows flow `normalizer` → `merger` → (`filter`, `metrics`) inside one
//! `pipeline` refresh. `sync` decides when to refresh from change-feed
//! traffic; `mutation` writes back to sources and refreshes afterwards.

pub mod filter;
pub mod merger;
pub mod metrics;
pub mod mutation;
pub mod normalizer;
pub mod pipeline;
pub mod sync;
