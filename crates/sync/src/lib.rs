//! Sync orchestration and read-side query shaping.
//!
//! [`SyncService`] drives the incremental pull pipeline: single-flight
//! guarded, strictly ordered (subjects → assignments → reviews →
//! statistics), advancing per-type watermarks only on success so a
//! failed step resumes from its last known-good point. After a fully
//! successful run it derives the daily assignment distribution.
//!
//! [`query::QueryService`] shapes stored rows for the read API: joins
//! assignments and reviews with their subjects and projects daily
//! snapshot rows into the nested date → stage → type map.

mod error;
mod orchestrator;
pub mod query;
mod upstream;

pub use error::SyncError;
pub use orchestrator::{SyncRun, SyncService};
pub use upstream::Upstream;
