//! Domain model for the wanimirror data mirror.
//!
//! This crate defines the entity shapes pulled from the upstream
//! spaced-repetition API, the filter descriptors the storage layer
//! queries by, the sync-result descriptor the orchestrator reports,
//! and the SRS stage-name mapping the read API projects with.
//!
//! It performs no I/O and carries no async machinery; every other
//! crate in the workspace depends on it.

mod entity;
mod filter;
pub mod srs;
mod sync;
pub mod timestamp;

pub use entity::{
    Assignment, AssignmentSnapshot, Meaning, Reading, Review, StatisticsSnapshot, Subject,
    SubjectData, SubjectKind,
};
pub use filter::{AssignmentFilter, DateRange, SubjectFilter, TimeRange};
pub use sync::{DataType, SyncResult};
