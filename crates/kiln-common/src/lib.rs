//! Shared domain types for the kiln build coordinator.
//!
//! Everything in this crate is plain data plus the invariants that belong to
//! it (status monotonicity, append-only log ordering, duration derivation).
//! Transport, storage and scheduling live in the `kiln` crate.

pub mod build;
pub mod commit;
pub mod duration;
pub mod log;

pub use build::{Build, BuildId, BuildStatus, StatusChange};
pub use commit::{Commit, RepoRef};
pub use duration::{IN_PROGRESS, format_duration, format_span};
pub use log::{LogDraft, LogLevel, LogLine, SourceFormat};
