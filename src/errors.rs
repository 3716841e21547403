//! Typed error hierarchy for the build coordinator.
//!
//! One enum per component boundary:
//! - `TriggerError`: a build could not be started
//! - `StreamTransportError`: the live log connection failed or dropped
//! - `ReconcileFetchError`: the status poll failed (recovered fail-soft)
//! - `PersistedLogFetchError`: historical log retrieval failed
//! - `DeployError`: deploy gate refusal or remote rejection
//! - `CommitSourceError`: commit listing failed
//! - `AttachError` / `SelectError`: selection-level failures

use kiln_common::{BuildId, BuildStatus};
use thiserror::Error;

/// Errors from submitting a build request.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Private repository {repo} requires a credential token")]
    MissingCredential { repo: String },

    #[error("Invalid repository request: {0}")]
    InvalidRepository(String),

    #[error("Build start rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Build start request failed: {0}")]
    Transport(String),
}

/// Errors from the live log transport.
#[derive(Debug, Error)]
pub enum StreamTransportError {
    #[error("Invalid stream address: {0}")]
    InvalidAddress(String),

    #[error("Failed to connect to log stream: {0}")]
    Connect(String),

    #[error("Log stream dropped: {0}")]
    Protocol(String),
}

/// Errors from fetching remote build status.
#[derive(Debug, Error)]
pub enum ReconcileFetchError {
    #[error("Status request failed: {0}")]
    Request(String),

    #[error("Status endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode status response: {0}")]
    Decode(String),
}

/// Errors from fetching a persisted log blob.
#[derive(Debug, Error)]
pub enum PersistedLogFetchError {
    #[error("Log request failed: {0}")]
    Request(String),

    #[error("Log endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode log response: {0}")]
    Decode(String),
}

/// Errors from the deploy gate.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Build {build_id} is not deployable (status: {status})")]
    NotDeployable { build_id: BuildId, status: BuildStatus },

    #[error("Build {0} is not known to this console")]
    UnknownBuild(BuildId),

    #[error("{message}")]
    DeployFailed { message: String },
}

/// Errors from listing commits.
#[derive(Debug, Error)]
pub enum CommitSourceError {
    #[error("Commit request failed: {0}")]
    Request(String),

    #[error("Commit source returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode commit list: {0}")]
    Decode(String),
}

/// Errors from attaching the live log slot.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Build {0} is not known to this console")]
    UnknownBuild(BuildId),

    #[error("Build {build_id} is no longer live (status: {status})")]
    NotLive { build_id: BuildId, status: BuildStatus },
}

/// Errors from selecting a build for viewing.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Build {0} is not known to this console")]
    UnknownBuild(BuildId),

    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// Errors from listing builds for a repository.
#[derive(Debug, Error)]
pub enum BuildListError {
    #[error("Build list request failed: {0}")]
    Request(String),

    #[error("Build list endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode build list: {0}")]
    Decode(String),
}
