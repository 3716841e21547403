use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::format_duration;
use crate::log::{LogDraft, LogLine};

/// Opaque build identifier assigned by the trigger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuildId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BuildId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    /// Map the backend's workflow phase vocabulary onto a local status.
    ///
    /// Matching is case-insensitive. `Error` is a failure of the workflow
    /// engine itself and is reported as `Failed`. Unknown phases yield `None`
    /// so the caller keeps whatever status it already had.
    pub fn from_remote_phase(phase: &str) -> Option<Self> {
        match phase.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(Self::Pending),
            "running" | "in_progress" => Some(Self::Running),
            "succeeded" | "success" | "completed" => Some(Self::Succeeded),
            "failed" | "failure" | "error" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid build status: {}", s)),
        }
    }
}

/// Result of asking a build to move to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Advanced { from: BuildStatus, to: BuildStatus },
    Unchanged,
    /// The move would regress the build (or leave a terminal state).
    Rejected { current: BuildStatus, attempted: BuildStatus },
}

/// One build attempt for one commit.
#[derive(Debug, Clone, Serialize)]
pub struct Build {
    pub id: BuildId,
    pub commit_hash: String,
    pub commit_message: String,
    status: BuildStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: String,
    log_lines: Vec<LogLine>,
    #[serde(skip)]
    next_sequence: u64,
}

impl Build {
    pub fn new(id: BuildId, commit_hash: impl Into<String>, commit_message: impl Into<String>) -> Self {
        Self {
            id,
            commit_hash: commit_hash.into(),
            commit_message: commit_message.into(),
            status: BuildStatus::Pending,
            started_at: None,
            finished_at: None,
            duration: format_duration(None, None),
            log_lines: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn duration(&self) -> &str {
        &self.duration
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.log_lines
    }

    /// A build is live until a terminal status has been reconciled.
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_deployable(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }

    /// Move forward through `pending → running → {succeeded|failed}`.
    /// Terminal states are final.
    pub fn apply_status(&mut self, to: BuildStatus) -> StatusChange {
        let from = self.status;
        if from == to {
            return StatusChange::Unchanged;
        }
        if from.is_terminal() || to.rank() < from.rank() {
            return StatusChange::Rejected {
                current: from,
                attempted: to,
            };
        }
        self.status = to;
        StatusChange::Advanced { from, to }
    }

    /// Record reconciled timestamps and re-derive the duration.
    ///
    /// `None` leaves a previously known timestamp in place.
    pub fn set_timestamps(&mut self, started_at: Option<DateTime<Utc>>, finished_at: Option<DateTime<Utc>>) {
        if started_at.is_some() {
            self.started_at = started_at;
        }
        if finished_at.is_some() {
            self.finished_at = finished_at;
        }
        self.duration = format_duration(self.started_at, self.finished_at);
    }

    /// Append a line at the end of the timeline and return the stored copy.
    pub fn push_line(&mut self, draft: LogDraft) -> LogLine {
        let line = LogLine {
            sequence: self.next_sequence,
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            message: draft.message,
            level: draft.level,
            source_format: draft.source_format,
        };
        self.next_sequence += 1;
        self.log_lines.push(line.clone());
        line
    }

    /// Discard the whole timeline and repopulate it from a new source.
    /// Sequence numbers keep counting up from where the old timeline ended.
    pub fn reset_lines(&mut self, drafts: impl IntoIterator<Item = LogDraft>) {
        self.log_lines.clear();
        for draft in drafts {
            self.push_line(draft);
        }
    }
}
