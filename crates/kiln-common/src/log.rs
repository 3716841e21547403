use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity attached to a log line for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Where a line's text came from. Diagnostic only; never affects ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Decoded from a structured (JSON object) frame.
    Structured,
    /// Raw text: a plain stream frame or a line of a persisted log blob.
    Plain,
    /// Generated by the coordinator itself (connection notices, errors).
    Synthetic,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Plain => "plain",
            Self::Synthetic => "synthetic",
        }
    }
}

/// One unit of build output as stored on a [`crate::Build`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    /// Arrival order within the build. Strictly increasing, never reused.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    pub source_format: SourceFormat,
}

/// A log line before the owning build assigns its sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDraft {
    pub message: String,
    pub level: LogLevel,
    pub source_format: SourceFormat,
    /// Fixed timestamp for the line; `None` stamps it on arrival.
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogDraft {
    pub fn new(message: impl Into<String>, level: LogLevel, source_format: SourceFormat) -> Self {
        Self {
            message: message.into(),
            level,
            source_format,
            timestamp: None,
        }
    }

    pub fn synthetic(message: impl Into<String>, level: LogLevel) -> Self {
        Self::new(message, level, SourceFormat::Synthetic)
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
