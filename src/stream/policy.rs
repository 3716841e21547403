use kiln_common::{LogDraft, LogLevel};

use super::frame::Frame;

/// Diagnostic the workflow executor's wait container prints when the build
/// step's process exits. Carries no information for the operator.
pub const SUBPROCESS_EXIT_NOISE: &str = r#"msg="sub-process exited" argo=true error="<nil>""#;

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "exception"];
const WARNING_KEYWORDS: &[&str] = &["warn"];
const SUCCESS_KEYWORDS: &[&str] = &["success", "completed", "done"];

/// Level classification and noise filtering for log text. Shared by the live
/// and persisted paths so both produce the same timeline shape.
pub trait LogPolicy: Send + Sync {
    fn classify(&self, text: &str) -> LogLevel;
    fn is_noise(&self, text: &str) -> bool;
}

/// Keyword heuristic. Case-insensitive; error beats warning beats success.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPolicy;

impl LogPolicy for HeuristicPolicy {
    fn classify(&self, text: &str) -> LogLevel {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(ERROR_KEYWORDS) {
            LogLevel::Error
        } else if has(WARNING_KEYWORDS) {
            LogLevel::Warning
        } else if has(SUCCESS_KEYWORDS) {
            LogLevel::Success
        } else {
            LogLevel::Info
        }
    }

    fn is_noise(&self, text: &str) -> bool {
        let trimmed = text.trim();
        // The executor prefixes its lines with `time=... level=info`.
        trimmed.is_empty() || trimmed.ends_with(SUBPROCESS_EXIT_NOISE)
    }
}

/// Decode a raw frame and turn it into a log line, or `None` when the frame
/// is empty or noise.
pub fn normalize(raw: &str, policy: &dyn LogPolicy) -> Option<LogDraft> {
    let frame = Frame::decode(raw);
    let content = frame.content();
    if policy.is_noise(content) {
        return None;
    }
    Some(LogDraft::new(
        content,
        policy.classify(content),
        frame.source_format(),
    ))
}
