//! Historical logs for builds that are no longer live.

use std::sync::Arc;

use chrono::Utc;
use kiln_common::{BuildId, LogDraft, LogLevel, LogLine, SourceFormat};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{BuildApi, PersistedLogs, parse_timestamp};
use crate::errors::PersistedLogFetchError;
use crate::store::BuildStore;
use crate::stream::LogPolicy;

pub const NO_LOGS_LINE: &str = "No logs recorded for this build";

pub struct PersistedLogFetcher {
    api: Arc<dyn BuildApi>,
    store: BuildStore,
    policy: Arc<dyn LogPolicy>,
}

impl PersistedLogFetcher {
    pub fn new(api: Arc<dyn BuildApi>, store: BuildStore, policy: Arc<dyn LogPolicy>) -> Self {
        Self { api, store, policy }
    }

    /// Fetch the stored log blob for `build_id` and replace the build's
    /// timeline with it.
    ///
    /// Returns the new timeline, or `Ok(None)` when `cancel` fired first and
    /// nothing was written. On a failed fetch the timeline is replaced by a
    /// single error line and the error is returned as well.
    pub async fn load(
        &self,
        build_id: &BuildId,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LogLine>>, PersistedLogFetchError> {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(build_id = %build_id, "persisted log fetch superseded");
                return Ok(None);
            }
            fetched = self.api.persisted_logs(build_id) => fetched,
        };

        let (drafts, outcome) = match fetched {
            Ok(logs) => (split_persisted(&logs, self.policy.as_ref()), Ok(())),
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "failed to load build logs");
                let line = LogDraft::synthetic(format!("Failed to load build logs: {}", e), LogLevel::Error);
                (vec![line], Err(e))
            }
        };

        if !self.store.replace_lines(build_id, cancel, drafts) {
            return outcome.map(|_| None);
        }
        outcome?;
        Ok(self.store.get(build_id).map(|b| b.lines().to_vec()))
    }
}

/// Split a persisted log blob into timeline lines. The blob carries no
/// per-line timestamps, so every line gets the build's start time (or end
/// time, or now).
pub fn split_persisted(logs: &PersistedLogs, policy: &dyn LogPolicy) -> Vec<LogDraft> {
    let stamp = parse_timestamp(logs.start_time.as_deref())
        .or_else(|| parse_timestamp(logs.end_time.as_deref()))
        .unwrap_or_else(Utc::now);

    let drafts: Vec<LogDraft> = logs
        .logs
        .lines()
        .map(str::trim_end)
        .filter(|line| !policy.is_noise(line))
        .map(|line| LogDraft::new(line, policy.classify(line), SourceFormat::Plain).at(stamp))
        .collect();

    if drafts.is_empty() {
        return vec![LogDraft::synthetic(NO_LOGS_LINE, LogLevel::Info).at(stamp)];
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{HeuristicPolicy, SUBPROCESS_EXIT_NOISE};
    use crate::testing::MockBuildApi;
    use kiln_common::{Build, SourceFormat};

    fn setup() -> (Arc<MockBuildApi>, BuildStore, PersistedLogFetcher) {
        let api = MockBuildApi::new();
        let store = BuildStore::new();
        store.register(Build::new(BuildId::from("wf-1"), "abc1234", "Init"));
        let fetcher = PersistedLogFetcher::new(api.clone(), store.clone(), Arc::new(HeuristicPolicy));
        (api, store, fetcher)
    }

    #[test]
    fn test_split_uses_single_timestamp_and_classifies() {
        let logs = PersistedLogs {
            logs: format!(
                "Cloning...\n\nnpm WARN old lockfile\n{}\nBuild failed\r\n",
                SUBPROCESS_EXIT_NOISE
            ),
            start_time: Some("2025-01-01T10:00:00Z".to_string()),
            end_time: Some("2025-01-01T10:05:00Z".to_string()),
        };
        let drafts = split_persisted(&logs, &HeuristicPolicy);

        let messages: Vec<&str> = drafts.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["Cloning...", "npm WARN old lockfile", "Build failed"]);
        let levels: Vec<LogLevel> = drafts.iter().map(|d| d.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warning, LogLevel::Error]);

        let stamp = parse_timestamp(Some("2025-01-01T10:00:00Z"));
        assert!(drafts.iter().all(|d| d.timestamp == stamp));
        assert!(drafts.iter().all(|d| d.source_format == SourceFormat::Plain));
    }

    #[test]
    fn test_split_keeps_json_looking_lines_verbatim() {
        let raw = r#"{"level":"info","message":"listening"}"#;
        let logs = PersistedLogs {
            logs: format!("{}\nserver ready", raw),
            start_time: Some("2025-01-01T10:00:00Z".to_string()),
            end_time: None,
        };
        let drafts = split_persisted(&logs, &HeuristicPolicy);

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].message, raw);
        assert_eq!(drafts[0].source_format, SourceFormat::Plain);
        assert_eq!(drafts[0].level, LogLevel::Info);
    }

    #[test]
    fn test_split_falls_back_to_end_time() {
        let logs = PersistedLogs {
            logs: "only line".to_string(),
            start_time: None,
            end_time: Some("2025-01-01 10:05:00".to_string()),
        };
        let drafts = split_persisted(&logs, &HeuristicPolicy);
        assert_eq!(drafts[0].timestamp, parse_timestamp(Some("2025-01-01T10:05:00Z")));
    }

    #[test]
    fn test_empty_blob_yields_placeholder() {
        let drafts = split_persisted(&PersistedLogs::default(), &HeuristicPolicy);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].message, NO_LOGS_LINE);
        assert_eq!(drafts[0].source_format, SourceFormat::Synthetic);
    }

    #[tokio::test]
    async fn test_load_replaces_live_lines() {
        let (api, store, fetcher) = setup();
        let id = BuildId::from("wf-1");
        let token = CancellationToken::new();
        store.append_line(&id, &token, LogDraft::synthetic("live only", LogLevel::Info));
        api.set_logs("wf-1", "step one\nstep two", Some("2025-01-01T10:00:00Z"));

        let lines = fetcher.load(&id, &token).await.unwrap().unwrap();
        let messages: Vec<&str> = lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["step one", "step two"]);
        assert_eq!(store.get(&id).unwrap().lines().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_single_error_line() {
        let (api, store, fetcher) = setup();
        let id = BuildId::from("wf-1");
        api.fail_logs("wf-1", "503 from storage");

        let err = fetcher.load(&id, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PersistedLogFetchError::Request(_)));
        let lines = store.get(&id).unwrap().lines().to_vec();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].message.starts_with("Failed to load build logs:"));
        assert_eq!(lines[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_cancelled_load_writes_nothing() {
        let (api, store, fetcher) = setup();
        let id = BuildId::from("wf-1");
        api.set_logs("wf-1", "stale", None);
        let token = CancellationToken::new();
        token.cancel();

        assert!(fetcher.load(&id, &token).await.unwrap().is_none());
        assert!(store.get(&id).unwrap().lines().is_empty());
        assert_eq!(api.log_calls(), 0);
    }

    #[tokio::test]
    async fn test_load_cancelled_mid_fetch_writes_nothing() {
        let (api, store, fetcher) = setup();
        let id = BuildId::from("wf-1");
        api.set_logs("wf-1", "late answer", None);
        let gate = api.gate_logs();
        let token = CancellationToken::new();

        let switch = async {
            api.log_started.notified().await;
            token.cancel();
            gate.notify_one();
        };
        let (loaded, ()) = tokio::join!(fetcher.load(&id, &token), switch);

        assert!(loaded.unwrap().is_none());
        assert_eq!(api.log_calls(), 1);
        assert!(store.get(&id).unwrap().lines().is_empty());
    }
}
