//! In-memory build table: the single source of truth for status, duration and
//! log lines shown to the operator.
//!
//! `BuildStore` is a cheap clonable handle. Every mutation takes the inner
//! lock for exactly one step and never holds it across an await. Writes made
//! on behalf of a subscription or fetch carry that operation's
//! [`CancellationToken`], which is checked inside the lock so a superseded
//! source can never land a write after it was cancelled.
//!
//! Writers are crate-private: only the reconciler changes status, and only the
//! live coordinator and persisted fetcher touch log lines.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use kiln_common::{Build, BuildId, BuildStatus, LogDraft, LogLine, StatusChange};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 1024;

/// Change notifications published by the store, in mutation order.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Registered {
        build_id: BuildId,
    },
    LineAppended {
        build_id: BuildId,
        line: LogLine,
    },
    /// The build's log source changed and its timeline was replaced wholesale.
    LinesReset {
        build_id: BuildId,
        lines: Vec<LogLine>,
    },
    StatusChanged {
        build_id: BuildId,
        from: BuildStatus,
        to: BuildStatus,
    },
}

impl StoreEvent {
    pub fn build_id(&self) -> &BuildId {
        match self {
            Self::Registered { build_id }
            | Self::LineAppended { build_id, .. }
            | Self::LinesReset { build_id, .. }
            | Self::StatusChanged { build_id, .. } => build_id,
        }
    }
}

#[derive(Default)]
struct StoreInner {
    builds: HashMap<BuildId, Build>,
    /// Registration order, newest last.
    order: Vec<BuildId>,
}

#[derive(Clone)]
pub struct BuildStore {
    inner: Arc<Mutex<StoreInner>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for BuildStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildStore {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic mid-mutation leaves at worst a partially appended timeline.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Insert a build if its id is not already present. Returns `true` when
    /// the build was newly registered.
    pub fn register(&self, build: Build) -> bool {
        let mut inner = self.lock();
        if inner.builds.contains_key(&build.id) {
            return false;
        }
        let build_id = build.id.clone();
        inner.order.push(build_id.clone());
        inner.builds.insert(build_id.clone(), build);
        self.publish(StoreEvent::Registered { build_id });
        true
    }

    pub fn contains(&self, build_id: &BuildId) -> bool {
        self.lock().builds.contains_key(build_id)
    }

    /// Snapshot of one build.
    pub fn get(&self, build_id: &BuildId) -> Option<Build> {
        self.lock().builds.get(build_id).cloned()
    }

    pub fn status(&self, build_id: &BuildId) -> Option<BuildStatus> {
        self.lock().builds.get(build_id).map(|b| b.status())
    }

    /// Snapshot of all builds, most recently registered first.
    pub fn list(&self) -> Vec<Build> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.builds.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every build. Used when the enclosing view is torn down.
    pub fn evict_all(&self) {
        let mut inner = self.lock();
        inner.builds.clear();
        inner.order.clear();
    }

    /// Append one line unless `cancel` has fired. Returns the stored line.
    pub(crate) fn append_line(
        &self,
        build_id: &BuildId,
        cancel: &CancellationToken,
        draft: LogDraft,
    ) -> Option<LogLine> {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return None;
        }
        let build = inner.builds.get_mut(build_id)?;
        let line = build.push_line(draft);
        self.publish(StoreEvent::LineAppended {
            build_id: build_id.clone(),
            line: line.clone(),
        });
        Some(line)
    }

    /// Replace the build's whole timeline unless `cancel` has fired.
    pub(crate) fn replace_lines(
        &self,
        build_id: &BuildId,
        cancel: &CancellationToken,
        drafts: Vec<LogDraft>,
    ) -> bool {
        let mut inner = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        let Some(build) = inner.builds.get_mut(build_id) else {
            return false;
        };
        build.reset_lines(drafts);
        self.publish(StoreEvent::LinesReset {
            build_id: build_id.clone(),
            lines: build.lines().to_vec(),
        });
        true
    }

    /// Apply a reconciled status and timestamps. Returns `None` for unknown
    /// builds.
    pub(crate) fn apply_status(
        &self,
        build_id: &BuildId,
        status: Option<BuildStatus>,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Option<StatusChange> {
        let mut inner = self.lock();
        let build = inner.builds.get_mut(build_id)?;
        build.set_timestamps(started_at, finished_at);
        let change = match status {
            Some(status) => build.apply_status(status),
            None => StatusChange::Unchanged,
        };
        if let StatusChange::Advanced { from, to } = change {
            self.publish(StoreEvent::StatusChanged {
                build_id: build_id.clone(),
                from,
                to,
            });
        }
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::{LogLevel, SourceFormat};

    fn build(id: &str) -> Build {
        Build::new(BuildId::from(id), "abc1234", "Add health check")
    }

    fn draft(msg: &str) -> LogDraft {
        LogDraft::new(msg, LogLevel::Info, SourceFormat::Plain)
    }

    #[test]
    fn test_register_is_idempotent_per_id() {
        let store = BuildStore::new();
        assert!(store.register(build("wf-1")));
        assert!(!store.register(build("wf-1")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_is_newest_first() {
        let store = BuildStore::new();
        store.register(build("wf-1"));
        store.register(build("wf-2"));
        let ids: Vec<String> = store.list().iter().map(|b| b.id.to_string()).collect();
        assert_eq!(ids, vec!["wf-2", "wf-1"]);
    }

    #[test]
    fn test_append_is_skipped_after_cancellation() {
        let store = BuildStore::new();
        let id = BuildId::from("wf-1");
        store.register(build("wf-1"));
        let token = CancellationToken::new();

        assert!(store.append_line(&id, &token, draft("first")).is_some());
        token.cancel();
        assert!(store.append_line(&id, &token, draft("stale")).is_none());

        let lines = store.get(&id).unwrap().lines().to_vec();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message, "first");
    }

    #[test]
    fn test_append_to_unknown_build_is_noop() {
        let store = BuildStore::new();
        let token = CancellationToken::new();
        assert!(store.append_line(&BuildId::from("nope"), &token, draft("x")).is_none());
    }

    #[test]
    fn test_replace_lines_discards_previous_timeline() {
        let store = BuildStore::new();
        let id = BuildId::from("wf-1");
        store.register(build("wf-1"));
        let token = CancellationToken::new();
        store.append_line(&id, &token, draft("live line"));

        assert!(store.replace_lines(&id, &token, vec![draft("persisted 1"), draft("persisted 2")]));
        let messages: Vec<String> = store
            .get(&id)
            .unwrap()
            .lines()
            .iter()
            .map(|l| l.message.clone())
            .collect();
        assert_eq!(messages, vec!["persisted 1", "persisted 2"]);
    }

    #[test]
    fn test_apply_status_rejects_regression() {
        let store = BuildStore::new();
        let id = BuildId::from("wf-1");
        store.register(build("wf-1"));
        store.apply_status(&id, Some(BuildStatus::Failed), None, None);
        let change = store.apply_status(&id, Some(BuildStatus::Running), None, None);
        assert!(matches!(change, Some(StatusChange::Rejected { .. })));
        assert_eq!(store.status(&id), Some(BuildStatus::Failed));
    }

    #[tokio::test]
    async fn test_events_follow_mutation_order() {
        let store = BuildStore::new();
        let mut rx = store.subscribe();
        let id = BuildId::from("wf-1");
        let token = CancellationToken::new();

        store.register(build("wf-1"));
        store.append_line(&id, &token, draft("hello"));
        store.apply_status(&id, Some(BuildStatus::Running), None, None);

        assert!(matches!(rx.recv().await.unwrap(), StoreEvent::Registered { .. }));
        match rx.recv().await.unwrap() {
            StoreEvent::LineAppended { line, .. } => assert_eq!(line.message, "hello"),
            other => panic!("Expected LineAppended, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            StoreEvent::StatusChanged { from, to, .. } => {
                assert_eq!(from, BuildStatus::Pending);
                assert_eq!(to, BuildStatus::Running);
            }
            other => panic!("Expected StatusChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_evict_all_empties_store() {
        let store = BuildStore::new();
        store.register(build("wf-1"));
        store.evict_all();
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }
}
