//! In-memory test doubles for the `BuildApi`, `LogTransport` and
//! `CommitSource` seams.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::{self, BoxStream, StreamExt};
use kiln_common::{BuildId, Commit, RepoRef};
use tokio::sync::Notify;

use crate::api::{
    BuildApi, BuildSummary, DeployReceipt, DeployRequest, PersistedLogs, RemoteStatus,
    StartBuildRequest,
};
use crate::commits::CommitSource;
use crate::errors::{
    BuildListError, CommitSourceError, DeployError, PersistedLogFetchError, ReconcileFetchError,
    StreamTransportError, TriggerError,
};
use crate::stream::{FrameStream, LogTransport};

// ── BuildApi ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockBuildApi {
    pub next_build_id: Mutex<Option<String>>,
    pub start_rejection: Mutex<Option<(u16, String)>>,
    pub start_requests: Mutex<Vec<StartBuildRequest>>,
    pub builds: Mutex<Vec<BuildSummary>>,
    pub statuses: Mutex<HashMap<BuildId, Result<RemoteStatus, String>>>,
    pub logs: Mutex<HashMap<BuildId, Result<PersistedLogs, String>>>,
    pub deploy_rejection: Mutex<Option<String>>,
    pub deploy_requests: Mutex<Vec<DeployRequest>>,
    pub status_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
    /// When set, `persisted_logs` waits for a permit before answering.
    pub log_gate: Mutex<Option<Arc<Notify>>>,
    /// Signalled each time a `persisted_logs` call starts.
    pub log_started: Notify,
}

impl MockBuildApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_next_build_id(&self, id: &str) {
        *self.next_build_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn set_status(&self, id: &str, phase: &str, started_at: Option<&str>, finished_at: Option<&str>) {
        self.statuses.lock().unwrap().insert(
            BuildId::from(id),
            Ok(RemoteStatus {
                phase: phase.to_string(),
                started_at: started_at.map(str::to_string),
                finished_at: finished_at.map(str::to_string),
            }),
        );
    }

    pub fn fail_status(&self, id: &str, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(BuildId::from(id), Err(message.to_string()));
    }

    pub fn set_logs(&self, id: &str, logs: &str, start_time: Option<&str>) {
        self.logs.lock().unwrap().insert(
            BuildId::from(id),
            Ok(PersistedLogs {
                logs: logs.to_string(),
                start_time: start_time.map(str::to_string),
                end_time: None,
            }),
        );
    }

    pub fn fail_logs(&self, id: &str, message: &str) {
        self.logs
            .lock()
            .unwrap()
            .insert(BuildId::from(id), Err(message.to_string()));
    }

    /// Hold every persisted log fetch until the returned gate is notified.
    pub fn gate_logs(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.log_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn deploy_count(&self) -> usize {
        self.deploy_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl BuildApi for MockBuildApi {
    async fn start_build(&self, request: &StartBuildRequest) -> Result<BuildId, TriggerError> {
        self.start_requests.lock().unwrap().push(request.clone());
        if let Some((status, message)) = self.start_rejection.lock().unwrap().clone() {
            return Err(TriggerError::Rejected { status, message });
        }
        let id = self
            .next_build_id
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "wf-mock".to_string());
        Ok(BuildId::from(id))
    }

    async fn list_builds(&self, _repo: &RepoRef) -> Result<Vec<BuildSummary>, BuildListError> {
        Ok(self.builds.lock().unwrap().clone())
    }

    async fn build_status(&self, build_id: &BuildId) -> Result<RemoteStatus, ReconcileFetchError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().get(build_id) {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(message)) => Err(ReconcileFetchError::Request(message.clone())),
            None => Err(ReconcileFetchError::Status {
                status: 404,
                message: "build not found".to_string(),
            }),
        }
    }

    async fn persisted_logs(
        &self,
        build_id: &BuildId,
    ) -> Result<PersistedLogs, PersistedLogFetchError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        self.log_started.notify_one();
        let gate = self.log_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.logs.lock().unwrap().get(build_id) {
            Some(Ok(logs)) => Ok(logs.clone()),
            Some(Err(message)) => Err(PersistedLogFetchError::Request(message.clone())),
            None => Ok(PersistedLogs::default()),
        }
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployReceipt, DeployError> {
        self.deploy_requests.lock().unwrap().push(request.clone());
        if let Some(message) = self.deploy_rejection.lock().unwrap().clone() {
            return Err(DeployError::DeployFailed { message });
        }
        Ok(DeployReceipt {
            message: Some("deployed".to_string()),
        })
    }
}

// ── LogTransport ──────────────────────────────────────────────────────

/// One scripted step of a mock live stream.
#[derive(Debug, Clone)]
pub enum Scripted {
    Frame(String),
    Error(String),
    /// Keep the connection open until the subscriber goes away.
    Hold,
}

pub fn frames(items: &[&str]) -> Vec<Scripted> {
    items.iter().map(|s| Scripted::Frame(s.to_string())).collect()
}

#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<BuildId, Vec<Scripted>>>,
    refuse: Mutex<HashSet<BuildId>>,
    pub connects: Mutex<Vec<BuildId>>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, id: &str, steps: Vec<Scripted>) {
        self.scripts.lock().unwrap().insert(BuildId::from(id), steps);
    }

    pub fn refuse(&self, id: &str) {
        self.refuse.lock().unwrap().insert(BuildId::from(id));
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .map(|id| id.to_string())
            .collect()
    }
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct GuardedStream {
    inner: BoxStream<'static, Result<String, StreamTransportError>>,
    _guard: OpenGuard,
}

impl Stream for GuardedStream {
    type Item = Result<String, StreamTransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[async_trait]
impl LogTransport for MockTransport {
    async fn connect(&self, build_id: &BuildId) -> Result<FrameStream, StreamTransportError> {
        self.connects.lock().unwrap().push(build_id.clone());
        if self.refuse.lock().unwrap().contains(build_id) {
            return Err(StreamTransportError::Connect("connection refused".to_string()));
        }
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .get(build_id)
            .cloned()
            .unwrap_or_default();

        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        let guard = OpenGuard(self.open.clone());

        let hold = matches!(steps.last(), Some(Scripted::Hold));
        let items: Vec<Result<String, StreamTransportError>> = steps
            .into_iter()
            .filter_map(|step| match step {
                Scripted::Frame(text) => Some(Ok(text)),
                Scripted::Error(msg) => Some(Err(StreamTransportError::Protocol(msg))),
                Scripted::Hold => None,
            })
            .collect();
        let inner = if hold {
            stream::iter(items).chain(stream::pending()).boxed()
        } else {
            stream::iter(items).boxed()
        };
        Ok(Box::pin(GuardedStream {
            inner,
            _guard: guard,
        }))
    }
}

// ── CommitSource ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockCommitSource {
    pub commits: Mutex<Vec<Commit>>,
}

#[async_trait]
impl CommitSource for MockCommitSource {
    async fn recent_commits(&self, _repo: &RepoRef, limit: usize) -> Result<Vec<Commit>, CommitSourceError> {
        Ok(self.commits.lock().unwrap().iter().take(limit).cloned().collect())
    }
}

pub fn commit(hash: &str, message: &str) -> Commit {
    Commit {
        hash: hash.to_string(),
        message: message.to_string(),
        author: "dev".to_string(),
        date: None,
    }
}
