//! The console facade: one object wiring the store, trigger, live stream,
//! persisted logs, reconciler and deploy gate together the way the operator
//! view uses them.
//!
//! Selection routing lives here. Selecting a live build attaches the stream
//! (and, if configured, a fixed-cadence status poll); selecting a terminal
//! build detaches any stream and loads persisted logs instead. Each selection
//! owns a cancellation token so a superseded persisted fetch or poll never
//! writes after the operator has moved on.

use std::sync::Arc;
use std::time::Duration;

use kiln_common::{Build, BuildId, BuildStatus, Commit, LogLine, RepoRef};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{BuildApi, DeployReceipt, HttpBuildApi};
use crate::commits::{CommitSource, DEFAULT_COMMIT_LIMIT, GitHubCommitSource, ProxyCommitSource};
use crate::config::KilnConfig;
use crate::deploy::DeployGate;
use crate::errors::{
    BuildListError, CommitSourceError, DeployError, PersistedLogFetchError, ReconcileFetchError,
    SelectError, TriggerError,
};
use crate::history::PersistedLogFetcher;
use crate::reconciler::StatusReconciler;
use crate::store::BuildStore;
use crate::stream::{
    HeuristicPolicy, LiveSubscription, LogPolicy, LogStreamCoordinator, LogTransport,
    WsLogTransport,
};
use crate::trigger::BuildTrigger;

/// What the operator sees after selecting a build.
#[derive(Debug)]
pub enum SelectedView {
    /// The build is live; lines arrive through the store as they stream.
    Live(LiveSubscription),
    /// The build is finished; its persisted timeline was loaded.
    Historical {
        lines: Vec<LogLine>,
        error: Option<PersistedLogFetchError>,
    },
}

struct Selection {
    build_id: BuildId,
    cancel: CancellationToken,
}

pub struct Console {
    store: BuildStore,
    api: Arc<dyn BuildApi>,
    commits: Arc<dyn CommitSource>,
    trigger: BuildTrigger,
    reconciler: StatusReconciler,
    streams: LogStreamCoordinator,
    history: PersistedLogFetcher,
    gate: DeployGate,
    selection: Mutex<Option<Selection>>,
    poll_interval: Option<Duration>,
    commit_limit: usize,
    credential: Option<String>,
}

impl Console {
    pub fn new(
        api: Arc<dyn BuildApi>,
        transport: Arc<dyn LogTransport>,
        commits: Arc<dyn CommitSource>,
    ) -> Self {
        Self::with_policy(api, transport, commits, Arc::new(HeuristicPolicy))
    }

    pub fn with_policy(
        api: Arc<dyn BuildApi>,
        transport: Arc<dyn LogTransport>,
        commits: Arc<dyn CommitSource>,
        policy: Arc<dyn LogPolicy>,
    ) -> Self {
        let store = BuildStore::new();
        let reconciler = StatusReconciler::new(api.clone(), store.clone());
        Self {
            trigger: BuildTrigger::new(api.clone()),
            streams: LogStreamCoordinator::new(
                transport,
                store.clone(),
                reconciler.clone(),
                policy.clone(),
            ),
            history: PersistedLogFetcher::new(api.clone(), store.clone(), policy),
            gate: DeployGate::new(api.clone()),
            reconciler,
            store,
            api,
            commits,
            selection: Mutex::new(None),
            poll_interval: None,
            commit_limit: DEFAULT_COMMIT_LIMIT,
            credential: None,
        }
    }

    /// Wire the HTTP, websocket and commit-source implementations from
    /// resolved configuration.
    pub fn from_config(config: &KilnConfig) -> Self {
        let api = Arc::new(HttpBuildApi::new(&config.api_url, config.token.clone()));
        let transport = Arc::new(WsLogTransport::new(&config.api_url, config.token.clone()));
        let commits: Arc<dyn CommitSource> = if config.toml.commits.use_proxy {
            Arc::new(ProxyCommitSource::new(&config.api_url, config.token.clone()))
        } else {
            Arc::new(GitHubCommitSource::new(&config.toml.commits.github_api_url))
        };
        Self::new(api, transport, commits)
            .with_poll_interval(config.poll_interval())
            .with_commit_limit(config.toml.commits.limit)
            .with_credential(config.github_token.clone())
    }

    pub fn with_poll_interval(mut self, every: Option<Duration>) -> Self {
        self.poll_interval = every;
        self
    }

    pub fn with_commit_limit(mut self, limit: usize) -> Self {
        self.commit_limit = limit;
        self
    }

    /// Repository credential forwarded on build start.
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn store(&self) -> &BuildStore {
        &self.store
    }

    pub async fn recent_commits(&self, repo: &RepoRef) -> Result<Vec<Commit>, CommitSourceError> {
        self.commits.recent_commits(repo, self.commit_limit).await
    }

    /// Start a build for `commit` and register it as pending.
    pub async fn trigger_build(&self, repo: &RepoRef, commit: &Commit) -> Result<BuildId, TriggerError> {
        let build_id = self
            .trigger
            .trigger(repo, commit, self.credential.as_deref())
            .await?;
        self.store
            .register(Build::new(build_id.clone(), commit.hash.clone(), commit.title()));
        Ok(build_id)
    }

    /// Merge the backend's build list into the store. Returns the store's
    /// builds, newest first.
    pub async fn refresh_builds(&self, repo: &RepoRef) -> Result<Vec<Build>, BuildListError> {
        let summaries = self.api.list_builds(repo).await?;
        for summary in &summaries {
            self.store.register(Build::new(
                summary.workflow_id.clone(),
                summary.commit_id.clone(),
                summary.commit_message.clone(),
            ));
            self.reconciler.absorb_summary(summary);
        }
        debug!(repo = %repo.slug(), count = summaries.len(), "build list refreshed");
        Ok(self.store.list())
    }

    /// Route the view for `build_id` to the live stream or persisted logs.
    pub async fn select(&self, build_id: &BuildId) -> Result<SelectedView, SelectError> {
        let status = self
            .store
            .status(build_id)
            .ok_or_else(|| SelectError::UnknownBuild(build_id.clone()))?;

        let cancel = CancellationToken::new();
        {
            let mut selection = self.selection.lock().await;
            if let Some(previous) = selection.take() {
                debug!(from = %previous.build_id, to = %build_id, "selection changed");
                previous.cancel.cancel();
            }

            if !status.is_terminal() {
                let subscription = self.streams.attach(build_id).await?;
                if let Some(every) = self.poll_interval {
                    self.spawn_poll(build_id, every, cancel.clone());
                }
                *selection = Some(Selection {
                    build_id: build_id.clone(),
                    cancel,
                });
                return Ok(SelectedView::Live(subscription));
            }

            // A terminal build never shares its timeline with a live stream.
            self.streams.detach().await;
            *selection = Some(Selection {
                build_id: build_id.clone(),
                cancel: cancel.clone(),
            });
        }

        info!(build_id = %build_id, status = %status, "loading persisted logs");
        let current_lines = || {
            self.store
                .get(build_id)
                .map(|b| b.lines().to_vec())
                .unwrap_or_default()
        };
        let view = match self.history.load(build_id, &cancel).await {
            Ok(Some(lines)) => SelectedView::Historical { lines, error: None },
            Ok(None) => SelectedView::Historical {
                lines: current_lines(),
                error: None,
            },
            Err(e) => SelectedView::Historical {
                lines: current_lines(),
                error: Some(e),
            },
        };
        Ok(view)
    }

    fn spawn_poll(&self, build_id: &BuildId, every: Duration, cancel: CancellationToken) {
        let reconciler = self.reconciler.clone();
        let build_id = build_id.clone();
        tokio::spawn(async move {
            let status = reconciler.poll_until_terminal(&build_id, every, cancel).await;
            debug!(build_id = %build_id, status = ?status, "status poll finished");
        });
    }

    /// One reconcile for `build_id`.
    pub async fn reconcile(&self, build_id: &BuildId) -> Result<Option<BuildStatus>, ReconcileFetchError> {
        self.reconciler.reconcile(build_id).await
    }

    pub async fn deploy(&self, build_id: &BuildId, ingress_enabled: bool) -> Result<DeployReceipt, DeployError> {
        let build = self
            .store
            .get(build_id)
            .ok_or_else(|| DeployError::UnknownBuild(build_id.clone()))?;
        self.gate.submit(&build, ingress_enabled).await
    }

    /// Close the live stream, stop background work and evict every build.
    pub async fn teardown(&self) {
        if let Some(selection) = self.selection.lock().await.take() {
            selection.cancel.cancel();
        }
        self.streams.detach().await;
        self.store.evict_all();
    }
}
