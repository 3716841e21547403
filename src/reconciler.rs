//! Status reconciliation: the only writer of build status and timestamps.
//!
//! Two triggers feed the same idempotent entry point, [`StatusReconciler::reconcile`]:
//! the live stream closing, and an optional fixed-cadence poll while a build
//! is live. Both behave identically. A failed fetch is logged and leaves the
//! last known status in place.

use std::sync::Arc;
use std::time::Duration;

use kiln_common::{BuildId, BuildStatus, StatusChange};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{BuildApi, BuildSummary, parse_timestamp};
use crate::errors::ReconcileFetchError;
use crate::store::BuildStore;

#[derive(Clone)]
pub struct StatusReconciler {
    api: Arc<dyn BuildApi>,
    store: BuildStore,
}

impl StatusReconciler {
    pub fn new(api: Arc<dyn BuildApi>, store: BuildStore) -> Self {
        Self { api, store }
    }

    /// Fetch the authoritative status for `build_id` and write it into the
    /// store. Returns the build's status after the write, or `None` when the
    /// build is not registered.
    pub async fn reconcile(&self, build_id: &BuildId) -> Result<Option<BuildStatus>, ReconcileFetchError> {
        let remote = match self.api.build_status(build_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "status fetch failed, keeping last known status");
                return Err(e);
            }
        };

        let status = BuildStatus::from_remote_phase(&remote.phase);
        if status.is_none() && !remote.phase.is_empty() {
            debug!(build_id = %build_id, phase = %remote.phase, "unrecognized build phase");
        }
        self.write(
            build_id,
            status,
            parse_timestamp(remote.started_at.as_deref()),
            parse_timestamp(remote.finished_at.as_deref()),
        );
        Ok(self.store.status(build_id))
    }

    /// Promote a pending build to running once the live stream shows activity.
    pub fn observe_running(&self, build_id: &BuildId) {
        if self.store.status(build_id) == Some(BuildStatus::Pending) {
            self.write(build_id, Some(BuildStatus::Running), None, None);
        }
    }

    /// Absorb one row of the build list. The list carries a start time and a
    /// status but no finish time.
    pub fn absorb_summary(&self, summary: &BuildSummary) {
        self.write(
            &summary.workflow_id,
            BuildStatus::from_remote_phase(&summary.status),
            parse_timestamp(summary.start_time.as_deref()),
            None,
        );
    }

    fn write(
        &self,
        build_id: &BuildId,
        status: Option<BuildStatus>,
        started_at: Option<chrono::DateTime<chrono::Utc>>,
        finished_at: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        match self.store.apply_status(build_id, status, started_at, finished_at) {
            None => debug!(build_id = %build_id, "reconciled build is not registered"),
            Some(StatusChange::Advanced { from, to }) => {
                info!(build_id = %build_id, from = %from, to = %to, "build status changed");
            }
            Some(StatusChange::Rejected { current, attempted }) => {
                debug!(
                    build_id = %build_id,
                    current = %current,
                    attempted = %attempted,
                    "ignoring status regression"
                );
            }
            Some(StatusChange::Unchanged) => {}
        }
    }

    /// Reconcile on a fixed cadence until the build is terminal or `cancel`
    /// fires. Returns the last known status.
    pub async fn poll_until_terminal(
        &self,
        build_id: &BuildId,
        every: Duration,
        cancel: CancellationToken,
    ) -> Option<BuildStatus> {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // Errors are already logged; the next tick retries.
            if let Ok(Some(status)) = self.reconcile(build_id).await
                && status.is_terminal()
            {
                return Some(status);
            }
        }
        self.store.status(build_id)
    }
}
