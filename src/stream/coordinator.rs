//! The single live-log slot.
//!
//! `attach` hands out a [`LiveSubscription`] bound to one build id. Attaching
//! again (to any build) cancels the previous pump task and waits for it to
//! release its transport before the new one connects, so at most one live
//! connection exists at any time. Every store write made by a pump carries the
//! pump's cancellation token; once superseded it cannot touch the store.

use std::sync::Arc;

use futures::StreamExt;
use kiln_common::{BuildId, LogDraft, LogLevel};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::LogTransport;
use super::policy::{LogPolicy, normalize};
use crate::errors::AttachError;
use crate::reconciler::StatusReconciler;
use crate::store::BuildStore;

pub const CONNECTING_LINE: &str = "Connecting to live log stream…";
pub const CONNECTED_LINE: &str = "Connected to live log stream";
pub const COMPLETED_LINE: &str = "Log stream completed";

/// Lifecycle of one live subscription. Ordered so callers can wait for "at
/// least" a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    /// Transport released and, unless cancelled, status reconciled.
    Closed,
}

/// How a pump task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The remote closed the stream.
    Completed,
    /// Connect failed or the connection dropped.
    TransportError(String),
    /// Superseded by another attach, detached, or the handle was dropped.
    Cancelled,
}

struct Slot {
    build_id: BuildId,
    subscription_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

/// Scoped handle to the live stream of one build. Dropping it cancels the
/// stream and releases the transport.
#[derive(Debug)]
pub struct LiveSubscription {
    build_id: BuildId,
    subscription_id: Uuid,
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
}

impl LiveSubscription {
    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn id(&self) -> Uuid {
        self.subscription_id
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Wait until the subscription has reached at least `target`.
    pub async fn wait_until(&mut self, target: StreamState) -> StreamState {
        match self.state.wait_for(|s| *s >= target).await {
            Ok(state) => *state,
            // Pump task is gone without publishing; treat as closed.
            Err(_) => StreamState::Closed,
        }
    }

    /// Wait for the stream to finish and its status reconcile to complete.
    pub async fn closed(&mut self) -> StreamState {
        self.wait_until(StreamState::Closed).await
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct LogStreamCoordinator {
    transport: Arc<dyn LogTransport>,
    store: BuildStore,
    reconciler: StatusReconciler,
    policy: Arc<dyn LogPolicy>,
    slot: Mutex<Option<Slot>>,
}

impl LogStreamCoordinator {
    pub fn new(
        transport: Arc<dyn LogTransport>,
        store: BuildStore,
        reconciler: StatusReconciler,
        policy: Arc<dyn LogPolicy>,
    ) -> Self {
        Self {
            transport,
            store,
            reconciler,
            policy,
            slot: Mutex::new(None),
        }
    }

    /// Open the live stream for `build_id`, closing whatever was attached
    /// before. Terminal builds are refused; they have no live stream.
    pub async fn attach(&self, build_id: &BuildId) -> Result<LiveSubscription, AttachError> {
        let status = self
            .store
            .status(build_id)
            .ok_or_else(|| AttachError::UnknownBuild(build_id.clone()))?;
        if status.is_terminal() {
            return Err(AttachError::NotLive {
                build_id: build_id.clone(),
                status,
            });
        }

        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            debug!(from = %previous.build_id, to = %build_id, "switching live stream");
            shutdown(previous).await;
        }

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let subscription_id = Uuid::new_v4();
        let pump = Pump {
            transport: self.transport.clone(),
            store: self.store.clone(),
            reconciler: self.reconciler.clone(),
            policy: self.policy.clone(),
            build_id: build_id.clone(),
            cancel: cancel.clone(),
            state: state_tx,
        };
        let task = tokio::spawn(pump.run());

        info!(build_id = %build_id, subscription = %subscription_id, "attached live stream");
        *slot = Some(Slot {
            build_id: build_id.clone(),
            subscription_id,
            cancel: cancel.clone(),
            task,
        });

        Ok(LiveSubscription {
            build_id: build_id.clone(),
            subscription_id,
            cancel,
            state: state_rx,
        })
    }

    /// Close the live slot. Returns how the last pump ended, or `None` if
    /// nothing was attached.
    pub async fn detach(&self) -> Option<StreamOutcome> {
        let previous = self.slot.lock().await.take()?;
        shutdown(previous).await
    }

    /// The build whose stream is currently open, if any.
    pub async fn active_build(&self) -> Option<BuildId> {
        self.slot
            .lock()
            .await
            .as_ref()
            .filter(|slot| !slot.task.is_finished() && !slot.cancel.is_cancelled())
            .map(|slot| slot.build_id.clone())
    }
}

async fn shutdown(slot: Slot) -> Option<StreamOutcome> {
    slot.cancel.cancel();
    match slot.task.await {
        Ok(outcome) => {
            debug!(
                build_id = %slot.build_id,
                subscription = %slot.subscription_id,
                outcome = ?outcome,
                "live stream released"
            );
            Some(outcome)
        }
        Err(e) => {
            warn!(build_id = %slot.build_id, error = %e, "live stream task ended abnormally");
            None
        }
    }
}

struct Pump {
    transport: Arc<dyn LogTransport>,
    store: BuildStore,
    reconciler: StatusReconciler,
    policy: Arc<dyn LogPolicy>,
    build_id: BuildId,
    cancel: CancellationToken,
    state: watch::Sender<StreamState>,
}

impl Pump {
    fn line(&self, message: impl Into<String>, level: LogLevel) {
        self.store
            .append_line(&self.build_id, &self.cancel, LogDraft::synthetic(message, level));
    }

    async fn run(self) -> StreamOutcome {
        let outcome = self.stream().await;

        if outcome != StreamOutcome::Cancelled {
            // Every close ends the timeline the same way; only a clean close
            // is reported as a success.
            let level = match outcome {
                StreamOutcome::Completed => LogLevel::Success,
                _ => LogLevel::Info,
            };
            self.line(COMPLETED_LINE, level);

            // Stream close is the trigger for status finalization.
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = self.reconciler.reconcile(&self.build_id) => {}
            }
        }
        self.state.send_replace(StreamState::Closed);
        outcome
    }

    async fn stream(&self) -> StreamOutcome {
        self.state.send_replace(StreamState::Connecting);
        self.line(CONNECTING_LINE, LogLevel::Info);

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
            result = self.transport.connect(&self.build_id) => result,
        };
        let mut frames = match connected {
            Ok(frames) => frames,
            Err(e) => {
                warn!(build_id = %self.build_id, error = %e, "live stream connect failed");
                self.line(format!("Log stream error: {}", e), LogLevel::Error);
                return StreamOutcome::TransportError(e.to_string());
            }
        };

        self.state.send_replace(StreamState::Streaming);
        self.line(CONNECTED_LINE, LogLevel::Info);

        let mut seen_activity = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamOutcome::Cancelled,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(raw)) => {
                    if !seen_activity {
                        seen_activity = true;
                        self.reconciler.observe_running(&self.build_id);
                    }
                    if let Some(draft) = normalize(&raw, self.policy.as_ref()) {
                        self.store.append_line(&self.build_id, &self.cancel, draft);
                    }
                }
                Some(Err(e)) => {
                    warn!(build_id = %self.build_id, error = %e, "live stream dropped");
                    self.line(format!("Log stream error: {}", e), LogLevel::Error);
                    return StreamOutcome::TransportError(e.to_string());
                }
                None => {
                    debug!(build_id = %self.build_id, "live stream closed by remote");
                    return StreamOutcome::Completed;
                }
            }
        }
    }
}
