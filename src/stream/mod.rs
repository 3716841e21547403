//! Live build log streaming.
//!
//! ```text
//!  attach(build_id) ──> coordinator ──connect──> LogTransport (ws.rs)
//!                          │                          │ raw frames
//!                          │<─────────────────────────┘
//!                          │ Frame::decode  (frame.rs)
//!                          │ LogPolicy      (policy.rs)
//!                          v
//!                      BuildStore.append_line
//!                          │ on close / transport error
//!                          v
//!                      StatusReconciler.reconcile(build_id)
//! ```

pub mod coordinator;
pub mod frame;
pub mod policy;
pub mod ws;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kiln_common::BuildId;

use crate::errors::StreamTransportError;

pub use coordinator::{LiveSubscription, LogStreamCoordinator, StreamOutcome, StreamState};
pub use frame::Frame;
pub use policy::{HeuristicPolicy, LogPolicy, SUBPROCESS_EXIT_NOISE, normalize};
pub use ws::WsLogTransport;

/// Raw frame bodies from one live connection. The stream ends when the remote
/// closes; dropping it releases the connection.
pub type FrameStream = BoxStream<'static, Result<String, StreamTransportError>>;

/// Opens one live log connection per build.
/// Real implementation: `WsLogTransport`.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn connect(&self, build_id: &BuildId) -> Result<FrameStream, StreamTransportError>;
}
