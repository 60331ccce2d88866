//! Graceful shutdown: one `CancellationToken` for the listener and every
//! session, plus a `TaskTracker` so shutdown can wait for sessions to drain.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Owns the shutdown signal and the set of live sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wrap a session future so `drain` waits for it.
    pub fn track<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Sessions that have not finished yet.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!(sessions = self.sessions.len(), "shutdown requested");
        }
        self.token.cancel();
        let _ = self.sessions.close();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down, then wait up to `timeout` for the listener task and every
    /// tracked session to finish.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Duration) -> bool {
        self.shutdown();
        let finished = tokio::time::timeout(timeout, async {
            let _ = server.await;
            self.sessions.wait().await;
        })
        .await
        .is_ok();

        if finished {
            info!("all sessions drained");
        } else {
            warn!(
                remaining = self.sessions.len(),
                "shutdown timed out after {timeout:?}"
            );
        }
        finished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
