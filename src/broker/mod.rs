//! Connection broker.
//!
//! # Data Flow
//! ```text
//! acquire(target)
//!     → Connector::open            ─┐ one shared deadline
//!     → Session::ping (probe)      ─┘ (probe_timeout_ms)
//!     → Handle { session, guard }
//! release(handle)
//!     → Session::close
//!     → guard dropped (open count decremented)
//! ```
//!
//! # Design Decisions
//! - One fresh session per call; nothing is cached or pooled
//! - No retries: a failed probe is reported immediately
//! - A session that fails its probe is closed before `acquire` returns
//! - Dropping a handle without `release` (a cancelled call) closes its
//!   session on a background task and decrements the open count

pub mod target;
pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::config::BrokerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::store::{Connector, Session};

pub use target::ConnectionTarget;
pub use tracker::{HandleGuard, HandleId, HandleTracker};

/// Live, call-scoped session to the engine.
///
/// Must be handed back through [`Broker::release`] exactly once.
pub struct Handle {
    session: Option<Box<dyn Session>>,
    guard: HandleGuard,
}

impl Handle {
    pub fn id(&self) -> HandleId {
        self.guard.id()
    }

    pub fn session(&self) -> &dyn Session {
        self.session
            .as_deref()
            .expect("session is only taken by Broker::release, which consumes the handle")
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let handle_id = self.guard.id();
        tracing::warn!(handle_id = %handle_id, "Handle dropped without release, closing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    session.close().await;
                    tracing::debug!(handle_id = %handle_id, "Dropped handle closed");
                });
            }
            Err(_) => tracing::error!(handle_id = %handle_id, "No runtime to close dropped handle"),
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("id", &self.id()).finish()
    }
}

/// Opens and releases call-scoped handles.
pub struct Broker {
    connector: Arc<dyn Connector>,
    probe_timeout: Duration,
    tracker: HandleTracker,
}

impl Broker {
    pub fn new(connector: Arc<dyn Connector>, config: &BrokerConfig) -> Self {
        Self {
            connector,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            tracker: HandleTracker::new(),
        }
    }

    /// Open a session to `target` and verify it answers the probe.
    pub async fn acquire(&self, target: &ConnectionTarget) -> GatewayResult<Handle> {
        let deadline = Instant::now() + self.probe_timeout;

        let session = match timeout_at(deadline, self.connector.open(target)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!(uri = %target, error = %target.scrub(&e.to_string()), "Connection failed");
                return Err(connection_failed(&e.to_string()));
            }
            Err(_) => {
                tracing::warn!(uri = %target, "Connection timed out");
                return Err(self.timed_out());
            }
        };

        let handle = Handle {
            session: Some(session),
            guard: self.tracker.track(),
        };

        let probe = timeout_at(deadline, handle.session().ping()).await;
        match probe {
            Ok(Ok(())) => {
                tracing::debug!(uri = %target, handle_id = %handle.id(), "Connection acquired");
                Ok(handle)
            }
            Ok(Err(e)) => {
                tracing::warn!(uri = %target, error = %target.scrub(&e.to_string()), "Probe failed");
                self.release(handle).await;
                Err(connection_failed(&e.to_string()))
            }
            Err(_) => {
                tracing::warn!(uri = %target, "Probe timed out");
                self.release(handle).await;
                Err(self.timed_out())
            }
        }
    }

    /// Close the handle's session. Consumes the handle.
    pub async fn release(&self, mut handle: Handle) {
        if let Some(session) = handle.session.take() {
            session.close().await;
        }
        tracing::debug!(handle_id = %handle.id(), "Connection released");
    }

    /// Handles acquired and not yet released.
    pub fn open_handles(&self) -> u64 {
        self.tracker.open_count()
    }

    fn timed_out(&self) -> GatewayError {
        connection_failed(&format!(
            "timed out after {}ms",
            self.probe_timeout.as_millis()
        ))
    }
}

fn connection_failed(reason: &str) -> GatewayError {
    GatewayError::Connection(format!("Failed to connect to MongoDB: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::{MemoryConnector, Probe};

    fn broker(connector: &MemoryConnector, probe_timeout_ms: u64) -> Broker {
        let config = BrokerConfig {
            probe_timeout_ms,
            ..BrokerConfig::default()
        };
        Broker::new(Arc::new(connector.clone()), &config)
    }

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("memory://user:pw@local")
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let connector = MemoryConnector::new();
        let broker = broker(&connector, 1000);

        let handle = broker.acquire(&target()).await.unwrap();
        assert_eq!(broker.open_handles(), 1);

        broker.release(handle).await;
        assert_eq!(broker.open_handles(), 0);
        assert_eq!(connector.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn refused_probe_leaks_nothing() {
        let connector = MemoryConnector::new();
        connector.set_probe(Probe::Refused);
        let broker = broker(&connector, 1000);

        let err = broker.acquire(&target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(broker.open_handles(), 0);
        assert_eq!(connector.opened_sessions(), connector.closed_sessions());
    }

    #[tokio::test]
    async fn hanging_probe_times_out_within_bound() {
        let connector = MemoryConnector::new();
        connector.set_probe(Probe::Hang);
        let broker = broker(&connector, 200);

        let started = std::time::Instant::now();
        let err = broker.acquire(&target()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("timed out after 200ms"));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        assert_eq!(broker.open_handles(), 0);
        assert_eq!(connector.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn dropped_handle_is_uncounted_and_closed() {
        let connector = MemoryConnector::new();
        let broker = broker(&connector, 1000);

        let handle = broker.acquire(&target()).await.unwrap();
        drop(handle);
        assert_eq!(broker.open_handles(), 0);

        for _ in 0..50 {
            if connector.closed_sessions() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(connector.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn cancelled_call_still_closes_session() {
        let connector = MemoryConnector::new();
        let broker = broker(&connector, 1000);

        // Cancel while the session is held, as a client disconnect would.
        let call = async {
            let handle = broker.acquire(&target()).await.unwrap();
            std::future::pending::<()>().await;
            broker.release(handle).await;
        };
        let cancelled = tokio::time::timeout(Duration::from_millis(50), call).await;
        assert!(cancelled.is_err());

        for _ in 0..50 {
            if connector.closed_sessions() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(connector.opened_sessions(), 1);
        assert_eq!(connector.closed_sessions(), 1);
        assert_eq!(broker.open_handles(), 0);
    }
}
