//! Concurrent session limiting.
//!
//! Uses a semaphore to cap open WebSocket sessions. A permit is held for the
//! session's lifetime and frees its slot when dropped, even if the session
//! task panics.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct SessionLimiter {
    slots: Arc<Semaphore>,
    max_sessions: usize,
}

impl SessionLimiter {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
        }
    }

    /// Reserve a slot, or `None` when the limit is reached.
    pub fn try_open(&self) -> Option<SessionPermit> {
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok()?;
        let permit = SessionPermit {
            _permit: permit,
            id: Uuid::new_v4(),
            limiter: self.clone(),
        };
        metrics::set_active_sessions(self.active());
        Some(permit)
    }

    pub fn active(&self) -> usize {
        self.max_sessions - self.slots.available_permits()
    }
}

/// One open session's slot.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
    id: Uuid,
    limiter: SessionLimiter,
}

impl SessionPermit {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        // The semaphore permit is returned after this body runs.
        metrics::set_active_sessions(self.limiter.active().saturating_sub(1));
    }
}
