//! Open-handle accounting.
//!
//! # Responsibilities
//! - Generate unique handle IDs for tracing
//! - Count handles currently open so leaks are observable
//! - Publish the count as a gauge

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Global atomic counter for handle IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a broker handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new() -> Self {
        Self(HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Counts open handles.
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    open: Arc<AtomicU64>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened handle. The returned guard decrements on drop.
    pub fn track(&self) -> HandleGuard {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_open_handles(now);
        HandleGuard {
            open: Arc::clone(&self.open),
            id: HandleId::new(),
        }
    }

    pub fn open_count(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }
}

/// Tracks one handle's lifetime.
#[derive(Debug)]
pub struct HandleGuard {
    open: Arc<AtomicU64>,
    id: HandleId,
}

impl HandleGuard {
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let now = self.open.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_open_handles(now);
        tracing::trace!(handle_id = %self.id, "Handle closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_ids_unique() {
        assert_ne!(HandleId::new(), HandleId::new());
    }

    #[test]
    fn tracker_counts() {
        let tracker = HandleTracker::new();
        assert_eq!(tracker.open_count(), 0);

        let g1 = tracker.track();
        let g2 = tracker.track();
        assert_eq!(tracker.open_count(), 2);
        assert_ne!(g1.id(), g2.id());

        drop(g1);
        assert_eq!(tracker.open_count(), 1);
        drop(g2);
        assert_eq!(tracker.open_count(), 0);
    }
}
