//! Readiness and liveness state for the health-check surface.
//!
//! An explicitly owned, injectable object rather than process-wide globals:
//! the lifecycle flips it at phase boundaries, the health endpoint reads it
//! from another task. All flags are atomics so a cross-thread reader never
//! needs a lock.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct ReadinessInner {
    ready: AtomicBool,
    alive: AtomicBool,
    startup_complete: AtomicBool,
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    failed_sessions: AtomicU64,
}

/// Cloneable handle to the shared health state.
#[derive(Clone)]
pub struct ReadinessSignal {
    inner: Arc<ReadinessInner>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view for the health/state endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub alive: bool,
    pub ready: bool,
    pub startup_complete: bool,
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub failed_sessions: u64,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let inner = ReadinessInner::default();
        inner.alive.store(true, Ordering::SeqCst);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Session is up and able to take traffic. Counts one active session.
    pub fn mark_ready(&self) {
        if !self.inner.ready.swap(true, Ordering::SeqCst) {
            self.inner.active_sessions.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Session can no longer take traffic. Idempotent: a second call (signal
    /// handler plus normal teardown) changes nothing.
    pub fn mark_not_ready(&self) {
        if self.inner.ready.swap(false, Ordering::SeqCst) {
            let _ = self
                .inner
                .active_sessions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
        }
    }

    /// Process is shutting down or broken beyond this call.
    pub fn mark_unhealthy(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
    }

    /// Initial setup finished (startup probe).
    pub fn mark_startup_complete(&self) {
        self.inner.startup_complete.store(true, Ordering::SeqCst);
    }

    pub fn record_session(&self) {
        self.inner.total_sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.inner.failed_sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    pub fn is_startup_complete(&self) -> bool {
        self.inner.startup_complete.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            alive: self.is_alive(),
            ready: self.is_ready(),
            startup_complete: self.is_startup_complete(),
            total_sessions: self.inner.total_sessions.load(Ordering::SeqCst),
            active_sessions: self.inner.active_sessions.load(Ordering::SeqCst),
            failed_sessions: self.inner.failed_sessions.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_alive_and_not_ready() {
        let signal = ReadinessSignal::new();
        assert!(signal.is_alive());
        assert!(!signal.is_ready());
    }

    #[test]
    fn mark_not_ready_is_idempotent() {
        let signal = ReadinessSignal::new();
        signal.mark_ready();
        assert_eq!(signal.snapshot().active_sessions, 1);

        signal.mark_not_ready();
        signal.mark_not_ready();
        assert!(!signal.is_ready());
        assert_eq!(signal.snapshot().active_sessions, 0);
    }

    #[test]
    fn counters_accumulate() {
        let signal = ReadinessSignal::new();
        signal.record_session();
        signal.record_session();
        signal.record_failure();
        let snapshot = signal.snapshot();
        assert_eq!(snapshot.total_sessions, 2);
        assert_eq!(snapshot.failed_sessions, 1);
    }

    #[test]
    fn clones_share_state() {
        let signal = ReadinessSignal::new();
        let other = signal.clone();
        signal.mark_ready();
        assert!(other.is_ready());
    }
}
