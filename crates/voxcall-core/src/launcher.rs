//! Session start with bounded exponential-backoff retry.
//!
//! Transient backend failures (cold regions, websocket hiccups) are masked
//! by retrying; exhausting the budget raises [`LaunchFailed`] and the call
//! is abandoned — the lifecycle never retries a failed launch again.

use crate::error::{LaunchFailed, SessionError};
use crate::session::{AgentDescriptor, RealtimeSession, RoomHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Retry configuration. Pure value, shared read-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total start attempts before giving up.
    pub max_attempts: u32,
    /// Backoff base: the sleep after failed attempt `n` (1-indexed) is
    /// `base^n` seconds. No sleep follows the final attempt.
    pub backoff_base_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_seconds: 2.0,
        }
    }
}

impl RetryPolicy {
    fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_base_seconds.powi(attempt as i32))
    }
}

/// Opens exactly one backend connection per call attempt. No success-path
/// caching: every `start` runs its own fresh attempt sequence.
pub struct SessionLauncher {
    policy: RetryPolicy,
}

impl SessionLauncher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Attempt `session.start` up to `max_attempts` times, sleeping the
    /// backoff between attempts. The sleep suspends the task; it never
    /// blocks the scheduler.
    pub async fn start(
        &self,
        session: &dyn RealtimeSession,
        agent: &AgentDescriptor,
        room: &RoomHandle,
    ) -> Result<(), LaunchFailed> {
        let max = self.policy.max_attempts;
        let mut last: Option<SessionError> = None;

        for attempt in 1..=max {
            match session.start(agent, room).await {
                Ok(()) => {
                    info!(attempt, room = room.name(), "session started");
                    return Ok(());
                }
                Err(err) => {
                    let wait = self.policy.backoff_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = max,
                        wait_s = wait.as_secs_f64(),
                        error = %err,
                        "session start attempt failed"
                    );
                    last = Some(err);
                    if attempt < max {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Err(LaunchFailed {
            attempts: max,
            last: last.unwrap_or_else(|| {
                SessionError::Start("no start attempts were made".to_string())
            }),
        })
    }
}
