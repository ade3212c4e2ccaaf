//! **CallLifecycle** — the top-level per-call state machine.
//!
//! `Connecting → Starting → Active → Closing → Closed`, with a direct
//! `Starting → Closed` path when session start exhausts its retries. While
//! Active, the lifecycle waits on three termination triggers at once: a
//! tool-invoked end-call signal, the remote-disconnect subscription, and the
//! call-duration deadline. Only the deadline synthesizes its own goodbye —
//! the other two either came from the far end or follow an utterance the
//! agent already made.
//!
//! Connect and launch failures propagate to the caller; everything after a
//! successful start is contained and becomes a state transition or a log
//! line. Teardown always completes and is idempotent.

use crate::config::CallConfig;
use crate::error::{CallError, CallResult};
use crate::launcher::SessionLauncher;
use crate::monitor::{MonitorConfig, TurnMonitor};
use crate::readiness::ReadinessSignal;
use crate::session::{
    AgentDescriptor, CallSession, CallState, EndReason, RealtimeSession, RoomTransport,
    SubscriptionMode,
};
use crate::tools::EndCallHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle timing and greeting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Instruction sent once the greeting delay elapses.
    pub greeting: String,
    /// Pause after session start before greeting the caller.
    pub greeting_delay: Duration,
    /// Hard ceiling on conversation time, measured from the start of the
    /// active wait.
    pub max_call_duration: Duration,
    /// Grace period letting trailing goodbye audio reach the far end.
    pub goodbye_delay: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            greeting: "Greet the caller briefly and ask how you can help.".to_string(),
            greeting_delay: Duration::from_millis(800),
            max_call_duration: Duration::from_secs(900),
            goodbye_delay: Duration::from_secs(3),
        }
    }
}

/// Outcome of one completed call.
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub session_id: Uuid,
    pub room: String,
    pub end_reason: EndReason,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

const TIMEOUT_GOODBYE: &str =
    "The maximum call duration was reached. Say a short, friendly goodbye.";

/// Orchestrates one call from room connect to teardown.
pub struct CallLifecycle {
    config: LifecycleConfig,
    monitor_config: MonitorConfig,
    launcher: SessionLauncher,
    backend: Arc<dyn RealtimeSession>,
    transport: Arc<dyn RoomTransport>,
    readiness: ReadinessSignal,
    end_tx: mpsc::Sender<EndReason>,
    end_rx: mpsc::Receiver<EndReason>,
    torn_down: AtomicBool,
    last_call: Option<CallSession>,
}

impl CallLifecycle {
    pub fn new(
        config: &CallConfig,
        backend: Arc<dyn RealtimeSession>,
        transport: Arc<dyn RoomTransport>,
        readiness: ReadinessSignal,
    ) -> Self {
        let (end_tx, end_rx) = mpsc::channel(8);
        Self {
            config: config.lifecycle.clone(),
            monitor_config: config.monitor,
            launcher: SessionLauncher::new(config.retry),
            backend,
            transport,
            readiness,
            end_tx,
            end_rx,
            torn_down: AtomicBool::new(false),
            last_call: None,
        }
    }

    /// Handle for tools (and anything else) that may request termination.
    pub fn end_call_handle(&self) -> EndCallHandle {
        EndCallHandle::new(self.end_tx.clone())
    }

    /// The session record of the last finished call, if any.
    pub fn last_call(&self) -> Option<&CallSession> {
        self.last_call.as_ref()
    }

    /// Drive one call to completion.
    ///
    /// Returns `Err` only for connect failure or launch-retry exhaustion;
    /// every later failure is folded into the summary's end reason.
    pub async fn run(&mut self, agent: AgentDescriptor) -> CallResult<CallSummary> {
        self.readiness.record_session();

        // Connecting. Fatal on failure, deliberately not retried: launch
        // retries below cover the flaky path, a dead transport does not
        // get better by asking again.
        let room = match self.transport.connect(SubscriptionMode::AudioOnly).await {
            Ok(room) => room,
            Err(err) => {
                error!(error = %err, "room connect failed; aborting call");
                self.readiness.mark_not_ready();
                self.readiness.record_failure();
                return Err(CallError::Connect(err));
            }
        };
        let mut call = CallSession::new(room.clone());
        info!(session = %call.id(), room = room.name(), "room connected");

        // Starting, with bounded backoff.
        call.set_state(CallState::Starting);
        if let Err(err) = self
            .launcher
            .start(self.backend.as_ref(), &agent, &room)
            .await
        {
            error!(session = %call.id(), error = %err, "session launch failed; call abandoned");
            self.readiness.mark_not_ready();
            self.readiness.record_failure();
            call.record_end_reason(EndReason::Error);
            call.set_state(CallState::Closed);
            self.last_call = Some(call);
            return Err(CallError::Launch(err));
        }

        // Active: traffic-ready, disconnect listener attached, turn monitor
        // consuming the backend stream.
        self.readiness.mark_ready();
        call.set_state(CallState::Active);
        let mut disconnect_rx = self.transport.subscribe_disconnected();
        let monitor_task = self.spawn_monitor();

        let pending_end = self.greet(&mut disconnect_rx).await;
        let reason = match pending_end {
            Some(reason) => reason,
            None => self.await_termination(&mut disconnect_rx).await,
        };
        self.say_goodbye(reason).await;
        call.record_end_reason(reason);

        // Closing: cancel subscriptions deterministically, then release the
        // session. Teardown errors are logged, never propagated.
        call.set_state(CallState::Closing);
        if let Some(task) = monitor_task {
            task.abort();
        }
        drop(disconnect_rx);
        self.teardown().await;
        call.set_state(CallState::Closed);

        let duration = (Utc::now() - call.started_at())
            .to_std()
            .unwrap_or_default();
        let summary = CallSummary {
            session_id: call.id(),
            room: call.room().name().to_string(),
            end_reason: call.end_reason(),
            started_at: call.started_at(),
            duration,
        };
        info!(
            session = %summary.session_id,
            reason = ?summary.end_reason,
            duration_s = summary.duration.as_secs_f64(),
            "call finished"
        );
        self.last_call = Some(call);
        Ok(summary)
    }

    fn spawn_monitor(&self) -> Option<JoinHandle<()>> {
        let turns = self.backend.take_turns()?;
        let monitor = TurnMonitor::new(
            self.monitor_config,
            Arc::clone(&self.backend),
            self.end_call_handle(),
        );
        Some(tokio::spawn(monitor.run(turns)))
    }

    /// Wait out the greeting delay, then greet — unless termination was
    /// requested in the meantime, in which case the greeting is skipped and
    /// the reason carried into the wait phase.
    async fn greet(&mut self, disconnect_rx: &mut watch::Receiver<bool>) -> Option<EndReason> {
        tokio::select! {
            _ = tokio::time::sleep(self.config.greeting_delay) => {
                if let Err(err) = self.backend.generate_reply(&self.config.greeting).await {
                    warn!(error = %err, "greeting not sent");
                }
                None
            }
            reason = self.end_rx.recv() => {
                debug!("termination requested during greeting delay; greeting skipped");
                Some(reason.unwrap_or(EndReason::Error))
            }
            _ = wait_disconnected(disconnect_rx) => {
                debug!("remote disconnected during greeting delay; greeting skipped");
                Some(EndReason::UserDisconnected)
            }
        }
    }

    /// Race the three termination triggers; first one wins.
    async fn await_termination(&mut self, disconnect_rx: &mut watch::Receiver<bool>) -> EndReason {
        let deadline = tokio::time::Instant::now() + self.config.max_call_duration;
        tokio::select! {
            reason = self.end_rx.recv() => reason.unwrap_or(EndReason::Error),
            _ = wait_disconnected(disconnect_rx) => EndReason::UserDisconnected,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(
                    max_call_duration_s = self.config.max_call_duration.as_secs_f64(),
                    "max call duration reached; ending call"
                );
                EndReason::Timeout
            }
        }
    }

    /// Reason-specific goodbye handling, per the termination matrix in the
    /// module docs.
    async fn say_goodbye(&self, reason: EndReason) {
        match reason {
            EndReason::Timeout => {
                // The far end did not ask for this: speak a goodbye, then
                // give the audio time to drain.
                if let Err(err) = self.backend.generate_reply(TIMEOUT_GOODBYE).await {
                    warn!(error = %err, "timeout goodbye not sent");
                }
                tokio::time::sleep(self.config.goodbye_delay).await;
            }
            EndReason::ToolRequested => {
                // The agent's own preceding utterance carried the farewell;
                // only honor the grace delay.
                tokio::time::sleep(self.config.goodbye_delay).await;
            }
            EndReason::UserDisconnected => {
                info!("remote party disconnected");
            }
            EndReason::Error => {
                warn!("mid-call backend error; attempting a goodbye");
                if let Err(err) = self.backend.generate_reply(TIMEOUT_GOODBYE).await {
                    warn!(error = %err, "goodbye after error not sent");
                }
            }
            EndReason::None => {}
        }
    }

    /// Release the session and mark not-ready. Safe to call more than once;
    /// the session resource is released exactly once and nothing here ever
    /// propagates an error.
    pub async fn teardown(&self) {
        self.readiness.mark_not_ready();
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.backend.close().await {
            debug!(error = %err, "session close error (ignored)");
        }
    }
}

async fn wait_disconnected(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        // A closed channel means the transport itself went away; treat it
        // the same as a remote disconnect.
        if rx.changed().await.is_err() {
            return;
        }
    }
}
