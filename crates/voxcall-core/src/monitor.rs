//! **TurnMonitor** — keeps a conversation alive through brief silence and
//! ends it gracefully after prolonged silence.
//!
//! A timer is armed whenever the assistant speaks. If the caller stays quiet
//! past the timeout, the assistant is asked to rephrase itself, a bounded
//! number of times; after that it says goodbye and the lifecycle is told to
//! terminate. A caller turn with real text disarms the timer immediately.
//!
//! The whole monitor runs as one task: arming, firing and cancelling all
//! happen on the same `select!` loop, so a stale timer fire can never race a
//! cancellation — the `armed` guard is checked on the loop itself. Only the
//! pending wait is cancellable; once a fire is being acted on (the repeat or
//! goodbye request), it runs to completion.

use crate::session::{ConversationTurn, EndReason, RealtimeSession, Role};
use crate::tools::EndCallHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Silence handling configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// User inactivity after an assistant turn before a re-prompt.
    pub timeout: Duration,
    /// Re-prompts before the polite hang-off.
    pub max_repeats: u32,
    /// Short cosmetic pause before each re-prompt.
    pub repeat_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_repeats: 2,
            repeat_delay: Duration::from_millis(500),
        }
    }
}

/// What a turn does to the timer.
#[derive(Debug, PartialEq, Eq)]
enum TurnOutcome {
    Arm,
    Disarm,
    Ignore,
}

/// What to do when the timer fires.
#[derive(Debug, PartialEq, Eq)]
enum ExpiryAction {
    /// Ask for a rephrased repeat of the carried assistant text.
    Repeat(String),
    /// Budget exhausted: say goodbye and request termination.
    Close,
}

/// Per-session silence counters. Reset when a fresh assistant turn begins,
/// cleared entirely when the user speaks.
#[derive(Debug, Default)]
struct SilenceState {
    last_assistant_text: String,
    repeat_count: u32,
    /// Set while a requested repeat is in flight. The assistant turn that
    /// answers it re-arms the timer but must not reset `repeat_count`,
    /// otherwise the repeat budget could never be exhausted.
    expecting_repeat: bool,
}

impl SilenceState {
    fn on_turn(&mut self, turn: &ConversationTurn) -> TurnOutcome {
        // Recognized silence / inaudible audio: neither arms nor cancels.
        if !turn.has_text() {
            return TurnOutcome::Ignore;
        }
        match turn.role {
            Role::Assistant => {
                self.last_assistant_text = turn.text.clone();
                if self.expecting_repeat {
                    self.expecting_repeat = false;
                } else {
                    self.repeat_count = 0;
                }
                TurnOutcome::Arm
            }
            Role::User => {
                *self = Self::default();
                TurnOutcome::Disarm
            }
        }
    }

    fn on_expiry(&mut self, max_repeats: u32) -> ExpiryAction {
        if self.repeat_count < max_repeats {
            self.repeat_count += 1;
            self.expecting_repeat = true;
            ExpiryAction::Repeat(self.last_assistant_text.clone())
        } else {
            ExpiryAction::Close
        }
    }
}

/// Watches the turn stream for user inactivity after assistant turns.
pub struct TurnMonitor {
    config: MonitorConfig,
    session: Arc<dyn RealtimeSession>,
    end_call: EndCallHandle,
}

impl TurnMonitor {
    pub fn new(
        config: MonitorConfig,
        session: Arc<dyn RealtimeSession>,
        end_call: EndCallHandle,
    ) -> Self {
        Self {
            config,
            session,
            end_call,
        }
    }

    /// Consume the turn stream until the call ends. Turns are processed in
    /// the order the backend emits them. The stream closing while the call
    /// is still live is reported to the lifecycle as a backend error.
    pub async fn run(self, mut turns: mpsc::UnboundedReceiver<ConversationTurn>) {
        let mut state = SilenceState::default();
        let mut armed = false;
        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                maybe_turn = turns.recv() => {
                    let Some(turn) = maybe_turn else {
                        warn!("turn stream ended while monitoring; reporting backend error");
                        self.end_call.request_end(EndReason::Error);
                        break;
                    };
                    self.log_turn(&turn);
                    match state.on_turn(&turn) {
                        TurnOutcome::Arm => {
                            armed = true;
                            sleep.as_mut().reset(Instant::now() + self.config.timeout);
                        }
                        TurnOutcome::Disarm => {
                            // Disarming is the cancellation: idempotent, safe
                            // with no timer pending.
                            armed = false;
                        }
                        TurnOutcome::Ignore => {}
                    }
                }
                _ = &mut sleep, if armed => {
                    armed = false;
                    match state.on_expiry(self.config.max_repeats) {
                        ExpiryAction::Repeat(last_text) => {
                            debug!(repeat = state.repeat_count, "silence timeout, re-prompting");
                            tokio::time::sleep(self.config.repeat_delay).await;
                            let instructions = repeat_instructions(&last_text);
                            if let Err(err) = self.session.generate_reply(&instructions).await {
                                warn!(error = %err, "re-prompt dispatch failed");
                            }
                            // Re-armed once the repeat arrives as a new
                            // assistant turn.
                        }
                        ExpiryAction::Close => {
                            info!("silence budget exhausted, closing the call");
                            if let Err(err) = self.session.generate_reply(CLOSE_INSTRUCTIONS).await {
                                warn!(error = %err, "hang-off goodbye dispatch failed");
                            }
                            self.end_call.request_end(EndReason::ToolRequested);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn log_turn(&self, turn: &ConversationTurn) {
        if !turn.has_text() {
            return;
        }
        match turn.role {
            Role::User => info!(text = %turn.text, "caller turn"),
            Role::Assistant => info!(text = %turn.text, "agent turn"),
        }
    }
}

fn repeat_instructions(last_text: &str) -> String {
    format!(
        "The caller has not responded. Briefly rephrase and repeat your last message: \"{last_text}\""
    )
}

const CLOSE_INSTRUCTIONS: &str =
    "The caller seems to be gone. Say a short, polite goodbye and end the conversation.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PlaceholderSession;
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn empty_turns_are_ignored() {
        let mut state = SilenceState::default();
        assert_eq!(state.on_turn(&ConversationTurn::assistant("  ")), TurnOutcome::Ignore);
        assert_eq!(state.on_turn(&ConversationTurn::user("")), TurnOutcome::Ignore);
    }

    #[test]
    fn fresh_assistant_turn_resets_repeat_count() {
        let mut state = SilenceState::default();
        state.on_turn(&ConversationTurn::assistant("Are you there?"));
        assert_eq!(state.on_expiry(2), ExpiryAction::Repeat("Are you there?".to_string()));
        assert_eq!(state.repeat_count, 1);

        // The repeat's own reply keeps the count...
        state.on_turn(&ConversationTurn::assistant("Hello? Are you still there?"));
        assert_eq!(state.repeat_count, 1);

        // ...but a genuinely new assistant turn starts over.
        state.on_turn(&ConversationTurn::assistant("What date works for you?"));
        assert_eq!(state.repeat_count, 0);
    }

    #[test]
    fn user_speech_clears_everything() {
        let mut state = SilenceState::default();
        state.on_turn(&ConversationTurn::assistant("Are you there?"));
        state.on_expiry(2);
        assert_eq!(state.on_turn(&ConversationTurn::user("yes, sorry")), TurnOutcome::Disarm);
        assert_eq!(state.repeat_count, 0);
        assert!(!state.expecting_repeat);
    }

    #[test]
    fn expiry_past_budget_closes() {
        let mut state = SilenceState::default();
        state.on_turn(&ConversationTurn::assistant("Hello?"));
        assert!(matches!(state.on_expiry(1), ExpiryAction::Repeat(_)));
        state.on_turn(&ConversationTurn::assistant("Hello?"));
        assert_eq!(state.on_expiry(1), ExpiryAction::Close);
    }

    fn monitor_setup() -> (
        Arc<PlaceholderSession>,
        mpsc::Receiver<EndReason>,
        tokio::task::JoinHandle<()>,
    ) {
        let session = Arc::new(PlaceholderSession::new());
        session.set_auto_reply(true);
        let turns = session.take_turns().expect("turn stream");
        let (end_tx, end_rx) = mpsc::channel(4);
        let monitor = TurnMonitor::new(
            MonitorConfig {
                timeout: Duration::from_secs(10),
                max_repeats: 2,
                repeat_delay: Duration::from_millis(500),
            },
            Arc::clone(&session) as Arc<dyn RealtimeSession>,
            EndCallHandle::new(end_tx),
        );
        let handle = tokio::spawn(monitor.run(turns));
        (session, end_rx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn silence_drives_two_repeats_then_close() {
        let (session, mut end_rx, handle) = monitor_setup();

        session.emit_turn(ConversationTurn::assistant("Are you there?"));

        // First fire at t=10s, re-prompt dispatched after the 0.5s pause.
        tokio::time::sleep(Duration::from_secs(11)).await;
        let replies = session.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].instructions.contains("Are you there?"));

        // The auto-replied assistant turn re-armed the timer without
        // resetting the count: second re-prompt, then the goodbye.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(session.replies().len(), 2);

        tokio::time::sleep(Duration::from_secs(11)).await;
        let replies = session.replies();
        assert_eq!(replies.len(), 3);
        assert!(replies[2].instructions.contains("goodbye"));

        // Repeats are spaced one timeout plus the cosmetic pause apart; the
        // final fire closes without the pause.
        assert_eq!(replies[1].at - replies[0].at, Duration::from_millis(10_500));
        assert_eq!(replies[2].at - replies[1].at, Duration::from_secs(10));

        assert_eq!(end_rx.recv().await, Some(EndReason::ToolRequested));
        handle.await.unwrap();

        // No further timers are armed after the close.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(session.replies().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn user_reply_cancels_pending_timer() {
        let (session, mut end_rx, handle) = monitor_setup();

        session.emit_turn(ConversationTurn::assistant("Are you there?"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        session.emit_turn(ConversationTurn::user("yes, I'm here"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(session.replies().is_empty());
        assert_eq!(end_rx.try_recv().unwrap_err(), TryRecvError::Empty);

        session.drop_turn_stream();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_user_turn_does_not_cancel() {
        let (session, _end_rx, handle) = monitor_setup();

        session.emit_turn(ConversationTurn::assistant("Are you there?"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        session.emit_turn(ConversationTurn::user("   "));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(session.replies().len(), 1);

        session.drop_turn_stream();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_reports_backend_error() {
        let (session, mut end_rx, handle) = monitor_setup();

        session.emit_turn(ConversationTurn::assistant("Hello!"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        session.drop_turn_stream();

        assert_eq!(end_rx.recv().await, Some(EndReason::Error));
        handle.await.unwrap();
    }
}
