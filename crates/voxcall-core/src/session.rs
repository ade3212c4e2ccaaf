//! Session types and the seams to the external collaborators.
//!
//! The realtime voice backend and the room transport are opaque: the core
//! only ever starts them, asks for replies, and consumes a stream of
//! role-tagged turns. Everything backend-specific stays behind
//! [`RealtimeSession`] / [`RoomTransport`]; `Placeholder*` implementations
//! back the local dev mode and the test suites.

use crate::error::{SessionError, TransportError};
use crate::tools::ToolProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One attributed unit of dialogue. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    /// Extracted text; may be empty when nothing intelligible was recognized.
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// False for empty or whitespace-only turns (recognized silence),
    /// which the turn monitor ignores entirely.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Why a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    None,
    ToolRequested,
    UserDisconnected,
    Timeout,
    Error,
}

/// Call lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Connecting,
    Starting,
    Active,
    Closing,
    Closed,
}

/// What to subscribe to when joining a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    AudioOnly,
    All,
}

/// Opaque handle into the external transport, passed through to session start.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: String,
}

impl RoomHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The agent handed to the backend: a persona plus a composed tool bundle.
/// Tools are a capability reference, not a base class — the backend binds
/// function calls by declared name.
#[derive(Clone)]
pub struct AgentDescriptor {
    pub instructions: String,
    pub tools: Arc<dyn ToolProvider>,
}

impl AgentDescriptor {
    pub fn new(instructions: impl Into<String>, tools: Arc<dyn ToolProvider>) -> Self {
        Self {
            instructions: instructions.into(),
            tools,
        }
    }
}

/// One active connection. Owned exclusively by the lifecycle; every other
/// component observes it through accessors only.
#[derive(Debug, Clone)]
pub struct CallSession {
    id: Uuid,
    room: RoomHandle,
    state: CallState,
    started_at: DateTime<Utc>,
    end_reason: EndReason,
}

impl CallSession {
    pub fn new(room: RoomHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            room,
            state: CallState::Connecting,
            started_at: Utc::now(),
            end_reason: EndReason::None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn end_reason(&self) -> EndReason {
        self.end_reason
    }

    pub(crate) fn set_state(&mut self, next: CallState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "call state transition");
        self.state = next;
    }

    /// The first recorded reason sticks; repeated teardown paths must not
    /// rewrite history.
    pub(crate) fn record_end_reason(&mut self, reason: EndReason) {
        if self.end_reason == EndReason::None {
            self.end_reason = reason;
        }
    }
}

/// The realtime voice backend: a bidirectional stream the core treats as a
/// black box emitting [`ConversationTurn`]s.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    /// Open the backend stream for this agent in this room.
    async fn start(&self, agent: &AgentDescriptor, room: &RoomHandle) -> Result<(), SessionError>;

    /// Ask the model to speak; suspends until the request is dispatched.
    async fn generate_reply(&self, instructions: &str) -> Result<(), SessionError>;

    /// Hand out the turn event stream. Yields `None` after the first call —
    /// there is exactly one consumer.
    fn take_turns(&self) -> Option<mpsc::UnboundedReceiver<ConversationTurn>>;

    /// Release the backend connection.
    async fn close(&self) -> Result<(), SessionError>;
}

/// The room/transport layer: connect, observe remote disconnect, nothing more.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn connect(&self, mode: SubscriptionMode) -> Result<RoomHandle, TransportError>;

    /// Explicit disconnect subscription; the receiver is the unsubscribe
    /// token and is dropped deterministically at teardown.
    fn subscribe_disconnected(&self) -> watch::Receiver<bool>;
}

/// A reply recorded by [`PlaceholderSession`], with its dispatch instant.
#[derive(Debug, Clone)]
pub struct RecordedReply {
    pub instructions: String,
    pub at: tokio::time::Instant,
}

/// Scriptable in-process backend: queued start failures, recorded replies,
/// manual turn injection. Backs the daemon's local mode and the tests.
pub struct PlaceholderSession {
    start_failures: Mutex<VecDeque<SessionError>>,
    started: AtomicBool,
    closed: AtomicBool,
    fail_close: AtomicBool,
    auto_reply: AtomicBool,
    close_count: AtomicU32,
    replies: Mutex<Vec<RecordedReply>>,
    turn_tx: Mutex<Option<mpsc::UnboundedSender<ConversationTurn>>>,
    turn_rx: Mutex<Option<mpsc::UnboundedReceiver<ConversationTurn>>>,
}

impl Default for PlaceholderSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderSession {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            start_failures: Mutex::new(VecDeque::new()),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            auto_reply: AtomicBool::new(false),
            close_count: AtomicU32::new(0),
            replies: Mutex::new(Vec::new()),
            turn_tx: Mutex::new(Some(tx)),
            turn_rx: Mutex::new(Some(rx)),
        }
    }

    /// Queue `n` start failures; the attempt after them succeeds.
    pub fn fail_next_starts(&self, n: usize) {
        let mut failures = self.start_failures.lock().expect("lock");
        for i in 0..n {
            failures.push_back(SessionError::Start(format!("scripted failure {}", i + 1)));
        }
    }

    /// When enabled, every `generate_reply` immediately comes back as an
    /// assistant turn carrying the instruction text.
    pub fn set_auto_reply(&self, enabled: bool) {
        self.auto_reply.store(enabled, Ordering::SeqCst);
    }

    /// Make `close` return an error (teardown must swallow it).
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Inject a turn into the event stream.
    pub fn emit_turn(&self, turn: ConversationTurn) {
        if let Some(tx) = self.turn_tx.lock().expect("lock").as_ref() {
            let _ = tx.send(turn);
        }
    }

    /// Drop the sending side, ending the turn stream (simulates a mid-call
    /// backend failure).
    pub fn drop_turn_stream(&self) {
        self.turn_tx.lock().expect("lock").take();
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Replies recorded so far, in dispatch order.
    pub fn replies(&self) -> Vec<RecordedReply> {
        self.replies.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RealtimeSession for PlaceholderSession {
    async fn start(&self, _agent: &AgentDescriptor, _room: &RoomHandle) -> Result<(), SessionError> {
        if let Some(err) = self.start_failures.lock().expect("lock").pop_front() {
            return Err(err);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn generate_reply(&self, instructions: &str) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Reply("session already closed".to_string()));
        }
        self.replies.lock().expect("lock").push(RecordedReply {
            instructions: instructions.to_string(),
            at: tokio::time::Instant::now(),
        });
        if self.auto_reply.load(Ordering::SeqCst) {
            self.emit_turn(ConversationTurn::assistant(instructions));
        }
        Ok(())
    }

    fn take_turns(&self) -> Option<mpsc::UnboundedReceiver<ConversationTurn>> {
        self.turn_rx.lock().expect("lock").take()
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.turn_tx.lock().expect("lock").take();
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(SessionError::Close("scripted close failure".to_string()));
        }
        Ok(())
    }
}

/// In-process room transport with a manual disconnect trigger.
pub struct PlaceholderRoom {
    name: String,
    fail_connect: AtomicBool,
    disconnect_tx: watch::Sender<bool>,
}

impl PlaceholderRoom {
    pub fn new(name: impl Into<String>) -> Self {
        let (disconnect_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            fail_connect: AtomicBool::new(false),
            disconnect_tx,
        }
    }

    /// Make the next `connect` fail.
    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Simulate the remote party hanging up.
    pub fn trigger_disconnect(&self) {
        let _ = self.disconnect_tx.send(true);
    }
}

#[async_trait]
impl RoomTransport for PlaceholderRoom {
    async fn connect(&self, _mode: SubscriptionMode) -> Result<RoomHandle, TransportError> {
        if self.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Connect(format!(
                "room '{}' unreachable",
                self.name
            )));
        }
        Ok(RoomHandle::new(self.name.clone()))
    }

    fn subscribe_disconnected(&self) -> watch::Receiver<bool> {
        self.disconnect_tx.subscribe()
    }
}
