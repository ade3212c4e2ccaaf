//! # VoxCall Core - Realtime Call Session Orchestration
//!
//! This crate implements the session lifecycle for a realtime voice agent:
//! retried session launch, silence-driven turn monitoring, timed call
//! termination, and buffered PCM bridging between async producers and the
//! audio hardware callback.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Call Lifecycle                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │RoomTransport │→ │   Session    │→ │ Turn Monitor │       │
//! │  │  (connect)   │  │   Launcher   │  │ (silence/    │       │
//! │  └──────────────┘  │  (retries)   │  │  repeats)    │       │
//! │         ↓          └──────────────┘  └──────────────┘       │
//! │  ┌──────────────┐                    ┌──────────────┐       │
//! │  │ Audio Bridge │←───────────────────│  End-of-call │       │
//! │  │ (PCM queue)  │   goodbye audio    │   channel    │       │
//! │  └──────────────┘                    └──────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod launcher;
pub mod lifecycle;
pub mod monitor;
pub mod readiness;
pub mod session;
pub mod tools;

pub use audio::{AudioCapture, AudioConfig, AudioPlayback};
pub use bridge::{AudioBridge, AudioFrame};
pub use config::{CallConfig, HealthConfig};
pub use error::{CallError, CallResult, LaunchFailed, SessionError, TransportError};
pub use launcher::{RetryPolicy, SessionLauncher};
pub use lifecycle::{CallLifecycle, CallSummary, LifecycleConfig};
pub use monitor::{MonitorConfig, TurnMonitor};
pub use readiness::{HealthSnapshot, ReadinessSignal};
pub use session::{
    AgentDescriptor, CallSession, CallState, ConversationTurn, EndReason, PlaceholderRoom,
    PlaceholderSession, RealtimeSession, Role, RoomHandle, RoomTransport, SubscriptionMode,
};
pub use tools::{EndCallHandle, ReceptionTools, ToolCall, ToolProvider, ToolResponse, ToolSpec};
