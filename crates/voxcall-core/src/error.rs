//! Error types for the call session core

use thiserror::Error;

/// Result type alias for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors raised by the realtime voice backend.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("session start failed: {0}")]
    Start(String),

    #[error("reply dispatch failed: {0}")]
    Reply(String),

    #[error("session close failed: {0}")]
    Close(String),

    #[error("backend stream ended: {0}")]
    StreamEnded(String),
}

/// Errors raised by the room/transport layer.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("room connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Session start exhausted its retry budget. Carries the last underlying cause.
#[derive(Error, Debug)]
#[error("session start failed after {attempts} attempts: {last}")]
pub struct LaunchFailed {
    /// Number of attempts actually made.
    pub attempts: u32,
    /// The error from the final attempt.
    #[source]
    pub last: SessionError,
}

/// Errors that can occur in the call lifecycle.
///
/// Only `Connect` and `Launch` ever propagate out of the lifecycle; everything
/// else is contained and converted into a state transition or a log line.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("transport connect failed: {0}")]
    Connect(#[from] TransportError),

    #[error(transparent)]
    Launch(#[from] LaunchFailed),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<cpal::DevicesError> for CallError {
    fn from(err: cpal::DevicesError) -> Self {
        CallError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for CallError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        CallError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for CallError {
    fn from(err: cpal::BuildStreamError) -> Self {
        CallError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for CallError {
    fn from(err: cpal::PlayStreamError) -> Self {
        CallError::AudioStream(err.to_string())
    }
}
