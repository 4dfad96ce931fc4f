//! Domain-specific error types for the livecheck client.
//!
//! Every fallible operation returns `Result<T, LiveCheckError>`. None of
//! these errors is fatal to a running session: transport failures are
//! absorbed by the reconnect policy, protocol failures discard a single
//! message and capture failures skip a single tick.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the livecheck client.
#[derive(Debug, Error)]
pub enum LiveCheckError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The duplex channel failed (handshake, network drop, write error).
    #[error("transport error: {0}")]
    Transport(String),

    /// A connect attempt did not complete within its deadline.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An internal mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The configured endpoint or page origin could not be turned into a
    /// WebSocket URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// An inbound payload was not a valid status message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // ── Capture Errors ───────────────────────────────────────────
    /// The frame source could not produce a frame.
    #[error("capture error: {0}")]
    Capture(String),

    // ── User Action Errors ───────────────────────────────────────
    /// A download was requested before any verified photo was captured.
    #[error("no verified photo has been captured")]
    NoCapturedImage,

    /// Filesystem I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ── ProtocolError ─────────────────────────────────────────────────

/// Why an inbound message was rejected by the decoder.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not a JSON object of the expected shape.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field was present but carried an unusable value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Convenient From implementations ──────────────────────────────

impl From<tokio_tungstenite::tungstenite::Error> for LiveCheckError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        LiveCheckError::Transport(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LiveCheckError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LiveCheckError::ChannelClosed
    }
}

impl From<url::ParseError> for LiveCheckError {
    fn from(e: url::ParseError) -> Self {
        LiveCheckError::InvalidEndpoint(e.to_string())
    }
}

impl LiveCheckError {
    /// Returns `true` for errors the reconnect policy absorbs.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectTimeout(_) | Self::ChannelClosed
        )
    }
}
