//! # livecheck-core
//!
//! Client-side core for a real-time liveliness check: webcam stills are
//! streamed to a verification service over a WebSocket, and the service's
//! status messages drive the local session.
//!
//! This crate contains:
//! - **Transform**: `compute_transform` / `ZoomPolicy`, the smart-zoom face tracker
//! - **Protocol**: `OutboundFrame` encoding and `InboundMessage` decoding
//! - **Capture**: `FrameSource` capability and the fixed-cadence `CaptureLoop`
//! - **Network**: `ConnectionManager` with unbounded fixed-delay reconnect, `WsConnector`
//! - **State**: `Session` state machine, `ConnectionStatus`
//! - **Client**: `spawn` / `ClientHandle`, the task wiring and user actions
//! - **Photo**: saving the verified photo
//! - **Error**: `LiveCheckError`, a typed, `thiserror`-based error hierarchy

pub mod capture;
pub mod client;
pub mod error;
pub mod network;
pub mod photo;
pub mod protocol;
pub mod state;
pub mod transform;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{CaptureLoop, DirectoryFrameSource, FrameSource, StillFrameSource};
pub use client::{ClientHandle, ClientSettings, spawn};
pub use error::{LiveCheckError, ProtocolError};
pub use network::{
    Channel, ConnectionManager, Connector, FrameSender, ManagerSettings, WsConnector,
    resolve_endpoint,
};
pub use protocol::{EncodedImage, InboundMessage, OutboundFrame};
pub use state::{ConnectionStatus, Effect, Session, SessionEvent, SessionView};
pub use transform::{FaceBox, ViewTransform, ZoomPolicy, compute_transform};
