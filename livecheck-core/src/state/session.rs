//! The client-side session state machine.
//!
//! All mutation goes through [`Session::apply`]: connection callbacks,
//! decoded service messages and user actions are turned into
//! [`SessionEvent`]s by the caller, and the session answers with the
//! [`Effect`]s the caller must perform. The session itself never touches
//! the network or the camera, which keeps it testable without either.
//!
//! ```text
//!              Message{status: "verified"}
//!  Unverified ────────────────────────────► Verified ──┐
//!      ▲                                               │
//!      └──────────────────── Restart ──────────────────┘
//! ```

use tracing::{debug, info, warn};

use crate::protocol::{EncodedImage, InboundMessage};
use crate::state::connection::ConnectionStatus;
use crate::transform::{ViewTransform, ZoomPolicy};

// ── Events & effects ─────────────────────────────────────────────

/// Something that happened to the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A (re)connect attempt started.
    Connecting,
    /// The channel opened.
    Opened,
    /// The channel closed.
    Closed,
    /// The channel failed; handled exactly like a close.
    TransportError(String),
    /// A decoded status message arrived.
    Message(InboundMessage),
    /// A payload arrived that the decoder rejected.
    Malformed(String),
    /// The frame requested by [`Effect::CapturePhoto`] is available.
    PhotoCaptured(EncodedImage),
    /// The user asked to start over.
    Restart,
}

/// Side effects requested by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Grab the current frame and feed it back as
    /// [`SessionEvent::PhotoCaptured`].
    CapturePhoto,
    /// Tell the service to reset its state.
    SendReset,
}

// ── SessionView ──────────────────────────────────────────────────

/// Immutable snapshot of the session, published to renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub connection: ConnectionStatus,
    pub status: String,
    pub message: String,
    pub blink_count: u32,
    pub verified: bool,
    pub view: ViewTransform,
    pub has_photo: bool,
}

// ── Session ──────────────────────────────────────────────────────

/// Connection and verification state for one liveliness check.
#[derive(Debug, Clone)]
pub struct Session {
    connection: ConnectionStatus,
    status: String,
    message: String,
    blink_count: u32,
    verified: bool,
    view: ViewTransform,
    captured_image: Option<EncodedImage>,
    zoom: ZoomPolicy,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ZoomPolicy::default())
    }
}

impl Session {
    pub fn new(zoom: ZoomPolicy) -> Self {
        if !zoom.is_valid() {
            warn!("invalid zoom policy {zoom:?}; using defaults");
        }
        Self {
            connection: ConnectionStatus::Connecting,
            status: "Connecting...".into(),
            message: "Initializing...".into(),
            blink_count: 0,
            verified: false,
            view: ViewTransform::IDENTITY,
            captured_image: None,
            zoom: zoom.or_default(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn blink_count(&self) -> u32 {
        self.blink_count
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn view_transform(&self) -> ViewTransform {
        self.view
    }

    pub fn captured_image(&self) -> Option<&EncodedImage> {
        self.captured_image.as_ref()
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> SessionView {
        SessionView {
            connection: self.connection,
            status: self.status.clone(),
            message: self.message.clone(),
            blink_count: self.blink_count,
            verified: self.verified,
            view: self.view,
            has_photo: self.captured_image.is_some(),
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Apply one event and return the effects the caller must run.
    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::Connecting => {
                self.connection.begin_connect();
                Vec::new()
            }
            SessionEvent::Opened => {
                self.connection.open();
                self.status = "Connected".into();
                self.message = "Ready".into();
                Vec::new()
            }
            SessionEvent::Closed => {
                self.on_disconnect();
                Vec::new()
            }
            SessionEvent::TransportError(reason) => {
                debug!("transport error: {reason}");
                self.on_disconnect();
                Vec::new()
            }
            SessionEvent::Message(msg) => self.on_message(msg),
            SessionEvent::Malformed(reason) => {
                warn!("discarding malformed message: {reason}");
                Vec::new()
            }
            SessionEvent::PhotoCaptured(image) => {
                if self.verified && self.captured_image.is_none() {
                    info!("captured verified photo ({} bytes)", image.len());
                    self.captured_image = Some(image);
                } else {
                    debug!("dropping late photo capture");
                }
                Vec::new()
            }
            SessionEvent::Restart => {
                self.restart();
                vec![Effect::SendReset]
            }
        }
    }

    fn on_disconnect(&mut self) {
        if let Some(uptime) = self.connection.connected_duration() {
            info!("connection lost after {:.1}s", uptime.as_secs_f64());
        }
        self.connection.drop_connection();
        self.status = "Disconnected".into();
        self.message = "Reconnecting...".into();
    }

    fn on_message(&mut self, msg: InboundMessage) -> Vec<Effect> {
        if let Some(blinks) = msg.blinks {
            self.blink_count = blinks;
        }

        // Once verified, the status and the transform are frozen; only the
        // informational fields keep updating.
        if self.verified {
            self.message = msg.message;
            return Vec::new();
        }

        self.view = self.zoom.compute(msg.face_box.as_ref());
        self.message = msg.message;

        if msg.status == crate::protocol::VERIFIED_STATUS {
            info!("session verified after {} blinks", self.blink_count);
            self.status = msg.status;
            self.verified = true;
            return vec![Effect::CapturePhoto];
        }

        self.status = msg.status;
        Vec::new()
    }

    /// Reset verification, blinks, photo and transform together.
    fn restart(&mut self) {
        info!("restarting session");
        self.verified = false;
        self.blink_count = 0;
        self.captured_image = None;
        self.view = ViewTransform::IDENTITY;

        if self.connection.is_connected() {
            self.status = "Connected".into();
            self.message = "Ready".into();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
