//! Inbound status messages.
//!
//! ```json
//! {
//!   "status": "Face Detected",
//!   "message": "Blink to Verify",
//!   "blinks": 1,
//!   "face_box": { "x": 210, "y": 96, "width": 180, "height": 220,
//!                 "frame_width": 640, "frame_height": 480 }
//! }
//! ```
//!
//! `status` and `message` are required; `blinks` and `face_box` are
//! optional and may also be `null`. Unknown fields are ignored.

use serde::Deserialize;

use crate::error::ProtocolError;
use crate::transform::FaceBox;

/// Status string that marks a completed verification.
pub const VERIFIED_STATUS: &str = "verified";

/// A decoded, validated status message from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Free-form status ("No Face", "Face Detected", "verified", "error", ...).
    pub status: String,
    /// Human-readable hint for the user.
    pub message: String,
    /// Blink count reported by the service; replaces the local count.
    pub blinks: Option<u32>,
    /// Where the service found the face in the last frame.
    pub face_box: Option<FaceBox>,
}

/// Loose wire shape; required fields are checked by hand so that a
/// missing field gets its own error instead of a serde message.
#[derive(Debug, Deserialize)]
struct WireMessage {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    blinks: Option<i64>,
    #[serde(default)]
    face_box: Option<FaceBox>,
}

impl InboundMessage {
    /// Decode a text payload received on the channel.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireMessage = serde_json::from_str(text)?;

        let status = wire.status.ok_or(ProtocolError::MissingField("status"))?;
        let message = wire.message.ok_or(ProtocolError::MissingField("message"))?;

        let blinks = match wire.blinks {
            None => None,
            Some(n) => Some(u32::try_from(n).map_err(|_| ProtocolError::InvalidField {
                field: "blinks",
                reason: "must be a non-negative 32-bit integer",
            })?),
        };

        Ok(Self {
            status,
            message,
            blinks,
            face_box: wire.face_box,
        })
    }

    /// Whether this message completes the liveliness check.
    pub fn is_verified(&self) -> bool {
        self.status == VERIFIED_STATUS
    }
}
