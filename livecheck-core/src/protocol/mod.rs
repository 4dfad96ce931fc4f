//! Wire protocol spoken with the liveliness verification service.
//!
//! A single WebSocket text channel carries both directions:
//!
//! ```text
//! Client ──[data:image/jpeg;base64,...]──────► Service   (every capture tick)
//! Client ──[reset]───────────────────────────► Service   (user restart)
//!
//! Service ──[{"status":..,"message":..,
//!            "blinks":..,"face_box":{..}}]───► Client    (per processed frame)
//! ```
//!
//! Outbound payloads are plain text, inbound payloads are JSON objects.
//! A message whose `status` is `"verified"` ends the check.

pub mod inbound;
pub mod outbound;

pub use inbound::{InboundMessage, VERIFIED_STATUS};
pub use outbound::{EncodedImage, OutboundFrame, RESET_TOKEN};
