//! Outbound frames: JPEG stills as data URLs, plus the reset token.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Literal payload asking the service to drop its per-connection state.
pub const RESET_TOKEN: &str = "reset";

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

// ── EncodedImage ─────────────────────────────────────────────────

/// A JPEG-encoded still frame.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    jpeg: Vec<u8>,
}

impl EncodedImage {
    pub fn from_jpeg(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    /// Self-describing `data:image/jpeg;base64,...` form.
    pub fn to_data_url(&self) -> String {
        let capacity = JPEG_DATA_URL_PREFIX.len() + self.jpeg.len().div_ceil(3) * 4;
        let mut out = String::with_capacity(capacity);
        out.push_str(JPEG_DATA_URL_PREFIX);
        STANDARD.encode_string(&self.jpeg, &mut out);
        out
    }

    /// Parse a JPEG data URL. Returns `None` for anything else, including
    /// the reset token.
    pub fn from_data_url(text: &str) -> Option<Self> {
        let payload = text.strip_prefix(JPEG_DATA_URL_PREFIX)?;
        STANDARD.decode(payload).ok().map(Self::from_jpeg)
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedImage({} bytes)", self.jpeg.len())
    }
}

// ── OutboundFrame ────────────────────────────────────────────────

/// Everything the client ever sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A captured still.
    Image(EncodedImage),
    /// Restart request; resynchronises server-side blink state.
    Reset,
}

impl OutboundFrame {
    /// Serialise to the text payload put on the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Image(img) => img.to_data_url(),
            Self::Reset => RESET_TOKEN.to_string(),
        }
    }

    /// Inverse of [`encode`](Self::encode); used by test peers.
    pub fn decode(text: &str) -> Option<Self> {
        if text == RESET_TOKEN {
            return Some(Self::Reset);
        }
        EncodedImage::from_data_url(text).map(Self::Image)
    }
}
