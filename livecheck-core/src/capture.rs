//! Frame sources and the fixed-cadence capture loop.
//!
//! The loop samples a [`FrameSource`] every tick and hands each still to
//! the connection's [`FrameSender`]. It does not watch the connection:
//! frames produced while the channel is down are dropped by the sender,
//! which keeps the capture cadence independent of connection health.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::LiveCheckError;
use crate::network::FrameSender;
use crate::protocol::{EncodedImage, OutboundFrame};

/// Default time between two captured frames.
pub const CAPTURE_INTERVAL: Duration = Duration::from_millis(100);

// ── FrameSource ──────────────────────────────────────────────────

/// Anything that can hand out the current video frame as a JPEG still.
///
/// `Ok(None)` means "no frame right now" (camera warming up, no device);
/// the tick is skipped without complaint.
pub trait FrameSource: Send + Sync {
    fn grab(&self) -> Result<Option<EncodedImage>, LiveCheckError>;
}

/// Always returns the same still, or nothing.
#[derive(Debug, Clone, Default)]
pub struct StillFrameSource {
    image: Option<EncodedImage>,
}

impl StillFrameSource {
    pub fn new(image: EncodedImage) -> Self {
        Self { image: Some(image) }
    }

    /// A source that never yields a frame.
    pub fn empty() -> Self {
        Self { image: None }
    }
}

impl FrameSource for StillFrameSource {
    fn grab(&self) -> Result<Option<EncodedImage>, LiveCheckError> {
        Ok(self.image.clone())
    }
}

/// Cycles through the `*.jpg` / `*.jpeg` files of a directory in name
/// order, one file per grab. Stands in for a camera when replaying
/// recorded frames.
///
/// Every file is read once, in [`open`](Self::open); grabbing never
/// touches the filesystem, so it is safe on an async worker thread.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    frames: Vec<EncodedImage>,
    cursor: AtomicUsize,
}

impl DirectoryFrameSource {
    /// Scan `dir` and load its JPEG files. This blocks; call it before
    /// starting the runtime work or from `spawn_blocking`.
    pub fn open(dir: &Path) -> Result<Self, LiveCheckError> {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_jpeg = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
            if is_jpeg && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut frames = Vec::with_capacity(files.len());
        for path in &files {
            let bytes = std::fs::read(path)
                .map_err(|e| LiveCheckError::Capture(format!("{}: {e}", path.display())))?;
            let image = EncodedImage::from_jpeg(bytes);
            if image.is_empty() {
                warn!("skipping empty frame {}", path.display());
                continue;
            }
            frames.push(image);
        }

        info!("frame source: {} jpeg files in {}", frames.len(), dir.display());
        Ok(Self {
            frames,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn grab(&self) -> Result<Option<EncodedImage>, LiveCheckError> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        Ok(Some(self.frames[idx].clone()))
    }
}

// ── CaptureLoop ──────────────────────────────────────────────────

/// Periodic sampler feeding the connection.
pub struct CaptureLoop {
    source: Arc<dyn FrameSource>,
    sender: FrameSender,
    verified: watch::Receiver<bool>,
    interval: Duration,
}

impl CaptureLoop {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sender: FrameSender,
        verified: watch::Receiver<bool>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            sender,
            verified,
            interval,
        }
    }

    /// Run until `cancel` fires. Returns how many frames were accepted
    /// by the sender.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sent: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Inert once verified: do not even sample the source.
            if *self.verified.borrow() {
                continue;
            }

            let image = match self.source.grab() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    trace!("no frame available; skipping tick");
                    continue;
                }
                Err(e) => {
                    debug!("capture failed: {e}; skipping tick");
                    continue;
                }
            };

            if self.sender.send(OutboundFrame::Image(image)) {
                sent += 1;
            }
        }

        debug!("capture loop stopped after {sent} frames");
        sent
    }
}

// ── Tests ────────────────────────────────────────────────────────
