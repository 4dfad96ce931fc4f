//! Connection supervisor.
//!
//! Owns at most one [`Channel`] at a time and drives its lifecycle:
//!
//! ```text
//!   ┌──► connect ──ok──► pump (read ▸ decode ▸ emit, write queued frames)
//!   │       │                     │ close / error
//!   │     error                   ▼
//!   │       └──────────────► close channel, emit Closed/TransportError
//!   │                             │
//!   └──────── sleep(reconnect_delay) ◄┘
//! ```
//!
//! Retries are unbounded with a fixed delay. Transport failures are never
//! returned to the caller; they only show up as session events. Frames
//! offered while no channel is open are dropped, never queued for later.
//!
//! Images and control frames (`reset`) travel on separate queues. Images
//! go through a small bounded queue and are shed when the writer falls
//! behind; control frames are never shed while the channel is open and
//! are written ahead of any queued image.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::LiveCheckError;
use crate::network::transport::{Channel, Connector};
use crate::protocol::{EncodedImage, InboundMessage, OutboundFrame};
use crate::state::SessionEvent;

/// Fixed delay between a disconnect and the next connect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);
/// Default upper bound for a single connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Frames buffered between the capture loop and the writer.
const OUTBOUND_QUEUE: usize = 8;
/// How long a close handshake may take before the channel is just dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── ManagerSettings ──────────────────────────────────────────────

/// Timing knobs for [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

// ── FrameSender ──────────────────────────────────────────────────

/// Cloneable, non-blocking handle for outbound frames.
///
/// [`send`](Self::send) silently drops the frame when no channel is open
/// or when the session is verified. Images are also dropped when the
/// writer is backed up; control frames are not.
#[derive(Debug, Clone)]
pub struct FrameSender {
    images: mpsc::Sender<EncodedImage>,
    control: mpsc::UnboundedSender<OutboundFrame>,
    open: watch::Receiver<bool>,
    verified: watch::Receiver<bool>,
}

impl FrameSender {
    /// Offer a frame. Returns `true` if it was queued for the writer.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        if !*self.open.borrow() {
            trace!("no open channel; dropping frame");
            return false;
        }
        if *self.verified.borrow() {
            trace!("session verified; dropping frame");
            return false;
        }
        match frame {
            OutboundFrame::Image(image) => match self.images.try_send(image) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("outbound queue full; dropping frame");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            control => self.control.send(control).is_ok(),
        }
    }

    /// Whether a channel is currently open.
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }
}

// ── ConnectionManager ────────────────────────────────────────────

/// How a pumped channel ended.
enum PumpOutcome {
    Closed,
    Failed(String),
    Stopped,
}

/// Connect / reconnect supervisor. Run it with [`run`](Self::run) on its
/// own task.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    settings: ManagerSettings,
    events: mpsc::Sender<SessionEvent>,
    images: mpsc::Receiver<EncodedImage>,
    control: mpsc::UnboundedReceiver<OutboundFrame>,
    open: watch::Sender<bool>,
    verified: watch::Receiver<bool>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager that reports to `events`. `verified` gates the
    /// returned [`FrameSender`].
    pub fn new(
        connector: C,
        settings: ManagerSettings,
        events: mpsc::Sender<SessionEvent>,
        verified: watch::Receiver<bool>,
    ) -> (Self, FrameSender) {
        let (image_tx, images) = mpsc::channel(OUTBOUND_QUEUE);
        let (control_tx, control) = mpsc::unbounded_channel();
        let (open, open_rx) = watch::channel(false);
        let sender = FrameSender {
            images: image_tx,
            control: control_tx,
            open: open_rx,
            verified: verified.clone(),
        };
        let manager = Self {
            connector,
            settings,
            events,
            images,
            control,
            open,
            verified,
        };
        (manager, sender)
    }

    /// Connect, pump, reconnect, forever, until `cancel` fires or the
    /// session stops listening. The active channel is closed on the way
    /// out and a pending reconnect is abandoned.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if !self.emit(SessionEvent::Connecting).await {
                break;
            }

            let attempt = match self.connect(&cancel).await {
                Some(attempt) => attempt,
                None => break,
            };

            let stop = match attempt {
                Ok(channel) => {
                    info!("connected");
                    self.open.send_replace(true);
                    let outcome = if self.emit(SessionEvent::Opened).await {
                        self.pump(channel, &cancel).await
                    } else {
                        Self::close(channel).await;
                        PumpOutcome::Stopped
                    };
                    self.open.send_replace(false);

                    match outcome {
                        PumpOutcome::Closed => {
                            info!("connection closed by peer");
                            !self.emit(SessionEvent::Closed).await
                        }
                        PumpOutcome::Failed(reason) => {
                            warn!("connection failed: {reason}");
                            !self.emit(SessionEvent::TransportError(reason)).await
                        }
                        PumpOutcome::Stopped => true,
                    }
                }
                Err(e) => {
                    if e.is_transport() {
                        warn!("connect failed: {e}");
                    } else {
                        error!("connect failed: {e}");
                    }
                    !self.emit(SessionEvent::TransportError(e.to_string())).await
                }
            };
            if stop {
                break;
            }

            info!("reconnecting in {:?}", self.settings.reconnect_delay);
            if !self.wait_reconnect(&cancel).await {
                break;
            }
        }

        self.open.send_replace(false);
        debug!("connection manager stopped");
    }

    /// One bounded connect attempt. Frames offered meanwhile are dropped.
    /// Returns `None` if cancelled.
    async fn connect(
        &mut self,
        cancel: &CancellationToken,
    ) -> Option<Result<Channel, LiveCheckError>> {
        let timeout = self.settings.connect_timeout;
        let attempt = tokio::time::timeout(timeout, self.connector.connect());
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                result = &mut attempt => {
                    return Some(match result {
                        Ok(inner) => inner,
                        Err(_) => Err(LiveCheckError::ConnectTimeout(timeout)),
                    });
                }
                Some(_) = self.images.recv() => trace!("dropping frame while connecting"),
                Some(_) = self.control.recv() => trace!("dropping control frame while connecting"),
            }
        }
    }

    /// Shuttle frames both ways until the channel ends or we are stopped.
    /// Always closes the channel before returning.
    async fn pump(&mut self, channel: Channel, cancel: &CancellationToken) -> PumpOutcome {
        let Channel {
            mut sink,
            mut stream,
        } = channel;
        let events = &self.events;
        let images = &mut self.images;
        let control = &mut self.control;
        let verified = &self.verified;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break PumpOutcome::Stopped,

                Some(frame) = control.recv() => {
                    if let Err(e) = sink.send(frame.encode()).await {
                        break PumpOutcome::Failed(e.to_string());
                    }
                }

                Some(image) = images.recv() => {
                    // Queued before verification; never written after it.
                    if *verified.borrow() {
                        trace!("session verified; discarding queued frame");
                        continue;
                    }
                    if let Err(e) = sink.send(OutboundFrame::Image(image).encode()).await {
                        break PumpOutcome::Failed(e.to_string());
                    }
                }

                incoming = stream.next() => match incoming {
                    None => break PumpOutcome::Closed,
                    Some(Err(e)) => break PumpOutcome::Failed(e.to_string()),
                    Some(Ok(text)) => {
                        // A bad message is dropped; it never closes the channel.
                        let event = match InboundMessage::decode(&text) {
                            Ok(msg) => SessionEvent::Message(msg),
                            Err(e) => SessionEvent::Malformed(e.to_string()),
                        };
                        if events.send(event).await.is_err() {
                            break PumpOutcome::Stopped;
                        }
                    }
                },
            }
        };

        Self::close(Channel::new(sink, stream)).await;
        outcome
    }

    /// Sleep out the reconnect delay, dropping frames meanwhile. Returns
    /// `false` if cancelled.
    async fn wait_reconnect(&mut self, cancel: &CancellationToken) -> bool {
        let delay = tokio::time::sleep(self.settings.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut delay => return true,
                Some(_) = self.images.recv() => trace!("dropping frame while disconnected"),
                Some(_) = self.control.recv() => trace!("dropping control frame while down"),
            }
        }
    }

    /// Close the sink so the peer sees an orderly shutdown, then drop both
    /// halves.
    async fn close(channel: Channel) {
        let Channel { mut sink, stream } = channel;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => trace!("channel closed"),
            Ok(Err(e)) => trace!("close after failure: {e}"),
            Err(_) => debug!("close handshake timed out"),
        }
        drop(stream);
    }

    async fn emit(&self, event: SessionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}
