//! Client runtime: wires the components into running tasks.
//!
//! ```text
//!  CaptureLoop ──frames──► FrameSender ──► ConnectionManager ◄──► service
//!                                               │ SessionEvent
//!  ClientHandle ──commands──► session actor ◄───┘
//!                                 │
//!                    watch<SessionView> ──► renderer
//! ```
//!
//! The [`Session`] is owned by a single actor task; connection events and
//! user commands are applied one at a time, in arrival order, so no lock
//! is needed around it even on a multi-threaded runtime. Other tasks only
//! observe it through `watch` channels.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CAPTURE_INTERVAL, CaptureLoop, FrameSource};
use crate::error::LiveCheckError;
use crate::network::{ConnectionManager, Connector, FrameSender, ManagerSettings};
use crate::photo;
use crate::protocol::{EncodedImage, OutboundFrame};
use crate::state::{Effect, Session, SessionEvent, SessionView};
use crate::transform::ZoomPolicy;

/// Events buffered between the connection manager and the session actor.
const EVENT_QUEUE: usize = 64;
/// User commands buffered for the session actor.
const COMMAND_QUEUE: usize = 16;

// ── ClientSettings ───────────────────────────────────────────────

/// Everything tunable about a running client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSettings {
    pub capture_interval: Duration,
    pub connection: ManagerSettings,
    pub zoom: ZoomPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            capture_interval: CAPTURE_INTERVAL,
            connection: ManagerSettings::default(),
            zoom: ZoomPolicy::default(),
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────

enum Command {
    Restart,
    TakePhoto(oneshot::Sender<Option<EncodedImage>>),
}

// ── ClientHandle ─────────────────────────────────────────────────

/// Handle to a running client. Dropping it tears the client down.
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    view_rx: watch::Receiver<SessionView>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Start a client: session actor, connection manager and capture loop.
pub fn spawn<C: Connector>(
    connector: C,
    source: Arc<dyn FrameSource>,
    settings: ClientSettings,
) -> ClientHandle {
    let cancel = CancellationToken::new();
    let session = Session::new(settings.zoom);

    let (view_tx, view_rx) = watch::channel(session.view());
    let (verified_tx, verified_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

    let (manager, frames) =
        ConnectionManager::new(connector, settings.connection, event_tx, verified_rx.clone());
    let capture = CaptureLoop::new(
        Arc::clone(&source),
        frames.clone(),
        verified_rx,
        settings.capture_interval,
    );

    let actor = SessionActor {
        session,
        view_tx,
        verified_tx,
        frames,
        source,
    };

    let tasks = vec![
        tokio::spawn(actor.run(event_rx, command_rx, cancel.clone())),
        tokio::spawn(manager.run(cancel.clone())),
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                capture.run(cancel).await;
            }
        }),
    ];

    info!("client started");
    ClientHandle {
        commands: command_tx,
        view_rx,
        cancel,
        tasks,
    }
}

impl ClientHandle {
    /// Receiver yielding a fresh [`SessionView`] after every change.
    pub fn view_receiver(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    /// The latest session snapshot.
    pub fn view(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    /// Reset local state and ask the service to do the same.
    pub async fn restart(&self) -> Result<(), LiveCheckError> {
        self.commands.send(Command::Restart).await?;
        Ok(())
    }

    /// The verified photo, if one has been captured.
    pub async fn captured_photo(&self) -> Result<Option<EncodedImage>, LiveCheckError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::TakePhoto(tx)).await?;
        rx.await.map_err(|_| LiveCheckError::ChannelClosed)
    }

    /// Save the verified photo into `dir` and return its path.
    pub async fn download(&self, dir: &Path) -> Result<PathBuf, LiveCheckError> {
        let image = self
            .captured_photo()
            .await?
            .ok_or(LiveCheckError::NoCapturedImage)?;
        photo::save_photo(dir, &image).await
    }

    /// Stop every task, close the connection and wait for the teardown to
    /// finish. No timer fires afterwards.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("client task ended abnormally: {e}");
            }
        }
        info!("client stopped");
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── SessionActor ─────────────────────────────────────────────────

/// Sole owner of the [`Session`].
struct SessionActor {
    session: Session,
    view_tx: watch::Sender<SessionView>,
    verified_tx: watch::Sender<bool>,
    frames: FrameSender,
    source: Arc<dyn FrameSource>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut commands: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => self.handle(event),
                Some(command) = commands.recv() => match command {
                    Command::Restart => self.handle(SessionEvent::Restart),
                    Command::TakePhoto(reply) => {
                        let _ = reply.send(self.session.captured_image().cloned());
                    }
                },
                else => break,
            }
        }
        debug!("session actor stopped");
    }

    /// Apply one event, publish the new state, then run its effects.
    fn handle(&mut self, event: SessionEvent) {
        let effects = self.session.apply(event);
        self.publish();

        for effect in effects {
            match effect {
                Effect::CapturePhoto => self.capture_photo(),
                Effect::SendReset => {
                    if !self.frames.is_open() {
                        debug!("reset not sent: no open channel");
                    } else if !self.frames.send(OutboundFrame::Reset) {
                        warn!("reset not sent: writer stopped");
                    }
                }
            }
        }
    }

    fn capture_photo(&mut self) {
        match self.source.grab() {
            Ok(Some(image)) => {
                self.session.apply(SessionEvent::PhotoCaptured(image));
                self.publish();
            }
            Ok(None) => warn!("verified, but the frame source had no frame to keep"),
            Err(e) => warn!("verified, but capturing the photo failed: {e}"),
        }
    }

    fn publish(&self) {
        // The verified flag gates the capture loop and the sender, so it
        // is updated before any effect runs.
        self.verified_tx.send_if_modified(|v| {
            let changed = *v != self.session.is_verified();
            *v = self.session.is_verified();
            changed
        });
        self.view_tx.send_replace(self.session.view());
    }
}
