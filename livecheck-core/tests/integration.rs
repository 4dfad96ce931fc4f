//! Integration tests: connection lifecycle, reconnect timing, the send
//! guard and full client sessions, run against an in-memory service on
//! tokio's paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use livecheck_core::network::TextSink;
use livecheck_core::{
    Channel, ClientSettings, ConnectionManager, Connector, EncodedImage, FrameSender,
    FrameSource, LiveCheckError, ManagerSettings, OutboundFrame, SessionEvent,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Service side of one fake connection.
struct Peer {
    /// Service → client.
    tx: UnboundedSender<Result<String, LiveCheckError>>,
    /// Client → service.
    rx: UnboundedReceiver<String>,
}

impl Peer {
    fn say(&self, text: &str) {
        self.tx.unbounded_send(Ok(text.to_string())).unwrap();
    }

    fn fail(&self, reason: &str) {
        self.tx
            .unbounded_send(Err(LiveCheckError::Transport(reason.into())))
            .unwrap();
    }

    /// Next frame the client sent, or `None` once the client closed.
    async fn next(&mut self) -> Option<String> {
        self.rx.next().await
    }

    /// Next image frame, skipping anything else.
    async fn next_image(&mut self) -> EncodedImage {
        loop {
            let text = self.next().await.expect("client closed");
            if let Some(OutboundFrame::Image(img)) = OutboundFrame::decode(&text) {
                return img;
            }
        }
    }

    /// Frames already delivered, without waiting.
    fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Some(text)) = self.rx.try_next() {
            out.push(text);
        }
        out
    }
}

#[derive(Default)]
struct FakeState {
    attempts: Vec<Instant>,
    fail_next: usize,
    client_sinks: Vec<UnboundedSender<String>>,
    max_live: usize,
    write_delay: Option<Duration>,
}

/// Connector handing out in-memory channels and recording every attempt.
#[derive(Clone)]
struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl FakeConnector {
    fn new() -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            peers,
        };
        (connector, peer_rx)
    }

    fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    /// Every frame the client writes takes `delay` to go out.
    fn slow_writes(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = Some(delay);
    }

    fn attempts(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Channel, LiveCheckError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(Instant::now());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LiveCheckError::Transport("connection refused".into()));
        }

        let live = state.client_sinks.iter().filter(|s| !s.is_closed()).count() + 1;
        state.max_live = state.max_live.max(live);

        let (client_tx, peer_rx) = unbounded::<String>();
        let (peer_tx, client_rx) = unbounded::<Result<String, LiveCheckError>>();
        state.client_sinks.push(client_tx.clone());
        let write_delay = state.write_delay;
        drop(state);

        let _ = self.peers.send(Peer {
            tx: peer_tx,
            rx: peer_rx,
        });

        let sink = client_tx.sink_map_err(|e| LiveCheckError::Transport(e.to_string()));
        let sink: TextSink = match write_delay {
            Some(delay) => Box::pin(sink.with(move |text: String| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, LiveCheckError>(text)
            })),
            None => Box::pin(sink),
        };
        Ok(Channel::new(sink, Box::pin(client_rx)))
    }
}

/// Frame source counting how often it was sampled.
struct CountingSource {
    grabs: AtomicUsize,
}

impl CountingSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            grabs: AtomicUsize::new(0),
        })
    }

    fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl FrameSource for CountingSource {
    fn grab(&self) -> Result<Option<EncodedImage>, LiveCheckError> {
        let n = self.grabs.fetch_add(1, Ordering::SeqCst) as u8;
        Ok(Some(EncodedImage::from_jpeg(vec![0xFF, 0xD8, n])))
    }
}

struct ManagerRig {
    events: mpsc::Receiver<SessionEvent>,
    frames: FrameSender,
    verified: watch::Sender<bool>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

fn start_manager(connector: FakeConnector) -> ManagerRig {
    let (event_tx, events) = mpsc::channel(64);
    let (verified, verified_rx) = watch::channel(false);
    let (manager, frames) =
        ConnectionManager::new(connector, ManagerSettings::default(), event_tx, verified_rx);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(manager.run(cancel.clone()));
    ManagerRig {
        events,
        frames,
        verified,
        cancel,
        task,
    }
}

async fn next_event(rig: &mut ManagerRig) -> SessionEvent {
    rig.events.recv().await.expect("manager stopped")
}

fn image(byte: u8) -> OutboundFrame {
    OutboundFrame::Image(EncodedImage::from_jpeg(vec![byte]))
}

const RECONNECT: Duration = Duration::from_millis(3000);

fn assert_gap(a: Instant, b: Instant, expected: Duration) {
    let gap = b - a;
    assert!(
        gap >= expected && gap < expected + Duration::from_millis(10),
        "expected ~{expected:?} between attempts, got {gap:?}"
    );
}

// ── Connection manager ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_connects_retry_every_three_seconds() {
    let (connector, mut peers) = FakeConnector::new();
    connector.fail_next(3);
    let mut rig = start_manager(connector.clone());

    for _ in 0..3 {
        assert!(matches!(next_event(&mut rig).await, SessionEvent::Connecting));
        assert!(matches!(next_event(&mut rig).await, SessionEvent::TransportError(_)));
    }
    assert!(matches!(next_event(&mut rig).await, SessionEvent::Connecting));
    assert!(matches!(next_event(&mut rig).await, SessionEvent::Opened));
    let _peer = peers.recv().await.unwrap();

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert_gap(pair[0], pair[1], RECONNECT);
    }

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn peer_close_schedules_exactly_one_reconnect() {
    let (connector, mut peers) = FakeConnector::new();
    let mut rig = start_manager(connector.clone());

    assert!(matches!(next_event(&mut rig).await, SessionEvent::Connecting));
    assert!(matches!(next_event(&mut rig).await, SessionEvent::Opened));
    let first = peers.recv().await.unwrap();

    // Service hangs up.
    let Peer { tx, mut rx } = first;
    drop(tx);
    assert!(matches!(next_event(&mut rig).await, SessionEvent::Closed));
    // The old channel was closed explicitly from the client side.
    assert_eq!(rx.next().await, None);

    assert!(matches!(next_event(&mut rig).await, SessionEvent::Connecting));
    assert!(matches!(next_event(&mut rig).await, SessionEvent::Opened));
    let _second = peers.recv().await.unwrap();

    // Nothing else is scheduled while the new channel is healthy.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 2);
    assert_gap(attempts[0], attempts[1], RECONNECT);
    assert_eq!(connector.max_live(), 1);

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn transport_error_takes_the_close_path() {
    let (connector, mut peers) = FakeConnector::new();
    let mut rig = start_manager(connector.clone());

    next_event(&mut rig).await;
    next_event(&mut rig).await;
    let mut peer = peers.recv().await.unwrap();

    peer.fail("connection reset");
    assert!(matches!(
        next_event(&mut rig).await,
        SessionEvent::TransportError(reason) if reason.contains("connection reset")
    ));
    assert_eq!(peer.next().await, None);

    assert!(matches!(next_event(&mut rig).await, SessionEvent::Connecting));
    assert!(matches!(next_event(&mut rig).await, SessionEvent::Opened));
    assert_eq!(connector.max_live(), 1);

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_message_keeps_connection_open() {
    let (connector, mut peers) = FakeConnector::new();
    let mut rig = start_manager(connector.clone());

    next_event(&mut rig).await;
    next_event(&mut rig).await;
    let mut peer = peers.recv().await.unwrap();

    peer.say("{not json");
    peer.say(r#"{"status":"Face Detected","message":"Blink to Verify","blinks":1}"#);

    assert!(matches!(next_event(&mut rig).await, SessionEvent::Malformed(_)));
    match next_event(&mut rig).await {
        SessionEvent::Message(msg) => assert_eq!(msg.blinks, Some(1)),
        other => panic!("unexpected event {other:?}"),
    }

    // Still the same, still writable channel.
    assert!(rig.frames.send(image(7)));
    assert_eq!(OutboundFrame::decode(&peer.next().await.unwrap()), Some(image(7)));
    assert_eq!(connector.attempts().len(), 1);

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sends_are_dropped_unless_open_and_unverified() {
    let (connector, mut peers) = FakeConnector::new();
    connector.fail_next(1);
    let mut rig = start_manager(connector.clone());

    // Not connected yet.
    assert!(!rig.frames.send(image(1)));
    assert!(!rig.frames.is_open());

    while !matches!(next_event(&mut rig).await, SessionEvent::Opened) {}
    let mut peer = peers.recv().await.unwrap();
    assert!(rig.frames.is_open());

    assert!(rig.frames.send(image(2)));
    assert_eq!(OutboundFrame::decode(&peer.next().await.unwrap()), Some(image(2)));

    // Verified: everything is dropped, including resets.
    rig.verified.send_replace(true);
    assert!(!rig.frames.send(image(3)));
    assert!(!rig.frames.send(OutboundFrame::Reset));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(peer.drain().is_empty());

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reset_is_not_dropped_behind_a_full_image_queue() {
    let (connector, mut peers) = FakeConnector::new();
    connector.slow_writes(Duration::from_secs(1));
    let mut rig = start_manager(connector);

    while !matches!(next_event(&mut rig).await, SessionEvent::Opened) {}
    let mut peer = peers.recv().await.unwrap();

    // More images than the writer can keep up with.
    let accepted = (0..20u8).filter(|&n| rig.frames.send(image(n))).count();
    assert!(accepted < 20, "image queue never filled");
    assert!(rig.frames.send(OutboundFrame::Reset));

    // At most the frame already in flight goes out ahead of the reset.
    let first = peer.next().await.unwrap();
    let second = peer.next().await.unwrap();
    assert!(first == "reset" || second == "reset", "got {first:.20} then {second:.20}");

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn queued_images_are_not_written_once_verified() {
    let (connector, mut peers) = FakeConnector::new();
    let mut rig = start_manager(connector);

    while !matches!(next_event(&mut rig).await, SessionEvent::Opened) {}
    let mut peer = peers.recv().await.unwrap();

    // Queued while unverified, then the session verifies before the
    // writer gets to them.
    assert!(rig.frames.send(image(1)));
    assert!(rig.frames.send(image(2)));
    rig.verified.send_replace(true);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(peer.drain().is_empty());

    rig.cancel.cancel();
    rig.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancel_closes_active_connection() {
    let (connector, mut peers) = FakeConnector::new();
    let mut rig = start_manager(connector);

    next_event(&mut rig).await;
    next_event(&mut rig).await;
    let mut peer = peers.recv().await.unwrap();

    rig.cancel.cancel();
    rig.task.await.unwrap();
    assert_eq!(peer.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn cancel_abandons_pending_reconnect() {
    let (connector, _peers) = FakeConnector::new();
    connector.fail_next(usize::MAX);
    let mut rig = start_manager(connector.clone());

    next_event(&mut rig).await;
    assert!(matches!(next_event(&mut rig).await, SessionEvent::TransportError(_)));

    // Mid-way through the reconnect delay.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    rig.cancel.cancel();
    rig.task.await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts().len(), 1);
}

// ── Full client ──────────────────────────────────────────────────

fn start_client(
    connector: FakeConnector,
    source: Arc<CountingSource>,
) -> livecheck_core::ClientHandle {
    livecheck_core::spawn(connector, source, ClientSettings::default())
}

#[tokio::test(start_paused = true)]
async fn frames_flow_every_hundred_milliseconds() {
    let (connector, mut peers) = FakeConnector::new();
    let source = CountingSource::new();
    let client = start_client(connector, Arc::clone(&source));

    let mut peer = peers.recv().await.unwrap();
    let first = peer.next_image().await;
    let t0 = Instant::now();
    let second = peer.next_image().await;
    let gap = Instant::now() - t0;

    assert_ne!(first, second);
    assert!(gap <= Duration::from_millis(110), "gap was {gap:?}");
    assert!(client.view().connection.is_connected());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn verification_captures_once_and_stops_streaming() {
    let (connector, mut peers) = FakeConnector::new();
    let source = CountingSource::new();
    let client = start_client(connector, Arc::clone(&source));
    let mut views = client.view_receiver();

    let mut peer = peers.recv().await.unwrap();
    peer.next_image().await;

    peer.say(
        r#"{"status":"Face Detected","message":"Blink to Verify","blinks":1,
            "face_box":{"x":0,"y":0,"width":100,"height":100,"frame_width":640,"frame_height":480}}"#,
    );
    let zoomed = views.wait_for(|v| v.blink_count == 1).await.unwrap().clone();
    assert!((zoomed.view.scale - 2.4).abs() < 1e-9);

    peer.say(
        r#"{"status":"verified","message":"Done","blinks":2,
            "face_box":{"x":0,"y":0,"width":100,"height":100,"frame_width":640,"frame_height":480}}"#,
    );
    let verified = views.wait_for(|v| v.verified && v.has_photo).await.unwrap().clone();
    assert_eq!(verified.blink_count, 2);
    assert_eq!(verified.status, "verified");
    assert_eq!(verified.view, zoomed.view);

    let grabs_at_verify = source.grabs();
    peer.drain();
    tokio::time::sleep(Duration::from_secs(2)).await;

    // No sampling and no sending once verified.
    assert_eq!(source.grabs(), grabs_at_verify);
    assert!(peer.drain().is_empty());

    // Later face boxes do not move the frozen view.
    peer.say(
        r#"{"status":"Face Detected","message":"still here","blinks":2,
            "face_box":{"x":270,"y":190,"width":100,"height":240,"frame_width":640,"frame_height":480}}"#,
    );
    views.wait_for(|v| v.message == "still here").await.unwrap();
    assert_eq!(client.view().view, zoomed.view);
    assert!(client.view().verified);

    let photo = client.captured_photo().await.unwrap().unwrap();
    assert_eq!(photo.as_bytes()[..2], [0xFF, 0xD8]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restart_resets_and_resumes_streaming() {
    let (connector, mut peers) = FakeConnector::new();
    let source = CountingSource::new();
    let client = start_client(connector, Arc::clone(&source));
    let mut views = client.view_receiver();

    let mut peer = peers.recv().await.unwrap();
    peer.say(r#"{"status":"verified","message":"Done","blinks":2}"#);
    views.wait_for(|v| v.has_photo).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    peer.drain();

    assert_ok!(client.restart().await);
    let reset = views.wait_for(|v| !v.verified).await.unwrap().clone();
    assert_eq!(reset.blink_count, 0);
    assert!(!reset.has_photo);
    assert!(reset.view.is_identity());

    // The service is told first, then frames resume.
    assert_eq!(peer.next().await.as_deref(), Some("reset"));
    peer.next_image().await;
    assert!(client.captured_photo().await.unwrap().is_none());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restart_reaches_a_slow_service() {
    let (connector, mut peers) = FakeConnector::new();
    connector.slow_writes(Duration::from_secs(1));
    let client = start_client(connector, CountingSource::new());

    let mut peer = peers.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_ok!(client.restart().await);

    let reset_seen = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(text) = peer.next().await {
            if text == "reset" {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(reset_seen, Ok(true));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn download_requires_a_verified_photo() {
    let (connector, mut peers) = FakeConnector::new();
    let client = start_client(connector, CountingSource::new());
    let mut views = client.view_receiver();
    let dir = tempfile::tempdir().unwrap();

    let peer = peers.recv().await.unwrap();
    assert!(matches!(
        client.download(dir.path()).await,
        Err(LiveCheckError::NoCapturedImage)
    ));

    peer.say(r#"{"status":"verified","message":"Done","blinks":2}"#);
    views.wait_for(|v| v.has_photo).await.unwrap();

    let path = assert_ok!(client.download(dir.path()).await);
    let saved = std::fs::read(&path).unwrap();
    assert_eq!(saved[..2], [0xFF, 0xD8]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn client_survives_disconnect_and_reports_it() {
    let (connector, mut peers) = FakeConnector::new();
    let client = start_client(connector.clone(), CountingSource::new());
    let mut views = client.view_receiver();

    let first = peers.recv().await.unwrap();
    views.wait_for(|v| v.connection.is_connected()).await.unwrap();

    drop(first);
    let down = views
        .wait_for(|v| v.connection.is_disconnected())
        .await
        .unwrap()
        .clone();
    assert_eq!(down.status, "Disconnected");
    assert_eq!(down.message, "Reconnecting...");

    let mut second = peers.recv().await.unwrap();
    views.wait_for(|v| v.connection.is_connected()).await.unwrap();
    second.next_image().await;
    assert_eq!(connector.max_live(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_leaves_no_timers_behind() {
    let (connector, _peers) = FakeConnector::new();
    connector.fail_next(usize::MAX);
    let source = CountingSource::new();
    let client = start_client(connector.clone(), Arc::clone(&source));

    tokio::time::sleep(Duration::from_millis(3500)).await;
    let attempts = connector.attempts().len();
    assert_eq!(attempts, 2);

    client.shutdown().await;
    let grabs = source.grabs();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts().len(), attempts);
    assert_eq!(source.grabs(), grabs);
}
