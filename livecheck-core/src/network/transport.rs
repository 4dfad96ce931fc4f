//! Transport seam.
//!
//! A [`Connector`] produces one [`Channel`] per successful connect. The
//! channel is split into a text sink and a text stream so the manager can
//! read and write concurrently. The stream ending (`None`) means the peer
//! closed the connection.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use url::Url;

use crate::error::LiveCheckError;

/// Outbound half of a channel.
pub type TextSink = Pin<Box<dyn Sink<String, Error = LiveCheckError> + Send>>;
/// Inbound half of a channel.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LiveCheckError>> + Send>>;

/// A live duplex text channel.
pub struct Channel {
    pub sink: TextSink,
    pub stream: TextStream,
}

impl Channel {
    pub fn new(sink: TextSink, stream: TextStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Channel { .. }")
    }
}

/// Opens channels to the service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Channel, LiveCheckError>;
}

// ── WebSocket ────────────────────────────────────────────────────

/// `ws://` / `wss://` connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Channel, LiveCheckError> {
        info!("connecting to {}", self.url);
        let (ws, response) = connect_async(self.url.as_str()).await?;
        debug!("websocket handshake complete: {}", response.status());

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(LiveCheckError::from)
            .with(|text: String| future::ready(Ok::<_, LiveCheckError>(Message::text(text))));

        // Only text frames carry protocol messages; pings are answered by
        // tungstenite itself and a close frame ends the stream.
        let stream = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(reason)) => {
                    debug!("peer sent close frame: {reason:?}");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(LiveCheckError::from(e))),
            })
        });

        Ok(Channel::new(Box::pin(sink), Box::pin(stream)))
    }
}
