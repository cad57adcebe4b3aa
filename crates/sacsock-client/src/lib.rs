//! sacsock-client
//!
//! Minimal async client for sacsock servers: connects with the
//! `sac-sock` subprotocol, emits named events, and yields decoded
//! incoming frames. Used by the integration tests and the interactive
//! CLI binary.

use anyhow::{bail, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sacsock_core::Payload;
use sacsock_protocol::{decode_frame, encode_frame, DecodedFrame, WireFrame, SUBPROTOCOL};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// The sending half of a connection.
pub struct EventSink {
    tx: WsSink,
}

impl EventSink {
    /// Send one named event to the server.
    pub async fn emit(&mut self, event_name: &str, payload: impl Into<Payload>) -> Result<()> {
        let msg = match encode_frame(event_name, &payload.into()) {
            WireFrame::Text(text) => Message::Text(text),
            WireFrame::Binary(data) => Message::Binary(data),
        };
        self.tx.send(msg).await?;
        Ok(())
    }

    /// Start a clean close of the connection.
    pub async fn close(&mut self) -> Result<()> {
        // The server may already have closed; that is not our problem.
        let _ = self.tx.send(Message::Close(None)).await;
        Ok(())
    }
}

/// The receiving half of a connection.
pub struct EventStream {
    rx: WsSource,
}

impl EventStream {
    /// The next decoded event, or `None` once the connection is closed.
    /// Malformed frames and control messages are skipped.
    pub async fn next_event(&mut self) -> Result<Option<DecodedFrame>> {
        while let Some(next) = self.rx.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return Ok(None),
                Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            };
            let data = match msg {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(data) => data,
                Message::Close(_) => return Ok(None),
                _ => continue,
            };
            match decode_frame(&data) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(error = %e, "skipping malformed frame"),
            }
        }
        Ok(None)
    }
}

/// A connection to a sacsock server.
pub struct Connection {
    sink: EventSink,
    stream: EventStream,
}

impl Connection {
    /// Connect and negotiate the `sac-sock` subprotocol. Fails when the
    /// server does not pin the subprotocol in its handshake response.
    pub async fn connect(url: &str) -> Result<Self> {
        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(SUBPROTOCOL),
        );

        let (ws, response) = connect_async(request).await?;

        let negotiated = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        if negotiated != Some(SUBPROTOCOL) {
            bail!("server did not negotiate the {SUBPROTOCOL} subprotocol");
        }
        debug!(url, "connected");

        let (tx, rx) = ws.split();
        Ok(Connection {
            sink: EventSink { tx },
            stream: EventStream { rx },
        })
    }

    pub async fn emit(&mut self, event_name: &str, payload: impl Into<Payload>) -> Result<()> {
        self.sink.emit(event_name, payload).await
    }

    pub async fn next_event(&mut self) -> Result<Option<DecodedFrame>> {
        self.stream.next_event().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await
    }

    /// Split into independently-owned halves, for callers that read and
    /// write from different tasks.
    pub fn split(self) -> (EventSink, EventStream) {
        (self.sink, self.stream)
    }
}
