//! Per-connection socket handle and I/O loops.
//!
//! Responsibilities:
//! - [`Socket`]: the handle handed to event handlers; stable id, room
//!   membership shadow, emit/broadcast/roomcast, close-once semantics.
//! - [`run_connection`]: one task per connection that reads websocket
//!   messages, decodes event frames and dispatches handlers.
//! - a writer task per connection that owns the websocket sink, so all
//!   writes to one transport are serialized without a lock around I/O.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use sacsock_core::{socket_room, BroadcastMsg, Payload, RoomMsg};
use sacsock_protocol::{decode_frame, encode_frame, WireFrame};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::server::ServerShared;
use crate::types::random_id;

/// Bytes of entropy behind each socket id (base64-encoded to 32 chars).
const SOCKET_ID_LEN: usize = 24;

fn new_socket_id() -> String {
    random_id(SOCKET_ID_LEN)
}

/// Errors returned by [`Socket::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    /// The socket's close has already been observed.
    Closed,
    /// The connection's writer task has gone away.
    ChannelClosed,
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::Closed => write!(f, "socket is closed"),
            EmitError::ChannelClosed => write!(f, "socket writer has shut down"),
        }
    }
}

impl std::error::Error for EmitError {}

struct SocketInner {
    id: String,
    out_tx: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    /// Local shadow of this socket's room memberships; answers
    /// `in_room`/`rooms` without a hub round-trip. The hub's index is the
    /// cross-cutting authority.
    rooms: RwLock<HashSet<String>>,
    shared: Arc<ServerShared>,
}

/// One live client connection. Cheap to clone; all clones refer to the
/// same underlying connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    pub(crate) fn new(shared: Arc<ServerShared>, out_tx: mpsc::UnboundedSender<Message>) -> Self {
        Socket {
            inner: Arc::new(SocketInner {
                id: new_socket_id(),
                out_tx,
                closed: AtomicBool::new(false),
                rooms: RwLock::new(HashSet::new()),
                shared,
            }),
        }
    }

    /// The unique id of this socket, stable for its lifetime.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// True if this socket is currently a member of `room_name`.
    pub fn in_room(&self, room_name: &str) -> bool {
        self.rooms_shadow().contains(room_name)
    }

    /// The rooms this socket is a member of.
    pub fn rooms(&self) -> Vec<String> {
        self.rooms_shadow().iter().cloned().collect()
    }

    fn rooms_shadow(&self) -> std::sync::RwLockReadGuard<'_, HashSet<String>> {
        self.inner.rooms.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Add this socket to a room, creating it on first join. Idempotent.
    pub async fn join(&self, room_name: &str) {
        self.inner
            .rooms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(room_name.to_string());
        self.inner
            .shared
            .hub
            .join_room(room_name.to_string(), self.clone())
            .await;
    }

    /// Remove this socket from a room. Idempotent; the room is dropped
    /// when its last member leaves.
    pub async fn leave(&self, room_name: &str) {
        self.inner
            .rooms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(room_name);
        self.inner
            .shared
            .hub
            .leave_room(room_name.to_string(), self.id().to_string())
            .await;
    }

    /// Send one event to this socket only. The frame is queued for the
    /// connection's writer; queuing never blocks.
    pub fn emit(&self, event_name: &str, payload: impl Into<Payload>) -> Result<(), EmitError> {
        if self.is_closed() {
            return Err(EmitError::Closed);
        }
        let msg = match encode_frame(event_name, &payload.into()) {
            WireFrame::Text(text) => Message::Text(text),
            WireFrame::Binary(data) => Message::Binary(data),
        };
        self.inner
            .out_tx
            .send(msg)
            .map_err(|_| EmitError::ChannelClosed)
    }

    /// Dispatch an event to every socket on the server (and on all peers,
    /// when a multihome backend is installed).
    pub async fn broadcast(&self, event_name: &str, payload: impl Into<Payload>) {
        self.inner
            .shared
            .hub
            .broadcast(BroadcastMsg::new(event_name, payload))
            .await;
    }

    /// Dispatch an event to every member of a room.
    pub async fn roomcast(&self, room_name: &str, event_name: &str, payload: impl Into<Payload>) {
        self.inner
            .shared
            .hub
            .roomcast(RoomMsg::new(room_name, event_name, payload))
            .await;
    }

    /// Close this socket and clean up after it: close the transport, leave
    /// every room, fire the disconnect hook, deregister from the hub.
    /// Only the first call has any effect.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(id = %self.id(), "socket disconnected");

        let _ = self.inner.out_tx.send(Message::Close(None));

        // During server shutdown these operations land on a stopped hub
        // and vanish, which is exactly what is wanted.
        for room in self.rooms() {
            self.inner
                .shared
                .hub
                .leave_room(room, self.id().to_string())
                .await;
        }
        self.inner
            .rooms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        if let Some(hook) = self.inner.shared.disconnect_hook() {
            hook(self.clone()).await;
        }

        self.inner.shared.hub.remove_socket(self.id().to_string()).await;
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Run the I/O loops for one accepted connection: spawn the writer, wire
/// the socket into the hub, fire the connect hook, then read frames until
/// the connection dies.
pub(crate) async fn run_connection(shared: Arc<ServerShared>, ws: WebSocketStream<TcpStream>) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let socket = Socket::new(shared.clone(), out_tx);
    let writer = tokio::spawn(run_writer(ws_tx, out_rx));

    shared.hub.add_socket(socket.clone()).await;
    socket.join(&socket_room(socket.id())).await;
    debug!(id = %socket.id(), "socket connected");

    if let Some(hook) = shared.connect_hook() {
        hook(socket.clone()).await;
    }

    while let Some(next) = ws_rx.next().await {
        match next {
            Ok(Message::Text(text)) => dispatch_frame(&shared, &socket, text.into_bytes()),
            Ok(Message::Binary(data)) => dispatch_frame(&shared, &socket, data),
            Ok(Message::Close(frame)) => {
                log_peer_close(&socket, frame.as_ref());
                break;
            }
            // Pings are answered by the transport; pongs carry nothing.
            Ok(_) => {}
            Err(e) if is_clean_disconnect(&e) => break,
            Err(e) => {
                warn!(id = %socket.id(), error = %e, "socket read failed");
                break;
            }
        }
    }

    socket.close().await;
    let _ = writer.await;
}

/// Consume the outbound queue and write frames to the websocket sink.
/// Being the only writer is what serializes sends on this connection.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = out_rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = ws_tx.send(msg).await {
            debug!(error = %e, "socket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = ws_tx.close().await;
}

/// Decode one inbound message and dispatch its handler on a fresh task.
/// Malformed frames and unknown events are dropped, never fatal.
fn dispatch_frame(shared: &Arc<ServerShared>, socket: &Socket, data: Vec<u8>) {
    let frame = match decode_frame(&data) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(id = %socket.id(), error = %e, "dropping malformed frame");
            return;
        }
    };

    match shared.handler(&frame.event) {
        Some(handler) => {
            // User code gets its own task so the read loop is never
            // blocked behind a handler.
            let socket = socket.clone();
            tokio::spawn(async move { handler(socket, frame.payload).await });
        }
        None => debug!(id = %socket.id(), event = %frame.event, "no handler registered"),
    }
}

fn log_peer_close(socket: &Socket, frame: Option<&CloseFrame<'_>>) {
    match frame {
        Some(f) if !matches!(f.code, CloseCode::Normal | CloseCode::Away) => {
            warn!(id = %socket.id(), code = u16::from(f.code), "peer closed with unexpected code");
        }
        _ => debug!(id = %socket.id(), "peer closed"),
    }
}

/// Read errors that just mean "the peer went away" and deserve no log
/// noise.
fn is_clean_disconnect(e: &WsError) -> bool {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}
