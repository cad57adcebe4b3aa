//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Holds the event-handler map and the connect/disconnect hooks.
//! - Binds a TCP listener (with simple port retry) and accepts
//!   connections, rejecting them past the configured client limit.
//! - Negotiates the `sac-sock` websocket subprotocol during the upgrade.
//! - Installs at most one multihome backend per server lifetime.
//! - Drives the shutdown sequence: drain the hub, close every socket,
//!   then shut the backend down.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use sacsock_core::{socket_room, BroadcastMsg, Payload, RoomMsg};
use sacsock_protocol::SUBPROTOCOL;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tracing::{debug, info, warn};

use crate::backend::MultihomeBackend;
use crate::config::Config;
use crate::hub::Hub;
use crate::socket::{self, Socket};
use crate::types::{EventHandler, LifecycleHook, BACKEND_QUEUE_DEPTH};

/// Max number of times we'll try to bump the port if it's in use.
const MAX_PORT_RETRIES: u16 = 3;

/// State shared between the facade, every connection task and the hub.
pub(crate) struct ServerShared {
    pub(crate) hub: Hub,
    config: Config,
    events: RwLock<HashMap<String, EventHandler>>,
    on_connect: RwLock<Option<LifecycleHook>>,
    on_disconnect: RwLock<Option<LifecycleHook>>,
    backend: RwLock<Option<Arc<dyn MultihomeBackend>>>,
    backend_installed: AtomicBool,
    conn_count: AtomicUsize,
    stopped: AtomicBool,
}

impl ServerShared {
    pub(crate) fn handler(&self, event_name: &str) -> Option<EventHandler> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_name)
            .cloned()
    }

    pub(crate) fn connect_hook(&self) -> Option<LifecycleHook> {
        self.on_connect
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn disconnect_hook(&self) -> Option<LifecycleHook> {
        self.on_disconnect
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// The server facade: registers handlers and hooks, accepts connections,
/// dispatches casts, and shuts everything down.
#[derive(Clone)]
pub struct Server {
    shared: Arc<ServerShared>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Server {
            shared: Arc::new(ServerShared {
                hub: Hub::spawn(),
                config,
                events: RwLock::new(HashMap::new()),
                on_connect: RwLock::new(None),
                on_disconnect: RwLock::new(None),
                backend: RwLock::new(None),
                backend_installed: AtomicBool::new(false),
                conn_count: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Register a handler for a named event. Handlers receive the raw
    /// payload bytes and run concurrently, one task per dispatched event.
    /// Registration is expected at startup; a later registration for the
    /// same name replaces the earlier one.
    pub fn on<F, Fut>(&self, event_name: impl Into<String>, handler: F)
    where
        F: Fn(Socket, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |socket, data| Box::pin(handler(socket, data)));
        self.shared
            .events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_name.into(), handler);
    }

    /// Register a hook fired whenever a socket finishes its handshake.
    pub fn on_connect<F, Fut>(&self, hook: F)
    where
        F: Fn(Socket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move |socket| Box::pin(hook(socket)));
        *self
            .shared
            .on_connect
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    /// Register a hook fired exactly once as each socket closes.
    pub fn on_disconnect<F, Fut>(&self, hook: F)
    where
        F: Fn(Socket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move |socket| Box::pin(hook(socket)));
        *self
            .shared
            .on_disconnect
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    /// Dispatch an event to every socket on this server, and to all peers
    /// when a multihome backend is installed.
    pub async fn broadcast(&self, event_name: &str, payload: impl Into<Payload>) {
        self.shared
            .hub
            .broadcast(BroadcastMsg::new(event_name, payload))
            .await;
    }

    /// Dispatch an event to every member of a room, here and on peers.
    pub async fn roomcast(&self, room_name: &str, event_name: &str, payload: impl Into<Payload>) {
        self.shared
            .hub
            .roomcast(RoomMsg::new(room_name, event_name, payload))
            .await;
    }

    /// Dispatch an event to the one socket with the given id, via its
    /// singleton room.
    pub async fn socketcast(&self, socket_id: &str, event_name: &str, payload: impl Into<Payload>) {
        self.shared
            .hub
            .roomcast(RoomMsg::new(socket_room(socket_id), event_name, payload))
            .await;
    }

    /// Install the multihome backend: initialize it, spawn its two
    /// long-lived producers, and hand it to the hub. Only the first
    /// backend installed over the server's lifetime takes effect.
    pub async fn set_multihome_backend(&self, backend: impl MultihomeBackend + 'static) {
        if self.shared.backend_installed.swap(true, Ordering::SeqCst) {
            warn!("a multihome backend is already installed, ignoring");
            return;
        }

        let backend: Arc<dyn MultihomeBackend> = Arc::new(backend);
        backend.init().await;

        // The producers deliver remote traffic on sinks owned here; two
        // pump tasks move it onto the hub's queue.
        let (bcast_tx, mut bcast_rx) = mpsc::channel(BACKEND_QUEUE_DEPTH);
        let (rcast_tx, mut rcast_rx) = mpsc::channel(BACKEND_QUEUE_DEPTH);
        {
            let backend = backend.clone();
            tokio::spawn(async move { backend.broadcast_from_backend(bcast_tx).await });
        }
        {
            let backend = backend.clone();
            tokio::spawn(async move { backend.roomcast_from_backend(rcast_tx).await });
        }
        {
            let hub = self.shared.hub.clone();
            tokio::spawn(async move {
                while let Some(msg) = bcast_rx.recv().await {
                    hub.broadcast_remote(msg).await;
                }
            });
        }
        {
            let hub = self.shared.hub.clone();
            tokio::spawn(async move {
                while let Some(msg) = rcast_rx.recv().await {
                    hub.roomcast_remote(msg).await;
                }
            });
        }

        *self
            .shared
            .backend
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(backend.clone());
        self.shared.hub.set_backend(backend).await;
    }

    /// Bind per the configuration and serve until the listener fails or
    /// the server is shut down.
    pub async fn serve(&self) -> io::Result<()> {
        let (listener, attempts) = bind_with_retry(&self.shared.config).await?;
        let addr = listener.local_addr()?;
        info!(%addr, attempts, "listening for websocket connections");
        self.serve_on(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve_on(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;

            if self.shared.stopped.load(Ordering::SeqCst) {
                debug!(%peer, "server is shut down, refusing connection");
                return Ok(());
            }

            let current = self.shared.conn_count.load(Ordering::SeqCst);
            if current >= self.shared.config.max_clients {
                warn!(
                    %peer,
                    current,
                    max = self.shared.config.max_clients,
                    "client limit reached, rejecting connection",
                );
                // Dropping the stream closes it.
                continue;
            }

            self.shared.conn_count.fetch_add(1, Ordering::SeqCst);
            let shared = self.shared.clone();
            tokio::spawn(async move {
                accept_connection(shared.clone(), stream, peer).await;
                shared.conn_count.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Close all active sockets, then shut down the multihome backend if
    /// one is installed. Each socket's disconnect hook fires as part of
    /// its own close.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.shared.stopped.store(true, Ordering::SeqCst);

        let sockets = self.shared.hub.shutdown().await;
        info!(count = sockets.len(), "closing sockets");
        for socket in sockets {
            socket.close().await;
        }

        let backend = self
            .shared
            .backend
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(backend) = backend {
            info!("shutting down multihome backend");
            backend.shutdown().await;
        }

        info!("shutdown complete");
    }
}

async fn accept_connection(shared: Arc<ServerShared>, stream: TcpStream, peer: SocketAddr) {
    let ws = match accept_hdr_async(stream, negotiate_subprotocol).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    socket::run_connection(shared, ws).await;
}

/// Accept the upgrade only when the client offers the `sac-sock`
/// subprotocol, and echo the token back so the handshake pins it.
fn negotiate_subprotocol(req: &Request, mut resp: Response) -> Result<Response, ErrorResponse> {
    let offered = req
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if offered.split(',').any(|p| p.trim() == SUBPROTOCOL) {
        resp.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(SUBPROTOCOL),
        );
        Ok(resp)
    } else {
        let mut denied = ErrorResponse::new(Some(format!(
            "unsupported websocket subprotocol, expected {SUBPROTOCOL}"
        )));
        *denied.status_mut() = StatusCode::BAD_REQUEST;
        Err(denied)
    }
}

/// Try binding `bind_addr:port`; on AddrInUse bump the port and retry a
/// few times. Ephemeral binds (port 0) never retry.
async fn bind_with_retry(config: &Config) -> io::Result<(TcpListener, u16)> {
    let mut port = config.port;
    let mut attempts = 0u16;
    loop {
        match TcpListener::bind((config.bind_addr.as_str(), port)).await {
            Ok(listener) => return Ok((listener, attempts)),
            Err(e)
                if e.kind() == io::ErrorKind::AddrInUse
                    && config.port != 0
                    && attempts < MAX_PORT_RETRIES =>
            {
                attempts += 1;
                port = port.saturating_add(1);
                warn!(port, "port in use, trying the next one");
            }
            Err(e) => return Err(e),
        }
    }
}
