//! Shared types for the websocket server.
//!
//! This module defines:
//! - boxed callback aliases for event handlers and lifecycle hooks
//! - `HubOp`: operations flowing from every producer into the hub task
//! - channel aliases and queue depths

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sacsock_core::{BroadcastMsg, RoomMsg};
use tokio::sync::{mpsc, oneshot};

use crate::backend::MultihomeBackend;
use crate::socket::Socket;

/// A registered event handler. Handlers receive the raw payload bytes and
/// run on their own task, so they may block or take their time.
pub type EventHandler =
    Arc<dyn Fn(Socket, Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Connect/disconnect hook.
pub type LifecycleHook =
    Arc<dyn Fn(Socket) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// One operation on the hub's single inbound queue.
///
/// All producers funnel into one FIFO queue so that operations enqueued by
/// the same producer are observed by the hub in program order; a join
/// enqueued before a roomcast is always applied before it.
pub(crate) enum HubOp {
    AddSocket(Socket),
    RemoveSocket(String),
    JoinRoom { room: String, socket: Socket },
    LeaveRoom { room: String, socket_id: String },
    RoomcastLocal(RoomMsg),
    BroadcastLocal(BroadcastMsg),
    RoomcastRemote(RoomMsg),
    BroadcastRemote(BroadcastMsg),
    SetBackend(Arc<dyn MultihomeBackend>),
    Shutdown { reply: oneshot::Sender<Vec<Socket>> },
}

pub(crate) type HubTx = mpsc::Sender<HubOp>;
pub(crate) type HubRx = mpsc::Receiver<HubOp>;

/// Depth of the hub's inbound queue. Kept small on purpose: producers wait
/// their turn rather than ballooning memory, and the hub's work per op is
/// O(1) or O(members) index manipulation.
pub(crate) const HUB_QUEUE_DEPTH: usize = 16;

/// Depth of the sinks carrying remote traffic from a backend to the hub.
pub(crate) const BACKEND_QUEUE_DEPTH: usize = 64;

/// A collision-resistant random identifier: `bytes` bytes of entropy,
/// base64-encoded.
pub(crate) fn random_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    STANDARD.encode(buf)
}
