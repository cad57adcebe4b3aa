//! Central hub loop.
//!
//! This task owns the socket and room indexes and processes all
//! membership and dispatch operations coming from connection tasks, the
//! server facade, and the installed backend.
//!
//! Dispatch policy:
//! - `RoomcastLocal`, `BroadcastLocal`: fan out to local members, then
//!   hand the message to the backend (from a fresh task, so a slow
//!   backend never stalls local dispatch).
//! - `RoomcastRemote`, `BroadcastRemote`: fan out locally only; remote
//!   traffic is never propagated back to the backend.
//!
//! Exactly one task runs [`run_hub_loop`]; the indexes need no locks
//! because nothing else can reach them. When the loop exits, the queue's
//! receiver drops and every later operation fails at the send site, where
//! it is treated as a harmless no-op.

use std::sync::Arc;

use sacsock_core::{BroadcastMsg, Registry, RoomMsg};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::backend::MultihomeBackend;
use crate::socket::Socket;
use crate::types::{HubOp, HubRx, HubTx, HUB_QUEUE_DEPTH};

/// Handle to the hub task. Cheap to clone; every producer holds one.
#[derive(Clone)]
pub(crate) struct Hub {
    ops: HubTx,
}

impl Hub {
    /// Start the hub task and return a handle to it.
    pub(crate) fn spawn() -> Self {
        let (ops, rx) = mpsc::channel(HUB_QUEUE_DEPTH);
        tokio::spawn(run_hub_loop(rx));
        Hub { ops }
    }

    async fn send(&self, op: HubOp) {
        if self.ops.send(op).await.is_err() {
            // The hub has stopped; operations arriving after shutdown are
            // defined to vanish.
            debug!("hub stopped, dropping operation");
        }
    }

    pub(crate) async fn add_socket(&self, socket: Socket) {
        self.send(HubOp::AddSocket(socket)).await;
    }

    pub(crate) async fn remove_socket(&self, socket_id: String) {
        self.send(HubOp::RemoveSocket(socket_id)).await;
    }

    pub(crate) async fn join_room(&self, room: String, socket: Socket) {
        self.send(HubOp::JoinRoom { room, socket }).await;
    }

    pub(crate) async fn leave_room(&self, room: String, socket_id: String) {
        self.send(HubOp::LeaveRoom { room, socket_id }).await;
    }

    pub(crate) async fn roomcast(&self, msg: RoomMsg) {
        self.send(HubOp::RoomcastLocal(msg)).await;
    }

    pub(crate) async fn broadcast(&self, msg: BroadcastMsg) {
        self.send(HubOp::BroadcastLocal(msg)).await;
    }

    pub(crate) async fn roomcast_remote(&self, msg: RoomMsg) {
        self.send(HubOp::RoomcastRemote(msg)).await;
    }

    pub(crate) async fn broadcast_remote(&self, msg: BroadcastMsg) {
        self.send(HubOp::BroadcastRemote(msg)).await;
    }

    pub(crate) async fn set_backend(&self, backend: Arc<dyn MultihomeBackend>) {
        self.send(HubOp::SetBackend(backend)).await;
    }

    /// Ask the hub to stop and hand back every registered socket. Returns
    /// an empty list when the hub has already stopped.
    pub(crate) async fn shutdown(&self) -> Vec<Socket> {
        let (reply, rx) = oneshot::channel();
        self.send(HubOp::Shutdown { reply }).await;
        rx.await.unwrap_or_default()
    }
}

/// Run the hub processing loop until a shutdown operation arrives.
async fn run_hub_loop(mut ops: HubRx) {
    let mut registry: Registry<Socket> = Registry::new();
    let mut backend: Option<Arc<dyn MultihomeBackend>> = None;

    while let Some(op) = ops.recv().await {
        match op {
            HubOp::AddSocket(socket) => {
                registry.add_socket(socket.id().to_string(), socket);
            }
            HubOp::RemoveSocket(socket_id) => {
                // The socket's close path already issued its room leaves.
                registry.remove_socket(&socket_id);
            }
            HubOp::JoinRoom { room, socket } => {
                registry.join(&room, socket.id().to_string(), socket);
            }
            HubOp::LeaveRoom { room, socket_id } => {
                registry.leave(&room, &socket_id);
            }
            HubOp::RoomcastLocal(msg) => {
                fan_out_room(&registry, &msg);
                if let Some(backend) = &backend {
                    // The room may have members only on peers, so the
                    // message crosses the backend even when no local
                    // socket is in it.
                    let backend = backend.clone();
                    tokio::spawn(async move { backend.roomcast_to_backend(&msg).await });
                }
            }
            HubOp::BroadcastLocal(msg) => {
                fan_out_all(&registry, &msg);
                if let Some(backend) = &backend {
                    let backend = backend.clone();
                    tokio::spawn(async move { backend.broadcast_to_backend(&msg).await });
                }
            }
            HubOp::RoomcastRemote(msg) => fan_out_room(&registry, &msg),
            HubOp::BroadcastRemote(msg) => fan_out_all(&registry, &msg),
            HubOp::SetBackend(b) => {
                backend = Some(b);
            }
            HubOp::Shutdown { reply } => {
                let _ = reply.send(registry.snapshot());
                break;
            }
        }
    }

    debug!("hub loop stopped");
}

/// Deliver a roomcast to every local member of the room. Emission errors
/// never abort the fan-out.
fn fan_out_room(registry: &Registry<Socket>, msg: &RoomMsg) {
    for socket in registry.room_members(&msg.room_name) {
        if let Err(e) = socket.emit(&msg.event_name, msg.payload.clone()) {
            debug!(
                id = %socket.id(),
                event = %msg.event_name,
                error = %e,
                "roomcast delivery skipped",
            );
        }
    }
}

/// Deliver a broadcast to every registered socket.
fn fan_out_all(registry: &Registry<Socket>, msg: &BroadcastMsg) {
    for socket in registry.sockets() {
        if let Err(e) = socket.emit(&msg.event_name, msg.payload.clone()) {
            debug!(
                id = %socket.id(),
                event = %msg.event_name,
                error = %e,
                "broadcast delivery skipped",
            );
        }
    }
}
