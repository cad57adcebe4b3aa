//! The multihome backend contract.
//!
//! A multihome backend synchronizes broadcasts and roomcasts between
//! several server instances, typically on different machines. The hub
//! treats an installed backend as an opaque capability: it pushes every
//! locally-originated broadcast/roomcast outward through it, and consumes
//! whatever the backend's producers deliver as remote traffic.
//!
//! Loop prevention is the backend's job, not the hub's: tag outgoing
//! messages with a per-instance server name and filter inbound messages
//! by it, as [`bus::BusBackend`] does.

use async_trait::async_trait;
use sacsock_core::{BroadcastMsg, RoomMsg};
use tokio::sync::mpsc;

pub mod bus;
pub mod dummy;

#[async_trait]
pub trait MultihomeBackend: Send + Sync {
    /// Called once, when the backend is installed on a server. May
    /// establish peer connections or subscribe to external topics.
    async fn init(&self);

    /// Called once, immediately after all sockets have been closed during
    /// server shutdown. Must terminate the producers started by the two
    /// `*_from_backend` methods.
    async fn shutdown(&self);

    /// Called once per locally-originated broadcast. Must be safe for
    /// concurrent invocation and must not block the caller for unbounded
    /// time; the hub launches it on a task of its own.
    async fn broadcast_to_backend(&self, msg: &BroadcastMsg);

    /// Called once per locally-originated roomcast, even when no local
    /// socket is a member of the room; members may exist only on peers.
    /// Same concurrency contract as [`Self::broadcast_to_backend`].
    async fn roomcast_to_backend(&self, msg: &RoomMsg);

    /// Called once, as a long-running task, when the backend is
    /// installed. Delivers each remote broadcast on `sink`. Messages that
    /// originated on this instance must be filtered out here if the
    /// transport reflects them back.
    async fn broadcast_from_backend(&self, sink: mpsc::Sender<BroadcastMsg>);

    /// Same as [`Self::broadcast_from_backend`], for roomcasts.
    async fn roomcast_from_backend(&self, sink: mpsc::Sender<RoomMsg>);
}
