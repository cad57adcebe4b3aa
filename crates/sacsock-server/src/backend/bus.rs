//! In-process message bus backend.
//!
//! [`MessageBus`] is a pair of pub/sub channels shared by every backend
//! attached to it; [`BusBackend`] implements the multihome contract over
//! it. Messages are serialized to JSON and tagged with the originating
//! server's name; ingest drops frames whose origin matches the local
//! name, so a message reflected back to its own instance is never
//! delivered twice.
//!
//! This wires several server instances together inside one process,
//! which is exactly what the cross-instance integration tests need. A
//! networked deployment would implement the same contract over an
//! external broker instead.

use sacsock_core::{BroadcastMsg, Payload, RoomMsg};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, warn};

use async_trait::async_trait;

use crate::backend::MultihomeBackend;
use crate::types::random_id;

/// Capacity of each bus channel; receivers that fall further behind than
/// this lose messages (and log it).
const BUS_CAPACITY: usize = 256;

/// Bytes of entropy behind an auto-generated server name.
const SERVER_NAME_LEN: usize = 16;

/// One frame on the bus.
#[derive(Debug, Serialize, Deserialize)]
struct Transmission {
    server_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    room_name: Option<String>,
    event_name: String,
    payload: Payload,
}

/// The shared medium. Clone-free: hand out backends via [`MessageBus::backend`].
pub struct MessageBus {
    broadcasts: broadcast::Sender<String>,
    roomcasts: broadcast::Sender<String>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (broadcasts, _) = broadcast::channel(BUS_CAPACITY);
        let (roomcasts, _) = broadcast::channel(BUS_CAPACITY);
        MessageBus {
            broadcasts,
            roomcasts,
        }
    }

    /// A backend attached to this bus under an explicit server name. The
    /// name must be unique per instance or loop prevention will eat
    /// legitimate traffic.
    pub fn backend(&self, server_name: impl Into<String>) -> BusBackend {
        let (stop, _) = watch::channel(false);
        BusBackend {
            server_name: server_name.into(),
            broadcasts: self.broadcasts.clone(),
            roomcasts: self.roomcasts.clone(),
            stop,
        }
    }

    /// A backend with an auto-generated unique server name.
    pub fn unique_backend(&self) -> BusBackend {
        self.backend(random_id(SERVER_NAME_LEN))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        MessageBus::new()
    }
}

pub struct BusBackend {
    server_name: String,
    broadcasts: broadcast::Sender<String>,
    roomcasts: broadcast::Sender<String>,
    stop: watch::Sender<bool>,
}

impl BusBackend {
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    fn publish(&self, channel: &broadcast::Sender<String>, t: &Transmission) {
        match serde_json::to_string(t) {
            // No receivers yet is fine; there is simply nobody to tell.
            Ok(json) => {
                let _ = channel.send(json);
            }
            Err(e) => error!(error = %e, "failed to serialize bus transmission"),
        }
    }

    fn decode(&self, json: &str) -> Option<Transmission> {
        match serde_json::from_str::<Transmission>(json) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(error = %e, "dropping undecodable bus transmission");
                None
            }
        }
    }
}

#[async_trait]
impl MultihomeBackend for BusBackend {
    async fn init(&self) {
        debug!(server = %self.server_name, "bus backend attached");
    }

    async fn shutdown(&self) {
        let _ = self.stop.send(true);
        debug!(server = %self.server_name, "bus backend detached");
    }

    async fn broadcast_to_backend(&self, msg: &BroadcastMsg) {
        self.publish(
            &self.broadcasts,
            &Transmission {
                server_name: self.server_name.clone(),
                room_name: None,
                event_name: msg.event_name.clone(),
                payload: msg.payload.clone(),
            },
        );
    }

    async fn roomcast_to_backend(&self, msg: &RoomMsg) {
        self.publish(
            &self.roomcasts,
            &Transmission {
                server_name: self.server_name.clone(),
                room_name: Some(msg.room_name.clone()),
                event_name: msg.event_name.clone(),
                payload: msg.payload.clone(),
            },
        );
    }

    async fn broadcast_from_backend(&self, sink: mpsc::Sender<BroadcastMsg>) {
        let mut sub = self.broadcasts.subscribe();
        let mut stop = self.stop.subscribe();
        if *stop.borrow() {
            return;
        }
        loop {
            tokio::select! {
                next = sub.recv() => match next {
                    Ok(json) => {
                        let Some(t) = self.decode(&json) else { continue };
                        if t.server_name == self.server_name {
                            // Our own message reflected back.
                            continue;
                        }
                        let msg = BroadcastMsg {
                            event_name: t.event_name,
                            payload: t.payload,
                        };
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "bus receiver lagged, broadcasts dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.changed() => break,
            }
        }
    }

    async fn roomcast_from_backend(&self, sink: mpsc::Sender<RoomMsg>) {
        let mut sub = self.roomcasts.subscribe();
        let mut stop = self.stop.subscribe();
        if *stop.borrow() {
            return;
        }
        loop {
            tokio::select! {
                next = sub.recv() => match next {
                    Ok(json) => {
                        let Some(t) = self.decode(&json) else { continue };
                        if t.server_name == self.server_name {
                            continue;
                        }
                        let Some(room_name) = t.room_name else {
                            warn!(event = %t.event_name, "roomcast transmission without a room");
                            continue;
                        };
                        let msg = RoomMsg {
                            room_name,
                            event_name: t.event_name,
                            payload: t.payload,
                        };
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "bus receiver lagged, roomcasts dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop.changed() => break,
            }
        }
    }
}
