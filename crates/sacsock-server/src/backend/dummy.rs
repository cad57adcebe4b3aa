//! A mockup multihome backend.
//!
//! It provides no actual cross-instance synchronization; it logs what it
//! is handed and periodically produces one canned broadcast and one
//! canned roomcast, which makes it handy for exercising the remote
//! fan-out path in demos and tests. Not for production use.

use std::time::Duration;

use async_trait::async_trait;
use sacsock_core::{BroadcastMsg, Payload, RoomMsg};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::info;

use crate::backend::MultihomeBackend;

pub struct DummyBackend {
    broadcast_event: String,
    roomcast_room: String,
    roomcast_event: String,
    payload: Payload,
    period: Duration,
    stop: watch::Sender<bool>,
}

impl DummyBackend {
    /// A backend that emits `broadcast_event` to everyone and
    /// `roomcast_event` to `roomcast_room`, both carrying `payload`,
    /// every `period`.
    pub fn new(
        broadcast_event: impl Into<String>,
        roomcast_room: impl Into<String>,
        roomcast_event: impl Into<String>,
        payload: impl Into<Payload>,
        period: Duration,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        DummyBackend {
            broadcast_event: broadcast_event.into(),
            roomcast_room: roomcast_room.into(),
            roomcast_event: roomcast_event.into(),
            payload: payload.into(),
            period,
            stop,
        }
    }
}

#[async_trait]
impl MultihomeBackend for DummyBackend {
    async fn init(&self) {
        info!("dummy multihome backend initialized");
    }

    async fn shutdown(&self) {
        let _ = self.stop.send(true);
        info!("dummy multihome backend shut down");
    }

    async fn broadcast_to_backend(&self, msg: &BroadcastMsg) {
        info!(event = %msg.event_name, "broadcast handed to dummy backend");
    }

    async fn roomcast_to_backend(&self, msg: &RoomMsg) {
        info!(
            room = %msg.room_name,
            event = %msg.event_name,
            "roomcast handed to dummy backend",
        );
    }

    async fn broadcast_from_backend(&self, sink: mpsc::Sender<BroadcastMsg>) {
        let mut stop = self.stop.subscribe();
        if *stop.borrow() {
            return;
        }
        loop {
            tokio::select! {
                _ = sleep(self.period) => {
                    let msg = BroadcastMsg::new(self.broadcast_event.clone(), self.payload.clone());
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = stop.changed() => break,
            }
        }
    }

    async fn roomcast_from_backend(&self, sink: mpsc::Sender<RoomMsg>) {
        let mut stop = self.stop.subscribe();
        if *stop.borrow() {
            return;
        }
        loop {
            tokio::select! {
                _ = sleep(self.period) => {
                    let msg = RoomMsg::new(
                        self.roomcast_room.clone(),
                        self.roomcast_event.clone(),
                        self.payload.clone(),
                    );
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = stop.changed() => break,
            }
        }
    }
}
