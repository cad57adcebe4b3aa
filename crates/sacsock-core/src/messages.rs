//! Message types shared by the hub, the wire codec and the backends.
//!
//! These are **transport-agnostic** logical messages:
//! - [`Payload`]: the single value carried by every event.
//! - [`BroadcastMsg`]: an event for every socket on an instance.
//! - [`RoomMsg`]: an event for every member of a named room.
//!
//! Note: the wire encoding lives in the `sacsock-protocol` crate; this
//! module is purely logical. Handlers always receive raw bytes; the
//! payload kinds here matter on the *emitting* side, where they select
//! the frame's type tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The value attached to an emitted event.
///
/// Emitters pick the variant from the runtime type of what they send:
/// strings stay strings, byte blobs stay binary, and everything else is
/// serialized as JSON. Receivers see the payload as opaque bytes plus an
/// advisory type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// UTF-8 text, sent on a text frame with the `'S'` tag.
    Str(String),

    /// Raw bytes, sent on a binary frame with the `'B'` tag.
    Bin(Vec<u8>),

    /// An arbitrary structured value, serialized to JSON and sent on a
    /// text frame with the `'J'` tag.
    Json(Value),
}

impl Payload {
    /// Build a JSON payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Str(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Str(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bin(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Bin(b.to_vec())
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

/// An event to be dispatched to every socket on the instance, and to all
/// peer instances when a multihome backend is installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMsg {
    pub event_name: String,
    pub payload: Payload,
}

impl BroadcastMsg {
    pub fn new(event_name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        BroadcastMsg {
            event_name: event_name.into(),
            payload: payload.into(),
        }
    }
}

/// An event to be dispatched to every member of a named room.
///
/// The room may have members only on peer instances; the message still
/// crosses the backend in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMsg {
    pub room_name: String,
    pub event_name: String,
    pub payload: Payload,
}

impl RoomMsg {
    pub fn new(
        room_name: impl Into<String>,
        event_name: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Self {
        RoomMsg {
            room_name: room_name.into(),
            event_name: event_name.into(),
            payload: payload.into(),
        }
    }
}
