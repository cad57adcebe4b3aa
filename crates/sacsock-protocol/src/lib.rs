//! sacsock-protocol
//!
//! Wire-level framing for the `sac-sock` websocket subprotocol.
//!
//! This crate is responsible for turning logical messages (an event name
//! plus a [`sacsock_core::Payload`]) into websocket message bodies and
//! back again.
//!
//! - [`wire`]  : separator bytes, type tags, subprotocol token
//! - [`frame`] : encode/decode of a single event frame

pub mod frame;
pub mod wire;

pub use frame::{decode_frame, encode_frame, DecodedFrame, FrameError, WireFrame};
pub use wire::{PayloadTag, SOH, STX, SUBPROTOCOL};
