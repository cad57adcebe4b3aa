//! sacsock-server
//!
//! Event-oriented websocket server with a Socket.IO-like surface: named
//! events, per-socket emission, rooms, roomcasts, broadcasts, and a
//! pluggable backend for synchronizing several instances.
//!
//! This crate glues together:
//! - `sacsock-core` (messages, socket/room registry)
//! - `sacsock-protocol` (the `sac-sock` wire framing)
//! and exposes the [`Server`] facade.

pub mod backend;
pub mod config;
pub mod server;
pub mod socket;
pub mod types;

mod hub;

pub use backend::MultihomeBackend;
pub use config::Config;
pub use server::Server;
pub use socket::{EmitError, Socket};

pub use sacsock_core::{socket_room, BroadcastMsg, Payload, RoomMsg};
