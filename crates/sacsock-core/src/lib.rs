//! sacsock-core
//!
//! Pure coordination logic for the sacsock websocket server:
//! - messages (payload, broadcast and roomcast types)
//! - socket/room registry (the state owned by the hub task)
//!
//! Nothing in this crate performs I/O or touches the async runtime.

pub mod messages;
pub mod registry;

pub use messages::{BroadcastMsg, Payload, RoomMsg};

pub use registry::{socket_room, Registry, SOCKET_ROOM_PREFIX};
