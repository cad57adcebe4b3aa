//! Socket and room indexes.
//!
//! [`Registry`] is the state owned by the hub task. It is generic over the
//! socket handle so it can be exercised without a transport, and it is not
//! synchronized: exactly one owner mutates it, which is what makes the
//! hub's ordering guarantees hold.
//!
//! Rules enforced here:
//! - A room exists if and only if it has at least one member.
//! - A socket appears at most once in a room's member set.
//! - Removing a socket from the socket index does **not** touch room
//!   membership; the socket's close path issues the leaves it needs
//!   before deregistering.

use std::collections::HashMap;

/// Name prefix of the per-socket singleton room.
///
/// Every socket is auto-joined to `__socket_id:<id>` on connection, which
/// lets targeted delivery reuse the roomcast path end to end. User room
/// names must not start with this prefix.
pub const SOCKET_ROOM_PREFIX: &str = "__socket_id:";

/// The name of the singleton room for a given socket id.
pub fn socket_room(id: &str) -> String {
    format!("{SOCKET_ROOM_PREFIX}{id}")
}

/// A named set of member sockets, keyed by socket id.
#[derive(Debug)]
struct Room<S> {
    members: HashMap<String, S>,
}

/// The authoritative mapping of sockets and rooms.
#[derive(Debug)]
pub struct Registry<S> {
    sockets: HashMap<String, S>,
    rooms: HashMap<String, Room<S>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Registry {
            sockets: HashMap::new(),
            rooms: HashMap::new(),
        }
    }
}

impl<S: Clone> Registry<S> {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a socket under its id. Re-registering the same id replaces
    /// the previous handle.
    pub fn add_socket(&mut self, id: impl Into<String>, socket: S) {
        self.sockets.insert(id.into(), socket);
    }

    /// Unregister a socket. Room membership is left alone.
    pub fn remove_socket(&mut self, id: &str) -> Option<S> {
        self.sockets.remove(id)
    }

    /// Add a socket to a room, creating the room on first join. Joining a
    /// room twice is a no-op.
    pub fn join(&mut self, room_name: &str, id: impl Into<String>, socket: S) {
        self.rooms
            .entry(room_name.to_string())
            .or_insert_with(|| Room {
                members: HashMap::new(),
            })
            .members
            .insert(id.into(), socket);
    }

    /// Remove a socket from a room. The room is dropped when its last
    /// member leaves. Leaving an unknown room or a room the socket is not
    /// in is a no-op.
    pub fn leave(&mut self, room_name: &str, id: &str) {
        if let Some(room) = self.rooms.get_mut(room_name) {
            room.members.remove(id);
            if room.members.is_empty() {
                self.rooms.remove(room_name);
            }
        }
    }

    /// Members of a room. Empty when the room does not exist.
    pub fn room_members(&self, room_name: &str) -> impl Iterator<Item = &S> {
        self.rooms
            .get(room_name)
            .into_iter()
            .flat_map(|room| room.members.values())
    }

    /// All registered sockets.
    pub fn sockets(&self) -> impl Iterator<Item = &S> {
        self.sockets.values()
    }

    pub fn contains_socket(&self, id: &str) -> bool {
        self.sockets.contains_key(id)
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Size of a room's member set; 0 when the room does not exist.
    pub fn room_len(&self, room_name: &str) -> usize {
        self.rooms.get(room_name).map_or(0, |r| r.members.len())
    }

    /// Clone out every registered socket. Used for the shutdown snapshot.
    pub fn snapshot(&self) -> Vec<S> {
        self.sockets.values().cloned().collect()
    }
}
