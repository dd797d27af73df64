//! Client and room registries.
//!
//! One [`Registry`] owns every connection handle and every room member set
//! for a server instance. All mutation goes through a single
//! `tokio::sync::Mutex` around it (see [`crate::state::AppState`]), which
//! makes check-then-insert sequences like the join capacity check atomic
//! with respect to other clients.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::mpsc;

use crate::protocol::Meta;

pub type ClientId = String;

/// Separator for composite room keys. Outside the validated channel-name
/// character class, so `("a", "b:c")` can never alias `("a:b", "c")`.
pub const ROOM_KEY_SEPARATOR: char = ':';

/// Composite key identifying a room within an application.
pub fn room_key(app: &str, room: &str) -> String {
    format!("{app}{ROOM_KEY_SEPARATOR}{room}")
}

/// Per-connection state. `app`, `room`, and `meta` stay `None` until the
/// join handshake completes, and `app`/`room` never change afterwards.
pub struct Client {
    /// Outbound channel; the only way the server talks to this client.
    pub sender: mpsc::UnboundedSender<String>,
    pub app: Option<String>,
    pub room: Option<String>,
    pub meta: Option<Meta>,
    /// Refreshed on every inbound frame; read by the idle sweep.
    pub last_seen: Instant,
}

impl Client {
    /// Key of the room this client is in, if it has joined one.
    pub fn room_key(&self) -> Option<String> {
        match (&self.app, &self.room) {
            (Some(app), Some(room)) => Some(room_key(app, room)),
            _ => None,
        }
    }
}

/// All connections and rooms owned by one server instance.
///
/// Invariants upheld here: a room key exists iff its member list is
/// non-empty, and a client id appears in at most one room's member list.
/// Member lists keep insertion order, which is the order peers are
/// presented to a newly joined client.
#[derive(Default)]
pub struct Registry {
    clients: HashMap<ClientId, Client>,
    rooms: HashMap<String, Vec<ClientId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection in the unjoined state.
    pub fn insert_client(&mut self, id: ClientId, sender: mpsc::UnboundedSender<String>) {
        self.clients.insert(
            id,
            Client {
                sender,
                app: None,
                room: None,
                meta: None,
                last_seen: Instant::now(),
            },
        );
    }

    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn client_mut(&mut self, id: &str) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    /// Drop a client entry, returning it so teardown can inspect its room.
    pub fn remove_client(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Member ids of a room, in join order. Empty slice if the room does
    /// not exist.
    pub fn room_members(&self, key: &str) -> &[ClientId] {
        self.rooms.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn room_size(&self, key: &str) -> usize {
        self.rooms.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Add a member, creating the room lazily.
    pub fn add_member(&mut self, key: &str, id: &str) {
        let members = self.rooms.entry(key.to_string()).or_default();
        if !members.iter().any(|m| m == id) {
            members.push(id.to_string());
        }
    }

    /// Remove a member; the room entry is dropped the instant it empties.
    pub fn remove_member(&mut self, key: &str, id: &str) {
        if let Some(members) = self.rooms.get_mut(key) {
            members.retain(|m| m != id);
            if members.is_empty() {
                self.rooms.remove(key);
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Lower-cased display names in use in a room, excluding one client.
    /// The exclusion matters when re-resolving a joined client's own name.
    pub fn used_names(&self, key: &str, exclude_id: &str) -> HashSet<String> {
        self.room_members(key)
            .iter()
            .filter(|id| id.as_str() != exclude_id)
            .filter_map(|id| self.clients.get(id))
            .filter_map(|client| client.meta.as_ref())
            .map(|meta| meta.name.to_lowercase())
            .collect()
    }

    pub fn touch(&mut self, id: &str) {
        if let Some(client) = self.clients.get_mut(id) {
            client.last_seen = Instant::now();
        }
    }

    /// Clients whose last inbound activity is older than `deadline`.
    pub fn idle_since(&self, deadline: Instant) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|(_, client)| client.last_seen < deadline)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
