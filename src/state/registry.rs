//! Live connection membership, role assignment and capacity enforcement.

use std::sync::{
    Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::engine::Slot;

/// Stable identity of one transport session.
pub type ConnectionId = Uuid;

/// Role currently held by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Admitted but not yet confirmed.
    Unconfirmed,
    /// Holds one of the two player slots.
    Player(Slot),
    /// Receives broadcasts only.
    Spectator,
}

impl Role {
    /// Identifier reported in `playerAssigned`; spectators and unconfirmed connections report 0.
    pub fn player_id(self) -> u8 {
        match self {
            Role::Player(slot) => slot.id(),
            Role::Unconfirmed | Role::Spectator => 0,
        }
    }

    /// Slot held by this role, if it is a player role.
    pub fn slot(self) -> Option<Slot> {
        match self {
            Role::Player(slot) => Some(slot),
            Role::Unconfirmed | Role::Spectator => None,
        }
    }
}

#[derive(Clone, Debug)]
/// Handle used to push messages to a connected client.
pub struct ConnectionHandle {
    /// Identity of the connection.
    pub id: ConnectionId,
    /// Admission order, used to keep snapshots stable.
    pub seq: u64,
    /// Outbound channel drained by the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
    /// Assigned role.
    pub role: Role,
    /// Display name supplied at confirmation.
    pub name: Option<String>,
}

/// Outcome of a confirmation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The connection received a fresh role.
    Assigned {
        /// Role granted.
        role: Role,
        /// This assignment filled the second player slot.
        match_ready: bool,
    },
    /// The connection was already confirmed; its role is unchanged.
    AlreadyConfirmed(Role),
    /// Both slots are taken and spectators are not admitted.
    NoSlotAvailable,
    /// The connection is not registered (it already left).
    Unknown,
}

/// Thread-safe registry of admitted connections.
pub struct ConnectionRegistry {
    capacity: usize,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    // Reserved before insert so concurrent admissions never overshoot capacity.
    admitted: AtomicUsize,
    next_seq: AtomicU64,
    confirm_gate: Mutex<()>,
}

impl ConnectionRegistry {
    /// Build an empty registry admitting at most `capacity` connections.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            connections: DashMap::new(),
            admitted: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            confirm_gate: Mutex::new(()),
        }
    }

    /// Configured maximum number of concurrent connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit a connection. Returns `false` without registering it when the registry is full.
    pub fn add(&self, id: ConnectionId, tx: mpsc::UnboundedSender<Message>) -> bool {
        let reserved = self
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.capacity).then_some(count + 1)
            })
            .is_ok();
        if !reserved {
            return false;
        }

        let handle = ConnectionHandle {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            tx,
            role: Role::Unconfirmed,
            name: None,
        };
        if self.connections.insert(id, handle).is_some() {
            // Re-admitting a live id replaces its handle without taking a second seat.
            self.admitted.fetch_sub(1, Ordering::AcqRel);
        }
        true
    }

    /// Remove a connection, returning its last known state.
    pub fn remove(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let (_, handle) = self.connections.remove(id)?;
        self.admitted.fetch_sub(1, Ordering::AcqRel);
        Some(handle)
    }

    /// Role held by `id`; unknown connections report [`Role::Unconfirmed`].
    pub fn role_of(&self, id: &ConnectionId) -> Role {
        self.connections
            .get(id)
            .map(|entry| entry.role)
            .unwrap_or(Role::Unconfirmed)
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Outbound channel for `id`, if it is registered.
    pub fn sender(&self, id: &ConnectionId) -> Option<mpsc::UnboundedSender<Message>> {
        self.connections.get(id).map(|entry| entry.tx.clone())
    }

    /// Number of registered connections matching `predicate`.
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ConnectionHandle) -> bool,
    {
        self.connections
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of registered connections holding a player slot.
    pub fn player_count(&self) -> usize {
        self.count(|conn| matches!(conn.role, Role::Player(_)))
    }

    /// Copy of the current membership in admission order.
    ///
    /// The returned handles are detached from the map, so callers may iterate
    /// them while other tasks add or remove connections.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        let mut handles = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        handles.sort_by_key(|handle| handle.seq);
        handles
    }

    /// Assign a role to `id`: the lowest free slot, else spectator when allowed.
    ///
    /// Confirmation is idempotent: a connection that already holds a role keeps it.
    pub fn confirm(&self, id: &ConnectionId, name: &str, allow_spectators: bool) -> Confirmation {
        // Serialises slot selection; the DashMap shards alone cannot make
        // "find a free slot, then take it" atomic.
        let _gate = self
            .confirm_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.connections.get(id).map(|entry| entry.role) {
            None => return Confirmation::Unknown,
            Some(Role::Unconfirmed) => {}
            Some(role) => return Confirmation::AlreadyConfirmed(role),
        }

        let role = match self.free_slot() {
            Some(slot) => Role::Player(slot),
            None if allow_spectators => Role::Spectator,
            None => return Confirmation::NoSlotAvailable,
        };

        match self.connections.get_mut(id) {
            Some(mut entry) => {
                entry.role = role;
                entry.name = Some(name.to_string());
            }
            None => return Confirmation::Unknown,
        }

        Confirmation::Assigned {
            role,
            match_ready: matches!(role, Role::Player(_)) && self.free_slot().is_none(),
        }
    }

    /// Display names of both players once both slots are held.
    pub fn player_names(&self) -> Option<(String, String)> {
        let mut one = None;
        let mut two = None;
        for handle in self.snapshot() {
            match handle.role {
                Role::Player(Slot::One) => one = handle.name,
                Role::Player(Slot::Two) => two = handle.name,
                _ => {}
            }
        }
        Some((one?, two?))
    }

    fn free_slot(&self) -> Option<Slot> {
        [Slot::One, Slot::Two].into_iter().find(|slot| {
            self.count(|conn| conn.role == Role::Player(*slot)) == 0
        })
    }
}
