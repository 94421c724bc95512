//! Append-only audit log of connection and match events.

pub mod jsonl;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dao::storage::StorageResult;

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Listener bound and accepting connections.
    ServerStart,
    /// Orderly shutdown began.
    ServerStop,
    /// A connection was admitted.
    ClientConnected,
    /// A connection was refused because the registry was full.
    ClientRejected,
    /// A registered connection went away.
    ClientDisconnected,
    /// A connection took a player slot.
    PlayerConfirmed,
    /// A connection confirmed as spectator.
    SpectatorConfirmed,
    /// The engine started running.
    MatchStarted,
    /// The engine stopped running.
    MatchStopped,
    /// A point was scored.
    Goal,
}

/// Event handed to a sink. The sink assigns the id and the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Kind of event.
    pub event_type: EventType,
    /// Free-form description.
    pub message: String,
    /// Player slot involved, 0 for spectators.
    pub player_id: Option<u8>,
    /// Display name involved.
    pub player_name: Option<String>,
}

impl EventRecord {
    /// Event without player attribution.
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            player_id: None,
            player_name: None,
        }
    }

    /// Attach the player this event is about.
    pub fn with_player(mut self, player_id: u8, player_name: Option<String>) -> Self {
        self.player_id = Some(player_id);
        self.player_name = player_name;
        self
    }
}

/// Persisted representation of an [`EventRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Auto-incremented identifier, starting at 1.
    pub id: u64,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// Kind of event.
    pub event_type: EventType,
    /// Free-form description.
    pub message: String,
    /// Player slot involved.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub player_id: Option<u8>,
    /// Display name involved.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub player_name: Option<String>,
}

/// Write-only destination for audit events.
pub trait EventSink: Send + Sync {
    /// Persist one event.
    fn append(&self, event: EventRecord) -> BoxFuture<'static, StorageResult<()>>;
}

/// Sink that only emits the event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn append(&self, event: EventRecord) -> BoxFuture<'static, StorageResult<()>> {
        info!(
            event_type = ?event.event_type,
            player_id = ?event.player_id,
            player_name = ?event.player_name,
            "{}",
            event.message
        );
        Box::pin(async { Ok(()) })
    }
}
