use axum::extract::ws::{Message, Utf8Bytes};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::OutboundMessage,
    error::DeliveryError,
    state::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry},
};

/// Serialize a message once so it can be fanned out without re-encoding.
pub fn encode(message: &OutboundMessage) -> Result<Utf8Bytes, DeliveryError> {
    Ok(serde_json::to_string(message)?.into())
}

/// Push an encoded payload onto a writer channel.
///
/// Never blocks: the channel is unbounded and drained by the connection's writer task.
pub fn push(tx: &mpsc::UnboundedSender<Message>, payload: Utf8Bytes) -> Result<(), DeliveryError> {
    tx.send(Message::Text(payload))
        .map_err(|_| DeliveryError::ConnectionClosed)
}

/// Deliver `message` to one connection, removing it from the registry if its writer is gone.
///
/// Returns the pruned handle when delivery failed.
pub fn send_one(
    registry: &ConnectionRegistry,
    id: &ConnectionId,
    message: &OutboundMessage,
) -> Option<ConnectionHandle> {
    let Some(tx) = registry.sender(id) else {
        debug!(conn = %id, kind = message.kind(), "recipient already left; dropping message");
        return None;
    };

    let payload = match encode(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, kind = message.kind(), "failed to encode message (not retrying)");
            return None;
        }
    };

    match push(&tx, payload) {
        Ok(()) => None,
        Err(err) => {
            warn!(conn = %id, error = %err, kind = message.kind(), "send failed; removing connection");
            registry.remove(id)
        }
    }
}

/// Deliver `message` to every registered connection.
///
/// Iterates a snapshot of the registry, so concurrent admissions and removals never
/// disturb the fan-out. Recipients whose writer is gone are removed and returned.
pub fn send_all(registry: &ConnectionRegistry, message: &OutboundMessage) -> Vec<ConnectionHandle> {
    let payload = match encode(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, kind = message.kind(), "failed to encode broadcast (not retrying)");
            return Vec::new();
        }
    };

    registry
        .snapshot()
        .into_iter()
        .filter_map(|conn| match push(&conn.tx, payload.clone()) {
            Ok(()) => None,
            Err(err) => {
                warn!(conn = %conn.id, error = %err, kind = message.kind(), "broadcast failed; removing connection");
                registry.remove(&conn.id)
            }
        })
        .collect()
}
