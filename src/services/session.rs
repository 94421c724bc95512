//! Connection lifecycle, role negotiation and match start/stop.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dao::event_store::{EventRecord, EventType},
    dto::ws::OutboundMessage,
    services::{broadcaster, scheduler},
    state::{
        SharedState,
        registry::{Confirmation, ConnectionHandle, ConnectionId, Role},
    },
};

const WELCOME: &str = "Welcome to the paddle relay";
const CAPACITY_MESSAGE: &str = "Maximum clients connected. Connection refused.";
const NO_SLOT_MESSAGE: &str = "Both player slots are taken. Connection refused.";

/// Admit a freshly opened connection.
///
/// Returns `false` when the connection was refused, either because the registry
/// is full or because automatic role assignment found no seat. The client has
/// then been sent an `error` message followed by a close frame and must not be
/// used further.
pub async fn open(state: &SharedState, id: ConnectionId, tx: &mpsc::UnboundedSender<Message>) -> bool {
    let registry = state.registry();
    if !registry.add(id, tx.clone()) {
        warn!(conn = %id, capacity = registry.capacity(), "registry full; refusing connection");
        if let Ok(payload) = broadcaster::encode(&OutboundMessage::Error {
            message: CAPACITY_MESSAGE.into(),
        }) {
            let _ = broadcaster::push(tx, payload);
        }
        let _ = tx.send(Message::Close(None));
        state.log_event(EventRecord::new(
            EventType::ClientRejected,
            "connection refused: registry full",
        ));
        return false;
    }

    info!(conn = %id, connections = registry.len(), "client connected");
    state.log_event(EventRecord::new(
        EventType::ClientConnected,
        format!("client {id} connected"),
    ));

    send_to(
        state,
        &id,
        &OutboundMessage::Welcome {
            message: WELCOME.into(),
        },
    )
    .await;

    if !state.config().require_confirmation {
        let name = format!("guest-{}", &id.simple().to_string()[..6]);
        return confirm(state, id, name).await;
    }

    true
}

/// Assign a role to `id` in response to a confirmation carrying `name`.
///
/// A connection that is already confirmed keeps its role and nothing is re-sent.
/// Returns `false` when the connection is no longer registered afterwards.
pub async fn confirm(state: &SharedState, id: ConnectionId, name: String) -> bool {
    let config = state.config();
    match state
        .registry()
        .confirm(&id, &name, config.allow_spectators)
    {
        Confirmation::Assigned { role, match_ready } => {
            info!(conn = %id, name = %name, player_id = role.player_id(), "client confirmed");
            let event_type = match role {
                Role::Player(_) => EventType::PlayerConfirmed,
                _ => EventType::SpectatorConfirmed,
            };
            state.log_event(
                EventRecord::new(event_type, format!("{name} confirmed"))
                    .with_player(role.player_id(), Some(name.clone())),
            );

            send_to(
                state,
                &id,
                &OutboundMessage::PlayerAssigned {
                    player_id: role.player_id(),
                },
            )
            .await;

            if match_ready {
                begin_countdown(state).await;
            }
            state.registry().contains(&id)
        }
        Confirmation::AlreadyConfirmed(role) => {
            info!(conn = %id, player_id = role.player_id(), "ignoring duplicate confirmation");
            true
        }
        Confirmation::NoSlotAvailable => {
            warn!(conn = %id, "no player slot available and spectators disabled; closing");
            send_to(
                state,
                &id,
                &OutboundMessage::Error {
                    message: NO_SLOT_MESSAGE.into(),
                },
            )
            .await;
            if let Some(tx) = state.registry().sender(&id) {
                let _ = tx.send(Message::Close(None));
            }
            close(state, &id).await;
            false
        }
        Confirmation::Unknown => {
            debug!(conn = %id, "confirmation from a connection that already left");
            false
        }
    }
}

/// Remove `id` after its transport closed or failed.
pub async fn close(state: &SharedState, id: &ConnectionId) {
    if let Some(handle) = state.registry().remove(id) {
        handle_departures(state, vec![handle]).await;
    }
}

/// Send to one connection, running departure handling if it was pruned.
pub async fn send_to(state: &SharedState, id: &ConnectionId, message: &OutboundMessage) {
    if let Some(pruned) = broadcaster::send_one(state.registry(), id, message) {
        handle_departures(state, vec![pruned]).await;
    }
}

/// Send to every connection, running departure handling for any that were pruned.
pub async fn broadcast(state: &SharedState, message: &OutboundMessage) {
    let pruned = broadcaster::send_all(state.registry(), message);
    if !pruned.is_empty() {
        handle_departures(state, pruned).await;
    }
}

/// Log departures and stop the match when a player was among them.
pub(crate) async fn handle_departures(state: &SharedState, departed: Vec<ConnectionHandle>) {
    let mut player_left = false;
    for handle in departed {
        log_departure(state, &handle);
        player_left |= matches!(handle.role, Role::Player(_));
    }
    if player_left {
        stop_match(state, "player left").await;
    }
}

fn log_departure(state: &SharedState, handle: &ConnectionHandle) {
    info!(
        conn = %handle.id,
        player_id = handle.role.player_id(),
        connections = state.registry().len(),
        "client disconnected"
    );
    let mut event = EventRecord::new(
        EventType::ClientDisconnected,
        format!("client {} disconnected", handle.id),
    );
    if handle.role != Role::Unconfirmed {
        event = event.with_player(handle.role.player_id(), handle.name.clone());
    }
    state.log_event(event);
}

/// Announce the match and start it after the pre-match delay on a background task.
async fn begin_countdown(state: &SharedState) {
    let Some((player1, player2)) = state.registry().player_names() else {
        return;
    };
    let config = state.config();

    let epoch = {
        let engine = state.engine().lock().await;
        state.advance_epoch(&engine)
    };

    info!(%player1, %player2, epoch, "both players confirmed; starting countdown");
    broadcast(
        state,
        &OutboundMessage::Countdown {
            number: config.countdown,
        },
    )
    .await;
    broadcast(state, &OutboundMessage::PlayerNames { player1, player2 }).await;

    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(config.pre_match_delay).await;
        start_match(&state, epoch).await;
    });
}

/// Start the engine and its scheduler unless the countdown was superseded.
async fn start_match(state: &SharedState, epoch: u64) {
    {
        let mut engine = state.engine().lock().await;
        if state.match_epoch() != epoch {
            debug!(epoch, "countdown superseded; not starting");
            return;
        }
        if state.registry().player_count() < 2 {
            debug!(epoch, "player left during countdown; not starting");
            return;
        }
        engine.start();
    }

    info!(epoch, "match started");
    state.log_event(EventRecord::new(EventType::MatchStarted, "match started"));
    scheduler::spawn(state.clone(), epoch);
}

/// Stop the engine and retire the scheduler and any pending countdown.
///
/// Emits one final `gameState` with `running: false` when a match was in progress.
/// It is sent under the engine lock, after any tick broadcast already in flight.
pub async fn stop_match(state: &SharedState, reason: &str) {
    let pruned = {
        let mut engine = state.engine().lock().await;
        state.advance_epoch(&engine);
        if !engine.is_running() {
            debug!(reason, "no match in progress");
            return;
        }
        engine.stop();
        broadcaster::send_all(state.registry(), &OutboundMessage::GameState(engine.snapshot()))
    };

    info!(reason, "match stopped");
    state.log_event(EventRecord::new(
        EventType::MatchStopped,
        format!("match stopped: {reason}"),
    ));

    // The match is already stopped, so pruned recipients only need logging.
    for handle in pruned {
        log_departure(state, &handle);
    }
}

/// Stop any match and close every connection ahead of process exit.
pub async fn shutdown(state: &SharedState) {
    stop_match(state, "server shutting down").await;
    for handle in state.registry().snapshot() {
        let _ = handle.tx.send(Message::Close(None));
        state.registry().remove(&handle.id);
    }
    state.log_event(EventRecord::new(EventType::ServerStop, "server stopped"));
}
