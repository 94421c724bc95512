//! Dispatch of inbound frames through a configurable `type` table.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use validator::Validate;

use crate::{
    dto::ws::{ConfirmationRequest, OutboundMessage, PaddleMoveRequest},
    error::ProtocolError,
    services::session,
    state::{SharedState, registry::ConnectionId},
};

/// Handlers a message type can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Reply with the configured server URL.
    ServerUrl,
    /// Reply with the configured group name.
    GroupName,
    /// Role negotiation.
    Confirmation,
    /// Paddle update for the sender's slot.
    PaddleMove,
    /// Broadcast of the starting paddle layout.
    InitialPositions,
}

impl Route {
    /// Resolve the route registered under a configured message type.
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "url" => Some(Self::ServerUrl),
            "groupname" => Some(Self::GroupName),
            "clientConfirmation" => Some(Self::Confirmation),
            "paddleMove" => Some(Self::PaddleMove),
            "init_positions" => Some(Self::InitialPositions),
            _ => None,
        }
    }
}

/// Decoded inbound message.
#[derive(Debug)]
pub enum Inbound {
    /// `url` query.
    ServerUrl,
    /// `groupname` query.
    GroupName,
    /// `clientConfirmation` with a trimmed, validated name.
    Confirmation(ConfirmationRequest),
    /// `paddleMove`.
    PaddleMove(PaddleMoveRequest),
    /// `init_positions` request.
    InitialPositions,
}

/// Closed set of message types accepted by this server, built from configuration.
#[derive(Debug, Clone)]
pub struct ProtocolTable {
    routes: IndexMap<String, Route>,
}

impl ProtocolTable {
    /// Build the table from configured type names; unknown names are skipped.
    pub fn from_names(names: &[String]) -> Self {
        let routes = names
            .iter()
            .filter_map(|name| match Route::from_type(name) {
                Some(route) => Some((name.clone(), route)),
                None => {
                    warn!(kind = %name, "ignoring unsupported route in configuration");
                    None
                }
            })
            .collect();
        Self { routes }
    }

    /// Registered message types, in registration order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Route bound to `kind`, if enabled.
    pub fn route(&self, kind: &str) -> Option<Route> {
        self.routes.get(kind).copied()
    }

    /// Decode a text frame into an [`Inbound`] message.
    pub fn decode(&self, text: &str) -> Result<Inbound, ProtocolError> {
        let mut value = serde_json::from_str::<Value>(text).map_err(ProtocolError::InvalidJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        let route = self
            .route(kind)
            .ok_or_else(|| ProtocolError::UnknownType(kind.to_string()))?;

        if let Some(object) = value.as_object_mut() {
            object.remove("type");
        }

        Ok(match route {
            Route::ServerUrl => Inbound::ServerUrl,
            Route::GroupName => Inbound::GroupName,
            Route::InitialPositions => Inbound::InitialPositions,
            Route::PaddleMove => Inbound::PaddleMove(body("paddleMove", value)?),
            Route::Confirmation => {
                let mut request: ConfirmationRequest = body("clientConfirmation", value)?;
                request.name = request.name.trim().to_string();
                request
                    .validate()
                    .map_err(|source| ProtocolError::Validation {
                        kind: "clientConfirmation",
                        source,
                    })?;
                Inbound::Confirmation(request)
            }
        })
    }
}

fn body<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidBody { kind, source })
}

/// Route one inbound text frame from `id`. Protocol errors are logged and dropped.
pub async fn dispatch(state: &SharedState, id: ConnectionId, text: &str) {
    let message = match state.protocol().decode(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(conn = %id, error = %err, "dropping inbound message");
            return;
        }
    };

    match message {
        Inbound::ServerUrl => {
            let message = state.config().server_url.clone();
            session::send_to(state, &id, &OutboundMessage::Url { message }).await;
        }
        Inbound::GroupName => {
            let message = state.config().group_name.clone();
            session::send_to(state, &id, &OutboundMessage::GroupName { message }).await;
        }
        Inbound::Confirmation(request) => {
            session::confirm(state, id, request.name).await;
        }
        Inbound::PaddleMove(request) => {
            let Some(slot) = state.registry().role_of(&id).slot() else {
                debug!(conn = %id, "paddle move from a non-player; ignoring");
                return;
            };
            state.engine().lock().await.set_paddle(slot, request.y);
        }
        Inbound::InitialPositions => {
            session::broadcast(state, &OutboundMessage::init_positions()).await;
        }
    }
}
