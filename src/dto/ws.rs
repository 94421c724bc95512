use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::state::engine::{GameSnapshot, LEFT_PADDLE_X, RIGHT_PADDLE_X};

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
/// Body of a `clientConfirmation` message.
pub struct ConfirmationRequest {
    /// Display name shown to the other participants.
    #[validate(length(min = 1, max = 32))]
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Body of a `paddleMove` message.
pub struct PaddleMoveRequest {
    /// Requested paddle center in `[0, 1]`; out-of-range values are clamped.
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
/// Position of one paddle in the `init_positions` reply.
pub struct PaddleLayout {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
/// Messages pushed to WebSocket clients.
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Greeting sent on connect.
    #[serde(rename = "welcome")]
    Welcome {
        /// Human-readable text.
        message: String,
    },
    /// Reply to a `url` query.
    #[serde(rename = "url")]
    Url {
        /// Human-readable text.
        message: String,
    },
    /// Reply to a `groupname` query.
    #[serde(rename = "groupname")]
    GroupName {
        /// Human-readable text.
        message: String,
    },
    /// Role granted after confirmation; spectators receive 0.
    #[serde(rename = "playerAssigned")]
    PlayerAssigned {
        /// 1 or 2 for players, 0 for spectators.
        #[serde(rename = "playerId")]
        player_id: u8,
    },
    /// Display names of both players.
    #[serde(rename = "playerNames")]
    PlayerNames {
        /// Left player.
        player1: String,
        /// Right player.
        player2: String,
    },
    /// Countdown announced before the match starts.
    #[serde(rename = "countdown")]
    Countdown {
        /// Seconds until the match starts.
        number: u32,
    },
    /// Authoritative simulation state.
    #[serde(rename = "gameState")]
    GameState(GameSnapshot),
    /// Starting paddle layout.
    #[serde(rename = "init_positions")]
    InitPositions {
        /// Left paddle.
        p1: PaddleLayout,
        /// Right paddle.
        p2: PaddleLayout,
    },
    /// Fatal condition for this connection; the server closes it afterwards.
    #[serde(rename = "error")]
    Error {
        /// Human-readable text.
        message: String,
    },
}

impl OutboundMessage {
    /// Starting layout with both paddles centered on their faces.
    pub fn init_positions() -> Self {
        Self::InitPositions {
            p1: PaddleLayout {
                x: LEFT_PADDLE_X,
                y: 0.5,
            },
            p2: PaddleLayout {
                x: RIGHT_PADDLE_X,
                y: 0.5,
            },
        }
    }

    /// Short tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Url { .. } => "url",
            Self::GroupName { .. } => "groupname",
            Self::PlayerAssigned { .. } => "playerAssigned",
            Self::PlayerNames { .. } => "playerNames",
            Self::Countdown { .. } => "countdown",
            Self::GameState(_) => "gameState",
            Self::InitPositions { .. } => "init_positions",
            Self::Error { .. } => "error",
        }
    }
}
