//! Authoritative ball and paddle simulation advanced one fixed step per tick.

use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

/// Height of both paddles in normalized field units.
pub const PADDLE_HEIGHT: f32 = 0.2;
/// Horizontal position of the left paddle face.
pub const LEFT_PADDLE_X: f32 = 0.05;
/// Horizontal position of the right paddle face.
pub const RIGHT_PADDLE_X: f32 = 0.95;
/// Horizontal ball speed after every reset.
pub const SERVE_SPEED: f32 = 0.01;
/// Bound on the vertical ball speed after every reset.
pub const SERVE_SPREAD: f32 = 0.005;
/// Vertical speed added when the ball hits the very edge of a paddle.
pub const DEFLECTION: f32 = 0.008;

const HALF_PADDLE: f32 = PADDLE_HEIGHT / 2.0;

/// One of the two player identities in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Left paddle.
    One,
    /// Right paddle.
    Two,
}

impl Slot {
    /// Numeric identifier reported to clients.
    pub fn id(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }

    /// Map a numeric identifier back to a slot.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Slot::One),
            2 => Some(Slot::Two),
            _ => None,
        }
    }
}

/// Ball position and velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    /// Horizontal position (scoring axis).
    pub x: f32,
    /// Vertical position.
    pub y: f32,
    /// Horizontal velocity per tick.
    pub vx: f32,
    /// Vertical velocity per tick.
    pub vy: f32,
}

impl Default for Ball {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            vx: SERVE_SPEED,
            vy: SERVE_SPREAD,
        }
    }
}

/// The single authoritative game object.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEngine {
    ball: Ball,
    paddle1_y: f32,
    paddle2_y: f32,
    score1: u32,
    score2: u32,
    running: bool,
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEngine {
    /// Build an idle engine with centered ball and paddles.
    pub fn new() -> Self {
        Self {
            ball: Ball::default(),
            paddle1_y: 0.5,
            paddle2_y: 0.5,
            score1: 0,
            score2: 0,
            running: false,
        }
    }

    /// Begin a new match: scores are zeroed and the ball is served.
    pub fn start(&mut self) {
        self.start_with(&mut rand::rng());
    }

    /// [`GameEngine::start`] with an explicit random source.
    pub fn start_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.score1 = 0;
        self.score2 = 0;
        self.reset_ball(rng);
        self.running = true;
    }

    /// Halt the simulation. Calling it on a stopped engine does nothing.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Whether ticks currently advance the simulation.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Move a paddle, clamping into its legal band. Infinities land on the band
    /// edges; NaN is ignored.
    pub fn set_paddle(&mut self, slot: Slot, y: f32) {
        if y.is_nan() {
            return;
        }
        let y = y.clamp(HALF_PADDLE, 1.0 - HALF_PADDLE);
        match slot {
            Slot::One => self.paddle1_y = y,
            Slot::Two => self.paddle2_y = y,
        }
    }

    /// Current paddle position for `slot`.
    pub fn paddle(&self, slot: Slot) -> f32 {
        match slot {
            Slot::One => self.paddle1_y,
            Slot::Two => self.paddle2_y,
        }
    }

    /// Current ball state.
    pub fn ball(&self) -> Ball {
        self.ball
    }

    /// Overwrite the ball state.
    pub fn set_ball(&mut self, ball: Ball) {
        self.ball = ball;
    }

    /// Current `(player1, player2)` score.
    pub fn score(&self) -> (u32, u32) {
        (self.score1, self.score2)
    }

    /// Advance one fixed step and return the resulting snapshot.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_with(&mut rand::rng())
    }

    /// [`GameEngine::tick`] with an explicit random source for serves.
    pub fn tick_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TickOutcome {
        if !self.running {
            return TickOutcome {
                goal: None,
                snapshot: self.snapshot(),
            };
        }

        let ball = &mut self.ball;
        ball.x += ball.vx;
        ball.y += ball.vy;

        if ball.y <= 0.0 || ball.y >= 1.0 {
            ball.vy = -ball.vy;
            ball.y = ball.y.clamp(0.0, 1.0);
        }

        if ball.x <= LEFT_PADDLE_X && within_paddle(ball.y, self.paddle1_y) {
            ball.vx = ball.vx.abs();
            ball.x = LEFT_PADDLE_X;
            ball.vy += deflection(ball.y, self.paddle1_y);
        }

        if ball.x >= RIGHT_PADDLE_X && within_paddle(ball.y, self.paddle2_y) {
            ball.vx = -ball.vx.abs();
            ball.x = RIGHT_PADDLE_X;
            ball.vy += deflection(ball.y, self.paddle2_y);
        }

        let goal = if ball.x < 0.0 {
            self.score2 += 1;
            Some(Slot::Two)
        } else if ball.x > 1.0 {
            self.score1 += 1;
            Some(Slot::One)
        } else {
            None
        };

        if goal.is_some() {
            self.reset_ball(rng);
        }

        TickOutcome {
            goal,
            snapshot: self.snapshot(),
        }
    }

    /// Serializable view of the current state.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            ball: BallPosition {
                x: self.ball.x,
                y: self.ball.y,
            },
            paddle1: PaddlePosition { y: self.paddle1_y },
            paddle2: PaddlePosition { y: self.paddle2_y },
            score: Score {
                player1: self.score1,
                player2: self.score2,
            },
            running: self.running,
        }
    }

    fn reset_ball<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.ball = Ball {
            x: 0.5,
            y: 0.5,
            vx: if rng.random_bool(0.5) {
                SERVE_SPEED
            } else {
                -SERVE_SPEED
            },
            vy: rng.random_range(-SERVE_SPREAD..=SERVE_SPREAD),
        };
    }
}

fn within_paddle(ball_y: f32, paddle_y: f32) -> bool {
    ball_y >= paddle_y - HALF_PADDLE && ball_y <= paddle_y + HALF_PADDLE
}

/// Impact at the paddle center leaves `vy` untouched; the edges add the full term.
fn deflection(ball_y: f32, paddle_y: f32) -> f32 {
    (ball_y - paddle_y) / HALF_PADDLE * DEFLECTION
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Slot credited with a point during this tick, if any.
    pub goal: Option<Slot>,
    /// State after the tick.
    pub snapshot: GameSnapshot,
}

/// Broadcast payload body of a `gameState` message.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GameSnapshot {
    /// Ball position.
    pub ball: BallPosition,
    /// Left paddle.
    pub paddle1: PaddlePosition,
    /// Right paddle.
    pub paddle2: PaddlePosition,
    /// Current score.
    pub score: Score,
    /// Whether the match is in progress.
    pub running: bool,
}

/// Ball coordinates in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct BallPosition {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

/// Paddle coordinate in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PaddlePosition {
    /// Vertical position.
    pub y: f32,
}

/// Score pair in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Score {
    /// Left player.
    pub player1: u32,
    /// Right player.
    pub player2: u32,
}
