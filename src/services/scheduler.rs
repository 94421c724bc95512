//! Fixed-timestep loop advancing the simulation and broadcasting each tick.

use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info};

use crate::{
    dao::event_store::{EventRecord, EventType},
    dto::ws::OutboundMessage,
    services::{broadcaster, session},
    state::{SharedState, engine::TickOutcome, registry::ConnectionHandle},
};

/// Accumulates elapsed wall time and converts it into whole simulation steps.
///
/// Leftover time below one period carries into the next frame instead of being
/// discarded, so the long-run tick rate does not drift. When more than
/// `max_steps` periods are owed, the excess is dropped.
#[derive(Debug)]
pub struct FrameClock {
    period: Duration,
    max_steps: u32,
    lag: Duration,
    last: Instant,
}

impl FrameClock {
    /// Start measuring from `now`.
    pub fn new(period: Duration, max_steps: u32, now: Instant) -> Self {
        Self {
            period,
            max_steps: max_steps.max(1),
            lag: Duration::ZERO,
            last: now,
        }
    }

    /// Account for the time elapsed until `now` and return how many ticks to run.
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.lag += now.saturating_duration_since(self.last);
        self.last = now;

        let period = self.period.as_nanos().max(1);
        let owed = u32::try_from(self.lag.as_nanos() / period).unwrap_or(u32::MAX);
        let steps = owed.min(self.max_steps);
        if owed > steps {
            debug!(owed, steps, "scheduler fell behind; dropping excess ticks");
            self.lag = Duration::from_nanos(
                u64::try_from(self.lag.as_nanos() % period).unwrap_or(u64::MAX),
            );
        } else {
            self.lag -= self.period * steps;
        }
        steps
    }

    /// Instant at which the next whole period will have accumulated.
    pub fn next_deadline(&self) -> Instant {
        self.last + self.period.saturating_sub(self.lag)
    }
}

/// Spawn the scheduler for the match identified by `epoch`.
pub fn spawn(state: SharedState, epoch: u64) -> JoinHandle<()> {
    tokio::spawn(async move { run(state, epoch).await })
}

async fn run(state: SharedState, epoch: u64) {
    let config = state.config();
    let mut clock = FrameClock::new(
        config.tick_period(),
        config.max_catch_up_ticks,
        Instant::now(),
    );
    info!(epoch, rate_hz = config.tick_rate_hz, "tick scheduler started");

    loop {
        sleep_until(clock.next_deadline()).await;
        let steps = clock.advance(Instant::now());

        for _ in 0..steps {
            let Some((outcome, pruned)) = step(&state, epoch).await else {
                info!(epoch, "tick scheduler stopped");
                return;
            };
            if let Some(slot) = outcome.goal {
                let score = outcome.snapshot.score;
                info!(
                    scorer = slot.id(),
                    player1 = score.player1,
                    player2 = score.player2,
                    "goal"
                );
                state.log_event(
                    EventRecord::new(
                        EventType::Goal,
                        format!("score {}-{}", score.player1, score.player2),
                    )
                    .with_player(slot.id(), None),
                );
            }
            if !pruned.is_empty() {
                session::handle_departures(&state, pruned).await;
            }
        }

        if state.match_epoch() != epoch {
            info!(epoch, "tick scheduler stopped");
            return;
        }
    }
}

/// Run one tick and fan its snapshot out, both under the engine lock, so a
/// concurrent stop always broadcasts last. `None` once the match was stopped
/// or superseded.
async fn step(state: &SharedState, epoch: u64) -> Option<(TickOutcome, Vec<ConnectionHandle>)> {
    let mut engine = state.engine().lock().await;
    if state.match_epoch() != epoch || !engine.is_running() {
        return None;
    }
    let outcome = engine.tick();
    let pruned = broadcaster::send_all(
        state.registry(),
        &OutboundMessage::GameState(outcome.snapshot.clone()),
    );
    Some((outcome, pruned))
}
