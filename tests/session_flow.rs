use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use paddle_relay::{
    config::AppConfig,
    dao::event_store::TracingSink,
    services::{event_log::EventLogger, router, session},
    state::{
        AppState, SharedState,
        engine::Slot,
        registry::{ConnectionId, Role},
    },
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

struct Client {
    id: ConnectionId,
    rx: UnboundedReceiver<Message>,
}

impl Client {
    fn drain(&mut self) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                messages.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        messages
    }

    fn drain_of(&mut self, kind: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|message| message["type"] == kind)
            .collect()
    }

    async fn send(&self, state: &SharedState, payload: Value) {
        router::dispatch(state, self.id, &payload.to_string()).await;
    }

    async fn confirm(&self, state: &SharedState, name: &str) {
        self.send(state, json!({ "type": "clientConfirmation", "name": name }))
            .await;
    }
}

fn test_state(config: AppConfig) -> SharedState {
    let (events, _writer) = EventLogger::spawn(Arc::new(TracingSink));
    AppState::new(
        AppConfig {
            event_log_path: None,
            ..config
        },
        events,
    )
}

async fn connect(state: &SharedState) -> Option<Client> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    session::open(state, id, &tx).await.then_some(Client { id, rx })
}

#[tokio::test(start_paused = true)]
async fn two_players_get_slots_countdown_and_game_state() {
    let state = test_state(AppConfig::default());
    let mut alice = connect(&state).await.unwrap();
    let mut bob = connect(&state).await.unwrap();

    assert_eq!(alice.drain_of("welcome").len(), 1);
    assert_eq!(bob.drain_of("welcome").len(), 1);

    alice.confirm(&state, "Alice").await;
    assert_eq!(
        alice.drain(),
        vec![json!({ "type": "playerAssigned", "playerId": 1 })]
    );

    bob.confirm(&state, "Bob").await;
    let bob_messages = bob.drain();
    assert_eq!(
        bob_messages[0],
        json!({ "type": "playerAssigned", "playerId": 2 })
    );
    for messages in [alice.drain(), bob_messages[1..].to_vec()] {
        assert!(messages.contains(&json!({ "type": "countdown", "number": 3 })));
        assert!(messages.contains(&json!({
            "type": "playerNames",
            "player1": "Alice",
            "player2": "Bob",
        })));
    }

    // Nothing is simulated before the pre-match delay elapses.
    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert!(alice.drain_of("gameState").is_empty());
    assert!(!state.engine().lock().await.is_running());

    tokio::time::sleep(Duration::from_millis(600)).await;
    let states = alice.drain_of("gameState");
    assert!(states.len() >= 10, "expected periodic broadcasts, got {}", states.len());
    assert!(states.iter().all(|message| message["running"] == true));
    assert_eq!(bob.drain_of("gameState").len(), states.len());
    assert!(state.engine().lock().await.is_running());
}

#[tokio::test(start_paused = true)]
async fn losing_a_player_stops_the_match() {
    let state = test_state(AppConfig::default());
    let mut alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(state.engine().lock().await.is_running());
    alice.drain();

    session::close(&state, &bob.id).await;
    assert!(!state.engine().lock().await.is_running());

    let last = alice.drain_of("gameState").pop().unwrap();
    assert_eq!(last["running"], false);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(alice.drain_of("gameState").is_empty());
    assert_eq!(state.registry().role_of(&alice.id), Role::Player(Slot::One));
}

#[tokio::test(start_paused = true)]
async fn player_leaving_during_countdown_cancels_start() {
    let state = test_state(AppConfig::default());
    let mut alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    session::close(&state, &bob.id).await;
    alice.drain();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!state.engine().lock().await.is_running());
    assert!(alice.drain_of("gameState").is_empty());
}

#[tokio::test(start_paused = true)]
async fn vacated_slot_goes_to_a_new_connection() {
    let state = test_state(AppConfig::default());
    let alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    let mut carol = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;
    carol.confirm(&state, "Carol").await;
    assert_eq!(
        carol.drain_of("playerAssigned"),
        vec![json!({ "type": "playerAssigned", "playerId": 0 })]
    );

    session::close(&state, &alice.id).await;
    assert_eq!(state.registry().role_of(&carol.id), Role::Spectator);

    let mut dave = connect(&state).await.unwrap();
    dave.confirm(&state, "Dave").await;
    assert_eq!(
        dave.drain_of("playerAssigned"),
        vec![json!({ "type": "playerAssigned", "playerId": 1 })]
    );
    assert_eq!(
        carol.drain_of("playerNames"),
        vec![json!({ "type": "playerNames", "player1": "Dave", "player2": "Bob" })]
    );
}

#[tokio::test]
async fn duplicate_confirmation_is_ignored() {
    let state = test_state(AppConfig::default());
    let mut alice = connect(&state).await.unwrap();
    let mut bob = connect(&state).await.unwrap();

    alice.confirm(&state, "Alice").await;
    alice.confirm(&state, "Alice again").await;
    assert_eq!(alice.drain_of("playerAssigned").len(), 1);

    bob.confirm(&state, "Bob").await;
    bob.confirm(&state, "Bob").await;
    assert_eq!(bob.drain_of("playerAssigned").len(), 1);
    assert_eq!(alice.drain_of("countdown").len(), 1);
    assert_eq!(state.registry().player_count(), 2);
    assert_eq!(
        state.registry().player_names(),
        Some(("Alice".to_string(), "Bob".to_string()))
    );
}

#[tokio::test]
async fn fourth_connection_is_rejected_at_capacity() {
    let state = test_state(AppConfig {
        max_connections: 3,
        ..AppConfig::default()
    });
    for _ in 0..3 {
        connect(&state).await.unwrap();
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    assert!(!session::open(&state, id, &tx).await);
    assert!(!state.registry().contains(&id));
    assert_eq!(state.registry().len(), 3);

    match rx.try_recv().unwrap() {
        Message::Text(text) => {
            let message: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(message["type"], "error");
        }
        other => panic!("expected error frame, got {other:?}"),
    }
    assert!(matches!(rx.try_recv().unwrap(), Message::Close(_)));
}

#[tokio::test]
async fn third_confirmation_is_refused_without_spectators() {
    let state = test_state(AppConfig {
        allow_spectators: false,
        ..AppConfig::default()
    });
    let alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    let mut carol = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;
    carol.drain();

    carol.confirm(&state, "Carol").await;
    assert_eq!(carol.drain_of("error").len(), 1);
    assert!(!state.registry().contains(&carol.id));
    assert_eq!(state.registry().player_count(), 2);
}

#[tokio::test]
async fn handshake_less_variant_assigns_roles_on_connect() {
    let state = test_state(AppConfig {
        max_connections: 2,
        allow_spectators: false,
        require_confirmation: false,
        ..AppConfig::default()
    });
    let mut first = connect(&state).await.unwrap();
    let mut second = connect(&state).await.unwrap();

    assert_eq!(
        first.drain_of("playerAssigned"),
        vec![json!({ "type": "playerAssigned", "playerId": 1 })]
    );
    let second_messages = second.drain();
    assert!(second_messages.contains(&json!({ "type": "playerAssigned", "playerId": 2 })));
    assert!(second_messages.contains(&json!({ "type": "countdown", "number": 3 })));
    assert!(connect(&state).await.is_none());
}

#[tokio::test]
async fn paddle_moves_apply_only_to_players() {
    let state = test_state(AppConfig::default());
    let alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    let carol = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;
    carol.confirm(&state, "Carol").await;

    alice.send(&state, json!({ "type": "paddleMove", "y": 2.0 })).await;
    bob.send(&state, json!({ "type": "paddleMove", "y": 0.3 })).await;
    carol.send(&state, json!({ "type": "paddleMove", "y": 0.2 })).await;

    let engine = state.engine().lock().await;
    assert!((engine.paddle(Slot::One) - 0.9).abs() < 1e-6);
    assert!((engine.paddle(Slot::Two) - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn paddle_moves_beyond_f32_range_are_clamped() {
    let state = test_state(AppConfig::default());
    let alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;

    router::dispatch(&state, alice.id, r#"{"type":"paddleMove","y":1e39}"#).await;
    router::dispatch(&state, bob.id, r#"{"type":"paddleMove","y":-1e39}"#).await;

    let engine = state.engine().lock().await;
    assert!((engine.paddle(Slot::One) - 0.9).abs() < 1e-6);
    assert!((engine.paddle(Slot::Two) - 0.1).abs() < 1e-6);
}

#[tokio::test]
async fn queries_are_answered_and_garbage_is_dropped() {
    let state = test_state(AppConfig {
        server_url: "ws://relay.test:3000".into(),
        group_name: "Matrix".into(),
        ..AppConfig::default()
    });
    let mut alice = connect(&state).await.unwrap();
    alice.drain();

    alice.send(&state, json!({ "type": "url" })).await;
    alice.send(&state, json!({ "type": "groupname" })).await;
    router::dispatch(&state, alice.id, "{ not json").await;
    alice.send(&state, json!({ "type": "teleport" })).await;
    alice.send(&state, json!({ "type": "paddleMove", "y": "up" })).await;
    alice.send(&state, json!({ "type": "init_positions" })).await;

    assert_eq!(
        alice.drain(),
        vec![
            json!({ "type": "url", "message": "ws://relay.test:3000" }),
            json!({ "type": "groupname", "message": "Matrix" }),
            json!({
                "type": "init_positions",
                "p1": { "x": 0.05, "y": 0.5 },
                "p2": { "x": 0.95, "y": 0.5 },
            }),
        ]
    );
    assert!(state.registry().contains(&alice.id));
}

#[tokio::test]
async fn broadcast_prunes_a_player_whose_transport_closed() {
    let state = test_state(AppConfig::default());
    let mut alice = connect(&state).await.unwrap();
    let bob = connect(&state).await.unwrap();
    alice.confirm(&state, "Alice").await;
    bob.confirm(&state, "Bob").await;
    let bob_id = bob.id;
    drop(bob);
    alice.drain();

    alice.send(&state, json!({ "type": "init_positions" })).await;
    assert!(!state.registry().contains(&bob_id));
    assert_eq!(alice.drain_of("init_positions").len(), 1);
    assert_eq!(state.registry().player_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stopping_mid_match_leaves_a_stopped_frame_last() {
    for _ in 0..200 {
        let state = test_state(AppConfig {
            tick_rate_hz: 20_000,
            pre_match_delay: Duration::ZERO,
            ..AppConfig::default()
        });
        let mut alice = connect(&state).await.unwrap();
        let bob = connect(&state).await.unwrap();
        alice.confirm(&state, "Alice").await;
        bob.confirm(&state, "Bob").await;
        while !state.engine().lock().await.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tokio::time::sleep(Duration::from_millis(3)).await;
        session::close(&state, &bob.id).await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        let last = alice.drain_of("gameState").pop().unwrap();
        assert_eq!(last["running"], false);
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_match_and_closes_everyone() {
    let state = test_state(AppConfig::default());
    let mut clients = Vec::new();
    for name in ["Alice", "Bob", "Carol"] {
        let client = connect(&state).await.unwrap();
        client.confirm(&state, name).await;
        clients.push(client);
    }
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(state.engine().lock().await.is_running());

    session::shutdown(&state).await;

    assert!(!state.engine().lock().await.is_running());
    assert!(state.registry().is_empty());
    for client in &mut clients {
        let mut frames = Vec::new();
        while let Ok(frame) = client.rx.try_recv() {
            frames.push(frame);
        }
        assert!(matches!(frames.last(), Some(Message::Close(_))));
        let final_state = frames
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Message::Text(text) => Some(serde_json::from_str::<Value>(text.as_str()).unwrap()),
                _ => None,
            })
            .unwrap();
        assert_eq!(final_state["type"], "gameState");
        assert_eq!(final_state["running"], false);
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    for client in &mut clients {
        assert!(client.rx.try_recv().is_err());
    }
}

#[tokio::test]
async fn handshake_less_connection_without_a_seat_is_refused() {
    let state = test_state(AppConfig {
        max_connections: 3,
        allow_spectators: false,
        require_confirmation: false,
        ..AppConfig::default()
    });
    let _first = connect(&state).await.unwrap();
    let _second = connect(&state).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    assert!(!session::open(&state, id, &tx).await);
    assert!(!state.registry().contains(&id));
    assert_eq!(state.registry().len(), 2);

    let mut kinds = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        match frame {
            Message::Text(text) => {
                let message: Value = serde_json::from_str(text.as_str()).unwrap();
                kinds.push(message["type"].as_str().unwrap().to_string());
            }
            Message::Close(_) => kinds.push("close".to_string()),
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!(kinds, vec!["welcome", "error", "close"]);
}
