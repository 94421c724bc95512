use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    services::{router, session},
    state::SharedState,
};

/// Silence after which the server pings the client; a second silent period drops it.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(100);

/// Handle the full lifecycle for an individual client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let conn_id = Uuid::new_v4();
    if !session::open(&state, conn_id, &outbound_tx).await {
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let mut awaiting_pong = false;
    loop {
        let next = match tokio::time::timeout(LIVENESS_TIMEOUT, receiver.next()).await {
            Ok(next) => next,
            Err(_) if awaiting_pong => {
                warn!(conn = %conn_id, "liveness timeout; dropping connection");
                break;
            }
            Err(_) => {
                awaiting_pong = true;
                let _ = outbound_tx.send(Message::Ping(Default::default()));
                continue;
            }
        };
        awaiting_pong = false;

        match next {
            Some(Ok(Message::Text(text))) => {
                info!(conn = %conn_id, payload = %text, "received client message");
                router::dispatch(&state, conn_id, text.as_str()).await;
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Some(Ok(Message::Close(frame))) => {
                info!(conn = %conn_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(conn = %conn_id, "ignoring binary frame");
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Err(err)) => {
                warn!(conn = %conn_id, error = %err, "websocket error");
                break;
            }
            None => break,
        }

        // Pruned by a failed send or closed by the negotiator.
        if !state.registry().contains(&conn_id) {
            break;
        }
    }

    session::close(&state, &conn_id).await;
    finalize(writer_task, outbound_tx).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
