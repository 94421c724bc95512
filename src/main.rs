//! Paddle relay binary entrypoint wiring config, event log, WebSocket routes and shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paddle_relay::{
    config::AppConfig,
    dao::event_store::{EventRecord, EventSink, EventType, TracingSink, jsonl::JsonLinesSink},
    routes,
    services::{event_log::EventLogger, session},
    state::{AppState, SharedState},
};

/// Upper bound on how long shutdown waits for queued events to be written.
const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;

    let sink = open_event_sink(&config).await;
    let (events, event_writer) = EventLogger::spawn(sink);

    let app_state = AppState::new(config, events);
    let app = build_router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    app_state.log_event(EventRecord::new(
        EventType::ServerStart,
        format!("listening on {addr}"),
    ));

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    info!("stopping server");
    session::shutdown(&app_state).await;
    drop(app_state);
    if tokio::time::timeout(EVENT_FLUSH_TIMEOUT, event_writer)
        .await
        .is_err()
    {
        warn!("timed out flushing event log");
    }
    info!("server stopped");

    Ok(())
}

/// Pick the event sink; a log file that cannot be opened degrades to tracing only.
async fn open_event_sink(config: &AppConfig) -> Arc<dyn EventSink> {
    let Some(path) = config.event_log_path.clone() else {
        info!("event log file disabled; events go to tracing only");
        return Arc::new(TracingSink);
    };

    match JsonLinesSink::open(path).await {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            warn!(error = %err, "failed to open event log; events go to tracing only");
            Arc::new(TracingSink)
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
