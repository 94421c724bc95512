use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::dao::event_store::{EventRecord, EventSink};

/// Fire-and-forget handle feeding a single writer task.
///
/// Events are written in submission order. Failures are logged and never reach the caller.
#[derive(Clone)]
pub struct EventLogger {
    tx: mpsc::UnboundedSender<EventRecord>,
}

impl EventLogger {
    /// Spawn the writer task draining into `sink`.
    ///
    /// The task ends once every [`EventLogger`] clone has been dropped and the queue is empty.
    pub fn spawn(sink: Arc<dyn EventSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<EventRecord>();
        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event_type = event.event_type;
                if let Err(err) = sink.append(event).await {
                    warn!(error = %err, ?event_type, "failed to persist event");
                }
            }
        });
        (Self { tx }, writer)
    }

    /// Queue an event for persistence.
    pub fn log(&self, event: EventRecord) {
        debug!(event_type = ?event.event_type, message = %event.message, "queueing event");
        if self.tx.send(event).is_err() {
            warn!("event log writer stopped; dropping event");
        }
    }
}
