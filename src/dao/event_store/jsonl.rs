//! JSON-lines file backend for the event log.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::{info, warn};

use crate::dao::storage::{StorageError, StorageResult};

use super::{EventRecord, EventSink, StoredEvent};

struct Inner {
    file: File,
    next_id: u64,
}

/// Append-only file where every line is one [`StoredEvent`].
#[derive(Clone)]
pub struct JsonLinesSink {
    path: Arc<Path>,
    inner: Arc<Mutex<Inner>>,
}

impl JsonLinesSink {
    /// Open (or create) the log at `path`, continuing the id sequence found in it.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::io(parent, source))?;
        }

        let last_id = match fs::read_to_string(&path).await {
            Ok(contents) => last_id(&path, &contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(source) => return Err(StorageError::io(&path, source)),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StorageError::io(&path, source))?;

        info!(path = %path.display(), next_id = last_id + 1, "event log opened");

        Ok(Self {
            path: Arc::from(path),
            inner: Arc::new(Mutex::new(Inner {
                file,
                next_id: last_id + 1,
            })),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesSink {
    fn append(&self, event: EventRecord) -> BoxFuture<'static, StorageResult<()>> {
        let path = Arc::clone(&self.path);
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let mut inner = inner.lock().await;
            let stored = StoredEvent {
                id: inner.next_id,
                timestamp: now_rfc3339(),
                event_type: event.event_type,
                message: event.message,
                player_id: event.player_id,
                player_name: event.player_name,
            };
            let mut line = serde_json::to_vec(&stored)?;
            line.push(b'\n');

            inner
                .file
                .write_all(&line)
                .await
                .map_err(|source| StorageError::io(&*path, source))?;
            inner
                .file
                .flush()
                .await
                .map_err(|source| StorageError::io(&*path, source))?;
            inner.next_id += 1;
            Ok(())
        })
    }
}

/// Highest id in an existing log; unreadable lines are skipped.
fn last_id(path: &Path, contents: &str) -> u64 {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<StoredEvent>(line) {
            Ok(event) => Some(event.id),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable event log line");
                None
            }
        })
        .max()
        .unwrap_or(0)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
