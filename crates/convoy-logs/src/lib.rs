//! convoy-logs — streams an app's log records to a caller's output.
//!
//! [`NullLogsStreamer`] is used when no log source is configured.
//! [`RecordLogsStreamer`] copies records from a [`RecordSource`], one per
//! line, until the source closes the stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use convoy_core::App;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub const LOGS_DISABLED: &str = "Logs are disabled\n";

/// Records buffered per app before slow subscribers start missing some.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum LogsError {
    #[error("failed to write logs: {0}")]
    Io(#[from] std::io::Error),

    #[error("log source error: {0}")]
    Source(String),
}

pub type LogsResult<T> = Result<T, LogsError>;

/// Output a log stream is written to.
pub type LogWriter<'a> = dyn AsyncWrite + Send + Unpin + 'a;

#[async_trait]
pub trait LogsStreamer: Send + Sync {
    /// Write the app's log records to `out` until the stream ends.
    async fn stream_logs(&self, app: &App, out: &mut LogWriter<'_>) -> LogsResult<()>;
}

/// Reports that logs are disabled and returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogsStreamer;

#[async_trait]
impl LogsStreamer for NullLogsStreamer {
    async fn stream_logs(&self, _app: &App, out: &mut LogWriter<'_>) -> LogsResult<()> {
        out.write_all(LOGS_DISABLED.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

/// A per-app sequence of raw log records.
#[async_trait]
pub trait RecordStream: Send {
    /// The next record, or `None` once the stream is closed.
    async fn next_record(&mut self) -> LogsResult<Option<Vec<u8>>>;
}

/// Opens record streams by app id.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn subscribe(&self, app_id: &str) -> LogsResult<Box<dyn RecordStream>>;
}

#[async_trait]
impl<T: RecordSource + ?Sized> RecordSource for Arc<T> {
    async fn subscribe(&self, app_id: &str) -> LogsResult<Box<dyn RecordStream>> {
        (**self).subscribe(app_id).await
    }
}

/// Streams records from a [`RecordSource`], each followed by a newline.
pub struct RecordLogsStreamer<S> {
    source: S,
}

impl<S> RecordLogsStreamer<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: RecordSource> LogsStreamer for RecordLogsStreamer<S> {
    async fn stream_logs(&self, app: &App, out: &mut LogWriter<'_>) -> LogsResult<()> {
        let mut stream = self.source.subscribe(&app.id).await?;
        debug!(app = %app.id, "log stream opened");

        let mut written = 0usize;
        while let Some(mut record) = stream.next_record().await? {
            record.push(b'\n');
            out.write_all(&record).await?;
            out.flush().await?;
            written += 1;
        }

        debug!(app = %app.id, records = written, "log stream closed");
        Ok(())
    }
}

/// An in-process [`RecordSource`] backed by one broadcast channel per app.
///
/// Subscribers only see records published after they subscribed.
/// Closing an app ends every open stream for it.
pub struct BroadcastSource {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl BroadcastSource {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, app_id: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock().expect("logs lock");
        channels
            .entry(app_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a record. Returns the number of streams that will see it.
    pub fn publish(&self, app_id: &str, record: impl Into<Vec<u8>>) -> usize {
        self.sender(app_id).send(record.into()).unwrap_or(0)
    }

    /// End every open stream of the app.
    pub fn close(&self, app_id: &str) {
        let mut channels = self.channels.lock().expect("logs lock");
        channels.remove(app_id);
    }

    /// Number of open streams for the app.
    pub fn subscribers(&self, app_id: &str) -> usize {
        let channels = self.channels.lock().expect("logs lock");
        channels
            .get(app_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

impl Default for BroadcastSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSource for BroadcastSource {
    async fn subscribe(&self, app_id: &str) -> LogsResult<Box<dyn RecordStream>> {
        Ok(Box::new(BroadcastStream {
            app_id: app_id.to_string(),
            receiver: self.sender(app_id).subscribe(),
        }))
    }
}

struct BroadcastStream {
    app_id: String,
    receiver: broadcast::Receiver<Vec<u8>>,
}

#[async_trait]
impl RecordStream for BroadcastStream {
    async fn next_record(&mut self) -> LogsResult<Option<Vec<u8>>> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Ok(Some(record)),
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(app = %self.app_id, skipped, "log stream lagged, records dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new("acme", vec![])
    }

    #[tokio::test]
    async fn null_streamer_reports_disabled() {
        let mut out = Vec::new();
        NullLogsStreamer.stream_logs(&app(), &mut out).await.unwrap();
        assert_eq!(out, b"Logs are disabled\n");
    }

    #[tokio::test]
    async fn records_are_written_one_per_line_until_close() {
        let source = Arc::new(BroadcastSource::new());
        let streamer = Arc::new(RecordLogsStreamer::new(source.clone()));

        let task = tokio::spawn({
            let streamer = streamer.clone();
            async move {
                let mut out = Vec::new();
                streamer.stream_logs(&app(), &mut out).await?;
                Ok::<_, LogsError>(out)
            }
        });

        while source.subscribers("acme") == 0 {
            tokio::task::yield_now().await;
        }
        source.publish("globex", "not ours");
        source.publish("acme", "web.1 listening on :8080");
        source.publish("acme", b"worker.1 started".to_vec());
        source.close("acme");

        let out = task.await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "web.1 listening on :8080\nworker.1 started\n"
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let source = BroadcastSource::new();
        assert_eq!(source.publish("acme", "lost"), 0);
        assert_eq!(source.subscribers("acme"), 0);
    }

    #[tokio::test]
    async fn lagging_stream_skips_ahead() {
        let source = BroadcastSource::with_capacity(2);
        let mut stream = source.subscribe("acme").await.unwrap();
        for i in 0..5 {
            source.publish("acme", format!("line {i}"));
        }
        source.close("acme");

        let mut seen = Vec::new();
        while let Some(record) = stream.next_record().await.unwrap() {
            seen.push(String::from_utf8(record).unwrap());
        }
        assert_eq!(seen, vec!["line 3", "line 4"]);
    }
}
