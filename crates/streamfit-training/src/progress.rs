use crate::accumulator::GroupKey;
use crate::fields::Stream;
use serde::Serialize;
use std::sync::Mutex;
use streamfit_abstraction::ModelArtifact;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    GroupOpened { key: GroupKey },
    /// A group reached its boundary. `rows` were used for training out of
    /// `observed` admitted (they differ under reservoir sampling).
    GroupFlushed { key: GroupKey, rows: usize, observed: usize },
    HeaderResolved { key: GroupKey, attributes: usize, cached: usize },
    ModelPersisted { key: GroupKey, artifact: ModelArtifact },
    RecordSkipped { stream: &'static str, reason: String },
    Finished { groups: usize },
}

impl ProgressEvent {
    pub(crate) fn skipped(stream: Stream, reason: impl Into<String>) -> Self {
        let stream = match stream {
            Stream::Training => "training",
            Stream::Test => "test",
        };
        Self::RecordSkipped { stream, reason: reason.into() }
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::GroupOpened { key } => tracing::debug!(group = %key, "group opened"),
            ProgressEvent::GroupFlushed { key, rows, observed } => {
                tracing::info!(group = %key, rows, observed, "group flushed");
            }
            ProgressEvent::HeaderResolved { key, attributes, cached } => {
                tracing::debug!(group = %key, attributes, cached, "header resolved");
            }
            ProgressEvent::ModelPersisted { key, artifact } => {
                tracing::info!(group = %key, path = %artifact.path.display(), sha256 = %artifact.sha256, "model saved");
            }
            ProgressEvent::RecordSkipped { stream, reason } => {
                tracing::debug!(stream, reason = %reason, "record skipped");
            }
            ProgressEvent::Finished { groups } => tracing::info!(groups, "run finished"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// `(key, rows)` of every flush, in order.
    #[must_use]
    pub fn flushes(&self) -> Vec<(GroupKey, usize)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::GroupFlushed { key, rows, .. } => Some((key, rows)),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
