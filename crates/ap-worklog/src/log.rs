// log.rs - In-process work log with fan-out to subscribers and sinks.
//
// Appends are serialized through one lock so every subscriber and sink
// observes entries in emission order. Live subscribers use a tokio
// broadcast channel: a slow subscriber lags and loses entries, it never
// stalls the writer.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::entry::{EntryStatus, WorkEntry};
use crate::sink::LogSink;

/// Entries retained in memory for `entries()` / `recent()`.
pub const DEFAULT_CAPACITY: usize = 1000;
const CHANNEL_CAPACITY: usize = 256;

struct Inner {
    entries: Vec<WorkEntry>,
    sinks: Vec<Box<dyn LogSink>>,
}

pub struct WorkLog {
    inner: Mutex<Inner>,
    sender: broadcast::Sender<WorkEntry>,
    capacity: usize,
}

impl Default for WorkLog {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds the in-memory tail only; sinks see everything.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                sinks: Vec::new(),
            }),
            sender,
            capacity: capacity.max(1),
        }
    }

    pub fn add_sink(&self, sink: Box<dyn LogSink>) {
        tracing::debug!(sink = sink.name(), "work log sink attached");
        self.lock().sinks.push(sink);
    }

    /// Receive every entry appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkEntry> {
        self.sender.subscribe()
    }

    pub fn append(
        &self,
        source: impl Into<String>,
        message: impl Into<String>,
        status: EntryStatus,
    ) -> WorkEntry {
        self.record(WorkEntry::new(source, message, status))
    }

    /// Append a fully built entry.
    pub fn record(&self, entry: WorkEntry) -> WorkEntry {
        tracing::debug!(
            source = %entry.source,
            status = %entry.status,
            "{}",
            entry.message
        );

        let mut inner = self.lock();
        for sink in inner.sinks.iter_mut() {
            if let Err(e) = sink.write(&entry) {
                tracing::warn!(sink = sink.name(), error = %e, "work log sink failed");
            }
        }
        inner.entries.push(entry.clone());
        if inner.entries.len() > self.capacity {
            let excess = inner.entries.len() - self.capacity;
            inner.entries.drain(..excess);
        }
        // No receivers is fine.
        let _ = self.sender.send(entry.clone());
        entry
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<WorkEntry> {
        self.lock().entries.clone()
    }

    /// The last `n` retained entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<WorkEntry> {
        let inner = self.lock();
        let start = inner.entries.len().saturating_sub(n);
        inner.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
