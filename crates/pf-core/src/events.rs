//! Log sinks for streamed pipeline output.
//!
//! The orchestrator and the stage runner are the only writers; whoever owns
//! the sink is the only reader and decides about retention and rendering.
//! A write must be cheap and must never block on the reader, so every
//! implementation here appends in O(1).

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Append-only channel for text chunks.
pub trait LogSink: Send + Sync {
    /// Append one chunk. Chunks are delivered in call order.
    fn write(&self, chunk: &str);
}

// ---------------------------------------------------------------------------
// ChannelSink
// ---------------------------------------------------------------------------

/// Sink that forwards every chunk into an unbounded tokio channel.
///
/// The receiving half belongs to the consumer (CLI printer, UI, test), which
/// drains it at its own pace. Chunks written after the receiver is dropped
/// are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Create a sink together with the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn write(&self, chunk: &str) {
        let _ = self.tx.send(chunk.to_string());
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that keeps chunks in memory, optionally capped to the most recent
/// `limit` chunks.
#[derive(Debug, Default)]
pub struct MemorySink {
    chunks: Mutex<Vec<String>>,
    limit: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` chunks, dropping the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            limit: Some(limit),
        }
    }

    /// Snapshot of the retained chunks.
    pub fn chunks(&self) -> Vec<String> {
        self.chunks.lock().clone()
    }

    /// Retained output split into lines, without line terminators.
    pub fn lines(&self) -> Vec<String> {
        self.chunks
            .lock()
            .iter()
            .flat_map(|c| c.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Whether any retained line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.chunks.lock().iter().any(|c| c.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write(&self, chunk: &str) {
        let mut chunks = self.chunks.lock();
        chunks.push(chunk.to_string());
        if let Some(limit) = self.limit {
            // Trim in batches so the amortized cost per write stays constant.
            if chunks.len() > limit.saturating_mul(2).max(1) {
                let excess = chunks.len() - limit;
                chunks.drain(..excess);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TracingSink / NullSink
// ---------------------------------------------------------------------------

/// Sink that forwards each chunk to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, chunk: &str) {
        let line = chunk.trim_end();
        if !line.is_empty() {
            tracing::info!(target: "photoforge::output", "{line}");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&self, _chunk: &str) {}
}
