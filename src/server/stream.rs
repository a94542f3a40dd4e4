//! Per-session stream buffers
//!
//! A generation task writes chunks (then the sentinel) into an unbounded
//! FIFO; a reader on the response side drains it until the sentinel is
//! observed, then stops. The sentinel never reaches the HTTP body. Each
//! buffer lives for exactly one generation request.

use axum::body::Bytes;
use dashmap::DashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// Reserved value marking end-of-stream; not part of the generated content
pub const STREAM_SENTINEL: &str = "[[DONE]]";

/// Registry of in-flight stream sessions
#[derive(Clone, Default)]
pub struct StreamRegistry {
    active: Arc<DashMap<Uuid, Instant>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer for one generation request
    pub fn open(&self) -> (StreamWriter, SessionStream) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.active.insert(id, Instant::now());
        tracing::debug!("Opened stream session {} ({} active)", id, self.active.len());

        let writer = StreamWriter { tx };
        let reader = SessionStream {
            id,
            registry: self.active.clone(),
            inner: UnboundedReceiverStream::new(rx),
            done: false,
        };
        (writer, reader)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Producer half of a session buffer
#[derive(Clone)]
pub struct StreamWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl StreamWriter {
    /// Append a chunk; a send after the reader went away is silently dropped
    pub fn push(&self, chunk: impl Into<String>) {
        let _ = self.tx.send(chunk.into());
    }

    /// Mark the logical end of the stream
    pub fn finish(&self) {
        let _ = self.tx.send(STREAM_SENTINEL.to_string());
    }
}

/// Consumer half: drains the buffer until the sentinel, then stops
pub struct SessionStream {
    id: Uuid,
    registry: Arc<DashMap<Uuid, Instant>>,
    inner: UnboundedReceiverStream<String>,
    done: bool,
}

impl SessionStream {
    fn complete(&mut self) {
        self.done = true;
        self.registry.remove(&self.id);
    }
}

impl futures::Stream for SessionStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(chunk)) if chunk == STREAM_SENTINEL => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(Bytes::from(chunk)))),
            // Writer dropped without a sentinel (failed generation task)
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_chunks_drain_in_order_and_sentinel_is_stripped() {
        let registry = StreamRegistry::new();
        let (writer, reader) = registry.open();
        assert_eq!(registry.active_count(), 1);

        writer.push("Hel");
        writer.push("lo");
        writer.finish();

        let chunks: Vec<String> = reader
            .map(|r| String::from_utf8_lossy(&r.unwrap()).to_string())
            .collect()
            .await;
        assert_eq!(chunks, vec!["Hel", "lo"]);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_reader_stops_at_sentinel_ignoring_later_pushes() {
        let registry = StreamRegistry::new();
        let (writer, mut reader) = registry.open();

        writer.push("a");
        writer.finish();
        writer.push("after-sentinel");

        assert_eq!(&reader.next().await.unwrap().unwrap()[..], b"a");
        assert!(reader.next().await.is_none());
        // Stays finished on subsequent polls
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_writer_ends_stream() {
        let registry = StreamRegistry::new();
        let (writer, mut reader) = registry.open();
        writer.push("only");
        drop(writer);

        assert_eq!(&reader.next().await.unwrap().unwrap()[..], b"only");
        assert!(reader.next().await.is_none());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_reader_deregisters() {
        let registry = StreamRegistry::new();
        let (_writer, reader) = registry.open();
        assert_eq!(registry.active_count(), 1);
        drop(reader);
        assert_eq!(registry.active_count(), 0);
    }
}
