//! Push-to-pull data bridge
//!
//! The channel pump pushes inbound chunks into an [`InboundSink`]; the caller
//! pulls them from the paired [`OutputStream`]. The queue is bounded and the
//! producer waits when it is full, so nothing is ever dropped. The stream
//! ends exactly once: when the channel goes inactive, when it fails, or when
//! the session finishes it explicitly. Chunks already queued are delivered
//! before the end.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Invoked once when the channel stops on its own
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Why an output stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The remote end closed the channel
    Inactive,
    /// The channel or its transport failed
    Error(String),
    /// The session ended the stream itself
    Finished,
}

struct Shared {
    terminated: CancellationToken,
    on_close: Mutex<Option<CloseCallback>>,
    end: Mutex<Option<StreamEnd>>,
}

impl Shared {
    fn terminate(&self, reason: StreamEnd) {
        let fire = reason != StreamEnd::Finished;
        let callback = {
            let mut end = lock(&self.end);
            if end.is_none() {
                *end = Some(reason);
            }
            lock(&self.on_close).take()
        };
        self.terminated.cancel();

        if let (true, Some(callback)) = (fire, callback) {
            callback();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Create a bridge with room for `capacity` queued chunks.
///
/// `on_close` runs on the first inactive or error notification and never on
/// [`InboundSink::finish`].
pub fn data_bridge(capacity: usize, on_close: CloseCallback) -> (InboundSink, OutputStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let terminated = CancellationToken::new();

    let shared = Arc::new(Shared {
        terminated: terminated.clone(),
        on_close: Mutex::new(Some(on_close)),
        end: Mutex::new(None),
    });

    (
        InboundSink {
            tx,
            shared: Arc::clone(&shared),
        },
        OutputStream {
            rx,
            terminated,
            shared,
            done: false,
        },
    )
}

/// Producer half, held by the channel pump
#[derive(Clone)]
pub struct InboundSink {
    tx: mpsc::Sender<Bytes>,
    shared: Arc<Shared>,
}

impl InboundSink {
    /// Queue a chunk, waiting for room if the queue is full.
    ///
    /// Returns `false` once the bridge has terminated or the consumer is
    /// gone; the chunk is discarded in that case.
    pub async fn push(&self, chunk: Bytes) -> bool {
        if chunk.is_empty() {
            return !self.is_terminated();
        }

        tokio::select! {
            biased;
            _ = self.shared.terminated.cancelled() => false,
            sent = self.tx.send(chunk) => sent.is_ok(),
        }
    }

    /// The remote end closed the channel
    pub fn channel_inactive(&self) {
        if !self.is_terminated() {
            tracing::debug!("Inbound channel became inactive");
        }
        self.shared.terminate(StreamEnd::Inactive);
    }

    /// Unrecoverable channel failure
    pub fn channel_error(&self, message: &str) {
        if !self.is_terminated() {
            tracing::warn!("Inbound channel failed: {}", message);
        }
        self.shared.terminate(StreamEnd::Error(message.to_string()));
    }

    /// End the stream without notifying; used for explicit close
    pub fn finish(&self) {
        self.shared.terminate(StreamEnd::Finished);
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.is_cancelled()
    }
}

/// Consumer half: an ordered, finite sequence of output chunks
pub struct OutputStream {
    rx: mpsc::Receiver<Bytes>,
    terminated: CancellationToken,
    shared: Arc<Shared>,
    done: bool,
}

impl OutputStream {
    /// Next chunk, or `None` once the stream has ended.
    ///
    /// After the first `None` every further call returns `None`.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        if self.done {
            return None;
        }

        tokio::select! {
            biased;
            chunk = self.rx.recv() => {
                if chunk.is_some() {
                    return chunk;
                }
            }
            _ = self.terminated.cancelled() => {
                if let Ok(chunk) = self.rx.try_recv() {
                    return Some(chunk);
                }
            }
        }

        self.done = true;
        None
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Why the stream ended; `None` while it is still open
    pub fn end_reason(&self) -> Option<StreamEnd> {
        lock(&self.shared.end).clone()
    }

    /// Adapt into a `futures` stream
    pub fn into_stream(self) -> BoxStream<'static, Bytes> {
        stream::unfold(self, |mut output| async move {
            output.next_chunk().await.map(|chunk| (chunk, output))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_bridge(capacity: usize) -> (InboundSink, OutputStream, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let (sink, output) = data_bridge(
            capacity,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (sink, output, fired)
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let (sink, mut output, _) = counting_bridge(8);

        for chunk in ["a", "b", "c"] {
            assert!(sink.push(Bytes::from(chunk)).await);
        }

        assert_eq!(output.next_chunk().await, Some(Bytes::from("a")));
        assert_eq!(output.next_chunk().await, Some(Bytes::from("b")));
        assert_eq!(output.next_chunk().await, Some(Bytes::from("c")));
    }

    #[tokio::test]
    async fn test_buffered_chunks_drain_before_end() {
        let (sink, mut output, fired) = counting_bridge(8);

        sink.push(Bytes::from("last words")).await;
        sink.channel_inactive();

        assert_eq!(output.next_chunk().await, Some(Bytes::from("last words")));
        assert_eq!(output.next_chunk().await, None);
        assert!(output.is_finished());
        assert_eq!(output.next_chunk().await, None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_fires_once() {
        let (sink, _output, fired) = counting_bridge(8);

        sink.channel_inactive();
        sink.channel_error("boom");
        sink.channel_inactive();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_consumes_callback_silently() {
        let (sink, mut output, fired) = counting_bridge(8);

        sink.finish();
        sink.channel_inactive();

        assert_eq!(output.next_chunk().await, None);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(output.end_reason(), Some(StreamEnd::Finished));
    }

    #[tokio::test]
    async fn test_first_end_reason_wins() {
        let (sink, output, _) = counting_bridge(8);
        assert_eq!(output.end_reason(), None);

        sink.channel_error("connection lost");
        sink.channel_inactive();
        sink.finish();

        assert_eq!(
            output.end_reason(),
            Some(StreamEnd::Error("connection lost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_push_after_termination_is_refused() {
        let (sink, _output, _) = counting_bridge(8);
        sink.finish();
        assert!(!sink.push(Bytes::from("late")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_applies_backpressure() {
        let (sink, mut output, _) = counting_bridge(1);

        assert!(sink.push(Bytes::from("one")).await);
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), sink.push(Bytes::from("two"))).await;
        assert!(blocked.is_err(), "producer should wait while the queue is full");

        assert_eq!(output.next_chunk().await, Some(Bytes::from("one")));
        assert!(sink.push(Bytes::from("two")).await);
        assert_eq!(output.next_chunk().await, Some(Bytes::from("two")));
    }

    #[tokio::test]
    async fn test_blocked_producer_released_by_finish() {
        let (sink, _output, _) = counting_bridge(1);
        sink.push(Bytes::from("fill")).await;

        let producer = sink.clone();
        let pending = tokio::spawn(async move { producer.push(Bytes::from("stuck")).await });

        tokio::task::yield_now().await;
        sink.finish();
        assert!(!pending.await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_ends_when_producers_dropped() {
        let (sink, output, _) = counting_bridge(4);
        sink.push(Bytes::from("x")).await;
        drop(sink);

        let chunks: Vec<Bytes> = output.into_stream().collect().await;
        assert_eq!(chunks, vec![Bytes::from("x")]);
    }
}
