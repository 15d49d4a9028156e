//! Buffering, batching, routing, and failure-recovery logic for the event
//! bus producer.

use crate::error::{EventError, EventResult};
use crate::event::Event;
use crate::routing::topic_for;
use crate::transport::EventTransport;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Batch-size and linger-timer knobs, plus the topic-name prefix. Parsing
/// these from environment variables is out of scope; a host constructs one
/// directly.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub batch_size: usize,
    pub linger_ms: u64,
    pub topic_prefix: String,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            linger_ms: 500,
            topic_prefix: String::new(),
        }
    }
}

impl ProducerConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_linger_ms(mut self, linger_ms: u64) -> Self {
        self.linger_ms = linger_ms;
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }
}

#[derive(Default)]
struct Buffer {
    topics: HashMap<String, VecDeque<Event>>,
    len: usize,
}

impl Buffer {
    fn recompute_len(&mut self) {
        self.len = self.topics.values().map(VecDeque::len).sum();
    }
}

/// The event-bus producer: a single shared buffer, one topic queue per
/// resolved topic, serialized flushes, and head-of-buffer requeue on
/// transport failure.
pub struct Producer {
    config: ProducerConfig,
    transport: Arc<dyn EventTransport>,
    buffer: Mutex<Buffer>,
    flush_lock: AsyncMutex<()>,
    linger_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Producer {
    pub fn new(config: ProducerConfig, transport: Arc<dyn EventTransport>) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            buffer: Mutex::new(Buffer::default()),
            flush_lock: AsyncMutex::new(()),
            linger_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Establishes the transport and arms the linger timer. Idempotent is
    /// not guaranteed if called twice — a host calls this once per run.
    pub fn connect(self: Arc<Self>) {
        let producer = Arc::clone(&self);
        let linger = Duration::from_millis(self.config.linger_ms.max(1));
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(linger) => {
                        if let Err(err) = Arc::clone(&producer).flush().await {
                            warn!(error = %err, "linger flush failed");
                        }
                    }
                    _ = producer.cancel.cancelled() => break,
                }
            }
        });
        *self.linger_handle.lock() = Some(handle);
    }

    /// Resolves `event`'s topic and appends it to that topic's buffer.
    /// Non-blocking from the caller's perspective: flushing, if triggered,
    /// runs on a spawned task.
    pub fn emit(self: Arc<Self>, event: Event) {
        let topic = self.fully_qualified_topic(&event);
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.topics.entry(topic).or_default().push_back(event);
            buffer.len += 1;
            buffer.len >= self.config.batch_size
        };

        if should_flush {
            let producer = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = producer.flush().await {
                    warn!(error = %err, "batch-size flush failed");
                }
            });
        }
    }

    fn fully_qualified_topic(&self, event: &Event) -> String {
        format!("{}{}", self.config.topic_prefix, topic_for(&event.event_type))
    }

    /// Drains every non-empty topic queue and attempts delivery. At most
    /// one flush runs at a time; a rejected batch is returned to the head
    /// of its topic's buffer in original order and this call reports the
    /// first failure encountered, after every topic has been attempted.
    pub async fn flush(self: Arc<Self>) -> EventResult<()> {
        let _guard = self.flush_lock.lock().await;

        let drained: Vec<(String, Vec<Event>)> = {
            let mut buffer = self.buffer.lock();
            let drained = buffer
                .topics
                .iter_mut()
                .filter(|(_, queue)| !queue.is_empty())
                .map(|(topic, queue)| (topic.clone(), queue.drain(..).collect()))
                .collect();
            buffer.recompute_len();
            drained
        };

        let mut first_err = None;
        for (topic, messages) in drained {
            let count = messages.len();
            let original = messages.clone();
            match self.transport.send_batch(&topic, messages).await {
                Ok(()) => debug!(topic = %topic, count, "flushed batch"),
                Err(err) => {
                    error!(topic = %topic, count, error = %err, "batch rejected, requeueing");
                    let mut buffer = self.buffer.lock();
                    let queue = buffer.topics.entry(topic).or_default();
                    let mut requeued: VecDeque<Event> = original.into();
                    requeued.append(queue);
                    *queue = requeued;
                    buffer.recompute_len();
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stops the linger timer, performs a final flush, and releases the
    /// transport. Buffered-but-unflushed events from a hard cancellation
    /// are not recovered by this call — it assumes a graceful shutdown.
    pub async fn disconnect(self: Arc<Self>) -> EventResult<()> {
        self.cancel.cancel();
        let handle = self.linger_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Arc::clone(&self).flush().await?;
        self.transport.close().await
    }

    #[cfg(test)]
    fn buffered_len(&self) -> usize {
        self.buffer.lock().len
    }
}
