//! Logger facade and the background shipping loops
//!
//! Two threads run per [`Logger`] for its whole lifetime: the publish loop,
//! which drains the segment queue and submits payloads to the broker sink,
//! and the transaction drain loop, which consumes publish completions and
//! logs delivery errors. `close()` stops them in strict order so no write can
//! race a stopped sink.

use super::codec::{self, EntryFields, Segment};
use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use super::metrics::ShipperMetrics;
use super::pool::PoolSet;
use super::queue::SegmentQueue;
use crate::sink::{ProducerTransaction, PublishError, Sink, SinkConfig, TcpSink};
use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_utils::sync::Parker;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Delay between publish retries while the sink reports a disconnect.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Consecutive disconnects tolerated before a payload is abandoned.
pub const MAX_CONSECUTIVE_DISCONNECTS: u32 = 10;

/// Capacity of the publish-completion channel.
const COMPLETION_CAPACITY: usize = 16;

/// How long the publish loop parks on an empty queue before re-polling.
/// Enqueues and the stop signal unpark it immediately.
const IDLE_PARK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Draining,
    Stopped,
}

/// Fire-and-forget shipper for structured entries and leveled messages.
///
/// Caller-facing methods never block and never suspend: they encode, stamp,
/// and enqueue. Delivery, retry, and failure handling all happen on the
/// background threads.
pub struct Logger {
    topic: String,
    source: String,
    sink: Arc<dyn Sink>,
    queue: Arc<SegmentQueue>,
    pools: Arc<PoolSet>,
    /// Serializes enqueues so the queue keeps its single-producer contract
    /// even when multiple caller threads share the logger.
    enqueue_lock: Mutex<()>,
    done_tx: Option<Sender<ProducerTransaction>>,
    stop_tx: Option<Sender<()>>,
    publish_handle: Option<thread::JoinHandle<()>>,
    drain_handle: Option<thread::JoinHandle<()>>,
    metrics: Arc<ShipperMetrics>,
}

impl Logger {
    /// Connect to a broker and return a ready logger.
    ///
    /// Records ship to `topic`; every wire record carries `source` as its
    /// origin tag. The broker client is configured with compression enabled,
    /// at most 100 in-flight requests, and the shared secret when `secret` is
    /// non-empty. A secret that cannot be applied fails construction.
    pub fn connect(
        topic: impl Into<String>,
        source: impl Into<String>,
        broker_addr: &str,
        secret: &str,
    ) -> Result<Logger> {
        LoggerBuilder::new(topic, source).connect(broker_addr, secret)
    }

    /// Create a builder for a logger with a custom sink or pools.
    pub fn builder(topic: impl Into<String>, source: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder::new(topic, source)
    }

    fn start(
        topic: String,
        source: String,
        sink: Arc<dyn Sink>,
        pools: Arc<PoolSet>,
    ) -> Logger {
        let (queue, parker) = SegmentQueue::new();
        let queue = Arc::new(queue);
        let (done_tx, done_rx) = bounded(COMPLETION_CAPACITY);
        let (stop_tx, stop_rx) = unbounded();
        let metrics = Arc::new(ShipperMetrics::new());

        let publish_handle = {
            let queue = Arc::clone(&queue);
            let sink = Arc::clone(&sink);
            let pools = Arc::clone(&pools);
            let metrics = Arc::clone(&metrics);
            let done_tx = done_tx.clone();
            let topic = topic.clone();
            thread::spawn(move || {
                let _final_state = publish_loop(
                    &queue, parker, sink.as_ref(), &topic, &pools, &done_tx, &stop_rx, &metrics,
                );
            })
        };

        let drain_handle = thread::spawn(move || drain_loop(&done_rx));

        Logger {
            topic,
            source,
            sink,
            queue,
            pools,
            enqueue_lock: Mutex::new(()),
            done_tx: Some(done_tx),
            stop_tx: Some(stop_tx),
            publish_handle: Some(publish_handle),
            drain_handle: Some(drain_handle),
            metrics,
        }
    }

    /// Encode a structured entry and enqueue it for shipping.
    ///
    /// A `time` field holding the current Unix timestamp (seconds) is
    /// injected before encoding, replacing any caller-supplied value. Fails
    /// only when a field holds a shape the wire record cannot represent.
    pub fn log_entry(&self, mut fields: EntryFields) -> Result<()> {
        fields.insert("time".to_string(), Utc::now().timestamp().into());
        let segment = codec::encode_entry(&self.pools.scratch, &self.source, &fields)?;
        self.enqueue(segment);
        Ok(())
    }

    /// Encode a leveled message and enqueue it for shipping. Never fails.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let segment = codec::encode_message(
            &self.pools.scratch,
            &self.source,
            level,
            message.as_ref(),
            Utc::now().timestamp(),
        );
        self.enqueue(segment);
    }

    /// Enqueue an already-encoded segment, bypassing the built-in encoder.
    ///
    /// Degenerate segments render to zero bytes and are discarded by the
    /// publish loop without a sink submission.
    pub fn enqueue_segment(&self, segment: Segment) {
        self.enqueue(segment);
    }

    fn enqueue(&self, segment: Segment) {
        let _guard = self.enqueue_lock.lock();
        self.queue.write(segment);
        self.metrics.record_enqueued();
    }

    #[inline]
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    #[inline]
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn fatal(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Fatal, message);
    }

    /// Topic records are shipped to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Source tag stamped into every record.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Pipeline counters for observability.
    pub fn metrics(&self) -> &ShipperMetrics {
        &self.metrics
    }

    /// Shut the logger down.
    ///
    /// Strictly ordered: the publish loop is signalled and joined first, then
    /// the completion channel is closed and the drain loop joined, and only
    /// then is the broker sink stopped. Queued segments that the publish loop
    /// has not reached are abandoned. A second call returns
    /// [`LoggerError::LoggerStopped`].
    pub fn close(&mut self) -> Result<()> {
        let stop_tx = self.stop_tx.take().ok_or(LoggerError::LoggerStopped)?;

        // 1. Publisher stops first.
        let _ = stop_tx.send(());
        self.queue.wake();
        if let Some(handle) = self.publish_handle.take() {
            if handle.join().is_err() {
                eprintln!("[LOGSHIP ERROR] publish loop panicked during close");
            }
        }

        // 2. Then the completion channel closes.
        drop(self.done_tx.take());
        if let Some(handle) = self.drain_handle.take() {
            if handle.join().is_err() {
                eprintln!("[LOGSHIP ERROR] drain loop panicked during close");
            }
        }

        // 3. Then the broker connection goes away.
        self.sink.stop();
        Ok(())
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.stop_tx.is_some() {
            if let Err(err) = self.close() {
                eprintln!("[LOGSHIP ERROR] close during drop failed: {err}");
            }
        }
    }
}

/// Drains the segment queue and ships payloads until stopped.
///
/// Returns the terminal state: `Stopped` after the stop signal or a
/// sink-stopped error. The consecutive-disconnect counter spans records and
/// resets only on a successful submission, so a fully-partitioned shipper
/// abandons each payload after a bounded number of attempts instead of
/// retry-looping forever.
#[allow(clippy::too_many_arguments)]
fn publish_loop(
    queue: &SegmentQueue,
    parker: Parker,
    sink: &dyn Sink,
    topic: &str,
    pools: &PoolSet,
    done_tx: &Sender<ProducerTransaction>,
    stop_rx: &Receiver<()>,
    metrics: &ShipperMetrics,
) -> LoopState {
    let mut state = LoopState::Running;
    let mut disconnects: u32 = 0;

    while state == LoopState::Running {
        if stop_rx.try_recv().is_ok() {
            state = LoopState::Draining;
            continue;
        }

        let Some(mut segment) = queue.read() else {
            parker.park_timeout(IDLE_PARK);
            continue;
        };

        let mut buf = pools.render.acquire();
        if let Some(spent) = segment.render_into(&mut buf) {
            pools.scratch.release(spent);
        }
        if buf.is_empty() {
            // Degenerate or already-rendered segment; never publish empty payloads.
            pools.render.release(buf);
            continue;
        }

        loop {
            match sink.publish_async(topic, &buf, done_tx.clone()) {
                Ok(()) => {
                    disconnects = 0;
                    metrics.record_published();
                    break;
                }
                Err(PublishError::NotConnected) => {
                    disconnects += 1;
                    if disconnects > MAX_CONSECUTIVE_DISCONNECTS {
                        eprintln!(
                            "[LOGSHIP WARNING] abandoning payload for '{topic}' after {disconnects} consecutive disconnects"
                        );
                        metrics.record_dropped();
                        break;
                    }
                    metrics.record_retry();
                    // The stop signal preempts the retry delay.
                    match stop_rx.recv_timeout(RETRY_DELAY) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            state = LoopState::Draining;
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                }
                Err(PublishError::Stopped) => {
                    state = LoopState::Stopped;
                    break;
                }
                Err(err) => {
                    eprintln!("[LOGSHIP ERROR] publish to '{topic}' failed: {err}");
                    metrics.record_publish_error();
                    metrics.record_dropped();
                    break;
                }
            }
        }

        pools.render.release(buf);
    }

    // Draining performs no further reads; remaining segments are abandoned.
    LoopState::Stopped
}

/// Consumes publish completions until the channel closes, logging delivery
/// errors with the original request arguments. Observability only; retry is
/// the publish loop's responsibility.
fn drain_loop(done_rx: &Receiver<ProducerTransaction>) {
    for transaction in done_rx.iter() {
        if let Some(err) = transaction.error {
            eprintln!(
                "[LOGSHIP ERROR] delivery to '{}' failed ({} bytes): {err}",
                transaction.topic, transaction.body_len
            );
        }
    }
}

/// Builder for a [`Logger`] with custom pools, sink configuration, or a
/// caller-supplied sink.
///
/// # Example
///
/// ```no_run
/// use logship::prelude::*;
///
/// let logger = Logger::builder("app-logs", "authdb")
///     .connect("127.0.0.1:4150", "shared-secret")
///     .unwrap();
/// logger.info("service started");
/// ```
pub struct LoggerBuilder {
    topic: String,
    source: String,
    pools: Option<Arc<PoolSet>>,
    sink_config: SinkConfig,
}

impl LoggerBuilder {
    pub fn new(topic: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            source: source.into(),
            pools: None,
            sink_config: SinkConfig::default(),
        }
    }

    /// Share explicit pools between loggers instead of creating a fresh set.
    #[must_use = "builder methods return a new value"]
    pub fn pools(mut self, pools: Arc<PoolSet>) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Override the broker client configuration.
    #[must_use = "builder methods return a new value"]
    pub fn sink_config(mut self, config: SinkConfig) -> Self {
        self.sink_config = config;
        self
    }

    /// Connect a [`TcpSink`] and build the logger.
    pub fn connect(self, broker_addr: &str, secret: &str) -> Result<Logger> {
        let config = self.sink_config.clone().with_auth_secret(secret);
        let sink = TcpSink::connect(broker_addr, config)?;
        Ok(self.build_with_sink(Arc::new(sink)))
    }

    /// Build the logger on top of an already-constructed sink.
    pub fn build_with_sink(self, sink: Arc<dyn Sink>) -> Logger {
        let pools = self.pools.unwrap_or_else(|| Arc::new(PoolSet::new()));
        Logger::start(self.topic, self.source, sink, pools)
    }
}
