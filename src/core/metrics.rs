//! Shipper metrics for observability
//!
//! Counters for monitoring pipeline health: how many records were enqueued,
//! delivered, retried, and dropped.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct ShipperMetrics {
    /// Records handed to the queue
    enqueued: AtomicU64,

    /// Payloads accepted by the sink
    published: AtomicU64,

    /// Payloads dropped after retry exhaustion or opaque failures
    dropped: AtomicU64,

    /// Publish attempts retried after a transient disconnect
    retries: AtomicU64,

    /// Opaque (non-transient) publish failures
    publish_errors: AtomicU64,
}

impl ShipperMetrics {
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn publish_errors(&self) -> u64 {
        self.publish_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_enqueued(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_published(&self) -> u64 {
        self.published.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_retry(&self) -> u64 {
        self.retries.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_publish_error(&self) -> u64 {
        self.publish_errors.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop rate as a percentage of enqueued records (0.0 when idle).
    pub fn drop_rate(&self) -> f64 {
        let enqueued = self.enqueued() as f64;
        if enqueued == 0.0 {
            0.0
        } else {
            (self.dropped() as f64 / enqueued) * 100.0
        }
    }
}

impl Default for ShipperMetrics {
    fn default() -> Self {
        Self::new()
    }
}
