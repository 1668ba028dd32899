//! # Logship
//!
//! An asynchronous log-record shipper: hand it structured entries and
//! free-text messages, and it serializes and forwards them to a message-broker
//! topic without blocking the caller.
//!
//! ## Design
//!
//! - **Non-blocking callers**: log calls encode and enqueue, nothing more
//! - **Background delivery**: a publish loop drains a lock-free queue and
//!   submits payloads to the broker sink with bounded retry on disconnects
//! - **Bounded memory churn**: encoding and rendering run through explicit
//!   buffer pools
//! - **At-most-once**: records may be dropped after sustained broker outages;
//!   there is no delivery guarantee by design

pub mod core;
pub mod macros;
pub mod sink;

pub mod prelude {
    pub use crate::core::{
        EntryFields, LogLevel, Logger, LoggerBuilder, LoggerError, PoolSet, Result,
        ShipperMetrics,
    };
    pub use crate::sink::{ProducerTransaction, PublishError, Sink, SinkConfig, TcpSink};
}

pub use crate::core::{
    BufferPool, EntryFields, LogLevel, Logger, LoggerBuilder, LoggerError, PoolSet, Result,
    Segment, SegmentQueue, ShipperMetrics, MAX_CONSECUTIVE_DISCONNECTS, RETRY_DELAY,
};
pub use crate::sink::{ProducerTransaction, PublishError, Sink, SinkConfig, TcpSink};
