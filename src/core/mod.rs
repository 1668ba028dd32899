//! Core shipper types and the publish pipeline

pub mod codec;
pub mod error;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod pool;
pub mod queue;

pub use codec::{EntryFields, Segment};
pub use error::{LoggerError, Result};
pub use log_level::LogLevel;
pub use logger::{Logger, LoggerBuilder, MAX_CONSECUTIVE_DISCONNECTS, RETRY_DELAY};
pub use metrics::ShipperMetrics;
pub use pool::{BufferPool, PoolSet, RENDER_WATERMARK, SCRATCH_CAPACITY_HINT};
pub use queue::SegmentQueue;
