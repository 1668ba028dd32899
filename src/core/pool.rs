//! Reusable byte-buffer pools
//!
//! Encoding and rendering both work through recycled `Vec<u8>` storage so the
//! steady-state allocation rate stays flat under load. Pools are explicit
//! objects shared by `Arc` rather than process-global state, which keeps their
//! lifetime tied to the loggers that use them.

use parking_lot::Mutex;

/// A render buffer whose capacity grew past this is re-allocated to a smaller
/// one on release instead of being recycled as-is. Bounds the worst-case
/// memory high-water mark per logger.
pub const RENDER_WATERMARK: usize = 2000;

/// Initial capacity hint for encode scratch buffers.
pub const SCRATCH_CAPACITY_HINT: usize = 100;

/// A thread-safe pool of byte buffers.
///
/// `acquire` always returns a buffer of zero length with retained capacity;
/// `release` never blocks and never errors. The pool places no cap on the
/// number of entries created under load.
pub struct BufferPool {
    entries: Mutex<Vec<Vec<u8>>>,
    initial_capacity: usize,
    watermark: usize,
}

impl BufferPool {
    pub fn new(initial_capacity: usize, watermark: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            initial_capacity,
            watermark,
        }
    }

    /// Check a buffer out of the pool.
    ///
    /// # Panics
    ///
    /// Panics if a recycled buffer surfaces in a non-reset state. That can
    /// only happen when pool storage was shared or mutated outside the
    /// acquire/release protocol, which is a programmer error the pool refuses
    /// to paper over.
    pub fn acquire(&self) -> Vec<u8> {
        let recycled = self.entries.lock().pop();
        match recycled {
            Some(buf) => {
                if !buf.is_empty() {
                    panic!(
                        "buffer pool invariant violated: recycled buffer holds {} bytes",
                        buf.len()
                    );
                }
                buf
            }
            None => Vec::with_capacity(self.initial_capacity),
        }
    }

    /// Return a buffer to the pool for reuse.
    ///
    /// The buffer is truncated to zero length; an over-watermark buffer is
    /// replaced by a fresh one at the initial capacity.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() > self.watermark {
            buf = Vec::with_capacity(self.initial_capacity);
        }
        self.entries.lock().push(buf);
    }

    /// Number of buffers currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for BufferPool {
    /// A pool at the standard limits: small initial buffers, recycled
    /// capacity bounded by [`RENDER_WATERMARK`].
    fn default() -> Self {
        Self::new(SCRATCH_CAPACITY_HINT, RENDER_WATERMARK)
    }
}

/// The pair of pools one shipping pipeline works with: scratch storage for
/// encoding and render storage for publish payloads.
pub struct PoolSet {
    pub render: BufferPool,
    pub scratch: BufferPool,
}

impl PoolSet {
    pub fn new() -> Self {
        Self {
            render: BufferPool::default(),
            scratch: BufferPool::default(),
        }
    }
}

impl Default for PoolSet {
    fn default() -> Self {
        Self::new()
    }
}
