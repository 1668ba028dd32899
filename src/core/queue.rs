//! Lock-free record queue
//!
//! Single-producer/single-consumer handoff between the facade and the publish
//! loop. Producers never block and never fail; the consumer reads without
//! suspending and parks briefly when the queue is empty, woken by the next
//! `write`. Growth is unbounded — there is no backpressure signal, by design.

use super::codec::Segment;
use crossbeam_queue::SegQueue;
use crossbeam_utils::sync::{Parker, Unparker};

pub struct SegmentQueue {
    inner: SegQueue<Segment>,
    unparker: Unparker,
}

impl SegmentQueue {
    /// Create a queue together with the [`Parker`] its consumer idles on.
    pub fn new() -> (Self, Parker) {
        let parker = Parker::new();
        let queue = Self {
            inner: SegQueue::new(),
            unparker: parker.unparker().clone(),
        };
        (queue, parker)
    }

    /// Enqueue a segment and wake the consumer. Never blocks, never fails.
    pub fn write(&self, segment: Segment) {
        self.inner.push(segment);
        self.unparker.unpark();
    }

    /// Non-blocking read: `None` when nothing is queued.
    pub fn read(&self) -> Option<Segment> {
        self.inner.pop()
    }

    /// Wake the consumer without enqueuing, e.g. to deliver a stop signal.
    pub fn wake(&self) {
        self.unparker.unpark();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{encode_message, Segment};
    use crate::core::log_level::LogLevel;
    use crate::core::pool::BufferPool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn message_segment(scratch: &BufferPool, text: &str) -> Segment {
        encode_message(scratch, "db", LogLevel::Info, text, 0)
    }

    #[test]
    fn test_read_empty_returns_none() {
        let (queue, _parker) = SegmentQueue::new();
        assert!(queue.read().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let scratch = BufferPool::default();
        let (queue, _parker) = SegmentQueue::new();

        for i in 0..10 {
            queue.write(message_segment(&scratch, &format!("msg-{i}")));
        }
        assert_eq!(queue.len(), 10);

        for i in 0..10 {
            let mut segment = queue.read().expect("segment queued");
            let mut buf = Vec::new();
            segment.render_into(&mut buf);
            let text = String::from_utf8(buf).unwrap();
            assert!(text.contains(&format!("msg-{i}")));
        }
        assert!(queue.read().is_none());
    }

    #[test]
    fn test_write_wakes_parked_consumer() {
        let scratch = BufferPool::default();
        let (queue, parker) = SegmentQueue::new();
        let queue = Arc::new(queue);

        let consumer_queue = Arc::clone(&queue);
        let consumer = thread::spawn(move || loop {
            if let Some(_segment) = consumer_queue.read() {
                return;
            }
            parker.park_timeout(Duration::from_secs(5));
        });

        thread::sleep(Duration::from_millis(50));
        queue.write(message_segment(&scratch, "wake up"));
        consumer.join().unwrap();
    }
}
