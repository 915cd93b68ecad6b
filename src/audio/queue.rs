//! Lock-free SPSC capture queue.
//!
//! Built on the `ringbuf` crate so the cpal callback can hand frames to the
//! control thread without taking a lock in the real-time path. The producer
//! half lives inside the stream callback; the consumer half is drained once
//! when the session stops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ten minutes of 16 kHz mono audio. The bound is the
/// maximum recording length; samples past it are dropped and counted.
const DEFAULT_CAPACITY: usize = 16_000 * 60 * 10;

/// Producer half — lives in the cpal audio callback.
pub struct CaptureProducer {
    inner: ringbuf::HeapProd<f32>,
    dropped: Arc<AtomicUsize>,
}

/// Consumer half — drained by the control thread on stop.
pub struct CaptureConsumer {
    inner: ringbuf::HeapCons<f32>,
    dropped: Arc<AtomicUsize>,
}

/// Create a matched producer/consumer pair backed by a bounded ring buffer.
pub fn capture_queue(capacity: Option<usize>) -> (CaptureProducer, CaptureConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let dropped = Arc::new(AtomicUsize::new(0));
    let rb = HeapRb::<f32>::new(cap);
    let (prod, cons) = rb.split();
    (
        CaptureProducer {
            inner: prod,
            dropped: Arc::clone(&dropped),
        },
        CaptureConsumer {
            inner: cons,
            dropped,
        },
    )
}

impl CaptureProducer {
    /// Append one frame of samples in delivery order.
    ///
    /// Returns the number of samples accepted; anything past the queue bound
    /// is dropped and added to the overflow counter.
    pub fn push_frame(&mut self, frame: &[f32]) -> usize {
        let written = self.inner.push_slice(frame);
        if written < frame.len() {
            self.dropped
                .fetch_add(frame.len() - written, Ordering::Relaxed);
        }
        written
    }
}

// Safety: each half is used from exactly one thread — the producer inside
// the cpal callback thread, the consumer in the control thread.
unsafe impl Send for CaptureProducer {}
unsafe impl Send for CaptureConsumer {}

impl CaptureConsumer {
    /// Number of samples currently queued.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Samples dropped so far because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain every queued sample into one contiguous buffer, in the order
    /// the frames were delivered.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_delivery_order() {
        let (mut prod, mut cons) = capture_queue(Some(16));
        prod.push_frame(&[1.0, 2.0]);
        prod.push_frame(&[3.0]);
        prod.push_frame(&[4.0, 5.0]);
        assert_eq!(cons.available(), 5);
        assert_eq!(cons.drain_all(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(cons.available(), 0);
    }

    #[test]
    fn test_empty_drain() {
        let (_prod, mut cons) = capture_queue(Some(16));
        assert!(cons.drain_all().is_empty());
        assert_eq!(cons.dropped(), 0);
    }

    #[test]
    fn test_overflow_drops_newest_and_counts() {
        let (mut prod, mut cons) = capture_queue(Some(4));
        assert_eq!(prod.push_frame(&[1.0, 2.0, 3.0]), 3);
        // Only one slot left: two samples of this frame are dropped.
        assert_eq!(prod.push_frame(&[4.0, 5.0, 6.0]), 1);
        assert_eq!(cons.dropped(), 2);
        assert_eq!(cons.drain_all(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_queue_reusable_after_drain() {
        let (mut prod, mut cons) = capture_queue(Some(4));
        prod.push_frame(&[1.0, 2.0, 3.0, 4.0]);
        cons.drain_all();
        assert_eq!(prod.push_frame(&[5.0, 6.0]), 2);
        assert_eq!(cons.drain_all(), vec![5.0, 6.0]);
    }
}
