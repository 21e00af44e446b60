//! Bounded MPSC ring queue used on every edge of the pipeline.
//!
//! Many producers may push concurrently; exactly one consumer pops.
//! The queue never grows and never blocks: `push` fails immediately
//! once the ring is at capacity, and `pop` fails immediately once it
//! is empty. Producers share a short spinlock critical section; the
//! consumer's fast path is the same lock, kept deliberately simple
//! since this queue sits on a 1ms-or-readiness-bounded polling loop,
//! not a latency-critical scheduler hot path.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::spinlock::SpinLock;

/// Sending half. Cheap to clone; every clone shares the same ring.
pub struct RingSender<T> {
    inner: Arc<RingInner<T>>,
}

/// Receiving half. Not `Clone` — the ring has exactly one consumer.
pub struct RingReceiver<T> {
    inner: Arc<RingInner<T>>,
}

struct RingInner<T> {
    buffer: SpinLock<VecDeque<T>>,
    capacity: usize,
}

/// Create a new bounded ring with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn ring<T>(capacity: usize) -> (RingSender<T>, RingReceiver<T>) {
    assert!(capacity > 0, "ring capacity must be >= 1");
    let inner = Arc::new(RingInner {
        buffer: SpinLock::new(VecDeque::with_capacity(capacity)),
        capacity,
    });
    (
        RingSender { inner: Arc::clone(&inner) },
        RingReceiver { inner },
    )
}

impl<T> RingSender<T> {
    /// Push a value. Returns `Err(value)` if the ring is full; the
    /// caller decides whether to drop it or retry.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut buf = self.inner.buffer.lock();
        if buf.len() >= self.inner.capacity {
            return Err(value);
        }
        buf.push_back(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl<T> Clone for RingSender<T> {
    fn clone(&self) -> Self {
        RingSender { inner: Arc::clone(&self.inner) }
    }
}

impl<T> RingReceiver<T> {
    /// Pop the oldest value, if any. Never blocks.
    pub fn pop(&self) -> Option<T> {
        self.inner.buffer.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

// Safety: access to the inner buffer is always through the spinlock.
unsafe impl<T: Send> Send for RingSender<T> {}
unsafe impl<T: Send> Sync for RingSender<T> {}
unsafe impl<T: Send> Send for RingReceiver<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn push_pop_preserves_order() {
        let (tx, rx) = ring(4);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn push_rejects_when_full() {
        let (tx, rx) = ring(2);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        assert_eq!(tx.push(3), Err(3));
        assert_eq!(rx.pop(), Some(1));
        tx.push(3).unwrap();
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
    }

    #[test]
    fn never_exceeds_capacity_under_concurrent_producers() {
        let (tx, rx) = ring::<u32>(16);
        let mut handles = vec![];
        for _ in 0..8 {
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000u32 {
                    let _ = tx.push(i);
                    assert!(tx.len() <= 16);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut drained = 0;
        while rx.pop().is_some() {
            drained += 1;
        }
        assert!(drained <= 16);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = ring::<u8>(0);
    }
}
