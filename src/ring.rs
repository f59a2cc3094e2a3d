//! A bounded single-producer/single-consumer ring exchange handing
//! finished [`PacketContainer`](crate::event::PacketContainer)s from
//! the producer (acquisition) thread to the consumer, without
//! blocking the producer.
//!
//! Lock-free by construction: two atomic cursors (`head`, `tail`) and
//! a fixed-size slot array. The producer only ever advances `tail`
//! after writing a slot; the consumer only ever advances `head` after
//! reading one. Neither index is ever read by the thread that doesn't
//! own it without the matching `Acquire`/`Release` pairing, so no
//! lock is needed for the class of access pattern this crate requires.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::event::PacketContainer;

struct Slot {
    container: UnsafeCell<Option<Box<PacketContainer>>>,
}

// SAFETY: a `Slot` is only ever written by the producer while it owns
// exclusive access (tail has not yet advanced past it) and only ever
// read by the consumer after it observes that advance (Acquire load of
// `tail`), and vice versa for `head`. The ring never aliases a slot
// between the two threads at the same time.
unsafe impl Sync for Slot {}

/// A bounded SPSC exchange of [`PacketContainer`]s.
pub struct Ring {
    slots: Box<[Slot]>,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl Ring {
    /// Creates a ring able to hold `capacity` containers at once.
    /// `capacity` must be nonzero; a zero capacity is coerced to one
    /// slot so the ring always has somewhere to put at least one
    /// pending container.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                container: UnsafeCell::new(None),
            });
        }
        Ring {
            slots: slots.into_boxed_slice(),
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer-only. Attempts to place `container` on the ring.
    /// Returns `false` without blocking if the ring is full.
    pub fn put(&self, container: Box<PacketContainer>) -> Result<(), Box<PacketContainer>> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) >= self.capacity {
            return Err(container);
        }

        let idx = tail % self.capacity;
        // SAFETY: this slot is not reachable by the consumer until the
        // `tail` store below, and the producer is the only writer.
        unsafe {
            *self.slots[idx].container.get() = Some(container);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer-only. Non-blocking; returns `None` if the ring is
    /// currently empty.
    pub fn get(&self) -> Option<Box<PacketContainer>> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let idx = head % self.capacity;
        // SAFETY: the `tail` Acquire load above synchronizes with the
        // producer's Release store, so the slot write is visible.
        let container = unsafe { (*self.slots[idx].container.get()).take() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        container
    }

    /// Number of containers currently queued. Racy w.r.t. concurrent
    /// `put`/`get` calls; intended for diagnostics only.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let ring = Ring::new(4);
        assert!(ring.get().is_none());
        ring.put(Box::new(PacketContainer::empty())).unwrap();
        assert_eq!(ring.len(), 1);
        assert!(ring.get().is_some());
        assert!(ring.get().is_none());
    }

    #[test]
    fn put_fails_when_full() {
        let ring = Ring::new(2);
        ring.put(Box::new(PacketContainer::empty())).unwrap();
        ring.put(Box::new(PacketContainer::empty())).unwrap();
        assert!(ring.put(Box::new(PacketContainer::empty())).is_err());
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn wraps_around_indices() {
        let ring = Ring::new(2);
        for _ in 0..10 {
            ring.put(Box::new(PacketContainer::empty())).unwrap();
            assert!(ring.get().is_some());
        }
    }

    #[test]
    fn concurrent_producer_consumer() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(Ring::new(16));
        let producer_ring = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            let mut sent = 0;
            while sent < 1000 {
                if producer_ring.put(Box::new(PacketContainer::empty())).is_ok() {
                    sent += 1;
                }
            }
        });

        let mut received = 0;
        while received < 1000 {
            if ring.get().is_some() {
                received += 1;
            }
        }
        producer.join().unwrap();
        assert_eq!(received, 1000);
    }
}
