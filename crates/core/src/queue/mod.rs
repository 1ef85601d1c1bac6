//! Bounded slot queue with a two-phase producer and consumer protocol.
//!
//! The producer reserves a slot, writes into it and commits it. The consumer
//! reserves a committed slot, reads it and releases it. Several reservations
//! may be outstanding on either side at once; they must be handed back in the
//! order they were taken. Slots are addressed through opaque [`SlotHandle`]s.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::{OverlapError, Result};

/// Opaque reference to one reserved slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle {
    seq: usize,
}

impl SlotHandle {
    /// Monotonic sequence number of the slot within the queue's lifetime.
    pub fn sequence(&self) -> usize {
        self.seq
    }
}

/// Queue primitive consumed by the accumulator and the overlap engine.
///
/// Implementations must be safe for one producer and one consumer running on
/// different threads without external locking.
pub trait SlotQueue<T>: Send + Sync {
    /// Number of slots.
    fn capacity(&self) -> usize;

    /// Number of elements in every slot.
    fn slot_len(&self) -> usize;

    /// Reserves the next free slot for writing, if any.
    fn reserve_write(&self) -> Option<SlotHandle>;

    /// Publishes a written slot to the consumer.
    fn commit_write(&self, handle: SlotHandle) -> Result<()>;

    /// Reserves the oldest committed slot for reading, if any.
    fn reserve_read(&self) -> Option<SlotHandle>;

    /// Returns a consumed slot to the producer.
    fn release_read(&self, handle: SlotHandle) -> Result<()>;

    /// Runs `f` with exclusive access to the slot's storage.
    fn with_slot<R>(&self, handle: &SlotHandle, f: impl FnOnce(&mut [T]) -> R) -> R;

    /// Committed slots that have not been reserved for reading yet.
    fn filled(&self) -> usize;
}

/// Fixed-capacity ring of fixed-size slots.
///
/// Cursor layout (all monotonically increasing, compared with wrapping
/// arithmetic): `released <= read_reserved <= committed <= write_reserved`
/// and `write_reserved - released <= capacity`.
pub struct SlotRing<T> {
    slots: Box<[Mutex<Box<[T]>>]>,
    slot_len: usize,
    write_reserved: AtomicUsize,
    committed: AtomicUsize,
    read_reserved: AtomicUsize,
    released: AtomicUsize,
}

impl<T: Copy + Default + Send> SlotRing<T> {
    pub fn new(capacity: usize, slot_len: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OverlapError::config("slot queue needs at least one slot"));
        }
        if slot_len == 0 {
            return Err(OverlapError::config("slot length must be non-zero"));
        }

        let slots = (0..capacity)
            .map(|_| Mutex::new(vec![T::default(); slot_len].into_boxed_slice()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots,
            slot_len,
            write_reserved: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
            read_reserved: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        })
    }

    fn index(&self, handle: &SlotHandle) -> usize {
        handle.seq % self.slots.len()
    }
}

impl<T: Copy + Default + Send> SlotQueue<T> for SlotRing<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_len(&self) -> usize {
        self.slot_len
    }

    fn reserve_write(&self) -> Option<SlotHandle> {
        let seq = self.write_reserved.load(Ordering::Relaxed);
        let released = self.released.load(Ordering::Acquire);
        if seq.wrapping_sub(released) >= self.slots.len() {
            return None;
        }
        self.write_reserved
            .store(seq.wrapping_add(1), Ordering::Relaxed);
        Some(SlotHandle { seq })
    }

    fn commit_write(&self, handle: SlotHandle) -> Result<()> {
        let expected = self.committed.load(Ordering::Relaxed);
        if handle.seq != expected {
            return Err(OverlapError::OutOfOrder {
                expected,
                got: handle.seq,
            });
        }
        self.committed
            .store(expected.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    fn reserve_read(&self) -> Option<SlotHandle> {
        let seq = self.read_reserved.load(Ordering::Relaxed);
        let committed = self.committed.load(Ordering::Acquire);
        if seq == committed {
            return None;
        }
        self.read_reserved
            .store(seq.wrapping_add(1), Ordering::Relaxed);
        Some(SlotHandle { seq })
    }

    fn release_read(&self, handle: SlotHandle) -> Result<()> {
        let expected = self.released.load(Ordering::Relaxed);
        if handle.seq != expected {
            return Err(OverlapError::OutOfOrder {
                expected,
                got: handle.seq,
            });
        }
        self.released
            .store(expected.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    fn with_slot<R>(&self, handle: &SlotHandle, f: impl FnOnce(&mut [T]) -> R) -> R {
        // Reservation already grants exclusive ownership; the lock only
        // publishes the slot contents across threads and is never contended.
        let mut slot = self.slots[self.index(handle)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    fn filled(&self) -> usize {
        let committed = self.committed.load(Ordering::Acquire);
        let read = self.read_reserved.load(Ordering::Relaxed);
        committed.wrapping_sub(read)
    }
}

impl<T> std::fmt::Debug for SlotRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRing")
            .field("capacity", &self.slots.len())
            .field("slot_len", &self.slot_len)
            .field("write_reserved", &self.write_reserved.load(Ordering::Relaxed))
            .field("committed", &self.committed.load(Ordering::Relaxed))
            .field("read_reserved", &self.read_reserved.load(Ordering::Relaxed))
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}
