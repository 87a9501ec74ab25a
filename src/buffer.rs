//! The fixed-capacity storage unit that the swap protocol rotates between
//! the producer-active, retired and spare roles.
use crate::backoff::Backoff;
use crate::hints::unlikely;
use crate::number_types::{CachePaddedLongAtomic, LongAtomic, LongNumber};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// A single value cell, padded so writers of neighboring tickets do not
/// share a cache line.
pub(crate) struct Slot<T> {
    value: CachePadded<UnsafeCell<T>>,
}

impl<T: Default> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: CachePadded::new(UnsafeCell::new(T::default())),
        }
    }
}

impl<T> Slot<T> {
    pub(crate) fn value_ptr(&self) -> *mut T {
        self.value.get()
    }
}

/// A slab of [`Slot`]s plus the header the swap protocol needs: the number
/// of writers that have finished with the slab since its last rotation and
/// the cell count recorded by that rotation.
///
/// The slab is allocated once, its cells stay default-initialized between
/// cycles and are overwritten in place by move-assignment.
pub(crate) struct Buffer<T> {
    exits: CachePaddedLongAtomic,
    /// Touched only by the consumer that currently holds this buffer
    /// exclusively.
    size: UnsafeCell<usize>,
    slots: Box<[Slot<T>]>,
}

unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Send> Sync for Buffer<T> {}

impl<T: Default> Buffer<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0);

        Self {
            exits: CachePadded::new(LongAtomic::new(0)),
            size: UnsafeCell::new(0),
            slots: (0..capacity).map(|_| Slot::default()).collect(),
        }
    }
}

impl<T> Buffer<T> {
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slots_ptr(&self) -> *const Slot<T> {
        self.slots.as_ptr()
    }

    /// Moves `value` into the cell claimed by `ticket`.
    ///
    /// An out-of-range ticket hands the value back. Either way the claimant
    /// checks in through `exits` exactly once; the quiescence wait in
    /// [`wait_exclusive`](Self::wait_exclusive) counts on it.
    #[inline]
    pub(crate) fn enqueue(&self, ticket: LongNumber, value: T) -> Result<(), T> {
        if unlikely(ticket >= self.slots.len() as LongNumber) {
            self.exits.fetch_add(1, Release);

            return Err(value);
        }

        // A ticket is handed to exactly one producer, so the write cannot
        // race with other writers, and the consumer does not look at the
        // cell before it observes the check-in below.
        #[allow(clippy::cast_possible_truncation, reason = "bounded by the capacity above")]
        let slot = unsafe { self.slots.get_unchecked(ticket as usize) };
        let displaced = unsafe { ptr::replace(slot.value_ptr(), value) };

        self.exits.fetch_add(1, Release);

        // Dropped only after the check-in, so a panicking drop cannot leave
        // the consumer waiting forever.
        drop(displaced);

        Ok(())
    }

    /// Busy-waits until every writer that claimed one of the `expected`
    /// tickets has checked in, then takes exclusive ownership of the
    /// contents. Returns the number of meaningful leading cells.
    ///
    /// # Safety
    ///
    /// Must be called only on a retired buffer, by the single consumer that
    /// holds the owning queue's consumer lock.
    pub(crate) unsafe fn wait_exclusive(&self, expected: LongNumber) -> usize {
        let backoff = Backoff::new();

        while self.exits.load(Acquire) < expected {
            backoff.snooze();
        }

        // Quiet now: every claimant has checked in and new producers enter
        // the opposite buffer, so only this consumer touches the header.
        self.exits.store(0, Relaxed);

        let size = usize::try_from(expected).map_or(self.slots.len(), |n| n.min(self.slots.len()));
        unsafe { *self.size.get() = size };

        size
    }

    /// The cell count recorded by the last [`wait_exclusive`](Self::wait_exclusive).
    ///
    /// # Safety
    ///
    /// Must be called only by the consumer currently holding this buffer
    /// exclusively.
    #[cfg(test)]
    pub(crate) unsafe fn size(&self) -> usize {
        unsafe { *self.size.get() }
    }
}
