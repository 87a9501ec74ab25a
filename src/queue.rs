//! The queue shell: the tagged entry counter, the buffer rotation, and the
//! [`Producer`], [`Consumer`] and [`Stealer`] handles.
use crate::backoff::Backoff;
use crate::buffer::{Buffer, Slot};
use crate::drained::Drained;
use crate::hints::unlikely;
use crate::loom_bindings::sync::atomic::{AtomicBool, AtomicPtr};
use crate::loom_bindings::sync::Arc;
use crate::number_types::{CachePaddedLongAtomic, LongAtomic, LongNumber};
use crossbeam_utils::CachePadded;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// The most-significant bit of the entry counter selects the buffer
/// producers write into; the remaining bits are the per-cycle ticket.
const TAG_MASK: LongNumber = !(LongNumber::MAX >> 1);

/// Index of the spare buffer handle, never selected by the tag.
const SPARE: usize = 2;

#[inline]
fn tag_index(token: LongNumber) -> usize {
    usize::from(token & TAG_MASK != 0)
}

/// Shared state behind the handles.
///
/// `buffers[0]` and `buffers[1]` are swapped only under `consumer_lock`;
/// `buffers[SPARE]` is touched only through the queue's unique [`Consumer`].
struct SwapQueue<T> {
    entries: CachePaddedLongAtomic,
    /// Set when a producer ran out of tickets; best-effort hint cleared by
    /// the next rotation.
    is_full: AtomicBool,
    /// Serializes consumer-side operations (local drains and remote steals)
    /// on this queue.
    consumer_lock: AtomicBool,
    buffers: [AtomicPtr<Buffer<T>>; 3],
    marker: PhantomData<*mut T>,
}

unsafe impl<T: Send> Send for SwapQueue<T> {}
unsafe impl<T: Send> Sync for SwapQueue<T> {}

/// Releases the consumer lock on every exit path.
struct ConsumerLockGuard<'a> {
    lock: &'a AtomicBool,
}

impl Drop for ConsumerLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(false, Release);
    }
}

impl<T: Default> SwapQueue<T> {
    fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");

        let buffer = || Box::into_raw(Box::new(Buffer::with_capacity(capacity)));

        Self {
            entries: CachePadded::new(LongAtomic::new(0)),
            is_full: AtomicBool::new(false),
            consumer_lock: AtomicBool::new(false),
            buffers: [
                AtomicPtr::new(buffer()),
                AtomicPtr::new(buffer()),
                AtomicPtr::new(buffer()),
            ],
            marker: PhantomData,
        }
    }
}

impl<T> SwapQueue<T> {
    fn capacity(&self) -> usize {
        // All three buffers share one capacity, so any handle will do, and
        // the pointee's header is immutable after construction.
        unsafe { (*self.buffers[0].load(Relaxed)).capacity() }
    }

    #[inline]
    fn push(&self, value: T) -> Result<(), T> {
        if unlikely(self.is_full.load(Relaxed)) {
            return Err(value);
        }

        let token = self.entries.fetch_add(1, Relaxed);
        // The buffer under this tag cannot be swapped out before every
        // claimant of its tickets, this producer included, has checked in.
        let buffer = unsafe { &*self.buffers[tag_index(token)].load(Acquire) };

        match buffer.enqueue(token & !TAG_MASK, value) {
            Ok(()) => Ok(()),
            Err(value) => {
                self.is_full.store(true, Relaxed);

                Err(value)
            }
        }
    }

    /// Acquired on entry, released exactly once on exit through the guard.
    fn lock_consumer(&self) -> ConsumerLockGuard<'_> {
        let backoff = Backoff::new();

        while self.consumer_lock.swap(true, Acquire) {
            backoff.snooze();
        }

        ConsumerLockGuard {
            lock: &self.consumer_lock,
        }
    }

    /// A single try, no retry: stealing backs off to the caller on contention.
    fn try_lock_consumer(&self) -> Option<ConsumerLockGuard<'_>> {
        if self.consumer_lock.swap(true, Acquire) {
            return None;
        }

        Some(ConsumerLockGuard {
            lock: &self.consumer_lock,
        })
    }

    /// Flips the tag, zeroing the ticket field, so that new producers enter
    /// the opposite buffer. Returns the retired tag and how many producers
    /// entered it since the previous flip.
    fn flip(&self) -> (usize, LongNumber) {
        let current = self.entries.load(Relaxed) & TAG_MASK;
        let retired = self.entries.swap(current ^ TAG_MASK, Relaxed);

        // Best-effort: a straggler that overflowed the retired buffer may
        // set the flag again before its check-in; the next flip clears it.
        self.is_full.store(false, Relaxed);

        (tag_index(retired), retired & !TAG_MASK)
    }

    /// Retires the producer-active buffer, waits until its writers are
    /// quiet, and parks it in `thief`'s spare slot, installing the previous
    /// spare in its place. Returns the retired cells.
    ///
    /// # Safety
    ///
    /// The caller must hold this queue's consumer lock and have exclusive
    /// access to `thief`'s spare slot.
    unsafe fn retire_active_into(&self, thief: &Self) -> (NonNull<Slot<T>>, usize) {
        let (retired_tag, tickets) = self.flip();

        let retired = self.buffers[retired_tag].load(Relaxed);
        let size = unsafe { (*retired).wait_exclusive(tickets) };

        let spare = thief.buffers[SPARE].load(Relaxed);
        thief.buffers[SPARE].store(retired, Relaxed);
        // Publishes the swap, and the leftover cells the next cycle will
        // displace, to producers that pick the retired tag back up.
        self.buffers[retired_tag].store(spare, Release);

        let cells = unsafe { NonNull::new_unchecked((*retired).slots_ptr().cast_mut()) };

        (cells, size)
    }
}

impl<T> Drop for SwapQueue<T> {
    fn drop(&mut self) {
        for handle in &self.buffers {
            drop(unsafe { Box::from_raw(handle.load(Relaxed)) });
        }
    }
}

/// A producing handle. Clones feed the same queue from any thread.
pub struct Producer<T> {
    inner: Arc<SwapQueue<T>>,
}

impl<T> Producer<T> {
    /// Returns the maximum number of values one drain cycle can hold.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns whether a producer ran out of tickets since the last drain.
    ///
    /// A best-effort hint: the flag trails the actual state on both edges.
    pub fn is_full(&self) -> bool {
        self.inner.is_full.load(Relaxed)
    }

    /// Moves `value` into the queue.
    ///
    /// Fails when the current cycle is out of tickets and hands the value
    /// back; the caller may drop it, retry after the consumer's next drain,
    /// or back off.
    #[inline]
    pub fn push(&self, value: T) -> Result<(), T> {
        self.inner.push(value)
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("is_full", &self.is_full())
            .finish_non_exhaustive()
    }
}

/// The single consuming handle of a queue.
///
/// Deliberately not `Clone`: a queue has one consumer. Cross-queue
/// consumption goes through [`steal`](Self::steal) with a [`Stealer`] token
/// instead.
pub struct Consumer<T> {
    inner: Arc<SwapQueue<T>>,
}

impl<T> Consumer<T> {
    /// Returns the maximum number of values one drain cycle can hold.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns a token other queues' consumers can use to steal this
    /// queue's drain.
    pub fn stealer(&self) -> Stealer<T> {
        Stealer {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default> Consumer<T> {
    /// Retires the buffer producers were writing into and returns an
    /// exclusive view of everything enqueued since the previous drain.
    ///
    /// Busy-waits (yielding) until in-flight producers finish, then reuses
    /// the spare buffer for the next cycle. The view borrows this consumer,
    /// so it must be dropped before the next `drain` or `steal`.
    pub fn drain(&mut self) -> Drained<'_, T> {
        let _guard = self.inner.lock_consumer();

        // SAFETY: the lock is held, and the retired buffer lands in our own
        // spare slot, which only this consumer can reach.
        let (cells, len) = unsafe { self.inner.retire_active_into(&self.inner) };

        unsafe { Drained::new(cells, len) }
    }

    /// Performs `victim`'s drain, parking the retired buffer in this queue's
    /// spare slot so the two queues never contend for storage.
    ///
    /// Returns an empty view without blocking when the victim is already
    /// being drained or stolen from.
    pub fn steal<'a>(&'a mut self, victim: &Stealer<T>) -> Drained<'a, T> {
        let Some(_guard) = victim.inner.try_lock_consumer() else {
            return Drained::empty();
        };

        // SAFETY: the victim's lock is held, and the retired buffer lands in
        // our own spare slot, which only this consumer can reach.
        let (cells, len) = unsafe { victim.inner.retire_active_into(&self.inner) };

        unsafe { Drained::new(cells, len) }
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

/// A cloneable token granting other queues' consumers the right to steal
/// this queue's drain.
pub struct Stealer<T> {
    inner: Arc<SwapQueue<T>>,
}

impl<T> Clone for Stealer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Stealer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stealer").finish_non_exhaustive()
    }
}

/// Creates a bounded queue holding at most `capacity` values per drain
/// cycle.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn new<T: Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let queue = Arc::new(SwapQueue::with_capacity(capacity));

    (
        Producer {
            inner: queue.clone(),
        },
        Consumer { inner: queue },
    )
}

#[cfg(all(test, not(swapq_loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_drain_returns_batch() {
        let (producer, mut consumer) = new::<usize>(4);

        producer.push(10).unwrap();
        producer.push(20).unwrap();
        producer.push(30).unwrap();

        let mut values: Vec<_> = consumer.drain().collect();
        values.sort_unstable();

        assert_eq!(values, [10, 20, 30]);
        assert_eq!(consumer.drain().count(), 0);
    }

    #[test]
    fn test_overflow_rejects_and_recovers() {
        let (producer, mut consumer) = new::<usize>(2);

        assert_eq!(producer.push(1), Ok(()));
        assert_eq!(producer.push(2), Ok(()));
        assert_eq!(producer.push(3), Err(3));
        assert!(producer.is_full());
        assert_eq!(producer.push(4), Err(4));

        let mut drained: Vec<_> = consumer.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained, [1, 2]);

        assert!(!producer.is_full());
        assert_eq!(producer.push(5), Ok(()));
        assert_eq!(consumer.drain().collect::<Vec<_>>(), [5]);
    }

    #[test]
    fn test_capacity_boundary() {
        const CAPACITY: usize = 16;

        let (producer, mut consumer) = new::<usize>(CAPACITY);

        for round in 0..3 {
            for i in 0..CAPACITY {
                assert_eq!(producer.push(round * CAPACITY + i), Ok(()));
            }

            assert_eq!(producer.push(usize::MAX), Err(usize::MAX));
            assert!(producer.is_full());

            let drained = consumer.drain();
            assert_eq!(drained.len(), CAPACITY);
            assert_eq!(drained.count(), CAPACITY);
        }
    }

    #[test]
    fn test_empty_drain_is_idempotent() {
        let (_producer, mut consumer) = new::<usize>(8);

        for _ in 0..10 {
            assert!(consumer.drain().is_empty());
        }
    }

    #[test]
    fn test_view_random_access() {
        let (producer, mut consumer) = new::<usize>(4);

        producer.push(1).unwrap();
        producer.push(2).unwrap();

        let mut view = consumer.drain();

        view[0] += 10;
        *view.get_mut(1).unwrap() += 20;
        assert!(view.get_mut(2).is_none());

        let mut values: Vec<_> = view.collect();
        values.sort_unstable();
        assert_eq!(values, [11, 22]);
    }

    #[test]
    fn test_steal_idle_queue() {
        let (producer_b, mut consumer_b) = new::<usize>(16);
        let (_producer_a, mut consumer_a) = new::<usize>(16);
        let stealer_b = consumer_b.stealer();

        for i in 1..=10 {
            producer_b.push(i).unwrap();
        }

        let mut stolen: Vec<_> = consumer_a.steal(&stealer_b).collect();
        stolen.sort_unstable();
        assert_eq!(stolen, (1..=10).collect::<Vec<_>>());

        assert!(consumer_b.drain().is_empty());

        // The victim got a usable buffer back: a full cycle works after the
        // steal, and so does stealing again.
        for i in 11..=13 {
            producer_b.push(i).unwrap();
        }

        let mut again: Vec<_> = consumer_a.steal(&stealer_b).collect();
        again.sort_unstable();
        assert_eq!(again, [11, 12, 13]);
    }

    #[test]
    fn test_steal_contention_returns_empty() {
        let (producer_b, consumer_b) = new::<usize>(4);
        let (_producer_a, mut consumer_a) = new::<usize>(4);
        let stealer_b = consumer_b.stealer();

        producer_b.push(7).unwrap();

        let guard = consumer_b.inner.lock_consumer();
        assert!(consumer_a.steal(&stealer_b).is_empty());
        drop(guard);

        // The failed attempt changed nothing: the value is still there.
        assert_eq!(consumer_a.steal(&stealer_b).collect::<Vec<_>>(), [7]);
    }

    #[test]
    fn test_steal_own_queue_degenerates_to_drain() {
        let (producer, mut consumer) = new::<usize>(4);
        let stealer = consumer.stealer();

        producer.push(1).unwrap();

        assert_eq!(consumer.steal(&stealer).collect::<Vec<_>>(), [1]);
        assert!(consumer.drain().is_empty());
    }

    #[test]
    fn test_spare_records_last_drain_size() {
        let (producer, mut consumer) = new::<usize>(8);

        for i in 0..3 {
            producer.push(i).unwrap();
        }

        assert_eq!(consumer.drain().count(), 3);

        let spare = consumer.inner.buffers[SPARE].load(Relaxed);
        assert_eq!(unsafe { (*spare).size() }, 3);
    }

    #[test]
    fn test_boxed_values_roundtrip() {
        let (producer, mut consumer) = new::<Option<Box<usize>>>(8);

        for round in 0..4 {
            for i in 0..8 {
                producer.push(Some(Box::new(round * 8 + i))).unwrap();
            }

            let mut seen: Vec<usize> = consumer.drain().map(|v| *v.unwrap()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (round * 8..round * 8 + 8).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_values_dropped_exactly_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Debug, Default)]
        struct Counted(bool);

        impl Drop for Counted {
            fn drop(&mut self) {
                if self.0 {
                    DROPS.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        {
            let (producer, mut consumer) = new::<Counted>(4);

            producer.push(Counted(true)).unwrap();
            producer.push(Counted(true)).unwrap();

            // Looked at but not moved out: the payloads stay in the cells.
            let drained = consumer.drain();
            assert_eq!(drained.len(), 2);
            drop(drained);

            producer.push(Counted(true)).unwrap();
        }

        // Two left in the spare buffer, one in the active buffer, all freed
        // exactly once on queue teardown.
        assert_eq!(DROPS.load(Ordering::Relaxed), 3);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_is_rejected() {
        let _ = new::<usize>(0);
    }
}
