//! Width selection for the counters that drive the swap protocol.
//!
//! The entry counter packs a 1-bit buffer tag and a ticket into one word, so
//! the queue always uses the widest atomic the target offers.
#[cfg(all(target_has_atomic = "32", not(target_has_atomic = "64")))]
use crate::loom_bindings::sync::atomic::AtomicU32;
#[cfg(target_has_atomic = "64")]
use crate::loom_bindings::sync::atomic::AtomicU64;
use crossbeam_utils::CachePadded;

#[cfg(target_has_atomic = "64")]
/// Synonym for the unsigned number with the size of the longest atomic.
pub type LongNumber = u64;
#[cfg(all(target_has_atomic = "32", not(target_has_atomic = "64")))]
/// Synonym for the unsigned number with the size of the longest atomic.
pub type LongNumber = u32;

#[cfg(target_has_atomic = "64")]
/// Synonym for the longest atomic.
pub type LongAtomic = AtomicU64;
#[cfg(all(target_has_atomic = "32", not(target_has_atomic = "64")))]
/// Synonym for the longest atomic.
pub type LongAtomic = AtomicU32;

/// Synonym for the cache padded longest atomic.
pub type CachePaddedLongAtomic = CachePadded<LongAtomic>;
