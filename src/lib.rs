//! A bounded multi-producer, single-consumer queue built for batched
//! consumption and cross-queue work stealing.
//!
//! Producers [`push`](Producer::push) values concurrently through a single
//! `fetch_add` on a tagged counter. The consumer periodically
//! [`drain`](Consumer::drain)s everything enqueued since the previous drain
//! as one exclusive batch, and an idle consumer may [`steal`](Consumer::steal)
//! the drain of a sibling queue through its [`Stealer`].
//!
//! ```
//! let (producer, mut consumer) = swapq::new::<usize>(128);
//!
//! producer.push(1).unwrap();
//! producer.push(2).unwrap();
//!
//! let sum: usize = consumer.drain().sum();
//! assert_eq!(sum, 3);
//! ```
#![deny(clippy::all)]
#![deny(clippy::assertions_on_result_states)]
#![deny(clippy::match_wild_err_arm)]
#![deny(clippy::allow_attributes_without_reason)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always, reason = "We write highly optimized code.")]
#![allow(
    clippy::must_use_candidate,
    reason = "It is better to developer think about it."
)]
#![allow(
    clippy::missing_const_for_fn,
    reason = "Since we cannot make a constant function non-constant after its release,
    we need to look for a reason to make it constant, and not vice versa."
)]
#![allow(
    clippy::missing_errors_doc,
    reason = "Unless the error is something special,
    the developer should document it."
)]
#![allow(clippy::redundant_pub_crate, reason = "It improves readability.")]
#![allow(clippy::if_not_else, reason = "It improves readability.")]
pub mod backoff;
mod buffer;
mod drained;
pub mod hints;
pub(crate) mod loom_bindings;
pub mod number_types;
mod queue;
#[cfg(all(test, not(swapq_loom)))]
mod test_lock;

pub use backoff::Backoff;
pub use drained::Drained;
pub use queue::{new, Consumer, Producer, Stealer};
