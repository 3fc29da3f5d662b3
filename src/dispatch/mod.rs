//! The two dispatch strategies feeding the executor.
//!
//! Both may run at once against the same store. Neither relies on the other
//! for correctness: a task is claimed only through the store's
//! compare-and-set, so whichever pathway wins executes it and the other
//! observes a skip.

pub mod consumer;
pub mod poller;

pub use consumer::{Consumer, Disposition};
pub use poller::Poller;
