//! Shared infrastructure: concurrent collections and filesystem helpers.

pub mod fs;
pub mod synchronization;

pub use synchronization::{ConcurrentMap, DedupGuard, Locker};
