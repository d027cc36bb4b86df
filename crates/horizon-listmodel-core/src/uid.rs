//! Identity generation for tables and rows.
//!
//! Every table and every row carries a uid that survives structural changes
//! and cross-thread merges. A [`UidGenerator`] hands out strictly increasing
//! uids; clones share the same counter, so a worker-side copy of a table draws
//! from the same sequence as its owner and the two never collide.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// A table or row identity.
pub type Uid = u64;

/// First uid handed out by a fresh generator.
pub const MIN_UID: Uid = 1024;

/// Process-wide generator used when no generator is injected.
static GLOBAL: OnceLock<UidGenerator> = OnceLock::new();

/// Thread-safe, shareable uid allocator.
#[derive(Clone, Debug)]
pub struct UidGenerator {
    next: Arc<AtomicU64>,
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UidGenerator {
    /// Create an independent generator starting at [`MIN_UID`].
    pub fn new() -> Self {
        Self::starting_at(MIN_UID)
    }

    /// Create an independent generator starting at `first`.
    pub fn starting_at(first: Uid) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    /// The process-wide generator.
    pub fn global() -> Self {
        GLOBAL.get_or_init(UidGenerator::new).clone()
    }

    /// Allocate the next uid.
    #[inline]
    pub fn next_uid(&self) -> Uid {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns `true` if both generators share one counter.
    pub fn shares_counter_with(&self, other: &UidGenerator) -> bool {
        Arc::ptr_eq(&self.next, &other.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let uids = UidGenerator::new();
        let a = uids.next_uid();
        let b = uids.next_uid();
        assert_eq!(a, MIN_UID);
        assert!(b > a);
    }

    #[test]
    fn test_clones_share_counter() {
        let uids = UidGenerator::new();
        let other = uids.clone();
        assert!(uids.shares_counter_with(&other));
        let a = uids.next_uid();
        let b = other.next_uid();
        assert_eq!(b, a + 1);
        assert!(!uids.shares_counter_with(&UidGenerator::new()));
    }

    #[test]
    fn test_unique_across_threads() {
        let uids = UidGenerator::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let uids = uids.clone();
                std::thread::spawn(move || (0..100).map(|_| uids.next_uid()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Uid> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
