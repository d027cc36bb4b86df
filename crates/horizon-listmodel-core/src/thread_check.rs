//! Thread affinity tracking.
//!
//! A list model is owned by the thread that created it; a worker-side copy is
//! owned by its worker. [`ThreadAffinity`] records the creating thread so that
//! operations restricted to the owner (such as switching the storage
//! strategy) can be checked at runtime.
//!
//! ```
//! use horizon_listmodel_core::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//!
//! let other = std::thread::spawn(move || affinity.is_same_thread())
//!     .join()
//!     .unwrap();
//! assert!(!other);
//! ```

use std::thread::ThreadId;

/// The thread that owns a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Records the calling thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// The thread this affinity was recorded on.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns `true` if the calling thread is the recorded thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Panics when called off the owner thread.
    #[track_caller]
    pub fn assert_same_thread(&self) {
        let current = std::thread::current();
        assert!(
            current.id() == self.thread_id,
            "owned by thread {:?}, used from {:?} ({})",
            self.thread_id,
            current.id(),
            current.name().unwrap_or("<unnamed>"),
        );
    }

    /// [`assert_same_thread`](Self::assert_same_thread) in debug builds only.
    #[inline]
    #[track_caller]
    pub fn debug_assert_same_thread(&self) {
        #[cfg(debug_assertions)]
        self.assert_same_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        affinity.assert_same_thread();
    }

    #[test]
    fn test_other_thread() {
        let affinity = ThreadAffinity::current();
        let same = std::thread::spawn(move || affinity.is_same_thread())
            .join()
            .unwrap();
        assert!(!same);
    }

    #[test]
    fn test_assert_panics_on_other_thread() {
        let affinity = ThreadAffinity::current();
        let result = std::thread::spawn(move || affinity.assert_same_thread()).join();
        assert!(result.is_err());
    }
}
