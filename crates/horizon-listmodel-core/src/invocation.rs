//! Deferred invocations for cross-thread delivery.
//!
//! A [`QueuedInvocation`] is a closure bound for the thread that owns a model.
//! It travels through that thread's [`EventLoop`](crate::EventLoop) and runs
//! when the loop gets to it.
//!
//! A sender that must wait attaches a [`CompletionHandle`] and parks on the
//! matching [`CompletionWaiter`]. The waiter reports an [`Outcome`]: the
//! closure either ran, or its invocation was dropped unexecuted (for example
//! because the owner loop exited with it still queued).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// How a blocking invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The closure ran to completion.
    Ran,
    /// The invocation was dropped without running.
    Discarded,
}

/// A boxed closure waiting to run on its owner thread.
pub struct QueuedInvocation {
    invoke: Box<dyn FnOnce() + Send>,
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    /// Wraps `invoke` with nobody waiting on it.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Wraps `invoke` and releases `completion` once it has run.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Runs the closure on the calling thread.
    pub fn execute(self) {
        let Self { invoke, completion } = self;
        invoke();
        if let Some(completion) = completion {
            completion.finish(Outcome::Ran);
        }
    }
}

/// Sender side of a completion pair.
///
/// Dropping it unfinished reports [`Outcome::Discarded`].
pub struct CompletionHandle {
    state: Option<Arc<CompletionState>>,
}

impl CompletionHandle {
    fn finish(mut self, outcome: Outcome) {
        if let Some(state) = self.state.take() {
            state.settle(outcome);
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.settle(Outcome::Discarded);
        }
    }
}

/// Receiver side of a completion pair.
pub struct CompletionWaiter {
    state: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Blocks until the invocation ran or was discarded.
    ///
    /// Calling this on the thread that should run the invocation deadlocks.
    pub fn wait(self) -> Outcome {
        let mut outcome = self.state.outcome.lock();
        loop {
            if let Some(outcome) = *outcome {
                return outcome;
            }
            self.state.settled.wait(&mut outcome);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(self, timeout: Duration) -> Option<Outcome> {
        let mut outcome = self.state.outcome.lock();
        if outcome.is_none() {
            self.state.settled.wait_for(&mut outcome, timeout);
        }
        *outcome
    }
}

struct CompletionState {
    outcome: Mutex<Option<Outcome>>,
    settled: Condvar,
}

impl CompletionState {
    fn settle(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.settled.notify_all();
    }
}

/// Creates a linked handle and waiter.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        outcome: Mutex::new(None),
        settled: Condvar::new(),
    });
    (
        CompletionHandle {
            state: Some(state.clone()),
        },
        CompletionWaiter { state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_execute_runs_closure_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        QueuedInvocation::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .execute();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waiter_sees_ran_from_other_thread() {
        let (handle, waiter) = completion_pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let invocation = QueuedInvocation::with_completion(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
            handle,
        );

        let thread = std::thread::spawn(move || invocation.execute());
        assert_eq!(waiter.wait(), Outcome::Ran);
        thread.join().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_invocation_reports_discarded() {
        let (handle, waiter) = completion_pair();
        drop(QueuedInvocation::with_completion(|| {}, handle));
        assert_eq!(waiter.wait_timeout(Duration::from_millis(10)), Some(Outcome::Discarded));
    }

    #[test]
    fn test_wait_timeout_while_pending() {
        let (_handle, waiter) = completion_pair();
        assert_eq!(waiter.wait_timeout(Duration::from_millis(10)), None);
    }
}
