//! Per-thread event loop for deferred and cross-thread invocations.
//!
//! An [`EventLoop`] is created on the thread that owns some state (for list
//! models, the thread that owns the primary model). Other threads obtain an
//! [`EventLoopHandle`] and post closures to it; the closures run on the owner
//! thread when it calls [`EventLoop::process_events`] or [`EventLoop::exec`].
//!
//! Creating a loop registers it for the current thread, which is how queued
//! signal connections find the loop of the thread that connected them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;

use crate::error::{CoreError, Result};
use crate::event::LoopEvent;
use crate::invocation::QueuedInvocation;
use crate::logging::targets;
use crate::thread_check::ThreadAffinity;

/// Registry of the event loop running on each thread.
static LOOP_REGISTRY: OnceLock<Mutex<HashMap<ThreadId, EventLoopHandle>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<ThreadId, EventLoopHandle>> {
    LOOP_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the handle of the event loop registered for `thread`, if any.
pub fn handle_for_thread(thread: ThreadId) -> Option<EventLoopHandle> {
    registry().lock().get(&thread).cloned()
}

/// Returns the handle of the event loop registered for the calling thread.
pub fn current() -> Option<EventLoopHandle> {
    handle_for_thread(std::thread::current().id())
}

/// A queue of events processed on the thread that created it.
///
/// `EventLoop` is deliberately not `Clone`: exactly one owner drains it. Use
/// [`handle`](Self::handle) to post to it from anywhere.
pub struct EventLoop {
    sender: Sender<LoopEvent>,
    receiver: Receiver<LoopEvent>,
    affinity: ThreadAffinity,
    quit_requested: Arc<AtomicBool>,
}

/// A cloneable, thread-safe handle for posting events to an [`EventLoop`].
#[derive(Clone)]
pub struct EventLoopHandle {
    sender: Sender<LoopEvent>,
    thread: ThreadId,
    quit_requested: Arc<AtomicBool>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create an event loop owned by the current thread.
    ///
    /// If the thread already had a loop registered, the new one replaces it
    /// for queued signal delivery.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let event_loop = Self {
            sender,
            receiver,
            affinity: ThreadAffinity::current(),
            quit_requested: Arc::new(AtomicBool::new(false)),
        };
        registry()
            .lock()
            .insert(event_loop.affinity.thread_id(), event_loop.handle());
        tracing::debug!(target: targets::EVENT_LOOP, thread = ?event_loop.affinity.thread_id(), "event loop created");
        event_loop
    }

    /// Get a handle for posting events to this loop.
    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            sender: self.sender.clone(),
            thread: self.affinity.thread_id(),
            quit_requested: self.quit_requested.clone(),
        }
    }

    /// The thread this loop belongs to.
    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// Number of events waiting to be processed.
    pub fn pending_events(&self) -> usize {
        self.receiver.len()
    }

    /// Process every event currently queued without blocking.
    ///
    /// Returns the number of invocations executed.
    pub fn process_events(&self) -> usize {
        self.affinity.debug_assert_same_thread();
        let mut executed = 0;
        while let Ok(event) = self.receiver.try_recv() {
            if self.dispatch(event) {
                executed += 1;
            }
        }
        executed
    }

    /// Run the loop until [`EventLoopHandle::quit`] is called.
    #[tracing::instrument(skip_all, target = "horizon_listmodel_core::event_loop", level = "debug")]
    pub fn exec(&self) {
        self.affinity.debug_assert_same_thread();
        self.quit_requested.store(false, Ordering::SeqCst);
        while !self.quit_requested.load(Ordering::SeqCst) {
            match self.receiver.recv() {
                Ok(event) => {
                    self.dispatch(event);
                }
                Err(_) => break,
            }
        }
        tracing::debug!(target: targets::EVENT_LOOP, "event loop exited");
    }

    /// Run the loop until `done` returns `true` or `timeout` elapses.
    ///
    /// `done` is checked after every processed event. Returns `true` if the
    /// predicate was satisfied.
    pub fn exec_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        self.affinity.debug_assert_same_thread();
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(event) => {
                    self.dispatch(event);
                }
                Err(RecvTimeoutError::Timeout) => return done(),
                Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }

    /// Handle one event; returns `true` if it was an invocation.
    fn dispatch(&self, event: LoopEvent) -> bool {
        tracing::trace!(target: targets::EVENT_LOOP, kind = event.kind(), "dispatching event");
        match event {
            LoopEvent::Invoke(invocation) => {
                invocation.execute();
                true
            }
            LoopEvent::Quit => {
                self.quit_requested.store(true, Ordering::SeqCst);
                false
            }
            LoopEvent::WakeUp => false,
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let mut loops = registry().lock();
        if loops
            .get(&self.affinity.thread_id())
            .is_some_and(|h| h.sender.same_channel(&self.sender))
        {
            loops.remove(&self.affinity.thread_id());
        }
        drop(loops);

        // Discard anything still queued so blocked senders are released.
        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            tracing::debug!(target: targets::EVENT_LOOP, discarded, "event loop dropped with pending events");
        }
    }
}

impl EventLoopHandle {
    /// The thread that processes events posted through this handle.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Returns `true` if called on the loop's own thread.
    pub fn is_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread
    }

    /// Post a closure to run on the loop's thread.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_invocation(QueuedInvocation::new(f))
    }

    /// Post a prepared invocation to run on the loop's thread.
    pub fn post_invocation(&self, invocation: QueuedInvocation) -> Result<()> {
        self.send(LoopEvent::Invoke(invocation))
    }

    /// Wake the loop without queuing work.
    pub fn wake_up(&self) -> Result<()> {
        self.send(LoopEvent::WakeUp)
    }

    /// Ask the loop to return from [`EventLoop::exec`].
    pub fn quit(&self) {
        tracing::debug!(target: targets::EVENT_LOOP, "quit requested");
        self.quit_requested.store(true, Ordering::SeqCst);
        let _ = self.sender.send(LoopEvent::Quit);
    }

    fn send(&self, event: LoopEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| CoreError::EventLoopClosed)
    }
}

impl std::fmt::Debug for EventLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopHandle")
            .field("thread", &self.thread)
            .finish()
    }
}

static_assertions::assert_impl_all!(EventLoopHandle: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_post_and_process() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            handle
                .post(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert_eq!(event_loop.pending_events(), 3);
        assert_eq!(event_loop.process_events(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invocations_run_on_loop_thread() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_on_clone = ran_on.clone();
        let poster = std::thread::spawn(move || {
            handle
                .post(move || {
                    *ran_on_clone.lock() = Some(std::thread::current().id());
                })
                .unwrap();
            handle.quit();
        });

        event_loop.exec();
        poster.join().unwrap();
        assert_eq!(*ran_on.lock(), Some(std::thread::current().id()));
    }

    #[test]
    fn test_post_after_drop_fails() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        drop(event_loop);
        assert_eq!(handle.post(|| {}), Err(CoreError::EventLoopClosed));
    }

    #[test]
    fn test_exec_until_timeout() {
        let event_loop = EventLoop::new();
        assert!(!event_loop.exec_until(Duration::from_millis(10), || false));
        assert!(event_loop.exec_until(Duration::from_millis(10), || true));
    }

    #[test]
    fn test_registered_for_current_thread() {
        let event_loop = EventLoop::new();
        let registered = current().expect("loop should be registered");
        assert_eq!(registered.thread(), event_loop.affinity().thread_id());
        drop(event_loop);
        assert!(current().is_none());
    }
}
