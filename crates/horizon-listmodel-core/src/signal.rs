//! Signal/slot system for Horizon ListModel.
//!
//! Models announce structural and value changes through signals; views and
//! per-row proxies connect slots (closures) to them.
//!
//! # Connection Types
//!
//! - **Direct**: Slot is called immediately in the emitting thread
//! - **Queued**: Slot execution is deferred to the connecting thread's
//!   [`EventLoop`](crate::EventLoop)
//! - **Auto**: Direct if same thread, Queued otherwise (default)
//! - **BlockingQueued**: Like Queued, but blocks until the slot completes
//!
//! When no event loop is registered for the target thread, queued slots are
//! executed immediately and a warning is logged.
//!
//! # Example
//!
//! ```
//! use horizon_listmodel_core::Signal;
//!
//! let rows_inserted = Signal::<(usize, usize)>::new();
//!
//! let conn_id = rows_inserted.connect(|(first, last)| {
//!     println!("rows {}..={} inserted", first, last);
//! });
//!
//! rows_inserted.emit((0, 1));
//! rows_inserted.disconnect(conn_id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::event_loop;
use crate::invocation::{CompletionHandle, Outcome, QueuedInvocation, completion_pair};
use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    pub struct ConnectionId;
}

/// Specifies how a connected slot should be invoked when the signal is emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the slot immediately in the emitting thread.
    Direct,

    /// Queue the slot invocation to the connecting thread's event loop.
    Queued,

    /// Direct when emitted on the connecting thread, queued otherwise.
    #[default]
    Auto,

    /// Like Queued, but blocks the emitting thread until the slot completes.
    ///
    /// # Warning
    ///
    /// Emitting from the connecting thread deadlocks: the emit waits for the
    /// event loop, which is waiting for the emit to return.
    BlockingQueued,
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Connection<Args> {
    slot: Slot<Args>,
    connection_type: ConnectionType,
    target_thread: ThreadId,
}

/// A type-safe signal that can have multiple connected slots.
///
/// `Args` is the argument type passed to connected slots. Use `()` for
/// signals with no arguments, or a tuple for several.
///
/// `Signal<Args>` is `Send + Sync` and can be shared between threads.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    blocked: AtomicBool,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot using [`ConnectionType::Auto`].
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Auto)
    }

    /// Connect a slot with a specific connection type.
    pub fn connect_with_type<F>(&self, slot: F, connection_type: ConnectionType) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Arc::new(slot),
            connection_type,
            target_thread: std::thread::current().id(),
        };
        self.connections.lock().insert(connection)
    }

    /// Connect a slot that is disconnected when the returned guard drops.
    pub fn connect_scoped<F>(&self, slot: F) -> ConnectionGuard<'_, Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard { signal: self, id }
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// Slots are collected first and invoked after the connection lock is
    /// released, so a slot may connect or disconnect on the same signal.
    #[tracing::instrument(skip_all, target = "horizon_listmodel_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let current_thread = std::thread::current().id();
        let slots: Vec<(Slot<Args>, ConnectionType, ThreadId)> = self
            .connections
            .lock()
            .values()
            .map(|c| (c.slot.clone(), c.connection_type, c.target_thread))
            .collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        let mut blocking_waiters = Vec::new();

        for (slot, connection_type, target_thread) in slots {
            match connection_type {
                ConnectionType::Direct => slot(&args),
                ConnectionType::Auto if target_thread == current_thread => slot(&args),
                ConnectionType::Auto | ConnectionType::Queued => {
                    Self::queue_invocation(slot, args.clone(), target_thread, None);
                }
                ConnectionType::BlockingQueued => {
                    let (handle, waiter) = completion_pair();
                    if Self::queue_invocation(slot, args.clone(), target_thread, Some(handle)) {
                        blocking_waiters.push(waiter);
                    }
                }
            }
        }

        for waiter in blocking_waiters {
            if waiter.wait() == Outcome::Discarded {
                tracing::debug!(target: targets::SIGNAL, "blocking slot discarded before it ran");
            }
        }
    }

    /// Post a slot invocation to the target thread's loop.
    ///
    /// Returns `true` if the invocation was queued, `false` if it ran inline.
    fn queue_invocation(
        slot: Slot<Args>,
        args: Args,
        target_thread: ThreadId,
        completion: Option<CompletionHandle>,
    ) -> bool {
        let invoke = move || slot(&args);
        let invocation = match completion {
            Some(handle) => QueuedInvocation::with_completion(invoke, handle),
            None => QueuedInvocation::new(invoke),
        };

        let Some(handle) = event_loop::handle_for_thread(target_thread) else {
            tracing::warn!(
                target: targets::SIGNAL,
                "No event loop available for queued signal, executing immediately"
            );
            invocation.execute();
            return false;
        };

        match handle.post_invocation(invocation) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(target: targets::SIGNAL, %err, "queued signal dropped");
                false
            }
        }
    }
}

/// A connection guard that disconnects when dropped.
///
/// Created via [`Signal::connect_scoped`].
pub struct ConnectionGuard<'a, Args: Clone + Send + 'static> {
    signal: &'a Signal<Args>,
    id: ConnectionId,
}

impl<Args: Clone + Send + 'static> ConnectionGuard<'_, Args> {
    /// The guarded connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: Clone + Send + 'static> Drop for ConnectionGuard<'_, Args> {
    fn drop(&mut self) {
        self.signal.disconnect(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventLoop;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&n| {
            received_clone.lock().push(n);
        });

        signal.emit(1);
        signal.emit(2);
        assert_eq!(*received.lock(), vec![1, 2]);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::<()>::new();
        let counter = Arc::new(AtomicI32::new(0));

        let counter_clone = counter.clone();
        let id = signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.emit(());
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_blocked() {
        let signal = Signal::<()>::new();
        let counter = Arc::new(AtomicI32::new(0));

        let counter_clone = counter.clone();
        signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set_blocked(true);
        signal.emit(());
        signal.set_blocked(false);
        signal.emit(());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connection_guard() {
        let signal = Signal::<()>::new();
        {
            let _guard = signal.connect_scoped(|_| {});
            assert_eq!(signal.connection_count(), 1);
        }
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_slot_may_disconnect_during_emit() {
        let signal = Arc::new(Signal::<()>::new());
        let weak = Arc::downgrade(&signal);
        signal.connect(move |_| {
            if let Some(signal) = weak.upgrade() {
                signal.disconnect_all();
            }
        });
        signal.emit(());
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_queued_connection_fallback() {
        // No event loop on this thread: the slot runs inline.
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect_with_type(
            move |&n| received_clone.lock().push(n),
            ConnectionType::Queued,
        );

        signal.emit(7);
        assert_eq!(*received.lock(), vec![7]);
    }

    #[test]
    fn test_queued_connection_uses_event_loop() {
        let event_loop = EventLoop::new();
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect_with_type(
            move |&n| received_clone.lock().push(n),
            ConnectionType::Queued,
        );

        signal.emit(5);
        assert!(received.lock().is_empty());
        assert_eq!(event_loop.process_events(), 1);
        assert_eq!(*received.lock(), vec![5]);
    }

    #[test]
    fn test_auto_connection_cross_thread() {
        let event_loop = EventLoop::new();
        let signal = Arc::new(Signal::<i32>::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&n| {
            received_clone.lock().push((n, std::thread::current().id()));
        });

        let signal_clone = signal.clone();
        std::thread::spawn(move || signal_clone.emit(9))
            .join()
            .unwrap();

        assert!(received.lock().is_empty());
        event_loop.process_events();
        assert_eq!(*received.lock(), vec![(9, std::thread::current().id())]);
    }

    #[test]
    fn test_blocking_queued_from_worker() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let signal = Arc::new(Signal::<i32>::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect_with_type(
            move |&n| received_clone.lock().push(n),
            ConnectionType::BlockingQueued,
        );

        let signal_clone = signal.clone();
        let received_clone = received.clone();
        let emitter = std::thread::spawn(move || {
            signal_clone.emit(3);
            // The slot has already run on the loop thread when emit returns.
            let seen = received_clone.lock().clone();
            handle.quit();
            seen
        });

        event_loop.exec();
        assert_eq!(emitter.join().unwrap(), vec![3]);
    }
}
