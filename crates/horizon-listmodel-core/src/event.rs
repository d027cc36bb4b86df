//! Event types delivered through an [`EventLoop`](crate::EventLoop).

use std::fmt;

use crate::invocation::QueuedInvocation;

/// Events dispatched through a per-thread event loop.
///
/// These events are sent via an [`EventLoopHandle`](crate::EventLoopHandle) and
/// processed on the thread that owns the loop.
pub enum LoopEvent {
    /// A deferred invocation, typically a queued slot or a cross-thread
    /// request such as a model sync.
    Invoke(QueuedInvocation),

    /// Request the loop to stop after the current iteration.
    Quit,

    /// Wake up the loop without doing any work.
    WakeUp,
}

impl LoopEvent {
    /// Returns a short name for this event, used in trace output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invoke(_) => "invoke",
            Self::Quit => "quit",
            Self::WakeUp => "wake_up",
        }
    }
}

impl fmt::Debug for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoopEvent").field(&self.kind()).finish()
    }
}
