//! Error types for Horizon ListModel core.

use thiserror::Error;

/// Errors reported by the core runtime primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The target event loop has been dropped and can no longer accept events.
    #[error("The event loop has already exited")]
    EventLoopClosed,

    /// The worker has been stopped and no longer accepts tasks.
    #[error("Worker '{name}' is not running")]
    WorkerStopped {
        /// Name of the worker thread.
        name: String,
    },

    /// The worker's task queue is full.
    #[error("Worker '{name}' task queue is full")]
    WorkerQueueFull {
        /// Name of the worker thread.
        name: String,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CoreError::EventLoopClosed.to_string(),
            "The event loop has already exited"
        );
        let err = CoreError::WorkerStopped {
            name: "sync-worker".into(),
        };
        assert_eq!(err.to_string(), "Worker 'sync-worker' is not running");
    }
}
