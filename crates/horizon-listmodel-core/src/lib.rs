//! Core systems for Horizon ListModel.
//!
//! This crate provides the runtime primitives the list-model engine is built on:
//!
//! - **Signal/Slot System**: Type-safe observer notifications with direct and
//!   queued delivery
//! - **Event Loop**: A per-thread queue of deferred invocations, used to hand
//!   work to the thread that owns a model
//! - **Property System**: Values with change detection
//! - **Thread Affinity**: Recording and checking which thread created an object
//! - **Identity Generator**: Monotonic, shareable uid allocation
//! - **Worker**: A dedicated background thread with its own task queue
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_listmodel_core::Signal;
//!
//! let count_changed = Signal::<usize>::new();
//!
//! let conn_id = count_changed.connect(|count| {
//!     println!("Count is now {}", count);
//! });
//!
//! count_changed.emit(3);
//! count_changed.disconnect(conn_id);
//! ```
//!
//! # Event Loop Example
//!
//! ```
//! use horizon_listmodel_core::EventLoop;
//!
//! let event_loop = EventLoop::new();
//! let handle = event_loop.handle();
//!
//! let worker = std::thread::spawn(move || {
//!     handle.post(|| println!("runs on the owner thread")).ok();
//!     handle.quit();
//! });
//!
//! event_loop.exec();
//! worker.join().unwrap();
//! ```

mod error;
mod event;
pub mod event_loop;
pub mod invocation;
pub mod logging;
pub mod property;
pub mod signal;
pub mod thread_check;
pub mod uid;
pub mod worker;

pub use error::{CoreError, Result};
pub use event::LoopEvent;
pub use event_loop::{EventLoop, EventLoopHandle};
pub use invocation::{CompletionHandle, CompletionWaiter, Outcome, QueuedInvocation, completion_pair};
pub use property::Property;
pub use signal::{ConnectionGuard, ConnectionId, ConnectionType, Signal};
pub use thread_check::ThreadAffinity;
pub use uid::{MIN_UID, Uid, UidGenerator};
pub use worker::{Worker, WorkerBuilder, WorkerConfig};
