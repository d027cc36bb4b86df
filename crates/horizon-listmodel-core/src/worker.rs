//! Dedicated background thread for worker-side model code.
//!
//! A [`Worker`] owns one named thread and a bounded queue of tasks, run one at
//! a time in submission order. Worker-side copies of a list model are created
//! on the owner thread and then edited from tasks sent here.
//!
//! ```
//! use horizon_listmodel_core::WorkerBuilder;
//!
//! let worker = WorkerBuilder::new().name("rows").queue_capacity(8).build().unwrap();
//! worker.send(|| println!("queued work")).unwrap();
//! assert_eq!(worker.send_sync(|| 6 * 7), Some(42));
//! assert!(worker.stop_and_join());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::error::{CoreError, Result};
use crate::logging::targets;

const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Thread settings for a [`Worker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Thread name, also used in diagnostics.
    pub name: String,
    /// Stack size in bytes; `None` keeps the platform default.
    pub stack_size: Option<usize>,
    /// Tasks that may wait in the queue before `send` fails.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "listmodel-worker".to_string(),
            stack_size: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Builds a [`Worker`] from a [`WorkerConfig`].
#[derive(Debug, Default)]
pub struct WorkerBuilder {
    config: WorkerConfig,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Clamped to at least one slot.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Spawns the thread.
    pub fn build(self) -> Result<Worker> {
        Worker::spawn(self.config)
    }
}

type Task = Box<dyn FnOnce() + Send>;

enum Message {
    Run(Task),
    Stop,
}

/// A named thread running queued tasks.
///
/// Dropping the worker asks it to stop once the queue is drained but does
/// not wait for it.
pub struct Worker {
    name: String,
    queue: Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
    queued: Arc<AtomicUsize>,
}

impl Worker {
    fn spawn(config: WorkerConfig) -> Result<Self> {
        let (queue, inbox) = bounded(config.queue_capacity.max(1));
        let queued = Arc::new(AtomicUsize::new(0));

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let thread_queued = queued.clone();
        let thread = builder
            .spawn(move || run(inbox, &thread_queued))
            .map_err(|_| CoreError::WorkerStopped {
                name: config.name.clone(),
            })?;
        tracing::debug!(target: targets::WORKER, name = %config.name, "worker started");

        Ok(Self {
            name: config.name,
            queue,
            thread: Mutex::new(Some(thread)),
            accepting: AtomicBool::new(true),
            queued,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` once [`stop`](Self::stop) was called.
    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Tasks sent but not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Queues `task` without waiting for it.
    pub fn send<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(task))
    }

    /// Runs `task` on the worker and waits for its result.
    ///
    /// Returns `None` if the worker is stopped or its queue is full. A task
    /// that syncs a model must go through [`send`](Self::send) while the
    /// owner loop runs; waiting here would block that loop.
    pub fn send_sync<F, R>(&self, task: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = bounded(1);
        self.enqueue(Box::new(move || {
            let _ = reply.send(task());
        }))
        .ok()?;
        result.recv().ok()
    }

    /// Stops accepting tasks; queued ones still run.
    pub fn stop(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            tracing::debug!(target: targets::WORKER, name = %self.name, "worker stop requested");
            let _ = self.queue.send(Message::Stop);
        }
    }

    /// Waits for the thread to exit.
    ///
    /// Returns `false` if it was already joined or a task panicked.
    pub fn join(&self) -> bool {
        match self.thread.lock().take() {
            Some(thread) => thread.join().is_ok(),
            None => false,
        }
    }

    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }

    fn enqueue(&self, task: Task) -> Result<()> {
        if !self.is_running() {
            return Err(CoreError::WorkerStopped {
                name: self.name.clone(),
            });
        }
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.queue.try_send(Message::Run(task)).map_err(|err| {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            let name = self.name.clone();
            match err {
                TrySendError::Full(_) => CoreError::WorkerQueueFull { name },
                TrySendError::Disconnected(_) => CoreError::WorkerStopped { name },
            }
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(inbox: Receiver<Message>, queued: &AtomicUsize) {
    for message in inbox.iter() {
        match message {
            Message::Run(task) => {
                task();
                queued.fetch_sub(1, Ordering::AcqRel);
            }
            Message::Stop => break,
        }
    }
    tracing::debug!(target: targets::WORKER, "worker loop exited");
}
