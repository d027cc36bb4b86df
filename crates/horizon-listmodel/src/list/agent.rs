//! Cross-thread editing of a list model.
//!
//! A [`WorkerAgent`] owns a private copy of an owner-thread model. A worker
//! thread edits the copy through the agent without touching the original,
//! then calls [`sync`](WorkerAgent::sync) to publish its edits.
//!
//! ```text
//!  worker thread                          owner thread
//!  ─────────────                          ────────────
//!  agent.append(..)  ── edits copy,
//!  agent.set(..)        records changes
//!  agent.sync() ─────── post ──────────>  merge copy -> original
//!        │                                replay recorded changes
//!        │ <──────────── reply ─────────  (rows_inserted, data_changed, ..)
//!     returns                             count_changed (once)
//! ```
//!
//! The merge matches rows by uid, so rows that survive keep their proxy
//! objects and nested tables on the owner side.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crossbeam_channel::{Sender, bounded};
use horizon_listmodel_core::logging::{span_names, targets};
use horizon_listmodel_core::{CoreError, EventLoopHandle, Uid, Worker};
use parking_lot::Mutex;

use super::dynamic;
use super::facade::ListModel;
use super::proxy::{PropertyNotice, RowRef};
use super::table::{Model, SyncTargets};
use crate::Result;
use crate::value::Value;

/// What a worker-side mutation would have notified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Inserted,
    Removed,
    Moved { to: usize },
    Changed { roles: Vec<usize> },
}

#[derive(Debug, Clone)]
struct Change {
    model_uid: Uid,
    index: usize,
    count: usize,
    kind: ChangeKind,
}

impl Change {
    /// Emits the recorded notification on `model`, without count changes.
    fn replay(&self, model: &ListModel) {
        let signals = model.signals();
        let last = self.index + self.count - 1;
        match &self.kind {
            ChangeKind::Inserted => signals.emit_rows_inserted(self.index, last, || {}),
            ChangeKind::Removed => signals.emit_rows_removed(self.index, last, || {}),
            ChangeKind::Moved { to } => signals.emit_rows_moved(self.index, *to, self.count, || {}),
            ChangeKind::Changed { roles } => signals.emit_data_changed(self.index, last, roles.clone()),
        }
    }
}

struct AgentState {
    original: Weak<ListModel>,
    orphaned: bool,
}

/// The worker-side handle of an owner-thread [`ListModel`].
///
/// Obtained from [`ListModel::agent`]. Every mutation is applied to the
/// agent's private copy on the calling thread.
pub struct WorkerAgent {
    copy: Arc<ListModel>,
    owner: EventLoopHandle,
    state: Mutex<AgentState>,
    changes: Mutex<Vec<Change>>,
    sync_lock: Mutex<()>,
}

impl WorkerAgent {
    pub(crate) fn new(original: &Arc<ListModel>, owner: EventLoopHandle) -> Arc<Self> {
        Arc::new_cyclic(|this| WorkerAgent {
            copy: ListModel::new_worker_copy(original, this.clone()),
            owner,
            state: Mutex::new(AgentState {
                original: Arc::downgrade(original),
                orphaned: false,
            }),
            changes: Mutex::new(Vec::new()),
            sync_lock: Mutex::new(()),
        })
    }

    /// The worker-side copy.
    pub fn model(&self) -> &Arc<ListModel> {
        &self.copy
    }

    /// Returns `true` once the original model has been dropped.
    pub fn is_orphaned(&self) -> bool {
        let state = self.state.lock();
        state.orphaned || state.original.strong_count() == 0
    }

    /// Queues `task` on `worker` with this agent.
    ///
    /// The task may call [`sync`](Self::sync); the owner thread has to keep
    /// its event loop running until the task is done.
    pub fn run_on<F>(self: &Arc<Self>, worker: &Worker, task: F) -> Result<()>
    where
        F: FnOnce(&Arc<WorkerAgent>) + Send + 'static,
    {
        let agent = self.clone();
        tracing::trace!(target: targets::AGENT, worker = worker.name(), "queueing agent task");
        worker.send(move || task(&agent))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Forwarded model API
    // -------------------------------------------------------------------------

    /// Number of rows in the copy.
    pub fn count(&self) -> usize {
        self.copy.count()
    }

    /// See [`ListModel::clear`].
    pub fn clear(&self) {
        self.copy.clear();
    }

    /// See [`ListModel::append`].
    pub fn append(&self, value: impl Into<Value>) {
        self.copy.append(value);
    }

    /// See [`ListModel::insert`].
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.copy.insert(index, value);
    }

    /// See [`ListModel::remove`].
    pub fn remove(&self, index: usize, count: usize) {
        self.copy.remove(index, count);
    }

    /// See [`ListModel::move_rows`].
    pub fn move_rows(&self, from: usize, to: usize, n: usize) {
        self.copy.move_rows(from, to, n);
    }

    /// See [`ListModel::set`].
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        self.copy.set(index, value);
    }

    /// See [`ListModel::set_property`].
    pub fn set_property(&self, index: usize, name: &str, value: impl Into<Value>) {
        self.copy.set_property(index, name, value);
    }

    /// See [`ListModel::get`].
    pub fn get(&self, index: usize) -> Option<RowRef> {
        self.copy.get(index)
    }

    /// Calls a script-visible method on the copy.
    ///
    /// `sync` is handled by the agent itself.
    pub fn invoke(self: &Arc<Self>, method: &str, args: &[Value]) -> Value {
        if method == "sync" {
            self.sync();
            return Value::Undefined;
        }
        self.copy.invoke(method, args)
    }

    // -------------------------------------------------------------------------
    // Change recording
    // -------------------------------------------------------------------------

    pub(crate) fn record_change(&self, model_uid: Uid, kind: ChangeKind, index: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.changes.lock().push(Change {
            model_uid,
            index,
            count,
            kind,
        });
    }

    /// Forgets value changes recorded for a table that has been emptied.
    pub(crate) fn discard_data_changes(&self, model_uid: Uid) {
        self.changes
            .lock()
            .retain(|c| c.model_uid != model_uid || !matches!(c.kind, ChangeKind::Changed { .. }));
    }

    /// Number of changes waiting for the next sync.
    pub fn pending_changes(&self) -> usize {
        self.changes.lock().len()
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    /// Publishes the copy's changes to the original model.
    ///
    /// Blocks until the owner thread has merged. Failures are logged.
    pub fn sync(self: &Arc<Self>) {
        if let Err(err) = self.try_sync() {
            tracing::warn!(target: targets::AGENT, %err, "sync failed");
        }
    }

    /// Publishes the copy's changes to the original model.
    ///
    /// Returns `Ok(false)` if the original model is gone and nothing was
    /// merged, and an error if the owner's event loop no longer runs. At
    /// most one sync per agent is in flight at a time.
    pub fn try_sync(self: &Arc<Self>) -> Result<bool> {
        let _in_flight = self.sync_lock.lock();

        if self.owner.is_loop_thread() {
            return Ok(self.handle_sync(None));
        }

        let (reply, response) = bounded(1);
        let agent = self.clone();
        self.owner.post(move || {
            agent.handle_sync(Some(reply));
        })?;
        tracing::trace!(target: targets::AGENT, "waiting for owner to merge");
        Ok(response.recv().map_err(|_| CoreError::EventLoopClosed)?)
    }

    /// Runs on the owner thread: merge, replay, reply, then count change.
    fn handle_sync(&self, reply: Option<Sender<bool>>) -> bool {
        let merged = self.merge();
        let outcome = merged.is_some();
        if let Some(reply) = reply {
            // The worker may have given up waiting; nothing to do then.
            let _ = reply.send(outcome);
        }
        if let Some((original, true)) = merged {
            original.signals().count_changed.emit(());
        }
        outcome
    }

    /// Merges the copy into the original and replays recorded changes.
    ///
    /// Returns the original and whether its row count changed, or `None`
    /// if the agent is orphaned.
    fn merge(&self) -> Option<(Arc<ListModel>, bool)> {
        let state = self.state.lock();
        let original = match state.original.upgrade() {
            Some(original) if !state.orphaned => original,
            _ => {
                drop(state);
                self.changes.lock().clear();
                tracing::debug!(target: targets::AGENT, "original model is gone, skipping merge");
                return None;
            }
        };

        let _span = tracing::debug_span!(target: targets::AGENT, span_names::SYNC).entered();
        let count_changed = original.count() != self.copy.count();
        let mut targets_by_uid: SyncTargets = HashMap::new();
        let mut notices = Vec::new();

        if self.copy.dynamic_roles() {
            dynamic::sync(&self.copy, &original, Some(&mut targets_by_uid), &mut notices);
        } else if let (Some(src), Some(target)) = (self.copy.shared_model(), original.shared_model()) {
            let ctx = original.context();
            Model::sync(&src.lock(), &mut target.lock(), Some(&mut targets_by_uid), &mut notices, &ctx);
        }
        targets_by_uid.insert(original.uid(), original.clone());
        drop(state);

        PropertyNotice::emit_all(notices);
        let changes = std::mem::take(&mut *self.changes.lock());
        let replayed = changes
            .iter()
            .filter_map(|change| {
                let model = targets_by_uid.get(&change.model_uid)?;
                change.replay(model);
                Some(())
            })
            .count();

        tracing::debug!(
            target: targets::AGENT,
            uid = original.uid(),
            rows = original.count(),
            recorded = changes.len(),
            replayed,
            count_changed,
            "merged worker copy"
        );
        Some((original, count_changed))
    }

    /// Marks the agent orphaned; called when the original model drops.
    pub(crate) fn model_destroyed(&self) {
        self.state.lock().orphaned = true;
        tracing::debug!(target: targets::AGENT, "original model destroyed, agent orphaned");
    }
}

impl std::fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("copy", &self.copy)
            .field("owner", &self.owner)
            .field("pending_changes", &self.pending_changes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_listmodel_core::{EventLoop, UidGenerator};
    use serde_json::json;

    fn values(model: &ListModel) -> serde_json::Value {
        model.to_value().to_json()
    }

    #[test]
    fn test_copy_keeps_uids() {
        let _event_loop = EventLoop::new();
        let model = ListModel::with_uids(UidGenerator::new());
        model.append(json!([{"x": 1}, {"x": 2}]));

        let agent = model.agent().unwrap();
        let copy = agent.model();
        assert!(!copy.is_main_thread());
        assert_eq!(copy.uid(), model.uid());
        assert_eq!(values(copy), values(&model));
        assert_eq!(copy.get(1).unwrap().uid(), model.get(1).unwrap().uid());
        assert!(Arc::ptr_eq(&model.agent().unwrap(), &agent));
    }

    #[test]
    fn test_worker_edits_are_recorded_not_emitted() {
        let _event_loop = EventLoop::new();
        let model = ListModel::with_uids(UidGenerator::new());
        model.append(json!({"x": 1}));
        let agent = model.agent().unwrap();

        let emitted = Arc::new(Mutex::new(0));
        let e = emitted.clone();
        agent.model().signals().rows_inserted.connect(move |_| *e.lock() += 1);

        agent.append(json!({"x": 2}));
        agent.set_property(0, "x", 10);
        agent.set_property(0, "x", 10);
        assert_eq!(*emitted.lock(), 0);
        assert_eq!(agent.pending_changes(), 2);

        agent.clear();
        assert_eq!(agent.pending_changes(), 2);
    }

    #[test]
    fn test_sync_on_owner_thread_runs_inline() {
        let _event_loop = EventLoop::new();
        let model = ListModel::with_uids(UidGenerator::new());
        model.append(json!({"x": 1}));
        let agent = model.agent().unwrap();

        let counts = Arc::new(Mutex::new(0));
        let c = counts.clone();
        model.signals().count_changed.connect(move |_| *c.lock() += 1);

        agent.append(json!({"x": 2}));
        agent.set_property(0, "x", 10);
        assert!(agent.try_sync().unwrap());
        assert_eq!(values(&model), json!([{"x": 10.0}, {"x": 2.0}]));
        assert_eq!(*counts.lock(), 1);
        assert_eq!(agent.pending_changes(), 0);
    }

    #[test]
    fn test_orphaned_agent_skips_merge() {
        let _event_loop = EventLoop::new();
        let model = ListModel::with_uids(UidGenerator::new());
        let agent = model.agent().unwrap();
        agent.append(json!({"x": 1}));

        drop(model);
        assert!(agent.is_orphaned());
        assert!(!agent.try_sync().unwrap());
        assert_eq!(agent.count(), 1);
        assert_eq!(agent.pending_changes(), 0);
    }

    #[test]
    fn test_agent_requires_event_loop() {
        let model = std::thread::spawn(|| {
            let model = ListModel::with_uids(UidGenerator::new());
            assert!(model.agent().is_none());
            model.count()
        })
        .join()
        .unwrap();
        assert_eq!(model, 0);
    }

    #[test]
    fn test_dynamic_roles_locked_once_agent_exists() {
        let _event_loop = EventLoop::new();
        let model = ListModel::with_uids(UidGenerator::new());
        let _agent = model.agent().unwrap();
        model.set_dynamic_roles(true);
        assert!(!model.dynamic_roles());
    }
}
