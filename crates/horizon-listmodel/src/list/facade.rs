//! The table-model facade.
//!
//! [`ListModel`] is what scripts and views hold. It owns (or, for a nested
//! table, borrows) either a static-schema [`Model`] or a dynamic row store,
//! implements [`ItemModel`], and turns every mutation into notifications.
//!
//! # Notification routing
//!
//! A facade living on the owner thread emits [`ModelSignals`] directly. A
//! worker-side copy never emits structural signals; it records what it
//! would have emitted with its [`WorkerAgent`], which replays the records
//! on the owner side after the next sync.
//!
//! # Locking
//!
//! Storage is guarded by `parking_lot` locks that are always released before
//! any signal is emitted, so slots may call back into the model. When a
//! parent table and a nested table are both locked, the parent is locked
//! first.
//!
//! # Example
//!
//! ```ignore
//! use horizon_listmodel::ListModel;
//! use serde_json::json;
//!
//! let fruit = ListModel::new();
//! fruit.append(json!({"name": "Apples", "cost": 5.95}));
//! fruit.append(json!({"name": "Pizza", "cost": 7.0}));
//!
//! fruit.set_property(0, "cost", 6.5);
//! fruit.move_rows(0, 1, 1);
//! assert_eq!(fruit.count(), 2);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use horizon_listmodel_core::logging::targets;
use horizon_listmodel_core::{ThreadAffinity, Uid, UidGenerator, event_loop};
use parking_lot::Mutex;

use super::agent::{ChangeKind, WorkerAgent};
use super::dynamic::{self, DynamicRowNode, DynamicStore};
use super::layout::Layout;
use super::proxy::{PropertyNotice, RowRef};
use super::table::{Model, SharedModel, record_of};
use crate::model::{ItemModel, ModelSignals};
use crate::value::{Value, ValueMap};

/// Settings a table hands down to the facades of its nested tables.
#[derive(Clone)]
pub(crate) struct ModelContext {
    pub(crate) main_thread: bool,
    pub(crate) agent: Option<Weak<WorkerAgent>>,
    pub(crate) uids: UidGenerator,
}

impl ModelContext {
    /// Context of a free-standing owner-thread table.
    pub(crate) fn detached(uids: UidGenerator) -> Self {
        Self {
            main_thread: true,
            agent: None,
            uids,
        }
    }
}

enum AgentLink {
    None,
    /// The agent created for this owner-thread table.
    Owned(Arc<WorkerAgent>),
    /// The agent of the table this one belongs to.
    Shared(Weak<WorkerAgent>),
}

impl AgentLink {
    fn from_weak(agent: Option<Weak<WorkerAgent>>) -> Self {
        agent.map_or(AgentLink::None, AgentLink::Shared)
    }

    fn upgrade(&self) -> Option<Arc<WorkerAgent>> {
        match self {
            AgentLink::None => None,
            AgentLink::Owned(agent) => Some(agent.clone()),
            AgentLink::Shared(agent) => agent.upgrade(),
        }
    }

    fn downgrade(&self) -> Option<Weak<WorkerAgent>> {
        match self {
            AgentLink::None => None,
            AgentLink::Owned(agent) => Some(Arc::downgrade(agent)),
            AgentLink::Shared(agent) => Some(agent.clone()),
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, AgentLink::None)
    }
}

enum ModelRef {
    Owned(SharedModel),
    /// A nested table owned by a row of another table.
    Borrowed(Weak<parking_lot::Mutex<Model>>),
}

impl ModelRef {
    fn get(&self) -> Option<SharedModel> {
        match self {
            ModelRef::Owned(model) => Some(model.clone()),
            ModelRef::Borrowed(model) => model.upgrade(),
        }
    }
}

/// Strips live models out of a value, replacing them with their records.
fn detached_value(value: Value) -> Value {
    match value {
        Value::Model(model) => model.to_value(),
        Value::List(items) => Value::List(items.into_iter().map(detached_value).collect()),
        Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, detached_value(v))).collect()),
        other => other,
    }
}

/// Widens a row argument; values past `i64::MAX` clamp and fail bounds checks.
fn row_arg(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A free-form list of records.
///
/// Columns ("roles") are discovered from the records written into the
/// model. With static roles (the default) a column's type is fixed by its
/// first value; with [dynamic roles](Self::set_dynamic_roles) every row is
/// an unconstrained property bag.
///
/// Misuse never panics and never returns an error: out-of-range indices,
/// non-record arguments and type conflicts are logged under the
/// `horizon_listmodel::*` tracing targets and the call has no effect.
pub struct ListModel {
    this: Weak<ListModel>,
    affinity: ThreadAffinity,
    main_thread: bool,
    primary: bool,
    dynamic_roles: AtomicBool,
    uids: UidGenerator,
    agent: Mutex<AgentLink>,
    model: ModelRef,
    dynamic: Mutex<DynamicStore>,
    signals: ModelSignals,
}

impl ListModel {
    /// Creates an empty model drawing uids from the process-wide generator.
    pub fn new() -> Arc<Self> {
        Self::with_uids(UidGenerator::global())
    }

    /// Creates an empty model drawing uids from `uids`.
    pub fn with_uids(uids: UidGenerator) -> Arc<Self> {
        let model = Model::new_shared(Layout::new_ref(), uids.clone(), None);
        Self::build(true, true, false, AgentLink::None, ModelRef::Owned(model), uids)
    }

    fn build(
        main_thread: bool,
        primary: bool,
        dynamic_roles: bool,
        agent: AgentLink,
        model: ModelRef,
        uids: UidGenerator,
    ) -> Arc<Self> {
        let store = DynamicStore::new(uids.next_uid());
        Arc::new_cyclic(|this| ListModel {
            this: this.clone(),
            affinity: ThreadAffinity::current(),
            main_thread,
            primary,
            dynamic_roles: AtomicBool::new(dynamic_roles),
            uids,
            agent: Mutex::new(agent),
            model,
            dynamic: Mutex::new(store),
            signals: ModelSignals::new(),
        })
    }

    /// Facade over a table nested in another table's row.
    pub(crate) fn new_nested(ctx: &ModelContext, model: Weak<parking_lot::Mutex<Model>>) -> Arc<Self> {
        Self::build(
            ctx.main_thread,
            false,
            false,
            AgentLink::from_weak(ctx.agent.clone()),
            ModelRef::Borrowed(model),
            ctx.uids.clone(),
        )
    }

    /// A fresh table inheriting `owner`'s thread role, agent and mode.
    pub(crate) fn create_with_owner(owner: &ListModel) -> Arc<Self> {
        let model = Model::new_shared(Layout::new_ref(), owner.uids.clone(), None);
        Self::build(
            owner.main_thread,
            true,
            owner.dynamic_roles(),
            AgentLink::from_weak(owner.agent.lock().downgrade()),
            ModelRef::Owned(model),
            owner.uids.clone(),
        )
    }

    /// The worker-side copy of `orig`, with the same table and row uids.
    pub(crate) fn new_worker_copy(orig: &ListModel, agent: Weak<WorkerAgent>) -> Arc<Self> {
        let dynamic_roles = orig.dynamic_roles();
        let orig_model = orig.shared_model();
        let (layout, uid) = match &orig_model {
            Some(model) => {
                let model = model.lock();
                (model.layout().read().deep_copy(), model.uid())
            }
            None => (Layout::new(), orig.uids.next_uid()),
        };

        let model = Model::new_shared(
            Arc::new(parking_lot::RwLock::new(layout)),
            orig.uids.clone(),
            Some(uid),
        );
        let copy = Self::build(
            false,
            true,
            dynamic_roles,
            AgentLink::Shared(agent),
            ModelRef::Owned(model.clone()),
            orig.uids.clone(),
        );

        // The copy has no observers yet, so merge notices are dropped.
        let mut notices = Vec::new();
        if dynamic_roles {
            dynamic::sync(orig, &copy, None, &mut notices);
        } else if let Some(orig_model) = orig_model {
            let ctx = copy.context();
            Model::sync(&orig_model.lock(), &mut model.lock(), None, &mut notices, &ctx);
        }
        tracing::debug!(target: targets::FACADE, uid = copy.uid(), rows = copy.count(), "created worker copy");
        copy
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Identity of the table, preserved across worker syncs.
    pub fn uid(&self) -> Uid {
        if self.dynamic_roles() {
            return self.dynamic.lock().uid;
        }
        match self.shared_model() {
            Some(model) => model.lock().uid(),
            None => self.dynamic.lock().uid,
        }
    }

    /// Number of rows.
    pub fn count(&self) -> usize {
        if self.dynamic_roles() {
            return self.dynamic.lock().nodes.len();
        }
        self.shared_model().map_or(0, |model| model.lock().element_count())
    }

    /// Returns `true` if the model has no rows.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns `true` for owner-thread models, `false` for worker copies.
    pub fn is_main_thread(&self) -> bool {
        self.main_thread
    }

    /// Returns `true` if this facade owns its rows.
    ///
    /// Facades over nested tables borrow rows owned by the parent table.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Returns `true` if rows are free-form property bags.
    pub fn dynamic_roles(&self) -> bool {
        self.dynamic_roles.load(Ordering::Acquire)
    }

    /// Selects dynamic (`true`) or static (`false`) row storage.
    ///
    /// Only takes effect on an owner-thread model with no columns yet and
    /// no worker agent; otherwise the request is logged and ignored.
    pub fn set_dynamic_roles(&self, enable: bool) {
        if !self.main_thread || !self.agent.lock().is_none() {
            tracing::warn!(
                target: targets::FACADE,
                "dynamic role setting must be made from the main thread, before any worker scripts are created"
            );
            return;
        }

        if enable {
            let role_count = self.shared_model().map_or(0, |model| model.lock().role_count());
            if role_count > 0 {
                tracing::warn!(target: targets::FACADE, "unable to enable dynamic roles as this model is not empty!");
                return;
            }
        } else if !self.dynamic.lock().roles.is_empty() {
            tracing::warn!(target: targets::FACADE, "unable to enable static roles as this model is not empty!");
            return;
        }
        self.dynamic_roles.store(enable, Ordering::Release);
    }

    /// The model's change signals.
    pub fn signals(&self) -> &ModelSignals {
        &self.signals
    }

    pub(crate) fn uid_generator(&self) -> &UidGenerator {
        &self.uids
    }

    pub(crate) fn downgrade_self(&self) -> Weak<ListModel> {
        self.this.clone()
    }

    pub(crate) fn dynamic_store(&self) -> &Mutex<DynamicStore> {
        &self.dynamic
    }

    pub(crate) fn shared_model(&self) -> Option<SharedModel> {
        self.model.get()
    }

    pub(crate) fn context(&self) -> ModelContext {
        ModelContext {
            main_thread: self.main_thread,
            agent: self.agent.lock().downgrade(),
            uids: self.uids.clone(),
        }
    }

    fn agent_link(&self) -> Option<Arc<WorkerAgent>> {
        self.agent.lock().upgrade()
    }

    /// Returns the agent through which a worker thread edits this model.
    ///
    /// The agent is created on first call. It needs an
    /// [`EventLoop`](horizon_listmodel_core::EventLoop) on the thread that
    /// created the model, which is where syncs are merged. Worker copies and
    /// nested tables return the agent they already belong to, if any.
    pub fn agent(&self) -> Option<Arc<WorkerAgent>> {
        if !self.main_thread || !self.primary {
            return self.agent_link();
        }

        let mut link = self.agent.lock();
        if let Some(agent) = link.upgrade() {
            return Some(agent);
        }
        let Some(owner) = event_loop::handle_for_thread(self.affinity.thread_id()) else {
            tracing::warn!(
                target: targets::AGENT,
                "worker agent requires an event loop on the thread that owns the model"
            );
            return None;
        };
        let this = self.this.upgrade()?;
        let agent = WorkerAgent::new(&this, owner);
        *link = AgentLink::Owned(agent.clone());
        Some(agent)
    }

    // -------------------------------------------------------------------------
    // Notification routing
    // -------------------------------------------------------------------------

    fn record_change(&self, kind: ChangeKind, index: usize, count: usize) {
        let uid = self.uid();
        if let Some(agent) = self.agent_link() {
            agent.record_change(uid, kind, index, count);
        }
    }

    fn notify_inserted<F>(&self, index: usize, count: usize, mutate: F)
    where
        F: FnOnce() -> Vec<PropertyNotice>,
    {
        let mut notices = Vec::new();
        if self.main_thread {
            self.signals
                .emit_rows_inserted(index, index + count - 1, || notices = mutate());
            PropertyNotice::emit_all(notices);
            self.signals.count_changed.emit(());
        } else {
            notices = mutate();
            PropertyNotice::emit_all(notices);
            self.record_change(ChangeKind::Inserted, index, count);
        }
    }

    fn notify_removed<F>(&self, index: usize, count: usize, mutate: F)
    where
        F: FnOnce(),
    {
        if self.main_thread {
            self.signals.emit_rows_removed(index, index + count - 1, mutate);
            self.signals.count_changed.emit(());
        } else {
            mutate();
            if index == 0 && self.count() == 0 {
                let uid = self.uid();
                if let Some(agent) = self.agent_link() {
                    agent.discard_data_changes(uid);
                }
            }
            self.record_change(ChangeKind::Removed, index, count);
        }
    }

    fn notify_moved<F>(&self, from: usize, to: usize, n: usize, mutate: F)
    where
        F: FnOnce(),
    {
        if self.main_thread {
            self.signals.emit_rows_moved(from, to, n, mutate);
        } else {
            mutate();
            self.record_change(ChangeKind::Moved { to }, from, n);
        }
    }

    fn notify_changed(&self, index: usize, roles: Vec<usize>) {
        if roles.is_empty() {
            return;
        }
        if self.main_thread {
            self.signals.emit_data_changed(index, index, roles);
        } else {
            self.record_change(ChangeKind::Changed { roles }, index, 1);
        }
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Removes every row.
    #[tracing::instrument(skip(self), target = "horizon_listmodel::facade", level = "trace")]
    pub fn clear(&self) {
        let cleared = self.count();
        if cleared == 0 {
            return;
        }
        self.notify_removed(0, cleared, || {
            if self.dynamic_roles() {
                self.dynamic.lock().clear();
            } else if let Some(model) = self.shared_model() {
                model.lock().clear();
            }
        });
    }

    /// Appends one record, or every record of a list.
    pub fn append(&self, value: impl Into<Value>) {
        let records = match detached_value(value.into()) {
            Value::List(items) => items.iter().map(record_of).collect(),
            Value::Map(map) => vec![map],
            _ => {
                tracing::warn!(target: targets::FACADE, "append: value is not an object");
                return;
            }
        };
        self.insert_records(self.count(), records);
    }

    /// Inserts one record, or every record of a list, at `index`.
    ///
    /// `index` may equal [`count`](Self::count) to append.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.insert_checked(row_arg(index), value.into());
    }

    pub(crate) fn insert_checked(&self, index: i64, value: Value) {
        if index < 0 || index > self.count() as i64 {
            tracing::warn!(target: targets::FACADE, "insert: index {} out of range", index);
            return;
        }
        let records = match detached_value(value) {
            Value::List(items) => items.iter().map(record_of).collect(),
            Value::Map(map) => vec![map],
            _ => {
                tracing::warn!(target: targets::FACADE, "insert: value is not an object");
                return;
            }
        };
        self.insert_records(index as usize, records);
    }

    fn insert_records(&self, index: usize, records: Vec<ValueMap>) {
        if records.is_empty() {
            return;
        }
        tracing::trace!(target: targets::FACADE, index, count = records.len(), "inserting rows");
        self.notify_inserted(index, records.len(), || {
            if self.dynamic_roles() {
                let mut store = self.dynamic.lock();
                let DynamicStore { roles, nodes, .. } = &mut *store;
                for (offset, record) in records.iter().enumerate() {
                    nodes.insert(index + offset, DynamicRowNode::create(self, record, roles));
                }
            } else if let Some(model) = self.shared_model() {
                let mut model = model.lock();
                for (offset, record) in records.iter().enumerate() {
                    model.insert_record(index + offset, record);
                }
            }
            Vec::new()
        });
    }

    /// Removes `count` rows starting at `index`.
    pub fn remove(&self, index: usize, count: usize) {
        self.remove_checked(row_arg(index), row_arg(count));
    }

    pub(crate) fn remove_checked(&self, index: i64, count: i64) {
        let total = self.count() as i64;
        let end = index.checked_add(count);
        if index < 0 || count <= 0 || end.is_none_or(|end| end > total) {
            tracing::warn!(
                target: targets::FACADE,
                "remove: indices [{} - {}] out of range [0 - {}]",
                index,
                index.saturating_add(count),
                total
            );
            return;
        }

        let (index, count) = (index as usize, count as usize);
        self.notify_removed(index, count, || {
            if self.dynamic_roles() {
                self.dynamic.lock().remove(index, count);
            } else if let Some(model) = self.shared_model() {
                model.lock().remove(index, count);
            }
        });
    }

    /// Moves `n` rows starting at `from` so that they start at `to`.
    ///
    /// Moving zero rows or onto the same index does nothing.
    pub fn move_rows(&self, from: usize, to: usize, n: usize) {
        self.move_checked(row_arg(from), row_arg(to), row_arg(n));
    }

    pub(crate) fn move_checked(&self, from: i64, to: i64, n: i64) {
        if n == 0 || from == to {
            return;
        }
        let count = self.count() as i64;
        let fits = |start: i64| start.checked_add(n).is_some_and(|end| end <= count);
        if from < 0 || to < 0 || n < 0 || !fits(from) || !fits(to) {
            tracing::warn!(target: targets::FACADE, "move: out of range");
            return;
        }

        let (from, to, n) = (from as usize, to as usize, n as usize);
        self.notify_moved(from, to, n, || {
            if self.dynamic_roles() {
                self.dynamic.lock().move_rows(from, to, n);
            } else if let Some(model) = self.shared_model() {
                model.lock().move_rows(from, to, n);
            }
        });
    }

    /// Merges the columns of `value` into row `index`.
    ///
    /// Columns not named in `value` are left alone. With `index` equal to
    /// [`count`](Self::count) the record is appended instead.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        self.set_checked(row_arg(index), value.into());
    }

    pub(crate) fn set_checked(&self, index: i64, value: Value) {
        let Value::Map(record) = detached_value(value) else {
            tracing::warn!(target: targets::FACADE, "set: value is not an object");
            return;
        };
        let count = self.count() as i64;
        if index < 0 || index > count {
            tracing::warn!(target: targets::FACADE, "set: index {} out of range", index);
            return;
        }

        let index = index as usize;
        if index as i64 == count {
            self.insert_records(index, vec![record]);
            return;
        }

        let mut notices = Vec::new();
        let roles = if self.dynamic_roles() {
            let mut store = self.dynamic.lock();
            let DynamicStore { roles, nodes, .. } = &mut *store;
            match nodes.get(index) {
                Some(node) => node.clone().update_values(self, &record, roles, &mut notices),
                None => Vec::new(),
            }
        } else {
            let ctx = self.context();
            match self.shared_model() {
                Some(model) => model.lock().set(index, &record, &ctx, &mut notices),
                None => Vec::new(),
            }
        };
        PropertyNotice::emit_all(notices);
        self.notify_changed(index, roles);
    }

    /// Writes a single column of row `index`.
    pub fn set_property(&self, index: usize, name: &str, value: impl Into<Value>) {
        self.set_property_checked(row_arg(index), name, value.into());
    }

    /// Returns `true` if the stored value changed.
    pub(crate) fn set_property_checked(&self, index: i64, name: &str, value: Value) -> bool {
        let count = self.count() as i64;
        if count == 0 || index < 0 || index >= count {
            tracing::warn!(target: targets::FACADE, "set: index {} out of range", index);
            return false;
        }

        let index = index as usize;
        let value = detached_value(value);
        let mut notices = Vec::new();
        let changed = if self.dynamic_roles() {
            let mut store = self.dynamic.lock();
            let role = DynamicStore::role_index_or_create(&mut store.roles, name);
            let node = store.nodes.get(index).cloned();
            node.and_then(|node| node.set_value(self, name, value, &mut notices).then_some(role))
        } else {
            let ctx = self.context();
            self.shared_model().and_then(|model| {
                model
                    .lock()
                    .set_or_create_property(index, name, &value, &ctx, &mut notices)
            })
        };
        PropertyNotice::emit_all(notices);

        match changed {
            Some(role) => {
                self.notify_changed(index, vec![role]);
                true
            }
            None => false,
        }
    }

    /// Mirrors a proxy write into row storage.
    ///
    /// Only existing columns are written. Returns `true` if storage changed.
    pub(crate) fn set_existing_property(&self, index: usize, name: &str, value: Value) -> bool {
        let value = detached_value(value);
        let ctx = self.context();
        let mut notices = Vec::new();
        let changed = self.shared_model().and_then(|model| {
            model
                .lock()
                .set_existing_property(index, name, &value, &ctx, &mut notices)
        });
        PropertyNotice::emit_all(notices);

        match changed {
            Some(role) => {
                self.notify_changed(index, vec![role]);
                true
            }
            None => false,
        }
    }

    /// Reports a write made through a dynamic row's proxy.
    pub(crate) fn dynamic_node_written(&self, node: &DynamicRowNode, name: &str) {
        let located = {
            let mut store = self.dynamic.lock();
            store
                .index_of(node)
                .map(|index| (index, DynamicStore::role_index_or_create(&mut store.roles, name)))
        };
        if let Some((index, role)) = located {
            self.notify_changed(index, vec![role]);
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Returns the proxy object of row `index`.
    ///
    /// Repeated calls return the same object while the row exists.
    pub fn get(&self, index: usize) -> Option<RowRef> {
        if self.dynamic_roles() {
            return self.dynamic.lock().nodes.get(index).cloned().map(RowRef::Dynamic);
        }
        let ctx = self.context();
        let model = self.shared_model()?;
        let proxy = model
            .lock()
            .get_or_create_model_object(index, self.this.clone(), &ctx)?;
        Some(RowRef::Static(proxy))
    }

    /// Reads column `role` of `row`.
    ///
    /// A nested table reads as its facade (`Value::Model`).
    pub fn data(&self, row: usize, role: usize) -> Value {
        if self.dynamic_roles() {
            let store = self.dynamic.lock();
            return match (store.nodes.get(row), store.roles.get(role)) {
                (Some(node), Some(name)) => node.value(name),
                _ => Value::Undefined,
            };
        }
        let ctx = self.context();
        self.shared_model()
            .map_or(Value::Undefined, |model| model.lock().get_property(row, role, &ctx))
    }

    /// Reads column `name` of `row`.
    pub fn property_value(&self, row: usize, name: &str) -> Value {
        if self.dynamic_roles() {
            let store = self.dynamic.lock();
            return store.nodes.get(row).map_or(Value::Undefined, |node| node.value(name));
        }
        let ctx = self.context();
        let Some(model) = self.shared_model() else {
            return Value::Undefined;
        };
        let model = model.lock();
        match model.existing_role(name) {
            Some(role) => model.get_property(row, role.index, &ctx),
            None => Value::Undefined,
        }
    }

    /// Column names keyed by role index, in discovery order.
    pub fn role_names(&self) -> BTreeMap<usize, String> {
        if self.dynamic_roles() {
            return self.dynamic.lock().roles.iter().cloned().enumerate().collect();
        }
        let Some(model) = self.shared_model() else {
            return BTreeMap::new();
        };
        let model = model.lock();
        let layout = model.layout().read();
        layout
            .roles()
            .iter()
            .map(|role| (role.index, role.name.clone()))
            .collect()
    }

    /// Exports every row as a record; nested tables become record lists.
    pub fn to_value(&self) -> Value {
        if self.dynamic_roles() {
            return self.dynamic.lock().to_value();
        }
        self.shared_model()
            .map_or_else(|| Value::List(Vec::new()), |model| model.lock().to_value())
    }

    /// Pushes a worker copy's changes to the owner model.
    ///
    /// Only meaningful on a worker-side copy; elsewhere it logs a warning
    /// and does nothing.
    pub fn sync(&self) {
        if !self.main_thread
            && self.primary
            && let Some(agent) = self.agent_link()
        {
            agent.sync();
            return;
        }
        tracing::warn!(target: targets::FACADE, "List sync() can only be called from a WorkerScript");
    }
}

impl ItemModel for ListModel {
    fn row_count(&self) -> usize {
        self.count()
    }

    fn data(&self, row: usize, role: usize) -> Value {
        ListModel::data(self, row, role)
    }

    fn role_names(&self) -> BTreeMap<usize, String> {
        ListModel::role_names(self)
    }

    fn signals(&self) -> &ModelSignals {
        &self.signals
    }

    fn set_data(&self, row: usize, role: usize, value: Value) -> bool {
        match ListModel::role_names(self).get(&role) {
            Some(name) => self.set_property_checked(row_arg(row), name, value),
            None => false,
        }
    }
}

impl std::fmt::Debug for ListModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListModel")
            .field("main_thread", &self.main_thread)
            .field("primary", &self.primary)
            .field("dynamic_roles", &self.dynamic_roles())
            .finish_non_exhaustive()
    }
}

impl Drop for ListModel {
    fn drop(&mut self) {
        if !self.primary {
            return;
        }
        self.dynamic.get_mut().clear();
        if let ModelRef::Owned(model) = &self.model {
            model.lock().destroy();
        }
        if self.main_thread
            && let AgentLink::Owned(agent) = self.agent.get_mut()
        {
            agent.model_destroyed();
        }
    }
}
