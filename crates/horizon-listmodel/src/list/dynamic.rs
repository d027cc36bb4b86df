//! Dynamic-schema tables.
//!
//! With dynamic roles a row is a free-form property bag: nothing pins a
//! column's type, and a row may simply lack a column other rows have. The
//! table keeps an append-only list of every column name seen so far, which
//! is what views enumerate as role names.
//!
//! A [`DynamicRowNode`] is its own proxy object. List values become nested
//! dynamic facades owned by the row.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use horizon_listmodel_core::logging::{span_names, targets};
use horizon_listmodel_core::{Signal, Uid};
use parking_lot::RwLock;

use super::facade::ListModel;
use super::proxy::{PropertyNotice, RowProxy};
use super::table::{SyncTargets, record_of};
use crate::value::{Value, ValueMap};

/// Rows and column names of a dynamic-schema table.
pub(crate) struct DynamicStore {
    pub(crate) uid: Uid,
    pub(crate) roles: Vec<String>,
    pub(crate) nodes: Vec<Arc<DynamicRowNode>>,
}

impl DynamicStore {
    pub(crate) fn new(uid: Uid) -> Self {
        Self {
            uid,
            roles: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Index of `name`, registering it as a new column if unseen.
    pub(crate) fn role_index_or_create(roles: &mut Vec<String>, name: &str) -> usize {
        match roles.iter().position(|r| r == name) {
            Some(index) => index,
            None => {
                roles.push(name.to_string());
                roles.len() - 1
            }
        }
    }

    pub(crate) fn index_of(&self, node: &DynamicRowNode) -> Option<usize> {
        self.nodes.iter().position(|n| std::ptr::eq(n.as_ref(), node))
    }

    /// Drops every row, detaching the nodes from the table.
    pub(crate) fn clear(&mut self) {
        for node in self.nodes.drain(..) {
            node.detach();
        }
    }

    pub(crate) fn remove(&mut self, index: usize, count: usize) {
        for node in self.nodes.drain(index..index + count) {
            node.detach();
        }
    }

    /// Moves `n` rows starting at `from` so they start at `to`.
    pub(crate) fn move_rows(&mut self, from: usize, to: usize, n: usize) {
        let (from, to, n) = if from > to { (to, to + n, from - to) } else { (from, to, n) };
        self.nodes[from..to + n].rotate_left(n);
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::List(
            self.nodes
                .iter()
                .map(|node| Value::Map(node.plain_values()))
                .collect(),
        )
    }
}

/// Builds a nested dynamic table from literal records.
pub(crate) fn build_nested(owner: &ListModel, items: &[Value]) -> Arc<ListModel> {
    let nested = ListModel::create_with_owner(owner);
    {
        let mut store = nested.dynamic_store().lock();
        let DynamicStore { roles, nodes, .. } = &mut *store;
        for item in items {
            nodes.push(DynamicRowNode::create(&nested, &record_of(item), roles));
        }
    }
    nested
}

/// One row of a dynamic-schema table, doubling as its proxy object.
pub struct DynamicRowNode {
    uid: Uid,
    owner: Weak<ListModel>,
    values: RwLock<ValueMap>,
    updates_enabled: AtomicBool,
    detached: AtomicBool,
    property_changed: Signal<(String, Value)>,
}

impl DynamicRowNode {
    pub(crate) fn new(owner: Weak<ListModel>, uid: Uid) -> Self {
        Self {
            uid,
            owner,
            values: RwLock::new(ValueMap::new()),
            updates_enabled: AtomicBool::new(true),
            detached: AtomicBool::new(false),
            property_changed: Signal::new(),
        }
    }

    /// Creates a populated row for `owner`.
    pub(crate) fn create(owner: &ListModel, record: &ValueMap, roles: &mut Vec<String>) -> Arc<Self> {
        let node = Arc::new(Self::new(owner.downgrade_self(), owner.uid_generator().next_uid()));
        node.update_values(owner, record, roles, &mut Vec::new());
        node
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.updates_enabled.store(false, Ordering::Release);
    }

    /// Returns `true` once the row has been removed from its table.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Converts an incoming value to its stored form.
    fn stored_form(owner: &ListModel, value: Value) -> Value {
        match value {
            Value::List(items) => Value::Model(build_nested(owner, &items)),
            other => other,
        }
    }

    /// Writes `value` under `name`, returning `true` if it changed.
    fn put(&self, name: &str, value: Value) -> bool {
        let previous = self.values.write().insert(name, value.clone());
        // A replaced nested table is released here, outside the lock.
        previous.is_none_or(|old| old != value)
    }

    /// Merges `record` into the row, returning the changed column indices.
    ///
    /// Unseen names are registered in `roles`; list values become nested
    /// dynamic tables.
    pub(crate) fn update_values(
        self: &Arc<Self>,
        owner: &ListModel,
        record: &ValueMap,
        roles: &mut Vec<String>,
        notices: &mut Vec<PropertyNotice>,
    ) -> Vec<usize> {
        let mut changed = Vec::new();
        for (name, value) in record {
            let role_index = DynamicStore::role_index_or_create(roles, name);
            let value = Self::stored_form(owner, value.clone());
            if self.put(name, value.clone()) {
                changed.push(role_index);
                let proxy: Arc<dyn RowProxy> = self.clone();
                notices.push(PropertyNotice::new(proxy, name, value));
            }
        }
        changed
    }

    /// Writes one column on behalf of the table, reporting a change.
    pub(crate) fn set_value(self: &Arc<Self>, owner: &ListModel, name: &str, value: Value, notices: &mut Vec<PropertyNotice>) -> bool {
        let value = Self::stored_form(owner, value);
        if self.put(name, value.clone()) {
            let proxy: Arc<dyn RowProxy> = self.clone();
            notices.push(PropertyNotice::new(proxy, name, value));
            true
        } else {
            false
        }
    }

    /// Reads a column; nested tables are returned as their facades.
    pub fn value(&self, name: &str) -> Value {
        self.values.read().get(name).cloned().unwrap_or_default()
    }

    /// Reads every column, nested tables as record lists.
    pub(crate) fn plain_values(&self) -> ValueMap {
        self.values
            .read()
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::Model(model) => model.to_value(),
                    other => other.clone(),
                };
                (name, value)
            })
            .collect()
    }

    /// Copies every column of `src` into `target`.
    ///
    /// Nested tables are merged into the target's existing nested facade
    /// (or a new one owned by `target_owner`), so their identity and proxies
    /// survive. A nested table only the target has is released.
    pub(crate) fn sync(
        src: &DynamicRowNode,
        target: &Arc<DynamicRowNode>,
        target_owner: &ListModel,
        mut targets_by_uid: Option<&mut SyncTargets>,
        notices: &mut Vec<PropertyNotice>,
    ) {
        let src_values = src.values.read().clone();
        for (name, value) in src_values {
            let value = match value {
                Value::Model(src_model) => {
                    let target_model = match target.value(&name) {
                        Value::Model(existing) => existing,
                        _ => ListModel::create_with_owner(target_owner),
                    };
                    sync(&src_model, &target_model, targets_by_uid.as_deref_mut(), notices);
                    Value::Model(target_model)
                }
                other => other,
            };
            let force = value.as_model().is_some();
            if target.put(&name, value.clone()) || force {
                let proxy: Arc<dyn RowProxy> = target.clone();
                notices.push(PropertyNotice::new(proxy, name, value));
            }
        }
    }
}

impl RowProxy for DynamicRowNode {
    fn uid(&self) -> Uid {
        self.uid
    }

    fn row(&self) -> Option<usize> {
        if self.is_detached() {
            return None;
        }
        self.owner.upgrade()?.dynamic_store().lock().index_of(self)
    }

    fn get(&self, name: &str) -> Value {
        self.value(name)
    }

    fn set(&self, name: &str, value: Value) -> bool {
        if !self.values.read().contains_key(name) {
            return false;
        }
        let owner = self.owner.upgrade();
        let value = match (value, &owner) {
            (Value::List(items), Some(owner)) => Value::Model(build_nested(owner, &items)),
            (Value::Model(model), Some(owner)) => match model.to_value() {
                Value::List(items) => Value::Model(build_nested(owner, &items)),
                other => other,
            },
            (value, _) => value,
        };

        if !self.put(name, value.clone()) {
            return true;
        }
        self.property_changed.emit((name.to_string(), value));

        if self.updates_enabled.load(Ordering::Acquire)
            && let Some(owner) = owner
        {
            owner.dynamic_node_written(self, name);
        }
        true
    }

    fn property_names(&self) -> Vec<String> {
        self.values.read().keys().map(str::to_string).collect()
    }

    fn property_changed(&self) -> &Signal<(String, Value)> {
        &self.property_changed
    }
}

impl std::fmt::Debug for DynamicRowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicRowNode")
            .field("uid", &self.uid)
            .field("properties", &self.property_names())
            .finish()
    }
}

/// Reconciles the dynamic table behind `target` with the one behind `src`.
///
/// Same contract as the static merge: `target` takes `src`'s uid, column
/// list, rows (matched by row uid) and values. Every target facade reached
/// is recorded in `targets_by_uid`.
pub(crate) fn sync(
    src: &ListModel,
    target: &Arc<ListModel>,
    mut targets_by_uid: Option<&mut SyncTargets>,
    notices: &mut Vec<PropertyNotice>,
) {
    let src_store = src.dynamic_store().lock();
    let _span = tracing::debug_span!(
        target: targets::DYNAMIC,
        span_names::SYNC,
        uid = src_store.uid,
        rows = src_store.nodes.len()
    )
    .entered();

    let mut target_store = target.dynamic_store().lock();
    target_store.uid = src_store.uid;
    if let Some(map) = targets_by_uid.as_deref_mut() {
        map.insert(target_store.uid, target.clone());
    }
    target_store.roles = src_store.roles.clone();

    let mut by_uid: HashMap<Uid, (bool, Option<Arc<DynamicRowNode>>)> = HashMap::new();
    for node in target_store.nodes.drain(..) {
        by_uid.insert(node.uid, (false, Some(node)));
    }
    for node in &src_store.nodes {
        by_uid.entry(node.uid).or_insert((false, None)).0 = true;
    }
    by_uid.retain(|_, (in_src, node)| {
        if !*in_src && let Some(gone) = node.take() {
            gone.detach();
        }
        *in_src
    });

    for src_node in &src_store.nodes {
        let node = by_uid
            .get_mut(&src_node.uid)
            .and_then(|(_, node)| node.take())
            .unwrap_or_else(|| Arc::new(DynamicRowNode::new(Arc::downgrade(target), src_node.uid)));
        DynamicRowNode::sync(src_node, &node, target, targets_by_uid.as_deref_mut(), notices);
        target_store.nodes.push(node);
    }

    tracing::debug!(
        target: targets::DYNAMIC,
        uid = target_store.uid,
        count = target_store.nodes.len(),
        "merged dynamic table"
    );
}
