//! Per-row proxy objects.
//!
//! [`ListModel::get`](super::ListModel::get) hands out a proxy for a row: an
//! object whose columns are individually observable properties. A proxy is
//! created on first access and then cached on its row, so every caller
//! observes the same object until the row is destroyed.
//!
//! Writes through a proxy land in its own cache first and are then mirrored
//! into row storage. When storage rejects the value (a column type conflict)
//! the cache is restored from storage.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use horizon_listmodel_core::logging::targets;
use horizon_listmodel_core::{Property, Signal, Uid};
use parking_lot::RwLock;

use super::dynamic::DynamicRowNode;
use super::facade::ListModel;
use crate::value::{ObjectHandle, Value};

/// The observable face of one row.
pub trait RowProxy: Send + Sync {
    /// Identity of the row this proxy belongs to.
    fn uid(&self) -> Uid;

    /// Current index of the row, or `None` once the row is gone.
    fn row(&self) -> Option<usize>;

    /// Reads a column. Unknown names read as `Value::Undefined`.
    fn get(&self, name: &str) -> Value;

    /// Writes a column and mirrors it into row storage.
    ///
    /// Returns `false` if the proxy has no such column.
    fn set(&self, name: &str, value: Value) -> bool;

    /// Column names in discovery order.
    fn property_names(&self) -> Vec<String>;

    /// Emitted with `(name, value)` whenever a column value changes.
    fn property_changed(&self) -> &Signal<(String, Value)>;
}

/// A proxy property notification, delivered once storage locks are released.
pub(crate) struct PropertyNotice {
    proxy: Arc<dyn RowProxy>,
    name: String,
    value: Value,
}

impl PropertyNotice {
    pub(crate) fn new(proxy: Arc<dyn RowProxy>, name: impl Into<String>, value: Value) -> Self {
        Self {
            proxy,
            name: name.into(),
            value,
        }
    }

    pub(crate) fn emit(self) {
        self.proxy.property_changed().emit((self.name, self.value));
    }

    /// Delivers every notice in order.
    pub(crate) fn emit_all(notices: Vec<PropertyNotice>) {
        for notice in notices {
            notice.emit();
        }
    }
}

/// Proxy object of a static-schema row.
pub struct RowObject {
    owner: Weak<ListModel>,
    row: AtomicUsize,
    uid: Uid,
    properties: RwLock<Vec<(String, Property<Value>)>>,
    updates_enabled: AtomicBool,
    detached: AtomicBool,
    property_changed: Signal<(String, Value)>,
}

impl RowObject {
    pub(crate) fn new(owner: Weak<ListModel>, row: usize, uid: Uid) -> Self {
        Self {
            owner,
            row: AtomicUsize::new(row),
            uid,
            properties: RwLock::new(Vec::new()),
            updates_enabled: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            property_changed: Signal::new(),
        }
    }

    pub(crate) fn set_row(&self, row: usize) {
        self.row.store(row, Ordering::Release);
    }

    /// Cuts the proxy off from its row; later writes stay local.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub(crate) fn set_updates_enabled(&self, enabled: bool) {
        self.updates_enabled.store(enabled, Ordering::Release);
    }

    /// Returns `true` once the row behind this proxy has been destroyed.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Caches a storage value, queueing a notice if it changed.
    ///
    /// `force` queues a notice even for an equal value; nested tables use it
    /// because their content can change behind an unchanged facade.
    pub(crate) fn store(self: &Arc<Self>, name: &str, value: Value, force: bool, notices: &mut Vec<PropertyNotice>) {
        let changed = {
            let mut properties = self.properties.write();
            match properties.iter().position(|(n, _)| n == name) {
                Some(index) => properties[index].1.set(value.clone()),
                None => {
                    properties.push((name.to_string(), Property::new(value.clone())));
                    true
                }
            }
        };
        if changed || force {
            let proxy: Arc<dyn RowProxy> = self.clone();
            notices.push(PropertyNotice::new(proxy, name, value));
        }
    }

    fn cached(&self, name: &str) -> Option<Value> {
        self.properties
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, property)| property.get())
    }

    fn overwrite(&self, name: &str, value: Value) -> bool {
        let properties = self.properties.read();
        match properties.iter().find(|(n, _)| n == name) {
            Some((_, property)) => property.set(value),
            None => false,
        }
    }
}

impl RowProxy for RowObject {
    fn uid(&self) -> Uid {
        self.uid
    }

    fn row(&self) -> Option<usize> {
        (!self.is_detached()).then(|| self.row.load(Ordering::Acquire))
    }

    fn get(&self, name: &str) -> Value {
        self.cached(name).unwrap_or_default()
    }

    fn set(&self, name: &str, value: Value) -> bool {
        if self.cached(name).is_none() {
            return false;
        }
        if self.overwrite(name, value.clone()) {
            self.property_changed.emit((name.to_string(), value.clone()));
        }

        if !self.updates_enabled.load(Ordering::Acquire) || self.is_detached() {
            return true;
        }
        let Some(owner) = self.owner.upgrade() else {
            return true;
        };
        let row = self.row.load(Ordering::Acquire);
        if !owner.set_existing_property(row, name, value) {
            // Storage kept its value (unchanged or rejected); resync the cache.
            let stored = owner.property_value(row, name);
            if self.overwrite(name, stored.clone()) {
                tracing::trace!(target: targets::PROXY, row, name, "restored proxy value from storage");
                self.property_changed.emit((name.to_string(), stored));
            }
        }
        true
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.read().iter().map(|(n, _)| n.clone()).collect()
    }

    fn property_changed(&self) -> &Signal<(String, Value)> {
        &self.property_changed
    }
}

impl std::fmt::Debug for RowObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowObject")
            .field("uid", &self.uid)
            .field("row", &self.row())
            .field("properties", &self.property_names())
            .finish()
    }
}

/// A row proxy of either storage kind.
#[derive(Clone, Debug)]
pub enum RowRef {
    /// Proxy of a static-schema row.
    Static(Arc<RowObject>),
    /// Row node of a dynamic-schema table, which is its own proxy.
    Dynamic(Arc<DynamicRowNode>),
}

impl RowRef {
    /// Returns `true` if both refer to the same proxy object.
    pub fn ptr_eq(&self, other: &RowRef) -> bool {
        match (self, other) {
            (RowRef::Static(a), RowRef::Static(b)) => Arc::ptr_eq(a, b),
            (RowRef::Dynamic(a), RowRef::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Wraps the proxy as an object handle, keeping its identity.
    pub fn to_object(&self) -> ObjectHandle {
        match self {
            RowRef::Static(row) => ObjectHandle::from_arc(row.clone()),
            RowRef::Dynamic(node) => ObjectHandle::from_arc(node.clone()),
        }
    }
}

impl Deref for RowRef {
    type Target = dyn RowProxy;

    fn deref(&self) -> &Self::Target {
        match self {
            RowRef::Static(row) => row.as_ref(),
            RowRef::Dynamic(node) => node.as_ref(),
        }
    }
}
