//! Static-schema tables.
//!
//! A [`Model`] is an ordered sequence of [`Element`] rows sharing one
//! [`Layout`]. Row order is positional; row identity is the element uid,
//! which survives structural changes and cross-thread merges.
//!
//! The table never emits notifications itself. Operations that touch live
//! proxy objects push [`PropertyNotice`]s for the facade to deliver once
//! every lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use horizon_listmodel_core::logging::{span_names, targets};
use horizon_listmodel_core::{Uid, UidGenerator};
use parking_lot::Mutex;

use super::element::Element;
use super::facade::{ListModel, ModelContext};
use super::layout::{Layout, LayoutRef, Role, RoleType};
use super::proxy::{PropertyNotice, RowObject};
use crate::value::{Value, ValueMap};

/// A table shared between its owner row (or facade) and nested facades.
pub(crate) type SharedModel = Arc<Mutex<Model>>;

/// Facades reached during a merge, keyed by table uid.
pub(crate) type SyncTargets = HashMap<Uid, Arc<ListModel>>;

/// The record a literal list item stands for.
///
/// Maps are taken as they are; any other item becomes an empty row.
pub(crate) fn record_of(item: &Value) -> ValueMap {
    match item {
        Value::Map(map) => map.clone(),
        _ => ValueMap::new(),
    }
}

/// An ordered collection of rows sharing one layout.
pub(crate) struct Model {
    uid: Uid,
    layout: LayoutRef,
    elements: Vec<Element>,
    uids: UidGenerator,
    /// Facade over this table when it is nested in another table's row.
    facade: Option<Arc<ListModel>>,
}

impl Model {
    pub(crate) fn new(layout: LayoutRef, uids: UidGenerator, uid: Option<Uid>) -> Self {
        let uid = uid.unwrap_or_else(|| uids.next_uid());
        Self {
            uid,
            layout,
            elements: Vec::new(),
            uids,
            facade: None,
        }
    }

    pub(crate) fn new_shared(layout: LayoutRef, uids: UidGenerator, uid: Option<Uid>) -> SharedModel {
        Arc::new(Mutex::new(Self::new(layout, uids, uid)))
    }

    pub(crate) fn uid(&self) -> Uid {
        self.uid
    }

    pub(crate) fn layout(&self) -> &LayoutRef {
        &self.layout
    }

    pub(crate) fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn element_uid(&self, index: usize) -> Option<Uid> {
        self.elements.get(index).map(Element::uid)
    }

    pub(crate) fn role_count(&self) -> usize {
        self.layout.read().role_count()
    }

    pub(crate) fn role_at(&self, index: usize) -> Option<Role> {
        self.layout.read().role_at(index).cloned()
    }

    pub(crate) fn existing_role(&self, name: &str) -> Option<Role> {
        self.layout.read().get_existing_role(name).cloned()
    }

    fn roles(&self) -> Vec<Role> {
        self.layout.read().roles().to_vec()
    }

    /// Returns the facade of a nested table, creating and caching it.
    pub(crate) fn facade_for(model: &SharedModel, ctx: &ModelContext) -> Arc<ListModel> {
        let mut guard = model.lock();
        if let Some(facade) = &guard.facade {
            return facade.clone();
        }
        let facade = ListModel::new_nested(ctx, Arc::downgrade(model));
        guard.facade = Some(facade.clone());
        facade
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    pub(crate) fn append_element(&mut self) -> usize {
        let index = self.elements.len();
        self.elements.push(Element::new(self.uids.next_uid()));
        index
    }

    pub(crate) fn insert_element(&mut self, index: usize) {
        self.elements.insert(index, Element::new(self.uids.next_uid()));
        self.update_cache_indices();
    }

    /// Appends a row populated from `record`, returning its index.
    pub(crate) fn append_record(&mut self, record: &ValueMap) -> usize {
        let index = self.append_element();
        self.set_fast(index, record);
        index
    }

    /// Inserts a row populated from `record` at `index`.
    pub(crate) fn insert_record(&mut self, index: usize, record: &ValueMap) {
        self.insert_element(index);
        self.set_fast(index, record);
    }

    pub(crate) fn remove(&mut self, index: usize, count: usize) {
        for mut element in self.elements.drain(index..index + count) {
            element.destroy();
        }
        self.update_cache_indices();
        tracing::trace!(target: targets::TABLE, uid = self.uid, index, count, "removed rows");
    }

    pub(crate) fn clear(&mut self) {
        for mut element in self.elements.drain(..) {
            element.destroy();
        }
    }

    /// Moves `n` rows starting at `from` so they start at `to`.
    ///
    /// A backward move is normalized into the equivalent forward move of the
    /// rows it jumps over; both are a rotation of the affected range.
    pub(crate) fn move_rows(&mut self, from: usize, to: usize, n: usize) {
        let (from, to, n) = if from > to { (to, to + n, from - to) } else { (from, to, n) };
        self.elements[from..to + n].rotate_left(n);
        self.update_cache_indices();
    }

    /// Renumbers live proxy objects after a structural change.
    pub(crate) fn update_cache_indices(&self) {
        for (index, element) in self.elements.iter().enumerate() {
            if let Some(proxy) = &element.proxy {
                proxy.set_row(index);
            }
        }
    }

    /// Tears the table down, including nested tables and the cached facade.
    pub(crate) fn destroy(&mut self) {
        self.clear();
        self.facade = None;
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    pub(crate) fn get_property(&self, index: usize, role_index: usize, ctx: &ModelContext) -> Value {
        match (self.elements.get(index), self.role_at(role_index)) {
            (Some(element), Some(role)) => element.get_property(&role, ctx),
            _ => Value::Undefined,
        }
    }

    /// Merges `record` into row `index`, returning the changed role indices.
    ///
    /// Unseen names create roles; a name already bound to another type is
    /// reported by the layout and skipped. Null and undefined clear an
    /// existing column.
    pub(crate) fn set(
        &mut self,
        index: usize,
        record: &ValueMap,
        ctx: &ModelContext,
        notices: &mut Vec<PropertyNotice>,
    ) -> Vec<usize> {
        let mut roles = Vec::new();
        if index >= self.elements.len() {
            return roles;
        }

        for (name, value) in record {
            let changed = if value.is_nullish() {
                self.existing_role(name)
                    .and_then(|role| self.elements[index].clear_property(&role))
            } else {
                let Some(role_type) = RoleType::for_value(value) else {
                    continue;
                };
                let role = self.layout.write().get_role_or_create(name, role_type);
                if role.role_type != role_type {
                    continue;
                }
                self.elements[index].set_value(&role, value, &self.uids)
            };
            if let Some(role_index) = changed {
                roles.push(role_index);
            }
        }

        if !roles.is_empty() {
            self.refresh_proxy(index, Some(&roles), ctx, notices);
        }
        roles
    }

    /// Populates row `index` from `record` without change tracking.
    pub(crate) fn set_fast(&mut self, index: usize, record: &ValueMap) {
        for (name, value) in record {
            if value.is_nullish() {
                if let Some(role) = self.existing_role(name) {
                    self.elements[index].clear_property(&role);
                }
                continue;
            }
            let Some(role_type) = RoleType::for_value(value) else {
                continue;
            };
            let role = self.layout.write().get_role_or_create(name, role_type);
            if role.role_type == role_type {
                self.elements[index].set_value_fast(&role, value, &self.uids);
            }
        }
    }

    /// Writes one column, creating the role if unseen.
    ///
    /// A value of another kind than an existing role is rejected with a
    /// diagnostic and leaves the row untouched.
    pub(crate) fn set_or_create_property(
        &mut self,
        index: usize,
        name: &str,
        value: &Value,
        ctx: &ModelContext,
        notices: &mut Vec<PropertyNotice>,
    ) -> Option<usize> {
        if index >= self.elements.len() {
            return None;
        }

        let changed = if value.is_nullish() {
            match self.existing_role(name) {
                Some(role) => self.elements[index].clear_property(&role),
                None => {
                    tracing::warn!(target: targets::TABLE, "Can't create role for unsupported data type");
                    None
                }
            }
        } else {
            let role = self.layout.write().get_role_or_create_for_value(name, value)?;
            if RoleType::for_value(value) != Some(role.role_type) {
                return None;
            }
            self.elements[index].set_value(&role, value, &self.uids)
        };

        if let Some(role_index) = changed {
            self.refresh_proxy(index, Some(&[role_index]), ctx, notices);
        }
        changed
    }

    /// Writes one column of an existing role, as a proxy object write-back.
    ///
    /// The proxy already holds the written value, so only a replaced nested
    /// table is pushed back into it.
    pub(crate) fn set_existing_property(
        &mut self,
        index: usize,
        name: &str,
        value: &Value,
        ctx: &ModelContext,
        notices: &mut Vec<PropertyNotice>,
    ) -> Option<usize> {
        if index >= self.elements.len() {
            return None;
        }
        let role = self.existing_role(name)?;
        let changed = self.elements[index].set_value_property(&role, value, &self.uids);
        if changed.is_some() && role.role_type == RoleType::List {
            self.refresh_proxy(index, Some(&[role.index]), ctx, notices);
        }
        changed
    }

    /// Returns the proxy object of row `index`, creating it on first use.
    pub(crate) fn get_or_create_model_object(
        &mut self,
        index: usize,
        owner: Weak<ListModel>,
        ctx: &ModelContext,
    ) -> Option<Arc<RowObject>> {
        let element = self.elements.get_mut(index)?;
        if let Some(proxy) = &element.proxy {
            return Some(proxy.clone());
        }

        let proxy = Arc::new(RowObject::new(owner, index, element.uid()));
        element.proxy = Some(proxy.clone());

        let mut initial = Vec::new();
        self.refresh_proxy(index, None, ctx, &mut initial);
        proxy.set_updates_enabled(true);
        Some(proxy)
    }

    /// Pushes storage values into row `index`'s proxy, if it has one.
    ///
    /// With `roles` only those columns are refreshed; otherwise all are.
    pub(crate) fn refresh_proxy(
        &self,
        index: usize,
        roles: Option<&[usize]>,
        ctx: &ModelContext,
        notices: &mut Vec<PropertyNotice>,
    ) {
        let Some(element) = self.elements.get(index) else {
            return;
        };
        let Some(proxy) = element.proxy.clone() else {
            return;
        };

        let roles: Vec<Role> = match roles {
            Some(indices) => {
                let layout = self.layout.read();
                indices
                    .iter()
                    .filter_map(|&i| layout.role_at(i).cloned())
                    .collect()
            }
            None => self.roles(),
        };

        for role in roles {
            let value = element.get_property(&role, ctx);
            proxy.store(&role.name, value, role.role_type == RoleType::List, notices);
        }
    }

    /// Exports the table as a list of records.
    pub(crate) fn to_value(&self) -> Value {
        let roles = self.roles();
        Value::List(
            self.elements
                .iter()
                .map(|element| {
                    let mut record = ValueMap::with_capacity(roles.len());
                    for role in &roles {
                        let value = element.plain_value(role);
                        if !value.is_undefined() {
                            record.insert(role.name.clone(), value);
                        }
                    }
                    Value::Map(record)
                })
                .collect(),
        )
    }

    // -------------------------------------------------------------------------
    // Merge
    // -------------------------------------------------------------------------

    /// Reconciles `target` with `src` by row uid.
    ///
    /// Afterwards `target` has `src`'s table uid, exactly `src`'s rows in
    /// `src`'s order, and `src`'s values. Rows present on both sides keep
    /// their target element and therefore their proxy object; rows only in
    /// `target` are destroyed before anything else happens. Every facade of
    /// a target table reached on the way is recorded in `targets_by_uid`.
    pub(crate) fn sync(
        src: &Model,
        target: &mut Model,
        mut targets_by_uid: Option<&mut SyncTargets>,
        notices: &mut Vec<PropertyNotice>,
        ctx: &ModelContext,
    ) {
        let _span = tracing::debug_span!(
            target: targets::TABLE,
            span_names::SYNC,
            uid = src.uid,
            rows = src.elements.len()
        )
        .entered();

        target.uid = src.uid;
        if let (Some(map), Some(facade)) = (targets_by_uid.as_deref_mut(), &target.facade) {
            map.insert(target.uid, facade.clone());
        }

        let mut by_uid: HashMap<Uid, (bool, Option<Element>)> = HashMap::new();
        for element in target.elements.drain(..) {
            by_uid.insert(element.uid(), (false, Some(element)));
        }
        for element in &src.elements {
            by_uid.entry(element.uid()).or_insert((false, None)).0 = true;
        }

        let mut removed = 0usize;
        by_uid.retain(|_, (in_src, element)| {
            if !*in_src && let Some(mut gone) = element.take() {
                gone.destroy();
                removed += 1;
            }
            *in_src
        });

        if !Arc::ptr_eq(&src.layout, &target.layout) {
            Layout::sync(&src.layout.read(), &mut target.layout.write());
        }
        let src_roles = src.roles();
        let target_roles = target.roles();

        let mut created = 0usize;
        for src_element in &src.elements {
            let uid = src_element.uid();
            let mut element = match by_uid.get_mut(&uid).and_then(|(_, element)| element.take()) {
                Some(element) => element,
                None => {
                    created += 1;
                    Element::new(uid)
                }
            };
            Element::sync(
                src_element,
                &src_roles,
                &mut element,
                &target_roles,
                targets_by_uid.as_deref_mut(),
                notices,
                ctx,
                &target.uids,
            );
            target.elements.push(element);
        }

        target.update_cache_indices();
        for index in 0..target.elements.len() {
            target.refresh_proxy(index, None, ctx, notices);
        }

        tracing::debug!(
            target: targets::TABLE,
            uid = target.uid,
            count = target.elements.len(),
            removed,
            created,
            "merged table"
        );
    }
}
