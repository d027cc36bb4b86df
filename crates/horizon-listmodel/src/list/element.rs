//! Row storage for static-schema tables.
//!
//! An [`Element`] keeps one row's values in a vector of fixed-size byte
//! blocks laid out by the table's [`Layout`](super::layout::Layout).
//! Numbers and booleans live directly in their slot. Every other type
//! stores a 4-byte handle into the row's value heap, with `0` meaning
//! "absent". A slot that was never written therefore reads as absent for
//! strings, lists, objects, maps and timestamps, and as `0` / `false` for
//! numbers and booleans.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use horizon_listmodel_core::logging::targets;
use horizon_listmodel_core::{Uid, UidGenerator};
use static_assertions::const_assert;

use super::facade::ModelContext;
use super::layout::{Layout, Role, RoleType};
use super::proxy::{PropertyNotice, RowObject};
use super::table::{Model, SharedModel, SyncTargets, record_of};
use crate::value::{ObjectGuard, Value, ValueMap};

/// Size of one storage block.
///
/// A block plus the row's bookkeeping fits a 64-byte allocation.
pub const BLOCK_SIZE: usize = 64 - size_of::<u32>() - 2 * size_of::<usize>();

const_assert!(BLOCK_SIZE >= size_of::<f64>());

#[derive(Clone)]
struct Block {
    bytes: [u8; BLOCK_SIZE],
}

impl Block {
    const EMPTY: Block = Block {
        bytes: [0; BLOCK_SIZE],
    };
}

/// A column value in storage form.
#[derive(Clone)]
pub(crate) enum Cell {
    String(String),
    Number(f64),
    Bool(bool),
    List(SharedModel),
    Object(ObjectGuard),
    Map(ValueMap),
    DateTime(DateTime<Utc>),
}

impl Cell {
    fn role_type(&self) -> RoleType {
        match self {
            Cell::String(_) => RoleType::String,
            Cell::Number(_) => RoleType::Number,
            Cell::Bool(_) => RoleType::Bool,
            Cell::List(_) => RoleType::List,
            Cell::Object(_) => RoleType::ObjectReference,
            Cell::Map(_) => RoleType::KeyValueMap,
            Cell::DateTime(_) => RoleType::DateTime,
        }
    }

    /// The value a cleared column holds.
    fn empty(role_type: RoleType) -> Option<Cell> {
        match role_type {
            RoleType::String => Some(Cell::String(String::new())),
            RoleType::Number => Some(Cell::Number(0.0)),
            RoleType::Bool => Some(Cell::Bool(false)),
            RoleType::KeyValueMap => Some(Cell::Map(ValueMap::new())),
            RoleType::List | RoleType::ObjectReference | RoleType::DateTime => None,
        }
    }
}

/// Outcome of converting a value for a role.
enum Assign {
    Set(Cell),
    Clear,
    Mismatch,
}

/// One row of a static-schema table.
pub(crate) struct Element {
    uid: Uid,
    blocks: Vec<Block>,
    heap: Vec<Option<Cell>>,
    free: Vec<usize>,
    pub(crate) proxy: Option<Arc<RowObject>>,
}

impl Element {
    pub(crate) fn new(uid: Uid) -> Self {
        Self {
            uid,
            blocks: Vec::new(),
            heap: Vec::new(),
            free: Vec::new(),
            proxy: None,
        }
    }

    pub(crate) fn uid(&self) -> Uid {
        self.uid
    }

    // -------------------------------------------------------------------------
    // Slot addressing
    // -------------------------------------------------------------------------

    fn slot(&self, role: &Role) -> Option<&[u8]> {
        let block = self.blocks.get(role.block_index)?;
        Some(&block.bytes[role.block_offset..role.block_offset + role.role_type.slot_size()])
    }

    /// Returns the slot for `role`, allocating blocks up to it.
    fn slot_mut(&mut self, role: &Role) -> &mut [u8] {
        if self.blocks.len() <= role.block_index {
            self.blocks.resize(role.block_index + 1, Block::EMPTY);
        }
        let size = role.role_type.slot_size();
        &mut self.blocks[role.block_index].bytes[role.block_offset..role.block_offset + size]
    }

    fn heap_index(&self, role: &Role) -> Option<usize> {
        let bytes: [u8; 4] = self.slot(role)?.try_into().ok()?;
        match u32::from_le_bytes(bytes) {
            0 => None,
            handle => Some(handle as usize - 1),
        }
    }

    fn set_heap_index(&mut self, role: &Role, index: Option<usize>) {
        let handle = index.map_or(0, |i| i as u32 + 1);
        self.slot_mut(role).copy_from_slice(&handle.to_le_bytes());
    }

    // -------------------------------------------------------------------------
    // Typed access
    // -------------------------------------------------------------------------

    /// Reads the cell for `role`. `None` means absent.
    pub(crate) fn cell(&self, role: &Role) -> Option<Cell> {
        match role.role_type {
            RoleType::Number => {
                let value = self
                    .slot(role)
                    .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                    .map_or(0.0, f64::from_le_bytes);
                Some(Cell::Number(value))
            }
            RoleType::Bool => Some(Cell::Bool(self.slot(role).is_some_and(|b| b[0] != 0))),
            _ => self
                .heap_index(role)
                .and_then(|index| self.heap.get(index))
                .and_then(Clone::clone),
        }
    }

    fn nested(&self, role: &Role) -> Option<SharedModel> {
        match self.cell(role) {
            Some(Cell::List(model)) => Some(model),
            _ => None,
        }
    }

    /// Writes `cell` unconditionally, returning the previous cell.
    fn replace_cell(&mut self, role: &Role, cell: Option<Cell>) -> Option<Cell> {
        let previous = self.cell(role);
        match (role.role_type, cell) {
            (RoleType::Number, cell) => {
                let value = match cell {
                    Some(Cell::Number(n)) => n,
                    _ => 0.0,
                };
                self.slot_mut(role).copy_from_slice(&value.to_le_bytes());
            }
            (RoleType::Bool, cell) => {
                let value = matches!(cell, Some(Cell::Bool(true)));
                self.slot_mut(role)[0] = u8::from(value);
            }
            (_, Some(cell)) => match self.heap_index(role) {
                Some(index) => self.heap[index] = Some(cell),
                None => {
                    let index = match self.free.pop() {
                        Some(index) => {
                            self.heap[index] = Some(cell);
                            index
                        }
                        None => {
                            self.heap.push(Some(cell));
                            self.heap.len() - 1
                        }
                    };
                    self.set_heap_index(role, Some(index));
                }
            },
            (_, None) => {
                if let Some(index) = self.heap_index(role) {
                    self.heap[index] = None;
                    self.free.push(index);
                    self.set_heap_index(role, None);
                }
            }
        }
        previous
    }

    /// Writes `cell` without change detection.
    ///
    /// Used for freshly created rows and merges. A replaced nested table is
    /// torn down.
    pub(crate) fn set_cell_fast(&mut self, role: &Role, cell: Option<Cell>) {
        if cell.as_ref().is_some_and(|c| c.role_type() != role.role_type) {
            return;
        }
        if let Some(Cell::List(old)) = self.replace_cell(role, cell) {
            old.lock().destroy();
        }
    }

    /// Writes `cell`, returning the role index if the stored value changed.
    ///
    /// A cell of another type is rejected and reported as unchanged.
    /// Writing a nested table always counts as a change.
    pub(crate) fn set_cell(&mut self, role: &Role, cell: Option<Cell>) -> Option<usize> {
        if cell.as_ref().is_some_and(|c| c.role_type() != role.role_type) {
            return None;
        }

        let changed = match (self.cell(role), &cell) {
            (None, None) => false,
            (Some(Cell::String(old)), Some(Cell::String(new))) => old != *new,
            (Some(Cell::Number(old)), Some(Cell::Number(new))) => old != *new,
            (Some(Cell::Bool(old)), Some(Cell::Bool(new))) => old != *new,
            (Some(Cell::Object(old)), Some(Cell::Object(new))) => !old.ptr_eq(new),
            (Some(Cell::Map(old)), Some(Cell::Map(new))) => old != *new,
            (Some(Cell::DateTime(old)), Some(Cell::DateTime(new))) => old != *new,
            _ => true,
        };

        if changed {
            self.set_cell_fast(role, cell);
            Some(role.index)
        } else {
            None
        }
    }

    /// Resets `role` to its type's empty value.
    pub(crate) fn clear_property(&mut self, role: &Role) -> Option<usize> {
        self.set_cell(role, Cell::empty(role.role_type))
    }

    // -------------------------------------------------------------------------
    // Value conversion
    // -------------------------------------------------------------------------

    /// Converts `value` for `role`, dispatching on the role's declared type.
    fn assign_for(role: &Role, value: &Value, uids: &UidGenerator) -> Assign {
        match (role.role_type, value) {
            (_, Value::Undefined | Value::Null) => Assign::Clear,
            (RoleType::String, Value::String(s)) => Assign::Set(Cell::String(s.clone())),
            (RoleType::Number, Value::Number(n)) => Assign::Set(Cell::Number(*n)),
            (RoleType::Bool, Value::Bool(b)) => Assign::Set(Cell::Bool(*b)),
            (RoleType::List, Value::List(items)) => Assign::Set(Cell::List(Self::build_nested(role, items, uids))),
            (RoleType::List, Value::Model(model)) => match model.to_value() {
                Value::List(items) => Assign::Set(Cell::List(Self::build_nested(role, &items, uids))),
                _ => Assign::Mismatch,
            },
            (RoleType::ObjectReference, Value::Object(handle)) => Assign::Set(Cell::Object(handle.downgrade())),
            (RoleType::KeyValueMap, Value::Map(map)) => Assign::Set(Cell::Map(map.clone())),
            (RoleType::DateTime, Value::DateTime(dt)) => Assign::Set(Cell::DateTime(*dt)),
            _ => Assign::Mismatch,
        }
    }

    /// Builds a nested table for a `List` role from literal records.
    fn build_nested(role: &Role, items: &[Value], uids: &UidGenerator) -> SharedModel {
        let layout = role.sub_layout.clone().unwrap_or_else(Layout::new_ref);
        let nested = Model::new_shared(layout, uids.clone(), None);
        {
            let mut model = nested.lock();
            for item in items {
                model.append_record(&record_of(item));
            }
        }
        nested
    }

    /// Writes `value` with change detection.
    ///
    /// A value whose kind differs from the role's type is ignored without a
    /// diagnostic; the caller already reported the conflict.
    pub(crate) fn set_value(&mut self, role: &Role, value: &Value, uids: &UidGenerator) -> Option<usize> {
        match Self::assign_for(role, value, uids) {
            Assign::Set(cell) => self.set_cell(role, Some(cell)),
            Assign::Clear => self.clear_property(role),
            Assign::Mismatch => None,
        }
    }

    /// Writes `value` with change detection, logging a type conflict.
    pub(crate) fn set_value_property(&mut self, role: &Role, value: &Value, uids: &UidGenerator) -> Option<usize> {
        match Self::assign_for(role, value, uids) {
            Assign::Set(cell) => self.set_cell(role, Some(cell)),
            Assign::Clear => self.clear_property(role),
            Assign::Mismatch => {
                let new_type = RoleType::for_value(value).map_or(value.type_name(), RoleType::name);
                tracing::warn!(
                    target: targets::ELEMENT,
                    "Can't assign to existing role '{}' of different type [{} -> {}]",
                    role.name,
                    role.role_type.name(),
                    new_type
                );
                None
            }
        }
    }

    /// Writes `value` without change detection.
    pub(crate) fn set_value_fast(&mut self, role: &Role, value: &Value, uids: &UidGenerator) {
        match Self::assign_for(role, value, uids) {
            Assign::Set(cell) => self.set_cell_fast(role, Some(cell)),
            Assign::Clear => self.set_cell_fast(role, Cell::empty(role.role_type)),
            Assign::Mismatch => {}
        }
    }

    /// Reads `role` as a script value.
    ///
    /// A nested table is returned as its (cached) facade.
    pub(crate) fn get_property(&self, role: &Role, ctx: &ModelContext) -> Value {
        match self.cell(role) {
            None => Value::Undefined,
            Some(Cell::String(s)) => Value::String(s),
            Some(Cell::Number(n)) => Value::Number(n),
            Some(Cell::Bool(b)) => Value::Bool(b),
            Some(Cell::List(model)) => Value::Model(Model::facade_for(&model, ctx)),
            Some(Cell::Object(guard)) => guard.upgrade().map_or(Value::Null, Value::Object),
            Some(Cell::Map(map)) => Value::Map(map),
            Some(Cell::DateTime(dt)) => Value::DateTime(dt),
        }
    }

    /// Reads `role` as a detached value; nested tables become record lists.
    pub(crate) fn plain_value(&self, role: &Role) -> Value {
        match self.cell(role) {
            Some(Cell::List(model)) => model.lock().to_value(),
            Some(Cell::Object(guard)) => guard.upgrade().map_or(Value::Null, Value::Object),
            Some(Cell::String(s)) => Value::String(s),
            Some(Cell::Number(n)) => Value::Number(n),
            Some(Cell::Bool(b)) => Value::Bool(b),
            Some(Cell::Map(map)) => Value::Map(map),
            Some(Cell::DateTime(dt)) => Value::DateTime(dt),
            None => Value::Undefined,
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Tears the row down: nested tables are destroyed recursively and the
    /// proxy object is detached from the table.
    pub(crate) fn destroy(&mut self) {
        for cell in self.heap.drain(..).flatten() {
            if let Cell::List(model) = cell {
                model.lock().destroy();
            }
        }
        self.free.clear();
        self.blocks.clear();
        if let Some(proxy) = self.proxy.take() {
            proxy.detach();
        }
    }

    /// Copies every role common to both layouts from `src` into `target`.
    ///
    /// Role indices are aligned because the layouts were synced first.
    /// Nested tables are merged recursively; object references are copied
    /// as references.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn sync(
        src: &Element,
        src_roles: &[Role],
        target: &mut Element,
        target_roles: &[Role],
        mut targets_by_uid: Option<&mut SyncTargets>,
        notices: &mut Vec<PropertyNotice>,
        ctx: &ModelContext,
        uids: &UidGenerator,
    ) {
        for (src_role, target_role) in src_roles.iter().zip(target_roles) {
            if src_role.role_type != target_role.role_type {
                continue;
            }
            if src_role.role_type != RoleType::List {
                target.set_cell_fast(target_role, src.cell(src_role));
                continue;
            }

            match src.nested(src_role) {
                Some(src_model) => {
                    let src_model = src_model.lock();
                    let target_model = match target.nested(target_role) {
                        Some(existing) => existing,
                        None => {
                            let layout = target_role
                                .sub_layout
                                .clone()
                                .unwrap_or_else(Layout::new_ref);
                            let created = Model::new_shared(layout, uids.clone(), Some(src_model.uid()));
                            target.set_cell_fast(target_role, Some(Cell::List(created.clone())));
                            created
                        }
                    };
                    Model::sync(
                        &src_model,
                        &mut target_model.lock(),
                        targets_by_uid.as_deref_mut(),
                        notices,
                        ctx,
                    );
                }
                None => {
                    if target.nested(target_role).is_some() {
                        target.set_cell_fast(target_role, None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectHandle;

    fn role(layout: &mut Layout, name: &str, role_type: RoleType) -> Role {
        layout.get_role_or_create(name, role_type)
    }

    #[test]
    fn test_unwritten_slots_read_absent_or_zero() {
        let mut layout = Layout::new();
        let name = role(&mut layout, "name", RoleType::String);
        let cost = role(&mut layout, "cost", RoleType::Number);
        let flag = role(&mut layout, "flag", RoleType::Bool);
        let when = role(&mut layout, "when", RoleType::DateTime);

        let element = Element::new(1);
        assert!(element.cell(&name).is_none());
        assert!(element.cell(&when).is_none());
        assert!(matches!(element.cell(&cost), Some(Cell::Number(n)) if n == 0.0));
        assert!(matches!(element.cell(&flag), Some(Cell::Bool(false))));
    }

    #[test]
    fn test_change_detection() {
        let mut layout = Layout::new();
        let name = role(&mut layout, "name", RoleType::String);
        let cost = role(&mut layout, "cost", RoleType::Number);
        let uids = UidGenerator::new();

        let mut element = Element::new(1);
        assert_eq!(element.set_value(&name, &Value::from("Apples"), &uids), Some(0));
        assert_eq!(element.set_value(&name, &Value::from("Apples"), &uids), None);
        assert_eq!(element.set_value(&cost, &Value::from(6.5), &uids), Some(1));
        assert_eq!(element.set_value(&cost, &Value::from(6.5), &uids), None);

        // A string into a number column is rejected.
        assert_eq!(element.set_value_property(&cost, &Value::from("x"), &uids), None);
        assert!(matches!(element.cell(&cost), Some(Cell::Number(n)) if n == 6.5));
    }

    #[test]
    fn test_clear_property_resets_to_empty() {
        let mut layout = Layout::new();
        let name = role(&mut layout, "name", RoleType::String);
        let meta = role(&mut layout, "meta", RoleType::KeyValueMap);
        let uids = UidGenerator::new();

        let mut element = Element::new(1);
        element.set_value(&name, &Value::from("x"), &uids);
        element.set_value(&meta, &Value::from(ValueMap::new().with("k", 1)), &uids);

        assert_eq!(element.clear_property(&name), Some(0));
        assert!(matches!(element.cell(&name), Some(Cell::String(s)) if s.is_empty()));
        assert_eq!(element.clear_property(&meta), Some(1));
        assert!(matches!(element.cell(&meta), Some(Cell::Map(m)) if m.is_empty()));
        assert_eq!(element.clear_property(&meta), None);
    }

    #[test]
    fn test_heap_slots_are_reused() {
        let mut layout = Layout::new();
        let a = role(&mut layout, "a", RoleType::String);
        let b = role(&mut layout, "b", RoleType::DateTime);
        let uids = UidGenerator::new();

        let mut element = Element::new(1);
        element.set_value(&a, &Value::from("x"), &uids);
        element.set_value(&b, &Value::from(Utc::now()), &uids);
        element.set_value(&b, &Value::Null, &uids);
        assert_eq!(element.free.len(), 1);
        element.set_value(&b, &Value::from(Utc::now()), &uids);
        assert!(element.free.is_empty());
        assert_eq!(element.heap.len(), 2);
    }

    #[test]
    fn test_object_reference_is_guarded() {
        let mut layout = Layout::new();
        let obj = role(&mut layout, "obj", RoleType::ObjectReference);
        let uids = UidGenerator::new();
        let ctx = ModelContext::detached(uids.clone());

        let handle = ObjectHandle::new(7u32);
        let mut element = Element::new(1);
        assert_eq!(element.set_value(&obj, &Value::from(handle.clone()), &uids), Some(0));
        assert_eq!(element.set_value(&obj, &Value::from(handle.clone()), &uids), None);
        assert_eq!(element.get_property(&obj, &ctx), Value::Object(handle.clone()));

        drop(handle);
        assert_eq!(element.get_property(&obj, &ctx), Value::Null);
    }

    #[test]
    fn test_list_values_build_nested_tables() {
        let mut layout = Layout::new();
        let items = role(&mut layout, "items", RoleType::List);
        let uids = UidGenerator::new();

        let mut element = Element::new(1);
        let value = Value::List(vec![
            Value::from(ValueMap::new().with("x", 1)),
            Value::from(ValueMap::new().with("x", 2)),
        ]);
        assert_eq!(element.set_value(&items, &value, &uids), Some(0));
        // Lists always count as changed.
        assert_eq!(element.set_value(&items, &value, &uids), Some(0));

        let exported = element.plain_value(&items);
        assert_eq!(exported.to_json(), serde_json::json!([{"x": 1.0}, {"x": 2.0}]));
    }
}
