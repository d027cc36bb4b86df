//! Row layout registry.
//!
//! A [`Layout`] lists the roles (named, typed columns) discovered for a
//! static-schema table and decides where each role lives inside a row's
//! fixed-size storage blocks. Roles are created on first write, keep their
//! index and type for the lifetime of the layout, and are never removed.

use std::collections::HashMap;
use std::sync::Arc;

use horizon_listmodel_core::logging::targets;
use parking_lot::RwLock;

use super::element::BLOCK_SIZE;
use crate::value::Value;

/// A layout shared between a table and the rows of its nested tables.
pub type LayoutRef = Arc<RwLock<Layout>>;

/// The storage type of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleType {
    /// UTF-8 text.
    String,
    /// Double-precision number.
    Number,
    /// Boolean.
    Bool,
    /// Nested table.
    List,
    /// Guarded reference to an opaque object.
    ObjectReference,
    /// Key/value map.
    KeyValueMap,
    /// Timestamp.
    DateTime,
}

impl RoleType {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            RoleType::String => "String",
            RoleType::Number => "Number",
            RoleType::Bool => "Bool",
            RoleType::List => "List",
            RoleType::ObjectReference => "ObjectReference",
            RoleType::KeyValueMap => "KeyValueMap",
            RoleType::DateTime => "DateTime",
        }
    }

    /// Bytes occupied in a storage block.
    ///
    /// Numbers and booleans are stored in place; every other type stores a
    /// 4-byte handle into the row's value heap.
    pub const fn slot_size(self) -> usize {
        match self {
            RoleType::Number => size_of::<f64>(),
            RoleType::Bool => size_of::<u8>(),
            _ => size_of::<u32>(),
        }
    }

    /// Alignment of the slot inside a block.
    pub const fn slot_align(self) -> usize {
        self.slot_size()
    }

    /// Infers the role type for a value.
    ///
    /// Returns `None` for values without a column representation
    /// (`Undefined` and `Null`).
    pub fn for_value(value: &Value) -> Option<RoleType> {
        match value {
            Value::String(_) => Some(RoleType::String),
            Value::Number(_) => Some(RoleType::Number),
            Value::Bool(_) => Some(RoleType::Bool),
            Value::List(_) | Value::Model(_) => Some(RoleType::List),
            Value::Object(_) => Some(RoleType::ObjectReference),
            Value::Map(_) => Some(RoleType::KeyValueMap),
            Value::DateTime(_) => Some(RoleType::DateTime),
            Value::Undefined | Value::Null => None,
        }
    }
}

/// A column descriptor.
///
/// Cloning a role is shallow: the clone shares the nested layout of a
/// `List` role.
#[derive(Debug, Clone)]
pub struct Role {
    /// Column name, unique within its layout.
    pub name: String,
    /// Fixed storage type.
    pub role_type: RoleType,
    /// Ordinal assigned at creation.
    pub index: usize,
    /// Storage block holding the value.
    pub block_index: usize,
    /// Byte offset of the value inside its block.
    pub block_offset: usize,
    /// Layout of nested rows, for `List` roles only.
    pub sub_layout: Option<LayoutRef>,
}

impl Role {
    /// Copies the role, deep-copying a nested layout.
    fn deep_copy(&self) -> Role {
        Role {
            sub_layout: self
                .sub_layout
                .as_ref()
                .map(|layout| Arc::new(RwLock::new(layout.read().deep_copy()))),
            ..self.clone()
        }
    }
}

/// The ordered set of roles of a static-schema table.
#[derive(Debug, Default)]
pub struct Layout {
    roles: Vec<Role>,
    role_hash: HashMap<String, usize>,
    current_block: usize,
    current_block_offset: usize,
}

impl Layout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty shared layout.
    pub fn new_ref() -> LayoutRef {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Copies the layout, including every nested layout.
    pub fn deep_copy(&self) -> Layout {
        Layout {
            roles: self.roles.iter().map(Role::deep_copy).collect(),
            role_hash: self.role_hash.clone(),
            current_block: self.current_block,
            current_block_offset: self.current_block_offset,
        }
    }

    /// Number of roles.
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// Roles in index order.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Looks up a role by index.
    pub fn role_at(&self, index: usize) -> Option<&Role> {
        self.roles.get(index)
    }

    /// Looks up a role by name. Never creates.
    pub fn get_existing_role(&self, name: &str) -> Option<&Role> {
        self.role_hash.get(name).map(|&index| &self.roles[index])
    }

    /// Returns the role called `name`, creating it with `role_type` if unseen.
    ///
    /// An existing role keeps its type. When `role_type` differs, the
    /// conflict is logged and the existing role is returned unchanged, so
    /// callers must check [`Role::role_type`] before writing.
    pub fn get_role_or_create(&mut self, name: &str, role_type: RoleType) -> Role {
        if let Some(existing) = self.get_existing_role(name) {
            if existing.role_type != role_type {
                tracing::warn!(
                    target: targets::LAYOUT,
                    "Can't assign to existing role '{}' of different type [{} -> {}]",
                    name,
                    existing.role_type.name(),
                    role_type.name()
                );
            }
            return existing.clone();
        }
        self.create_role(name, role_type).clone()
    }

    /// Returns the role called `name`, inferring its type from `value`.
    ///
    /// Returns `None` (and logs) when the value has no column type.
    pub fn get_role_or_create_for_value(&mut self, name: &str, value: &Value) -> Option<Role> {
        match RoleType::for_value(value) {
            Some(role_type) => Some(self.get_role_or_create(name, role_type)),
            None => {
                tracing::warn!(target: targets::LAYOUT, "Can't create role for unsupported data type");
                None
            }
        }
    }

    fn create_role(&mut self, name: &str, role_type: RoleType) -> &Role {
        let size = role_type.slot_size();
        let align = role_type.slot_align();
        let offset = (self.current_block_offset + align - 1) & !(align - 1);

        let (block_index, block_offset) = if offset + size > BLOCK_SIZE {
            self.current_block += 1;
            self.current_block_offset = size;
            (self.current_block, 0)
        } else {
            self.current_block_offset = offset + size;
            (self.current_block, offset)
        };

        let index = self.roles.len();
        tracing::trace!(
            target: targets::LAYOUT,
            name,
            role_type = role_type.name(),
            index,
            block_index,
            block_offset,
            "created role"
        );

        self.roles.push(Role {
            name: name.to_string(),
            role_type,
            index,
            block_index,
            block_offset,
            sub_layout: (role_type == RoleType::List).then(Layout::new_ref),
        });
        self.role_hash.insert(name.to_string(), index);
        &self.roles[index]
    }

    /// Appends to `target` every role of `src` beyond `target`'s count.
    ///
    /// Existing target roles are neither reordered nor removed, so indices
    /// already handed out stay valid. The block cursors follow `src`.
    pub fn sync(src: &Layout, target: &mut Layout) {
        for role in src.roles.iter().skip(target.roles.len()) {
            let copy = role.deep_copy();
            target.role_hash.insert(copy.name.clone(), copy.index);
            target.roles.push(copy);
        }
        target.current_block = src.current_block;
        target.current_block_offset = src.current_block_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_keep_index_and_type() {
        let mut layout = Layout::new();
        let name = layout.get_role_or_create("name", RoleType::String);
        let cost = layout.get_role_or_create("cost", RoleType::Number);
        assert_eq!((name.index, cost.index), (0, 1));

        let again = layout.get_role_or_create("cost", RoleType::String);
        assert_eq!(again.index, 1);
        assert_eq!(again.role_type, RoleType::Number);
        assert_eq!(layout.role_count(), 2);
    }

    #[test]
    fn test_block_placement_aligns_and_spills() {
        let mut layout = Layout::new();
        let flag = layout.get_role_or_create("flag", RoleType::Bool);
        let number = layout.get_role_or_create("number", RoleType::Number);
        assert_eq!((flag.block_index, flag.block_offset), (0, 0));
        assert_eq!((number.block_index, number.block_offset), (0, 8));

        let mut last = number;
        for i in 0..16 {
            last = layout.get_role_or_create(&format!("n{i}"), RoleType::Number);
            assert!(last.block_offset + RoleType::Number.slot_size() <= BLOCK_SIZE);
        }
        assert!(last.block_index > 0);
    }

    #[test]
    fn test_spilled_role_starts_new_block() {
        let mut layout = Layout::new();
        let per_block = BLOCK_SIZE / RoleType::Number.slot_size();
        for i in 0..per_block {
            let role = layout.get_role_or_create(&format!("n{i}"), RoleType::Number);
            assert_eq!(role.block_index, 0);
        }
        let spilled = layout.get_role_or_create("spilled", RoleType::Number);
        assert_eq!((spilled.block_index, spilled.block_offset), (1, 0));
        let next = layout.get_role_or_create("next", RoleType::Bool);
        assert_eq!((next.block_index, next.block_offset), (1, 8));
    }

    #[test]
    fn test_value_inference() {
        let mut layout = Layout::new();
        assert!(layout.get_role_or_create_for_value("a", &Value::Null).is_none());
        let role = layout.get_role_or_create_for_value("a", &Value::List(Vec::new())).unwrap();
        assert_eq!(role.role_type, RoleType::List);
        assert!(role.sub_layout.is_some());
        assert_eq!(layout.role_count(), 1);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut layout = Layout::new();
        let list = layout.get_role_or_create("items", RoleType::List);
        list.sub_layout
            .as_ref()
            .unwrap()
            .write()
            .get_role_or_create("x", RoleType::Number);

        let copy = layout.deep_copy();
        let copied_sub = copy.role_at(0).unwrap().sub_layout.clone().unwrap();
        copied_sub.write().get_role_or_create("y", RoleType::Number);

        assert_eq!(list.sub_layout.unwrap().read().role_count(), 1);
        assert_eq!(copied_sub.read().role_count(), 2);
    }

    #[test]
    fn test_sync_appends_missing_roles() {
        let mut src = Layout::new();
        src.get_role_or_create("a", RoleType::String);
        src.get_role_or_create("b", RoleType::Number);
        src.get_role_or_create("c", RoleType::Bool);

        let mut target = Layout::new();
        target.get_role_or_create("a", RoleType::String);

        Layout::sync(&src, &mut target);
        let names: Vec<_> = target.roles().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(target.get_existing_role("c").map(|r| r.index), Some(2));

        Layout::sync(&src, &mut target);
        assert_eq!(target.role_count(), 3);
    }
}
