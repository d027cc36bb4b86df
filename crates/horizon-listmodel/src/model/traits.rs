//! The indexable-model contract.
//!
//! Views and repeaters consume a table through [`ItemModel`]: a row count,
//! a per-cell accessor keyed by role index, the role names, and the
//! [`ModelSignals`] they connect to in order to stay in sync.

use std::collections::BTreeMap;

use horizon_listmodel_core::Signal;

use crate::value::Value;

/// A flat table of rows whose columns are addressed by role index.
///
/// # Example
///
/// ```ignore
/// use std::collections::BTreeMap;
/// use horizon_listmodel::model::{ItemModel, ModelSignals};
/// use horizon_listmodel::Value;
///
/// struct Names {
///     names: Vec<String>,
///     signals: ModelSignals,
/// }
///
/// impl ItemModel for Names {
///     fn row_count(&self) -> usize {
///         self.names.len()
///     }
///
///     fn data(&self, row: usize, role: usize) -> Value {
///         match (self.names.get(row), role) {
///             (Some(name), 0) => Value::from(name.as_str()),
///             _ => Value::Undefined,
///         }
///     }
///
///     fn role_names(&self) -> BTreeMap<usize, String> {
///         BTreeMap::from([(0, "name".to_string())])
///     }
///
///     fn signals(&self) -> &ModelSignals {
///         &self.signals
///     }
/// }
/// ```
pub trait ItemModel: Send + Sync {
    /// Returns the number of rows.
    fn row_count(&self) -> usize;

    /// Returns the value of column `role` in `row`.
    ///
    /// Returns `Value::Undefined` for an out-of-range row or role.
    fn data(&self, row: usize, role: usize) -> Value;

    /// Returns the role names keyed by role index.
    fn role_names(&self) -> BTreeMap<usize, String>;

    /// Returns the signals for this model.
    fn signals(&self) -> &ModelSignals;

    // -------------------------------------------------------------------------
    // Optional methods with default implementations
    // -------------------------------------------------------------------------

    /// Sets column `role` of `row`.
    ///
    /// Returns `true` if the value changed. The default implementation is
    /// read-only.
    fn set_data(&self, _row: usize, _role: usize, _value: Value) -> bool {
        false
    }

    /// Looks up a role index by name.
    fn role_index(&self, name: &str) -> Option<usize> {
        self.role_names()
            .into_iter()
            .find_map(|(index, role)| (role == name).then_some(index))
    }
}

/// Collection of signals emitted by item models.
///
/// # Signal Usage
///
/// - **Structural changes**: `rows_about_to_be_*` before, `rows_*` after
/// - **Value changes**: `data_changed` with the changed role indices
/// - **Row count**: `count_changed` after inserts and removals
pub struct ModelSignals {
    /// Emitted just before rows are inserted.
    /// Args: (first row, last row)
    pub rows_about_to_be_inserted: Signal<(usize, usize)>,

    /// Emitted after rows have been inserted.
    /// Args: (first row, last row)
    pub rows_inserted: Signal<(usize, usize)>,

    /// Emitted just before rows are removed.
    /// Args: (first row, last row)
    pub rows_about_to_be_removed: Signal<(usize, usize)>,

    /// Emitted after rows have been removed.
    /// Args: (first row, last row)
    pub rows_removed: Signal<(usize, usize)>,

    /// Emitted just before rows are moved.
    /// Args: (from, to, count)
    pub rows_about_to_be_moved: Signal<(usize, usize, usize)>,

    /// Emitted after rows have been moved.
    /// Args: (from, to, count)
    pub rows_moved: Signal<(usize, usize, usize)>,

    /// Emitted when values in existing rows change.
    /// Args: (first row, last row, changed role indices)
    pub data_changed: Signal<(usize, usize, Vec<usize>)>,

    /// Emitted when the row count changes.
    pub count_changed: Signal<()>,
}

impl Default for ModelSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSignals {
    /// Creates a new set of model signals.
    pub fn new() -> Self {
        Self {
            rows_about_to_be_inserted: Signal::new(),
            rows_inserted: Signal::new(),
            rows_about_to_be_removed: Signal::new(),
            rows_removed: Signal::new(),
            rows_about_to_be_moved: Signal::new(),
            rows_moved: Signal::new(),
            data_changed: Signal::new(),
            count_changed: Signal::new(),
        }
    }

    /// Emits signals for row insertion.
    ///
    /// Calls the provided function between the about_to_be_inserted and inserted signals.
    pub fn emit_rows_inserted<F>(&self, first: usize, last: usize, insert_fn: F)
    where
        F: FnOnce(),
    {
        self.rows_about_to_be_inserted.emit((first, last));
        insert_fn();
        self.rows_inserted.emit((first, last));
    }

    /// Emits signals for row removal.
    ///
    /// Calls the provided function between the about_to_be_removed and removed signals.
    pub fn emit_rows_removed<F>(&self, first: usize, last: usize, remove_fn: F)
    where
        F: FnOnce(),
    {
        self.rows_about_to_be_removed.emit((first, last));
        remove_fn();
        self.rows_removed.emit((first, last));
    }

    /// Emits signals for a block move of `count` rows from `from` to `to`.
    ///
    /// Calls the provided function between the about_to_be_moved and moved signals.
    pub fn emit_rows_moved<F>(&self, from: usize, to: usize, count: usize, move_fn: F)
    where
        F: FnOnce(),
    {
        self.rows_about_to_be_moved.emit((from, to, count));
        move_fn();
        self.rows_moved.emit((from, to, count));
    }

    /// Emits the data_changed signal for a contiguous row range.
    pub fn emit_data_changed(&self, first: usize, last: usize, roles: Vec<usize>) {
        self.data_changed.emit((first, last, roles));
    }
}
