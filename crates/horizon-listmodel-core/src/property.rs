//! Values with change detection.
//!
//! [`Property<T>`] backs the cached columns of a per-row proxy object. Its
//! [`set`](Property::set) only stores a value that differs from the current
//! one and says so, which is what decides whether a change notification is
//! due.
//!
//! ```
//! use horizon_listmodel_core::Property;
//!
//! let cost = Property::new(5.95);
//! assert!(!cost.set(5.95));
//! assert!(cost.set(6.5));
//! assert_eq!(cost.get(), 6.5);
//! assert_eq!(cost.revision(), 1);
//! ```

use std::fmt;

use parking_lot::RwLock;

/// A shared value that knows when it changed.
///
/// The revision starts at zero and counts accepted changes.
pub struct Property<T> {
    slot: RwLock<(T, u64)>,
}

impl<T: Clone> Property<T> {
    /// Creates a property at revision zero.
    pub fn new(value: T) -> Self {
        Self {
            slot: RwLock::new((value, 0)),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.slot.read().0.clone()
    }

    /// Number of changes accepted by [`set`](Self::set).
    pub fn revision(&self) -> u64 {
        self.slot.read().1
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Stores `value` if it differs from the current one.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, value: T) -> bool {
        let mut slot = self.slot.write();
        if slot.0 == value {
            return false;
        }
        slot.0 = value;
        slot.1 += 1;
        true
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("Property")
            .field("value", &slot.0)
            .field("revision", &slot.1)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_value_is_not_a_change() {
        let name = Property::new(String::from("Apples"));
        assert!(!name.set("Apples".to_string()));
        assert_eq!(name.revision(), 0);
    }

    #[test]
    fn test_changes_bump_revision() {
        let count = Property::<u32>::default();
        assert!(count.set(3));
        assert!(count.set(4));
        assert!(!count.set(4));
        assert_eq!(count.get(), 4);
        assert_eq!(count.revision(), 2);
    }
}
