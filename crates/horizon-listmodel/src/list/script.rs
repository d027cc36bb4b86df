//! Script-facing method dispatch.
//!
//! Scripts call list-model methods by name with loosely typed arguments.
//! Indices are converted with 32-bit integer semantics, so a negative or
//! fractional index reaches the range checks exactly as the script wrote it.

use horizon_listmodel_core::logging::targets;

use super::facade::ListModel;
use crate::value::Value;

/// Script-visible method names.
pub const METHODS: &[&str] = &[
    "append",
    "clear",
    "count",
    "get",
    "insert",
    "move",
    "remove",
    "set",
    "setProperty",
    "sync",
];

fn index_arg(args: &[Value], position: usize) -> i64 {
    args.get(position).map_or(0, Value::to_int32) as i64
}

impl ListModel {
    /// Calls a script-visible method by name.
    ///
    /// Supported methods are listed in [`METHODS`]. Malformed calls are
    /// logged and have no effect; the return value is `Value::Undefined`
    /// except for `get` (the row proxy, as an object) and `count`.
    ///
    /// ```ignore
    /// use horizon_listmodel::{ListModel, Value};
    ///
    /// let model = ListModel::new();
    /// model.invoke("append", &[Value::from(serde_json::json!({"cost": 5.95}))]);
    /// model.invoke("remove", &[Value::from(0)]);
    /// assert_eq!(model.invoke("count", &[]), Value::from(0));
    /// ```
    pub fn invoke(&self, method: &str, args: &[Value]) -> Value {
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

        match method {
            "append" => {
                if args.len() == 1 {
                    self.append(arg(0));
                } else {
                    tracing::warn!(target: targets::FACADE, "append: value is not an object");
                }
            }
            "insert" => {
                if args.len() == 2 {
                    self.insert_checked(index_arg(args, 0), arg(1));
                } else {
                    tracing::warn!(target: targets::FACADE, "insert: value is not an object");
                }
            }
            "remove" => match args.len() {
                1 => self.remove_checked(index_arg(args, 0), 1),
                2 => self.remove_checked(index_arg(args, 0), index_arg(args, 1)),
                _ => tracing::warn!(target: targets::FACADE, "remove: incorrect number of arguments"),
            },
            "move" => self.move_checked(index_arg(args, 0), index_arg(args, 1), index_arg(args, 2)),
            "set" => self.set_checked(index_arg(args, 0), arg(1)),
            "setProperty" => {
                let name = arg(1).to_string();
                self.set_property_checked(index_arg(args, 0), &name, arg(2));
            }
            "get" => {
                let index = index_arg(args, 0);
                if index < 0 {
                    return Value::Undefined;
                }
                return self
                    .get(index as usize)
                    .map_or(Value::Undefined, |row| Value::Object(row.to_object()));
            }
            "clear" => self.clear(),
            "sync" => self.sync(),
            "count" => return Value::from(self.count()),
            _ => tracing::warn!(target: targets::FACADE, method, "no such ListModel method"),
        }
        Value::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::{RowObject, RowProxy};
    use horizon_listmodel_core::UidGenerator;
    use serde_json::json;

    fn model() -> std::sync::Arc<ListModel> {
        let model = ListModel::with_uids(UidGenerator::new());
        model.invoke("append", &[Value::from(json!([{"n": 0}, {"n": 1}, {"n": 2}]))]);
        model
    }

    fn column(model: &ListModel) -> Vec<f64> {
        (0..model.count())
            .filter_map(|i| model.data(i, 0).as_number())
            .collect()
    }

    #[test]
    fn test_argument_counts_are_checked() {
        let model = model();
        model.invoke("append", &[]);
        model.invoke("insert", &[Value::from(0)]);
        model.invoke("remove", &[]);
        model.invoke("remove", &[Value::from(0), Value::from(1), Value::from(1)]);
        assert_eq!(model.count(), 3);
        assert_eq!(model.invoke("count", &[]), Value::from(3));
    }

    #[test]
    fn test_remove_defaults_to_one_row() {
        let model = model();
        model.invoke("remove", &[Value::from(1)]);
        assert_eq!(column(&model), vec![0.0, 2.0]);
        model.invoke("remove", &[Value::from(-1), Value::from(1)]);
        assert_eq!(model.count(), 2);
    }

    #[test]
    fn test_indices_use_integer_conversion() {
        let model = model();
        model.invoke("move", &[Value::from("2"), Value::from(0.9), Value::from(1)]);
        assert_eq!(column(&model), vec![2.0, 0.0, 1.0]);
        model.invoke("setProperty", &[Value::from(0), Value::from("n"), Value::from(7)]);
        assert_eq!(column(&model), vec![7.0, 0.0, 1.0]);
    }

    #[test]
    fn test_get_returns_row_object() {
        let model = model();
        let row = model.invoke("get", &[Value::from(1)]);
        let row = row.as_object().and_then(|o| o.downcast::<RowObject>()).unwrap();
        assert_eq!(row.get("n"), Value::from(1.0));
        assert_eq!(model.invoke("get", &[Value::from(5)]), Value::Undefined);
        assert_eq!(model.invoke("get", &[Value::from(-1)]), Value::Undefined);
        assert_eq!(model.invoke("frobnicate", &[]), Value::Undefined);
    }
}
