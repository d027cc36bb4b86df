//! Horizon ListModel - free-form list models for declarative views.
//!
//! A [`ListModel`] is a table of rows with named columns. Rows are added
//! from loosely typed records ([`Value`] maps), read back by row and role
//! index through the [`ItemModel`] contract, and observed through
//! [`ModelSignals`]. Every row can hand out a proxy object whose columns are
//! individually observable properties.
//!
//! Models can be edited from a worker thread through a [`WorkerAgent`],
//! which keeps a private copy and merges it back into the owner's model on
//! [`WorkerAgent::sync`]. Rows are matched by uid during the merge, so row
//! proxies held on the owner side survive it.
//!
//! # Example
//!
//! ```
//! use horizon_listmodel::{ItemModel, ListModel, Value};
//! use serde_json::json;
//!
//! let fruit = ListModel::new();
//! fruit.append(json!({"name": "Apples", "cost": 5.95}));
//! fruit.append(json!({"name": "Pizza", "cost": 7.0}));
//!
//! assert_eq!(fruit.row_count(), 2);
//! assert_eq!(fruit.data(1, 1), Value::from(7.0));
//! ```
//!
//! # Declared elements
//!
//! Literal element declarations are compiled once by
//! [`ListModelParser`](list::ListModelParser) and replayed with
//! [`ListModel::from_compiled`].

mod error;
pub mod list;
pub mod model;
pub mod prelude;
pub mod value;

pub use error::{Error, Result};
pub use list::{
    CompileError, CompiledListModel, DecodeError, DynamicRowNode, ListModel, ListModelParser, RowObject,
    RowProxy, RowRef, WorkerAgent,
};
pub use model::{ItemModel, ModelSignals};
pub use value::{ObjectGuard, ObjectHandle, Value, ValueMap};

pub use horizon_listmodel_core::{EventLoop, EventLoopHandle, UidGenerator};

static_assertions::assert_impl_all!(ListModel: Send, Sync);
static_assertions::assert_impl_all!(WorkerAgent: Send, Sync);
static_assertions::assert_impl_all!(RowObject: Send, Sync);
static_assertions::assert_impl_all!(DynamicRowNode: Send, Sync);
static_assertions::assert_impl_all!(Value: Send, Sync);
