//! Prelude module for Horizon ListModel.
//!
//! ```ignore
//! use horizon_listmodel::prelude::*;
//! ```

pub use crate::list::{ListModel, RowProxy, RowRef, WorkerAgent};
pub use crate::model::{ItemModel, ModelSignals};
pub use crate::value::{Value, ValueMap};

pub use horizon_listmodel_core::{ConnectionType, EventLoop, Signal};
