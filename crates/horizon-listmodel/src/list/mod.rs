//! Free-form list models.
//!
//! A [`ListModel`] stores rows of named columns. With static roles (the
//! default) the first value written under a name fixes that column's
//! [`RoleType`] for the whole table, and rows live in compact block storage
//! described by a shared [`Layout`]. With dynamic roles every row is a
//! free-form map and columns may change type.
//!
//! # Module layout
//!
//! | Module    | Contents                                              |
//! |-----------|-------------------------------------------------------|
//! | `layout`  | roles and their placement in storage blocks           |
//! | `element` | per-row block storage                                 |
//! | `table`   | static-schema tables and the uid merge                |
//! | `dynamic` | dynamic-schema rows and their merge                   |
//! | `proxy`   | observable per-row proxy objects                      |
//! | `facade`  | [`ListModel`], the notifying facade                   |
//! | `script`  | method dispatch by name                               |
//! | `agent`   | [`WorkerAgent`], worker-thread editing and sync       |
//! | `parser`  | compiler for declared list elements                   |
//!
//! # Worker threads
//!
//! A model is edited from another thread through its [`WorkerAgent`]. The
//! agent owns a private copy; edits apply to the copy immediately and are
//! merged into the original by [`WorkerAgent::sync`], which blocks until
//! the owner thread's event loop has run the merge.

mod agent;
mod dynamic;
mod element;
mod facade;
mod layout;
pub mod parser;
mod proxy;
mod script;
mod table;

pub use agent::WorkerAgent;
pub use dynamic::DynamicRowNode;
pub use element::BLOCK_SIZE;
pub use facade::ListModel;
pub use layout::{Layout, LayoutRef, Role, RoleType};
pub use parser::{CompileError, CompiledListModel, DecodeError, ListModelParser};
pub use proxy::{RowObject, RowProxy, RowRef};
pub use script::METHODS;
