//! The tabular data-model contract consumed by views.
//!
//! A view never looks inside a list model's storage. It asks for the row
//! count, per-cell values and the role names, and connects to the
//! structural-change signals:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  ListModel  │────>│ ModelSignals │────>│    View     │
//! │ (ItemModel) │     │              │     │             │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        ^                                        │
//!        └──────── row_count / data / role_names ─┘
//! ```

mod traits;

pub use traits::{ItemModel, ModelSignals};
