//! Error types for Horizon ListModel.
//!
//! Script-facing list operations never fail; misuse is logged and ignored.
//! These errors cover the programmatic surfaces: worker syncs and compiled
//! element declarations.

use horizon_listmodel_core::CoreError;
use thiserror::Error;

use crate::list::{CompileError, DecodeError};

/// Any error reported by this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A runtime primitive failed, e.g. the owner's event loop is gone.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Element declarations were rejected.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A compiled declaration blob is corrupt.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Result type for fallible list-model operations.
pub type Result<T> = std::result::Result<T, Error>;
