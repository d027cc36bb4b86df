//! Tracing targets used throughout Horizon ListModel.
//!
//! Horizon ListModel uses the `tracing` crate for all diagnostics. Misuse of
//! the model API (out-of-range indices, conflicting column types, and so on)
//! is reported as a `warn!` event rather than an error value, so installing a
//! subscriber is the way to see why a mutation had no effect:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_listmodel=warn")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core runtime target.
    pub const CORE: &str = "horizon_listmodel_core";
    /// Event loop target.
    pub const EVENT_LOOP: &str = "horizon_listmodel_core::event_loop";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_listmodel_core::signal";
    /// Worker thread target.
    pub const WORKER: &str = "horizon_listmodel_core::worker";

    /// Row layout registry target.
    pub const LAYOUT: &str = "horizon_listmodel::layout";
    /// Row storage target.
    pub const ELEMENT: &str = "horizon_listmodel::element";
    /// Static-schema table target.
    pub const TABLE: &str = "horizon_listmodel::table";
    /// Dynamic-schema table target.
    pub const DYNAMIC: &str = "horizon_listmodel::dynamic";
    /// Per-row proxy object target.
    pub const PROXY: &str = "horizon_listmodel::proxy";
    /// Table-model facade target.
    pub const FACADE: &str = "horizon_listmodel::facade";
    /// Cross-thread agent target.
    pub const AGENT: &str = "horizon_listmodel::agent";
    /// Declarative literal compiler target.
    pub const PARSER: &str = "horizon_listmodel::parser";
}

/// Span names used for tracing long-running operations.
pub mod span_names {
    /// Event loop processing span.
    pub const EVENT_LOOP: &str = "horizon_listmodel::event_loop";
    /// Table merge span.
    pub const SYNC: &str = "horizon_listmodel::sync";
    /// Literal replay span.
    pub const REPLAY: &str = "horizon_listmodel::replay";
}
