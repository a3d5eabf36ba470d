//! Core board logic for the lead dashboard.
//! This crate owns the board projection and its reconciliation with the
//! authoritative lead store; presentation layers only render snapshots.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{AppConfig, ConfigError, LogSettings, StoreBackend, StoreSettings};
pub use logging::{
    default_log_level, init_logging, init_logging_from, logging_status, LoggingError,
};
pub use model::board::{Board, Column, ColumnSummary};
pub use model::filter::LeadFilter;
pub use model::lead::{Lead, LeadAttributes, LeadId, LeadValidationError, Priority, Stage};
pub use repo::lead_store::{LeadStore, StoreError, StoreErrorKind, StoreOp, StoreResult};
pub use repo::memory_store::{
    FaultInjector, FaultKind, InMemoryLeadStore, NoFaults, ScriptedFaults,
};
pub use repo::sqlite_store::SqliteLeadStore;
pub use service::board_reconciler::{
    BoardError, BoardReconciler, BoardResult, MoveReport, MoveStart, MoveState, Notice,
    NoticeKind, PendingMove, ValidationError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
