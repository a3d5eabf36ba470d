//! Lead store contract.
//!
//! # Responsibility
//! - Define the authoritative data source the board reconciler reads from
//!   and writes stage changes to.
//! - Classify store failures so callers can tell "gone" from "try again".
//!
//! # Invariants
//! - `update_stage` persists exactly one field and returns the stored lead.
//! - `update_stage` on an unknown id fails with `StoreError::NotFound`.

use crate::db::DbError;
use crate::model::filter::LeadFilter;
use crate::model::lead::{Lead, LeadId, LeadValidationError, Stage};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation, used for fault scripting and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    UpdateStage,
}

impl StoreOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::UpdateStage => "update_stage",
        }
    }
}

/// Error from a lead store operation.
#[derive(Debug)]
pub enum StoreError {
    /// Lead vanished or never existed.
    NotFound(LeadId),
    /// Network/availability failure; retrying later may succeed.
    Transient(String),
    Db(DbError),
    InvalidData(String),
    Validation(LeadValidationError),
}

/// Coarse error class exposed to presentation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    Transient,
    Storage,
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::NotFound(_) => StoreErrorKind::NotFound,
            Self::Transient(_) => StoreErrorKind::Transient,
            Self::Db(_) | Self::InvalidData(_) | Self::Validation(_) => StoreErrorKind::Storage,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "lead not found: {id}"),
            Self::Transient(message) => write!(f, "lead store unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted lead data: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NotFound(_) | Self::Transient(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<LeadValidationError> for StoreError {
    fn from(value: LeadValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Authoritative source of leads.
///
/// No pagination: `list` returns the full filtered set.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Lists leads passing `filter`.
    async fn list(&self, filter: &LeadFilter) -> StoreResult<Vec<Lead>>;

    /// Persists a new stage for one lead and returns the stored record.
    async fn update_stage(&self, id: LeadId, stage: Stage) -> StoreResult<Lead>;
}
