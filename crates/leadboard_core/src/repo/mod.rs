//! Lead store contract and implementations.
//!
//! # Responsibility
//! - Define the `LeadStore` contract consumed by the board reconciler.
//! - Provide the in-memory mock store and the SQLite-backed store.
//!
//! # Invariants
//! - Stores return semantic errors (`NotFound`, `Transient`) in addition to
//!   storage transport errors.
//! - Stores are the source of truth; callers never own lead data.

pub mod lead_store;
pub mod memory_store;
pub mod sqlite_store;
