//! Lead board domain model.
//!
//! # Responsibility
//! - Define the lead record, the filter specification and the board projection.
//! - Keep board transforms pure so optimistic/rollback logic stays testable.
//!
//! # Invariants
//! - Every lead is identified by a stable `LeadId`.
//! - A board always carries one column per `Stage`, in `Stage::ALL` order.

pub mod board;
pub mod filter;
pub mod lead;
