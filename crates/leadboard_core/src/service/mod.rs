//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into board-level use cases.
//! - Keep presentation layers decoupled from store details.

pub mod board_reconciler;
