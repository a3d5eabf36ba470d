//! Board projection: leads grouped into ordered stage columns.
//!
//! # Responsibility
//! - Partition a lead listing into the fixed column set.
//! - Provide pure move/replace transforms used by the reconciler.
//!
//! # Invariants
//! - Every stage in `Stage::ALL` has exactly one column, in that order.
//! - A lead id appears in at most one column, at most once.
//! - Transforms never mutate `self`; they return a new board.

use crate::model::lead::{Lead, LeadId, Stage};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One stage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub stage: Stage,
    /// Display order; not semantically significant.
    pub leads: Vec<Lead>,
}

impl Column {
    fn empty(stage: Stage) -> Self {
        Self {
            stage,
            leads: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    /// Sum of deal amounts in this column, saturating at `i64::MAX`.
    pub fn total_amount_cents(&self) -> i64 {
        self.leads
            .iter()
            .fold(0_i64, |total, lead| {
                total.saturating_add(lead.attributes.amount_cents)
            })
    }

    pub fn contains(&self, id: LeadId) -> bool {
        self.leads.iter().any(|lead| lead.id == id)
    }

    pub fn ids(&self) -> Vec<LeadId> {
        self.leads.iter().map(|lead| lead.id).collect()
    }
}

/// Column header figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    pub stage: Stage,
    pub count: usize,
    pub total_amount_cents: i64,
}

/// Full projection of leads into columns.
///
/// Deserialization goes through `is_partition`, so a decoded board always
/// has the full column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoardColumns")]
pub struct Board {
    columns: Vec<Column>,
}

#[derive(Deserialize)]
struct BoardColumns {
    columns: Vec<Column>,
}

impl TryFrom<BoardColumns> for Board {
    type Error = &'static str;

    fn try_from(value: BoardColumns) -> Result<Self, Self::Error> {
        let board = Self {
            columns: value.columns,
        };
        if board.is_partition() {
            Ok(board)
        } else {
            Err("board must hold one column per stage, in order, without duplicate leads")
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    /// Board with every column present and empty.
    pub fn empty() -> Self {
        Self {
            columns: Stage::ALL.into_iter().map(Column::empty).collect(),
        }
    }

    /// Partitions `leads` by stage, preserving listing order inside columns.
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn from_leads(leads: impl IntoIterator<Item = Lead>) -> Self {
        let mut board = Self::empty();
        let mut seen = HashSet::new();
        for lead in leads {
            if !seen.insert(lead.id) {
                warn!(
                    "event=board_partition module=board status=duplicate lead_id={}",
                    lead.id
                );
                continue;
            }
            board.columns[lead.stage.index()].leads.push(lead);
        }
        board
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, stage: Stage) -> &Column {
        &self.columns[stage.index()]
    }

    /// Stage currently holding `id`.
    pub fn locate(&self, id: LeadId) -> Option<Stage> {
        self.columns
            .iter()
            .find(|column| column.contains(id))
            .map(|column| column.stage)
    }

    pub fn get(&self, id: LeadId) -> Option<&Lead> {
        self.columns
            .iter()
            .flat_map(|column| column.leads.iter())
            .find(|lead| lead.id == id)
    }

    pub fn lead_count(&self) -> usize {
        self.columns.iter().map(Column::len).sum()
    }

    pub fn summaries(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .map(|column| ColumnSummary {
                stage: column.stage,
                count: column.len(),
                total_amount_cents: column.total_amount_cents(),
            })
            .collect()
    }

    /// Checks the column layout and the no-duplicate rule.
    pub fn is_partition(&self) -> bool {
        if self.columns.len() != Stage::ALL.len() {
            return false;
        }
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .zip(Stage::ALL)
            .all(|(column, stage)| {
                column.stage == stage
                    && column
                        .leads
                        .iter()
                        .all(|lead| lead.stage == stage && seen.insert(lead.id))
            })
    }

    /// Returns a board with `id` removed from its column and appended to
    /// `target`, stage updated. `None` when `id` is not on the board.
    pub fn with_moved(&self, id: LeadId, target: Stage) -> Option<Self> {
        let source = self.locate(id)?;
        let mut next = self.clone();
        let position = next.columns[source.index()]
            .leads
            .iter()
            .position(|lead| lead.id == id)?;
        let lead = next.columns[source.index()].leads.remove(position);
        next.columns[target.index()]
            .leads
            .push(lead.moved_to(target));
        Some(next)
    }

    /// Returns a board where the copy of `lead.id` is replaced by `lead`.
    ///
    /// Keeps position when the stage is unchanged, otherwise appends to the
    /// new stage's column. Leads absent from the board are ignored.
    pub fn with_replaced(&self, lead: Lead) -> Self {
        let Some(current) = self.locate(lead.id) else {
            return self.clone();
        };
        let mut next = self.clone();
        let column = &mut next.columns[current.index()].leads;
        if current == lead.stage {
            if let Some(slot) = column.iter_mut().find(|existing| existing.id == lead.id) {
                *slot = lead;
            }
            return next;
        }
        column.retain(|existing| existing.id != lead.id);
        next.columns[lead.stage.index()].leads.push(lead);
        next
    }
}
