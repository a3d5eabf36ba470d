//! Lead domain model.
//!
//! # Responsibility
//! - Define the canonical lead record placed on the board.
//! - Own the fixed, ordered stage set and priority levels.
//!
//! # Invariants
//! - `id` is stable and never reused for another lead.
//! - A lead sits in exactly one `Stage` at any time.
//! - Tags are stored normalized: trimmed, lowercase, unique, sorted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every lead.
pub type LeadId = Uuid;

/// Pipeline stage, doubling as the board column identifier.
///
/// Declaration order is display order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Incoming,
    Decision,
    Negotiation,
    Final,
}

impl Stage {
    /// All stages in board order.
    pub const ALL: [Stage; 4] = [
        Stage::Incoming,
        Stage::Decision,
        Stage::Negotiation,
        Stage::Final,
    ];

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Decision => "decision",
            Self::Negotiation => "negotiation",
            Self::Final => "final",
        }
    }

    /// Parses a stage name, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
    }

    /// Position of this stage in board order.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lead priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == normalized)
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried by a lead. Moves never touch these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAttributes {
    /// Contact or deal name shown on the card.
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    /// Deal value in minor currency units.
    pub amount_cents: i64,
    pub tags: Vec<String>,
    pub priority: Priority,
}

impl LeadAttributes {
    /// Creates attributes with medium priority, no tags and zero amount.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            company: None,
            email: None,
            amount_cents: 0,
            tags: Vec::new(),
            priority: Priority::Medium,
        }
    }

    /// Rewrites `tags` into normalized form.
    ///
    /// Blank entries are kept so `Lead::validate` can reject them.
    pub fn normalize_tags(&mut self) {
        let normalized: BTreeSet<String> = self
            .tags
            .iter()
            .map(|tag| normalize_tag(tag))
            .collect();
        self.tags = normalized.into_iter().collect();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = normalize_tag(tag);
        self.tags.iter().any(|candidate| *candidate == wanted)
    }
}

/// Normalizes one tag for storage and comparison.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Validation failures for lead records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadValidationError {
    BlankName,
    NegativeAmount(i64),
    BlankTag,
}

impl Display for LeadValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "lead name must not be blank"),
            Self::NegativeAmount(amount) => {
                write!(f, "lead amount must not be negative, got {amount}")
            }
            Self::BlankTag => write!(f, "lead tags must not be blank"),
        }
    }
}

impl Error for LeadValidationError {}

/// A unit of work placed on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    /// Serialized as `column` to match board naming on the UI side.
    #[serde(rename = "column")]
    pub stage: Stage,
    pub attributes: LeadAttributes,
}

impl Lead {
    /// Creates a lead with a generated stable ID and normalized tags.
    pub fn new(stage: Stage, mut attributes: LeadAttributes) -> Self {
        attributes.normalize_tags();
        Self {
            id: Uuid::new_v4(),
            stage,
            attributes,
        }
    }

    /// Creates a lead with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(id: LeadId, stage: Stage, mut attributes: LeadAttributes) -> Self {
        attributes.normalize_tags();
        Self {
            id,
            stage,
            attributes,
        }
    }

    /// Checks payload invariants enforced before persistence.
    pub fn validate(&self) -> Result<(), LeadValidationError> {
        if self.attributes.name.trim().is_empty() {
            return Err(LeadValidationError::BlankName);
        }
        if self.attributes.amount_cents < 0 {
            return Err(LeadValidationError::NegativeAmount(
                self.attributes.amount_cents,
            ));
        }
        if self
            .attributes
            .tags
            .iter()
            .any(|tag| tag.trim().is_empty())
        {
            return Err(LeadValidationError::BlankTag);
        }
        Ok(())
    }

    /// Returns a copy placed in `stage`, payload unchanged.
    pub fn moved_to(&self, stage: Stage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }
}
