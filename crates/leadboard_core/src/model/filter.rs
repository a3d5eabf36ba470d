//! Board filter specification.
//!
//! # Invariants
//! - Dimensions combine with AND; values inside one dimension combine with OR.
//! - An empty set or blank search text places no constraint.

use crate::model::lead::{normalize_tag, Lead, Priority, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Filter applied when listing leads for the board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadFilter {
    /// Case-insensitive substring over name, company and email.
    pub search: Option<String>,
    pub tags: BTreeSet<String>,
    pub priorities: BTreeSet<Priority>,
    pub stages: BTreeSet<Stage>,
}

impl LeadFilter {
    /// Filter that lets every lead through.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(normalize_tag(tag));
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priorities.insert(priority);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.insert(stage);
        self
    }

    /// Trimmed, lowercased search needle, `None` when blank.
    pub fn search_needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase)
    }

    /// Tag set in normalized form.
    pub fn normalized_tags(&self) -> BTreeSet<String> {
        self.tags.iter().map(|tag| normalize_tag(tag)).collect()
    }

    /// Returns whether `lead` passes every dimension.
    pub fn matches(&self, lead: &Lead) -> bool {
        self.matches_stage(lead)
            && self.matches_priority(lead)
            && self.matches_tags(lead)
            && self.matches_search(lead)
    }

    pub fn matches_stage(&self, lead: &Lead) -> bool {
        self.stages.is_empty() || self.stages.contains(&lead.stage)
    }

    pub fn matches_priority(&self, lead: &Lead) -> bool {
        self.priorities.is_empty() || self.priorities.contains(&lead.attributes.priority)
    }

    pub fn matches_tags(&self, lead: &Lead) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let wanted = self.normalized_tags();
        lead.attributes
            .tags
            .iter()
            .any(|tag| wanted.contains(&normalize_tag(tag)))
    }

    pub fn matches_search(&self, lead: &Lead) -> bool {
        let Some(needle) = self.search_needle() else {
            return true;
        };
        let attributes = &lead.attributes;
        [
            Some(attributes.name.as_str()),
            attributes.company.as_deref(),
            attributes.email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}
