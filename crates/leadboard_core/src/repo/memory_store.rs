//! In-memory lead store with explicit fault injection.
//!
//! # Responsibility
//! - Serve as the mock data service behind `LeadStore`.
//! - Simulate latency and failures through injected, deterministic seams.
//!
//! # Invariants
//! - Listing order is insertion order.
//! - Faults come only from the configured `FaultInjector`; there is no
//!   built-in randomness.

use crate::model::filter::LeadFilter;
use crate::model::lead::{Lead, LeadAttributes, LeadId, Stage};
use crate::repo::lead_store::{LeadStore, StoreError, StoreOp, StoreResult};
use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Failure flavour produced by scripted faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Transient,
    /// Falls back to `Transient` for operations without a lead id.
    NotFound,
}

impl FaultKind {
    fn into_error(self, op: StoreOp, id: Option<LeadId>) -> StoreError {
        match (self, id) {
            (Self::NotFound, Some(id)) => StoreError::NotFound(id),
            _ => StoreError::Transient(format!("injected fault on {}", op.as_str())),
        }
    }
}

/// Decides whether a store call fails before touching data.
pub trait FaultInjector: Send + Sync {
    fn inject(&self, op: StoreOp, id: Option<LeadId>) -> Option<StoreError>;
}

/// Injector that never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn inject(&self, _op: StoreOp, _id: Option<LeadId>) -> Option<StoreError> {
        None
    }
}

#[derive(Debug, Default)]
struct FaultScript {
    queued: HashMap<StoreOp, VecDeque<FaultKind>>,
    always: HashMap<StoreOp, FaultKind>,
}

/// Injector driven by a per-operation script.
///
/// Queued one-shot faults are consumed first; an always-fail entry applies
/// once the queue for that operation is empty.
#[derive(Debug, Default)]
pub struct ScriptedFaults {
    script: Mutex<FaultScript>,
}

impl ScriptedFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one failure for the next call of `op`.
    pub fn fail_next(&self, op: StoreOp, kind: FaultKind) {
        self.lock()
            .queued
            .entry(op)
            .or_default()
            .push_back(kind);
    }

    /// Makes every call of `op` fail until `clear` is called.
    pub fn fail_always(&self, op: StoreOp, kind: FaultKind) {
        self.lock().always.insert(op, kind);
    }

    /// Drops all queued and permanent faults.
    pub fn clear(&self) {
        let mut script = self.lock();
        script.queued.clear();
        script.always.clear();
    }

    fn lock(&self) -> MutexGuard<'_, FaultScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FaultInjector for ScriptedFaults {
    fn inject(&self, op: StoreOp, id: Option<LeadId>) -> Option<StoreError> {
        let mut script = self.lock();
        let kind = script
            .queued
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .or_else(|| script.always.get(&op).copied())?;
        Some(kind.into_error(op, id))
    }
}

/// Mock lead store held entirely in memory.
pub struct InMemoryLeadStore {
    leads: Mutex<Vec<Lead>>,
    latency: Duration,
    faults: Arc<dyn FaultInjector>,
    list_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeadStore {
    /// Empty store with no latency and no faults.
    pub fn new() -> Self {
        Self {
            leads: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            faults: Arc::new(NoFaults),
            list_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    /// Seeds the store. Invalid or duplicate leads are rejected.
    pub fn with_leads(leads: impl IntoIterator<Item = Lead>) -> StoreResult<Self> {
        let store = Self::new();
        for lead in leads {
            store.insert(lead)?;
        }
        Ok(store)
    }

    /// Delay applied to every call before it resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_faults(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    /// Adds one lead after tag normalization and validation.
    pub fn insert(&self, mut lead: Lead) -> StoreResult<LeadId> {
        lead.attributes.normalize_tags();
        lead.validate()?;
        let mut leads = self.lock();
        if leads.iter().any(|existing| existing.id == lead.id) {
            return Err(StoreError::InvalidData(format!(
                "duplicate lead id {}",
                lead.id
            )));
        }
        let id = lead.id;
        leads.push(lead);
        Ok(id)
    }

    pub fn get(&self, id: LeadId) -> Option<Lead> {
        self.lock().iter().find(|lead| lead.id == id).cloned()
    }

    /// Deletes a lead, simulating removal by another client.
    pub fn remove(&self, id: LeadId) -> Option<Lead> {
        let mut leads = self.lock();
        let position = leads.iter().position(|lead| lead.id == id)?;
        Some(leads.remove(position))
    }

    /// Replaces a lead's payload, simulating an edit by another client.
    pub fn set_attributes(&self, id: LeadId, attributes: LeadAttributes) -> StoreResult<()> {
        let mut leads = self.lock();
        let lead = leads
            .iter_mut()
            .find(|lead| lead.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let candidate = Lead::with_id(id, lead.stage, attributes);
        candidate.validate()?;
        *lead = candidate;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of `list` calls received, including failed ones.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_stage` calls received, including failed ones.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Lead>> {
        self.leads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn list(&self, filter: &LeadFilter) -> StoreResult<Vec<Lead>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if let Some(err) = self.faults.inject(StoreOp::List, None) {
            debug!("event=store_fault module=store status=error op=list error={err}");
            return Err(err);
        }

        let leads = self
            .lock()
            .iter()
            .filter(|lead| filter.matches(lead))
            .cloned()
            .collect();
        Ok(leads)
    }

    async fn update_stage(&self, id: LeadId, stage: Stage) -> StoreResult<Lead> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if let Some(err) = self.faults.inject(StoreOp::UpdateStage, Some(id)) {
            debug!(
                "event=store_fault module=store status=error op=update_stage lead_id={id} error={err}"
            );
            return Err(err);
        }

        let mut leads = self.lock();
        let lead = leads
            .iter_mut()
            .find(|lead| lead.id == id)
            .ok_or(StoreError::NotFound(id))?;
        lead.stage = stage;
        Ok(lead.clone())
    }
}
