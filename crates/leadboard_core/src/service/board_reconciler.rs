//! Board reconciliation use-case service.
//!
//! # Responsibility
//! - Own the client-side board and the active filters.
//! - Apply drag moves optimistically, then confirm them against the store or
//!   roll back by reloading the whole board.
//! - Queue user-facing notices for every failure that reaches the user.
//!
//! # Invariants
//! - The board is only replaced through `load`, `begin_move` and `settle`.
//! - A failed `load` never clears the previously displayed board.
//! - A failed move always ends in a reloaded board (or, if the reload also
//!   fails, the lead restored to its source column); never in the
//!   unconfirmed optimistic state.
//! - At most one move per lead is in flight.
//! - A `PendingMove` dropped before `settle` finishes (timeout, cancelled
//!   task, never settled) releases its lead and undoes its optimistic step.
//! - A board listed from the store is only installed if no newer listing
//!   landed while it was in flight.
//! - The state lock is never held across an `.await`.

use crate::model::board::Board;
use crate::model::filter::LeadFilter;
use crate::model::lead::{LeadId, Stage};
use crate::repo::lead_store::{LeadStore, StoreError, StoreErrorKind};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub type BoardResult<T> = Result<T, BoardError>;

/// Requests rejected before any store call; state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Column name does not match any stage.
    UnknownColumn(String),
    /// Lead is not on the current board.
    UnknownLead(LeadId),
    /// Lead already has an unconfirmed move.
    MoveInFlight(LeadId),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownColumn(name) => write!(f, "unknown board column `{name}`"),
            Self::UnknownLead(id) => write!(f, "lead is not on the board: {id}"),
            Self::MoveInFlight(id) => write!(f, "lead already has a move in flight: {id}"),
        }
    }
}

impl Error for ValidationError {}

/// Errors from board reconciler operations.
#[derive(Debug)]
pub enum BoardError {
    Validation(ValidationError),
    /// Listing failed; the previous board is still displayed.
    Load(StoreError),
    /// Store rejected a move; the board was reloaded.
    MoveRolledBack {
        lead_id: LeadId,
        cause: StoreError,
        /// Set when the rollback reload failed too.
        reload_error: Option<StoreError>,
    },
}

impl BoardError {
    /// Store error class behind this failure, `None` for validation errors.
    pub fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            Self::Validation(_) => None,
            Self::Load(err) => Some(err.kind()),
            Self::MoveRolledBack { cause, .. } => Some(cause.kind()),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl Display for BoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Load(err) => write!(f, "failed to load board: {err}"),
            Self::MoveRolledBack {
                lead_id,
                cause,
                reload_error: None,
            } => write!(f, "move of lead {lead_id} rolled back: {cause}"),
            Self::MoveRolledBack {
                lead_id,
                cause,
                reload_error: Some(reload_error),
            } => write!(
                f,
                "move of lead {lead_id} rolled back: {cause}; board reload also failed: {reload_error}"
            ),
        }
    }
}

impl Error for BoardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Load(err) => Some(err),
            Self::MoveRolledBack { cause, .. } => Some(cause),
        }
    }
}

impl From<ValidationError> for BoardError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Lifecycle of one move once it leaves `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    OptimisticallyApplied,
    Confirmed,
    RolledBack,
}

impl MoveState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OptimisticallyApplied => "optimistic",
            Self::Confirmed => "confirmed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// An optimistically applied move awaiting `settle`.
///
/// Dropping it unsettled abandons the move: the lead is released and put
/// back in its source column unless a newer listing replaced the board.
#[must_use = "a pending move keeps its lead locked until settled"]
pub struct PendingMove {
    lead_id: LeadId,
    from: Stage,
    to: Stage,
    board: Board,
    started_at: Instant,
    generation: u64,
    state: Arc<Mutex<BoardState>>,
    armed: bool,
}

impl Debug for PendingMove {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMove")
            .field("lead_id", &self.lead_id)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl Drop for PendingMove {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let restored = state.release(self.lead_id, self.from, self.to, self.generation);
        warn!(
            "event=lead_move module=board status=abandoned lead_id={} from={} to={} restored={restored}",
            self.lead_id, self.from, self.to
        );
    }
}

impl PendingMove {
    pub fn lead_id(&self) -> LeadId {
        self.lead_id
    }

    pub fn from(&self) -> Stage {
        self.from
    }

    pub fn to(&self) -> Stage {
        self.to
    }

    /// Board rendered immediately, before the store answers.
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> MoveState {
        MoveState::OptimisticallyApplied
    }
}

/// Result of `begin_move`.
#[derive(Debug)]
pub enum MoveStart {
    /// Lead already sits in the target column; nothing was sent.
    Unchanged(Board),
    Pending(PendingMove),
}

/// Outcome of a confirmed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub lead_id: LeadId,
    pub from: Stage,
    pub to: Stage,
    pub state: MoveState,
    pub board: Board,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    LoadFailed,
    MoveRolledBack,
}

/// User-facing failure message (toast/banner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub lead_id: Option<LeadId>,
    pub error_kind: StoreErrorKind,
    pub message: String,
}

impl Notice {
    fn load_failed(err: &StoreError) -> Self {
        Self {
            kind: NoticeKind::LoadFailed,
            lead_id: None,
            error_kind: err.kind(),
            message: format!("Could not load leads ({err}). Retry to refresh the board."),
        }
    }

    fn move_rolled_back(lead_id: LeadId, to: Stage, err: &StoreError) -> Self {
        let message = match err.kind() {
            StoreErrorKind::NotFound => {
                "Could not move lead: it no longer exists. The board was reloaded.".to_string()
            }
            _ => format!("Could not move lead to {to} ({err}). The board was reloaded."),
        };
        Self {
            kind: NoticeKind::MoveRolledBack,
            lead_id: Some(lead_id),
            error_kind: err.kind(),
            message,
        }
    }
}

#[derive(Debug, Default)]
struct BoardState {
    board: Board,
    filters: LeadFilter,
    /// Bumped every time a store listing replaces the board.
    generation: u64,
    in_flight: HashSet<LeadId>,
    last_load_error: Option<String>,
    notices: Vec<Notice>,
}

impl BoardState {
    fn install(&mut self, board: Board) {
        self.board = board;
        self.generation += 1;
        self.last_load_error = None;
    }

    /// Ends a move without confirmation. The source column is restored only
    /// while the board is still the one the move was applied to.
    fn release(&mut self, lead_id: LeadId, from: Stage, to: Stage, generation: u64) -> bool {
        self.in_flight.remove(&lead_id);
        if self.generation != generation || self.board.locate(lead_id) != Some(to) {
            return false;
        }
        match self.board.with_moved(lead_id, from) {
            Some(restored) => {
                self.board = restored;
                true
            }
            None => false,
        }
    }
}

/// Keeps a board consistent with a `LeadStore` under optimistic moves.
pub struct BoardReconciler<S: LeadStore> {
    store: S,
    state: Arc<Mutex<BoardState>>,
}

impl<S: LeadStore> BoardReconciler<S> {
    /// Creates a reconciler with an empty board and no filters.
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(BoardState::default())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-only copy of the current board.
    pub fn snapshot(&self) -> Board {
        self.lock().board.clone()
    }

    /// Filters of the last successful load.
    pub fn active_filters(&self) -> LeadFilter {
        self.lock().filters.clone()
    }

    /// Message of the last failed load, cleared by the next successful one.
    pub fn last_load_error(&self) -> Option<String> {
        self.lock().last_load_error.clone()
    }

    /// Leads with an unconfirmed move, sorted.
    pub fn in_flight(&self) -> Vec<LeadId> {
        let mut ids: Vec<LeadId> = self.lock().in_flight.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Drains queued notices in the order they were raised.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.lock().notices)
    }

    /// Lists leads through the store and rebuilds the board.
    ///
    /// On failure the board and active filters stay as they were.
    pub async fn load(&self, filters: LeadFilter) -> BoardResult<Board> {
        let started_at = Instant::now();
        match self.store.list(&filters).await {
            Ok(leads) => {
                let board = Board::from_leads(leads);
                let mut state = self.lock();
                state.install(board.clone());
                state.filters = filters;
                info!(
                    "event=board_load module=board status=ok leads={} duration_ms={}",
                    board.lead_count(),
                    started_at.elapsed().as_millis()
                );
                Ok(board)
            }
            Err(err) => {
                warn!(
                    "event=board_load module=board status=error duration_ms={} error_kind={:?} error={}",
                    started_at.elapsed().as_millis(),
                    err.kind(),
                    err
                );
                let mut state = self.lock();
                state.last_load_error = Some(err.to_string());
                state.notices.push(Notice::load_failed(&err));
                Err(BoardError::Load(err))
            }
        }
    }

    /// Re-runs `load` with the active filters (retry affordance).
    pub async fn reload(&self) -> BoardResult<Board> {
        let filters = self.active_filters();
        self.load(filters).await
    }

    /// Moves one lead: optimistic apply, then confirm or roll back.
    pub async fn move_lead(&self, id: LeadId, target: Stage) -> BoardResult<Board> {
        match self.begin_move(id, target)? {
            MoveStart::Unchanged(board) => Ok(board),
            MoveStart::Pending(pending) => self.settle(pending).await.map(|report| report.board),
        }
    }

    /// Same as `move_lead` with the target given by column name.
    pub async fn move_lead_named(&self, id: LeadId, column: &str) -> BoardResult<Board> {
        let target = Stage::parse(column)
            .ok_or_else(|| ValidationError::UnknownColumn(column.to_string()))?;
        self.move_lead(id, target).await
    }

    /// Applies a move to the local board without contacting the store.
    ///
    /// The returned `PendingMove` must be passed to `settle`.
    pub fn begin_move(&self, id: LeadId, target: Stage) -> BoardResult<MoveStart> {
        let mut state = self.lock();
        let from = state
            .board
            .locate(id)
            .ok_or(ValidationError::UnknownLead(id))?;
        if from == target {
            return Ok(MoveStart::Unchanged(state.board.clone()));
        }
        if state.in_flight.contains(&id) {
            return Err(ValidationError::MoveInFlight(id).into());
        }

        let board = state
            .board
            .with_moved(id, target)
            .ok_or(ValidationError::UnknownLead(id))?;
        state.board = board.clone();
        state.in_flight.insert(id);
        info!(
            "event=lead_move module=board status=start state={} lead_id={id} from={from} to={target}",
            MoveState::OptimisticallyApplied.as_str()
        );

        Ok(MoveStart::Pending(PendingMove {
            lead_id: id,
            from,
            to: target,
            board,
            started_at: Instant::now(),
            generation: state.generation,
            state: Arc::clone(&self.state),
            armed: true,
        }))
    }

    /// Confirms a pending move with the store.
    ///
    /// On success the persisted lead replaces the optimistic copy. On failure
    /// the board is reloaded with the active filters and exactly one notice is
    /// queued. If this future is dropped before it completes, the pending move
    /// is abandoned as described on `PendingMove`.
    pub async fn settle(&self, mut pending: PendingMove) -> BoardResult<MoveReport> {
        let lead_id = pending.lead_id;
        let from = pending.from;
        let to = pending.to;
        let started_at = pending.started_at;

        let cause = match self.store.update_stage(lead_id, to).await {
            Ok(persisted) => {
                let mut state = self.lock();
                pending.armed = false;
                state.in_flight.remove(&lead_id);
                state.board = state.board.with_replaced(persisted);
                info!(
                    "event=lead_move module=board status=ok state={} lead_id={lead_id} from={from} to={to} duration_ms={}",
                    MoveState::Confirmed.as_str(),
                    started_at.elapsed().as_millis()
                );
                return Ok(MoveReport {
                    lead_id,
                    from,
                    to,
                    state: MoveState::Confirmed,
                    board: state.board.clone(),
                });
            }
            Err(err) => err,
        };

        warn!(
            "event=lead_move module=board status=error state={} lead_id={lead_id} from={from} to={to} error_kind={:?} error={cause}",
            MoveState::RolledBack.as_str(),
            cause.kind()
        );

        let (filters, listed_generation) = {
            let state = self.lock();
            (state.filters.clone(), state.generation)
        };
        let reloaded = self.store.list(&filters).await;

        let mut state = self.lock();
        pending.armed = false;
        let superseded = state.generation != listed_generation;
        let reload_error = match reloaded {
            Ok(_) if superseded => {
                state.in_flight.remove(&lead_id);
                info!(
                    "event=board_load module=board status=skipped reason=rollback lead_id={lead_id} superseded=true"
                );
                None
            }
            Ok(leads) => {
                state.in_flight.remove(&lead_id);
                state.install(Board::from_leads(leads));
                None
            }
            Err(err) => {
                warn!(
                    "event=board_load module=board status=error reason=rollback lead_id={lead_id} error={err}"
                );
                state.release(lead_id, from, to, pending.generation);
                Some(err)
            }
        };
        state.notices.push(Notice::move_rolled_back(lead_id, to, &cause));
        info!(
            "event=lead_move module=board status=rollback lead_id={lead_id} restored_to={} duration_ms={}",
            state
                .board
                .locate(lead_id)
                .map_or("absent", Stage::as_str),
            started_at.elapsed().as_millis()
        );

        Err(BoardError::MoveRolledBack {
            lead_id,
            cause,
            reload_error,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{BoardError, BoardReconciler, MoveStart, ValidationError};
    use crate::model::filter::LeadFilter;
    use crate::model::lead::{Lead, LeadAttributes, Stage};
    use crate::repo::lead_store::LeadStore;
    use crate::repo::memory_store::InMemoryLeadStore;

    fn seeded() -> (BoardReconciler<InMemoryLeadStore>, Lead) {
        let lead = Lead::new(Stage::Incoming, LeadAttributes::new("L1"));
        let store = InMemoryLeadStore::with_leads(vec![lead.clone()]).unwrap();
        (BoardReconciler::new(store), lead)
    }

    #[tokio::test]
    async fn begin_move_rejects_second_move_while_in_flight() {
        let (reconciler, lead) = seeded();
        reconciler.load(LeadFilter::all()).await.unwrap();

        let pending = match reconciler.begin_move(lead.id, Stage::Decision).unwrap() {
            MoveStart::Pending(pending) => pending,
            MoveStart::Unchanged(_) => panic!("move should be pending"),
        };
        assert_eq!(reconciler.in_flight(), vec![lead.id]);

        let err = reconciler.begin_move(lead.id, Stage::Final).unwrap_err();
        assert!(matches!(
            err,
            BoardError::Validation(ValidationError::MoveInFlight(id)) if id == lead.id
        ));

        reconciler.settle(pending).await.unwrap();
        assert!(reconciler.in_flight().is_empty());
    }

    #[tokio::test]
    async fn dropping_unsettled_move_restores_source_column() {
        let (reconciler, lead) = seeded();
        let before = reconciler.load(LeadFilter::all()).await.unwrap();

        let pending = match reconciler.begin_move(lead.id, Stage::Negotiation).unwrap() {
            MoveStart::Pending(pending) => pending,
            MoveStart::Unchanged(_) => panic!("move should be pending"),
        };
        assert_eq!(reconciler.snapshot().locate(lead.id), Some(Stage::Negotiation));
        drop(pending);

        assert_eq!(reconciler.snapshot(), before);
        assert!(reconciler.in_flight().is_empty());
        assert_eq!(reconciler.store().update_calls(), 0);
        reconciler.move_lead(lead.id, Stage::Final).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_move_leaves_newer_listing_alone() {
        let (reconciler, lead) = seeded();
        reconciler.load(LeadFilter::all()).await.unwrap();

        let pending = match reconciler.begin_move(lead.id, Stage::Decision).unwrap() {
            MoveStart::Pending(pending) => pending,
            MoveStart::Unchanged(_) => panic!("move should be pending"),
        };
        reconciler
            .store()
            .update_stage(lead.id, Stage::Decision)
            .await
            .unwrap();
        let listed = reconciler.load(LeadFilter::all()).await.unwrap();
        drop(pending);

        assert_eq!(reconciler.snapshot(), listed);
        assert_eq!(reconciler.snapshot().locate(lead.id), Some(Stage::Decision));
        assert!(reconciler.in_flight().is_empty());
    }

    #[tokio::test]
    async fn unknown_lead_is_rejected_without_state_change() {
        let (reconciler, _) = seeded();
        let before = reconciler.load(LeadFilter::all()).await.unwrap();
        let stranger = Lead::new(Stage::Incoming, LeadAttributes::new("Nobody"));

        let err = reconciler
            .move_lead(stranger.id, Stage::Final)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(reconciler.snapshot(), before);
        assert_eq!(reconciler.store().update_calls(), 0);
        assert!(reconciler.take_notices().is_empty());
    }
}
