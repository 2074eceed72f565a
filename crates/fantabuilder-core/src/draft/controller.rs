// Per-session draft state machine: the single writer of cursor and ledger.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::cursor::DraftCursor;
use super::ledger::{Ledger, LedgerSummary, Sale};
use super::order::{self, DraftScope};
use super::player::{Player, PlayerId};
use super::session::{Actor, Participant, ParticipantId, Session};
use super::validate::validate;
use crate::db::Database;
use crate::error::DraftError;

/// Buffered events per session before slow subscribers start lagging.
pub const EVENT_CAPACITY: usize = 256;

/// Snapshot of the cursor after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub scope: DraftScope,
    pub order_len: usize,
    pub position: Option<usize>,
    pub current: Option<PlayerId>,
}

impl CursorState {
    fn of(scope: DraftScope, cursor: &DraftCursor) -> Self {
        CursorState {
            scope,
            order_len: cursor.order().len(),
            position: cursor.position(),
            current: cursor.current(),
        }
    }
}

/// What a pending scope change would discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeChangePreview {
    pub from: DraftScope,
    pub to: DraftScope,
    /// Unsold players of the current order that leave the upcoming sequence.
    pub unsold_remaining: usize,
}

/// A committed mutation, published to every observer of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    DraftStarted {
        session_id: String,
        cursor: CursorState,
    },
    ScopeChanged {
        session_id: String,
        cursor: CursorState,
    },
    CursorMoved {
        session_id: String,
        cursor: CursorState,
    },
    SaleRecorded {
        session_id: String,
        sale: Sale,
        credits_remaining: u32,
        cursor: CursorState,
    },
}

#[derive(Debug, Clone)]
enum Phase {
    Uninitialized,
    Active {
        scope: DraftScope,
        cursor: DraftCursor,
    },
}

/// Owns one session's order, cursor, ledger and participant balances.
///
/// Every mutation is persisted before the in-memory state changes and
/// before the matching [`SessionEvent`] is published, so observers never
/// see state that a restart would lose.
pub struct DraftController {
    session: Session,
    catalog: Arc<Catalog>,
    db: Arc<Database>,
    phase: Phase,
    ledger: Ledger,
    participants: Vec<Participant>,
    pending_scope: Option<DraftScope>,
    events: broadcast::Sender<SessionEvent>,
}

impl DraftController {
    /// Rebuild a controller from whatever the database holds for `session`.
    ///
    /// A previously started draft comes back `Active` with its stored order
    /// and cursor; the ledger is replayed in sale order.
    pub fn load(
        session: Session,
        catalog: Arc<Catalog>,
        db: Arc<Database>,
    ) -> Result<Self, DraftError> {
        let participants = db
            .load_participants(&session.id)
            .map_err(DraftError::PersistenceFailure)?;
        let sales = db
            .load_sales(&session.id)
            .map_err(DraftError::PersistenceFailure)?;
        let sale_count = sales.len();
        let ledger = Ledger::from_sales(sales).map_err(|e| {
            DraftError::PersistenceFailure(anyhow::Error::new(e).context(format!(
                "stored ledger for session {} is inconsistent",
                session.id
            )))
        })?;

        let phase = match db
            .load_draft(&session.id)
            .map_err(DraftError::PersistenceFailure)?
        {
            Some(stored) => {
                if let Some(missing) = stored.order.ids().iter().find(|id| catalog.get(**id).is_none()) {
                    return Err(DraftError::not_found(format!(
                        "player {missing} from the stored order of session {} in catalog",
                        session.id
                    )));
                }
                let cursor = DraftCursor::restore(stored.order, stored.position)?;
                info!(
                    "Resumed session {} (scope {}, position {:?}, {} sales)",
                    session.id,
                    stored.scope,
                    cursor.position(),
                    sale_count
                );
                Phase::Active {
                    scope: stored.scope,
                    cursor,
                }
            }
            None => Phase::Uninitialized,
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(DraftController {
            session,
            catalog,
            db,
            phase,
            ledger,
            participants,
            pending_scope: None,
            events,
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the draft over `scope` (or the session default), or return the
    /// existing cursor if it is already running. Starting requires the admin;
    /// resuming does not.
    pub fn start_or_resume(
        &mut self,
        actor: &Actor,
        scope: Option<DraftScope>,
    ) -> Result<CursorState, DraftError> {
        if let Some(state) = self.cursor_state() {
            return Ok(state);
        }
        require_admin(actor, "start the draft")?;

        let scope = scope.unwrap_or(self.session.default_scope);
        let cursor = self.build_cursor(scope);
        self.db
            .replace_order(&self.session.id, scope, cursor.order(), cursor.position())
            .map_err(|e| self.persistence_failure("start draft", e))?;

        let state = CursorState::of(scope, &cursor);
        self.phase = Phase::Active { scope, cursor };
        info!(
            "Draft started for session {} (scope {scope}, {} players)",
            self.session.id, state.order_len
        );
        self.publish(SessionEvent::DraftStarted {
            session_id: self.session.id.clone(),
            cursor: state.clone(),
        });
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Scope changes
    // ------------------------------------------------------------------

    /// Stage a scope change and report what it would discard.
    pub fn request_scope_change(
        &mut self,
        actor: &Actor,
        to: DraftScope,
    ) -> Result<ScopeChangePreview, DraftError> {
        require_admin(actor, "change the draft scope")?;
        self.ensure_started(actor)?;
        let (from, cursor) = self.active()?;
        let unsold_remaining = cursor
            .order()
            .ids()
            .iter()
            .filter(|id| !self.ledger.is_sold(**id))
            .count();
        let preview = ScopeChangePreview {
            from,
            to,
            unsold_remaining,
        };
        self.pending_scope = Some(to);
        debug!("Scope change staged for session {}: {preview:?}", self.session.id);
        Ok(preview)
    }

    /// Apply the staged scope change: regenerate the order over the new
    /// scope and restart the cursor. The ledger is untouched.
    pub fn confirm_scope_change(&mut self, actor: &Actor) -> Result<CursorState, DraftError> {
        require_admin(actor, "change the draft scope")?;
        self.ensure_started(actor)?;
        let scope = self
            .pending_scope
            .ok_or_else(|| DraftError::precondition("no scope change is pending"))?;

        let cursor = self.build_cursor(scope);
        self.db
            .replace_order(&self.session.id, scope, cursor.order(), cursor.position())
            .map_err(|e| self.persistence_failure("change scope", e))?;

        let state = CursorState::of(scope, &cursor);
        self.phase = Phase::Active { scope, cursor };
        self.pending_scope = None;
        info!(
            "Session {} scope changed to {scope} ({} players)",
            self.session.id, state.order_len
        );
        self.publish(SessionEvent::ScopeChanged {
            session_id: self.session.id.clone(),
            cursor: state.clone(),
        });
        Ok(state)
    }

    /// Drop the staged scope change, returning it if there was one.
    pub fn cancel_scope_change(&mut self, actor: &Actor) -> Result<Option<DraftScope>, DraftError> {
        require_admin(actor, "change the draft scope")?;
        Ok(self.pending_scope.take())
    }

    /// Request and confirm a scope change in one step.
    pub fn change_scope(&mut self, actor: &Actor, to: DraftScope) -> Result<CursorState, DraftError> {
        self.request_scope_change(actor, to)?;
        self.confirm_scope_change(actor)
    }

    // ------------------------------------------------------------------
    // Cursor moves
    // ------------------------------------------------------------------

    pub fn advance(&mut self, actor: &Actor) -> Result<CursorState, DraftError> {
        self.move_cursor(actor, "advance the cursor", |c| c.advance().map(drop))
    }

    pub fn retreat(&mut self, actor: &Actor) -> Result<CursorState, DraftError> {
        self.move_cursor(actor, "retreat the cursor", |c| c.retreat().map(drop))
    }

    pub fn jump_to_start(&mut self, actor: &Actor) -> Result<CursorState, DraftError> {
        self.move_cursor(actor, "move the cursor", |c| c.jump_to_start().map(drop))
    }

    pub fn jump_to(&mut self, actor: &Actor, player_id: PlayerId) -> Result<CursorState, DraftError> {
        self.move_cursor(actor, "move the cursor", |c| c.jump_to(player_id).map(drop))
    }

    /// Apply `step` to a copy of the cursor, persist it, then swap it in.
    fn move_cursor<F>(
        &mut self,
        actor: &Actor,
        action: &'static str,
        step: F,
    ) -> Result<CursorState, DraftError>
    where
        F: FnOnce(&mut DraftCursor) -> Result<(), DraftError>,
    {
        require_admin(actor, action)?;
        self.ensure_started(actor)?;
        let (scope, cursor) = self.active()?;
        let mut next = cursor.clone();
        step(&mut next)?;

        self.db
            .save_cursor_position(&self.session.id, next.position())
            .map_err(|e| self.persistence_failure(action, e))?;

        let state = CursorState::of(scope, &next);
        self.phase = Phase::Active { scope, cursor: next };
        debug!(
            "Session {} cursor at {:?} (player {:?})",
            self.session.id, state.position, state.current
        );
        self.publish(SessionEvent::CursorMoved {
            session_id: self.session.id.clone(),
            cursor: state.clone(),
        });
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    /// Sell the current player to `participant_id` at `price`, then advance.
    ///
    /// The sale and the credit deduction commit together or not at all. The
    /// advance afterwards is a separate write: if only that fails the sale
    /// still stands and the cursor stays on the sold player.
    pub fn confirm_assignment(
        &mut self,
        actor: &Actor,
        participant_id: ParticipantId,
        price: i64,
    ) -> Result<Sale, DraftError> {
        require_admin(actor, "confirm an assignment")?;
        self.ensure_started(actor)?;
        let (scope, cursor) = self.active()?;
        let cursor = cursor.clone();
        let player_id = cursor
            .current()
            .ok_or_else(|| DraftError::precondition("there is no current player to assign"))?;
        let player = self
            .catalog
            .get(player_id)
            .ok_or_else(|| DraftError::not_found(format!("player {player_id}")))?;
        let idx = self.participant_index(participant_id)?;
        let participant = &self.participants[idx];

        let price = validate(participant, player, price, &self.ledger).map_err(|rejection| {
            info!(
                "Assignment of {} to {} rejected: {rejection}",
                player.name, participant.nickname
            );
            DraftError::from(rejection)
        })?;

        let sale = self.ledger.next_sale(participant_id, player, price);
        let credits_remaining = match self.db.commit_sale(&self.session.id, &sale) {
            Ok(Ok(remaining)) => remaining,
            Ok(Err(rejection)) => {
                info!("Sale of player {player_id} refused by store: {rejection}");
                return Err(rejection.into());
            }
            Err(e) => return Err(self.persistence_failure("confirm assignment", e)),
        };

        info!(
            "Sale #{}: {} to {} for {} ({} credits left)",
            sale.sale_order, player.name, participant.nickname, sale.price, credits_remaining
        );
        self.ledger.record(sale.clone());
        self.participants[idx].credits = credits_remaining;

        let mut next = cursor.clone();
        let cursor_after = match next.advance() {
            Ok(_) => match self.db.save_cursor_position(&self.session.id, next.position()) {
                Ok(()) => next,
                Err(e) => {
                    warn!(
                        "Sale #{} committed but advancing the cursor failed: {e:#}",
                        sale.sale_order
                    );
                    cursor
                }
            },
            Err(_) => cursor,
        };

        let state = CursorState::of(scope, &cursor_after);
        self.phase = Phase::Active {
            scope,
            cursor: cursor_after,
        };
        self.publish(SessionEvent::SaleRecorded {
            session_id: self.session.id.clone(),
            sale: sale.clone(),
            credits_remaining,
            cursor: state,
        });
        Ok(sale)
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Track a participant registered after the controller was loaded.
    pub fn upsert_participant(&mut self, participant: Participant) {
        match self.participants.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => *existing = participant,
            None => {
                self.participants.push(participant);
                self.participants.sort_by_key(|p| (p.position, p.id));
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `None` until the draft has been started.
    pub fn cursor_state(&self) -> Option<CursorState> {
        match &self.phase {
            Phase::Uninitialized => None,
            Phase::Active { scope, cursor } => Some(CursorState::of(*scope, cursor)),
        }
    }

    pub fn current_player(&self) -> Option<&Player> {
        match &self.phase {
            Phase::Uninitialized => None,
            Phase::Active { cursor, .. } => cursor.current().and_then(|id| self.catalog.get(id)),
        }
    }

    pub fn pending_scope(&self) -> Option<DraftScope> {
        self.pending_scope
    }

    pub fn ledger_summary(&self, participant_id: ParticipantId) -> Result<LedgerSummary, DraftError> {
        let participant = &self.participants[self.participant_index(participant_id)?];
        Ok(LedgerSummary {
            participant_id,
            credits_remaining: participant.credits,
            total_spent: self.ledger.total_spent(participant_id),
            counts_by_role: self.ledger.counts_by_role(participant_id),
        })
    }

    /// Catalog view filter. Never touches cursor, order or ledger.
    pub fn list_players(&self, scope: DraftScope) -> Vec<&Player> {
        self.catalog.list_players(scope)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn sales(&self) -> &[Sale] {
        self.ledger.sales()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// The first admin mutation on an unstarted session starts it over the
    /// default scope.
    fn ensure_started(&mut self, actor: &Actor) -> Result<(), DraftError> {
        if matches!(self.phase, Phase::Uninitialized) {
            self.start_or_resume(actor, None)?;
        }
        Ok(())
    }

    fn active(&self) -> Result<(DraftScope, &DraftCursor), DraftError> {
        match &self.phase {
            Phase::Active { scope, cursor } => Ok((*scope, cursor)),
            Phase::Uninitialized => Err(DraftError::precondition(format!(
                "draft for session {} has not been started",
                self.session.id
            ))),
        }
    }

    fn build_cursor(&self, scope: DraftScope) -> DraftCursor {
        let candidates = self.catalog.list_players(scope);
        DraftCursor::initialize(order::generate(candidates, &self.session.policy))
    }

    fn participant_index(&self, participant_id: ParticipantId) -> Result<usize, DraftError> {
        self.participants
            .iter()
            .position(|p| p.id == participant_id)
            .ok_or_else(|| {
                DraftError::not_found(format!(
                    "participant {participant_id} in session {}",
                    self.session.id
                ))
            })
    }

    fn persistence_failure(&self, action: &str, err: anyhow::Error) -> DraftError {
        warn!("Session {}: {action} failed to persist: {err:#}", self.session.id);
        DraftError::PersistenceFailure(err)
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine: nobody is watching this session yet.
        let _ = self.events.send(event);
    }
}

fn require_admin(actor: &Actor, action: &'static str) -> Result<(), DraftError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(DraftError::Unauthorized { action })
    }
}
