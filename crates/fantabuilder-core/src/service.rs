// Session registry: routes session-scoped operations to their controllers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::db::Database;
use crate::draft::catalog::Catalog;
use crate::draft::controller::{CursorState, DraftController, ScopeChangePreview, SessionEvent};
use crate::draft::ledger::{LedgerSummary, Sale};
use crate::draft::order::DraftScope;
use crate::draft::player::{Player, PlayerId};
use crate::draft::session::{Actor, Participant, ParticipantId, Session};
use crate::error::DraftError;

/// Entry point for everything outside the core. Owns the store, the catalog
/// and one [`DraftController`] per registered session.
pub struct DraftService {
    db: Arc<Database>,
    catalog: Arc<Catalog>,
    sessions: HashMap<String, DraftController>,
}

impl DraftService {
    pub fn new(db: Arc<Database>, catalog: Arc<Catalog>) -> Self {
        DraftService {
            db,
            catalog,
            sessions: HashMap::new(),
        }
    }

    /// Persist `session` and load (or reload) its controller from the store.
    /// Existing order, cursor and sales are picked up as-is.
    ///
    /// Changed settings of an already stored session never rebuild its order;
    /// a new ordering policy takes effect at the next scope change.
    pub fn register_session(&mut self, session: Session) -> Result<(), DraftError> {
        let stored = self
            .db
            .load_session(&session.id)
            .map_err(DraftError::PersistenceFailure)?;
        if let Some(previous) = stored.filter(|prev| *prev != session) {
            info!(
                "Session {} settings changed (policy {:?} -> {:?}, default scope {} -> {})",
                session.id, previous.policy, session.policy, previous.default_scope, session.default_scope
            );
        }
        self.db
            .upsert_session(&session)
            .map_err(DraftError::PersistenceFailure)?;
        let id = session.id.clone();
        let controller = DraftController::load(session, Arc::clone(&self.catalog), Arc::clone(&self.db))?;
        info!(
            "Registered session {id} ({} participants, {} sales)",
            controller.participants().len(),
            controller.sales().len()
        );
        self.sessions.insert(id, controller);
        Ok(())
    }

    /// Register a participant with the session's starting credits. A user
    /// already seated keeps their record.
    pub fn add_participant(
        &mut self,
        session_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> Result<Participant, DraftError> {
        let controller = lookup_mut(&mut self.sessions, session_id)?;
        let credits = controller.session().initial_credits;
        let participant = self
            .db
            .add_participant(session_id, user_id, nickname, credits)
            .map_err(DraftError::PersistenceFailure)?;
        controller.upsert_participant(participant.clone());
        Ok(participant)
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn session(&self, session_id: &str) -> Result<&Session, DraftError> {
        Ok(lookup(&self.sessions, session_id)?.session())
    }

    /// Resolve `user_id`'s identity within a session.
    pub fn actor(&self, session_id: &str, user_id: &str) -> Result<Actor, DraftError> {
        Ok(self.session(session_id)?.actor_for(user_id))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn start_or_resume_draft(
        &mut self,
        session_id: &str,
        actor: &Actor,
        scope: Option<DraftScope>,
    ) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.start_or_resume(actor, scope)
    }

    pub fn change_scope(
        &mut self,
        session_id: &str,
        actor: &Actor,
        scope: DraftScope,
    ) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.change_scope(actor, scope)
    }

    pub fn request_scope_change(
        &mut self,
        session_id: &str,
        actor: &Actor,
        scope: DraftScope,
    ) -> Result<ScopeChangePreview, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.request_scope_change(actor, scope)
    }

    pub fn confirm_scope_change(
        &mut self,
        session_id: &str,
        actor: &Actor,
    ) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.confirm_scope_change(actor)
    }

    pub fn cancel_scope_change(
        &mut self,
        session_id: &str,
        actor: &Actor,
    ) -> Result<Option<DraftScope>, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.cancel_scope_change(actor)
    }

    pub fn advance(&mut self, session_id: &str, actor: &Actor) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.advance(actor)
    }

    pub fn retreat(&mut self, session_id: &str, actor: &Actor) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.retreat(actor)
    }

    pub fn jump_to(
        &mut self,
        session_id: &str,
        actor: &Actor,
        player_id: PlayerId,
    ) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.jump_to(actor, player_id)
    }

    pub fn jump_to_start(
        &mut self,
        session_id: &str,
        actor: &Actor,
    ) -> Result<CursorState, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.jump_to_start(actor)
    }

    pub fn confirm_assignment(
        &mut self,
        session_id: &str,
        actor: &Actor,
        participant_id: ParticipantId,
        price: i64,
    ) -> Result<Sale, DraftError> {
        lookup_mut(&mut self.sessions, session_id)?.confirm_assignment(actor, participant_id, price)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn cursor_state(&self, session_id: &str) -> Result<Option<CursorState>, DraftError> {
        Ok(lookup(&self.sessions, session_id)?.cursor_state())
    }

    pub fn get_current_player(&self, session_id: &str) -> Result<Option<Player>, DraftError> {
        Ok(lookup(&self.sessions, session_id)?.current_player().cloned())
    }

    pub fn get_ledger_summary(
        &self,
        session_id: &str,
        participant_id: ParticipantId,
    ) -> Result<LedgerSummary, DraftError> {
        lookup(&self.sessions, session_id)?.ledger_summary(participant_id)
    }

    pub fn list_players(&self, session_id: &str, scope: DraftScope) -> Result<Vec<Player>, DraftError> {
        Ok(lookup(&self.sessions, session_id)?
            .list_players(scope)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn list_participants(&self, session_id: &str) -> Result<Vec<Participant>, DraftError> {
        Ok(lookup(&self.sessions, session_id)?.participants().to_vec())
    }

    pub fn list_sales(&self, session_id: &str) -> Result<Vec<Sale>, DraftError> {
        Ok(lookup(&self.sessions, session_id)?.sales().to_vec())
    }

    pub fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<SessionEvent>, DraftError> {
        Ok(lookup(&self.sessions, session_id)?.subscribe())
    }
}

fn lookup<'a>(
    sessions: &'a HashMap<String, DraftController>,
    session_id: &str,
) -> Result<&'a DraftController, DraftError> {
    sessions
        .get(session_id)
        .ok_or_else(|| DraftError::not_found(format!("session {session_id}")))
}

fn lookup_mut<'a>(
    sessions: &'a mut HashMap<String, DraftController>,
    session_id: &str,
) -> Result<&'a mut DraftController, DraftError> {
    sessions
        .get_mut(session_id)
        .ok_or_else(|| DraftError::not_found(format!("session {session_id}")))
}
