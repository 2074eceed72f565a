// Wire protocol between websocket clients and the draft server.
//
// Every frame is a JSON object tagged by `type`. Field names are snake_case;
// tags are SCREAMING_SNAKE_CASE.

use serde::{Deserialize, Serialize};

use fantabuilder_core::draft::{
    CursorState, DraftScope, LedgerSummary, Participant, ParticipantId, Player, PlayerId, Sale,
    ScopeChangePreview, SessionEvent,
};
use fantabuilder_core::error::DraftError;

/// Requests sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Join a session. Must precede every other request on a connection.
    Hello { session_id: String, user_id: String },
    StartDraft {
        /// Overrides the session's default scope on first start.
        #[serde(default)]
        scope: Option<DraftScope>,
    },
    RequestScopeChange { scope: DraftScope },
    ConfirmScopeChange,
    CancelScopeChange,
    Advance,
    Retreat,
    JumpTo { player_id: PlayerId },
    JumpToStart,
    ConfirmAssignment { participant_id: ParticipantId, price: i64 },
    GetCurrentPlayer,
    GetLedgerSummary { participant_id: ParticipantId },
    ListPlayers {
        #[serde(default)]
        scope: DraftScope,
    },
    ListParticipants,
    ListSales,
}

/// Replies and pushed updates sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome {
        session_id: String,
        user_id: String,
        is_admin: bool,
        /// `None` until the draft has been started.
        cursor: Option<CursorState>,
        current_player: Option<Player>,
    },
    Cursor { cursor: CursorState },
    ScopeChangePreview { preview: ScopeChangePreview },
    ScopeChangeCancelled { scope: Option<DraftScope> },
    Sale { sale: Sale },
    CurrentPlayer { player: Option<Player> },
    LedgerSummary { summary: LedgerSummary },
    Players { scope: DraftScope, players: Vec<Player> },
    Participants { participants: Vec<Participant> },
    Sales { sales: Vec<Sale> },
    /// A committed change in the client's session.
    Event { event: SessionEvent },
    /// Some events were dropped for this client; it should refetch state.
    Resync { missed: u64 },
    Error {
        kind: String,
        message: String,
        retryable: bool,
    },
}

impl ServerMessage {
    pub fn from_error(err: &DraftError) -> Self {
        ServerMessage::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    /// Reply to a frame that could not be parsed.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: "invalid_message".into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain data with string map keys.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"ERROR","kind":"internal","message":"{e}","retryable":false}}"#)
        })
    }
}
