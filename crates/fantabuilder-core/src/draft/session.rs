// Session, participant and caller identity records.

use serde::{Deserialize, Serialize};

use super::order::{DraftScope, OrderingPolicy};

pub type ParticipantId = i64;

/// A draft session's fixed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// User id of the single admin allowed to drive the draft.
    pub admin_user_id: String,
    pub policy: OrderingPolicy,
    /// Scope used when the draft is first started.
    pub default_scope: DraftScope,
    /// Credits each participant starts with.
    pub initial_credits: u32,
}

impl Session {
    /// Resolve the caller identity for `user_id` within this session.
    pub fn actor_for(&self, user_id: &str) -> Actor {
        Actor {
            user_id: user_id.to_string(),
            is_admin: user_id == self.admin_user_id,
        }
    }
}

/// The authenticated caller, reduced to what the draft engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub is_admin: bool,
}

/// A human bidding in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub user_id: String,
    pub nickname: String,
    /// Remaining credit balance.
    pub credits: u32,
    /// Seat order for display.
    pub position: u32,
}
