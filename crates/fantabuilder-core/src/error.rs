// Error taxonomy for draft operations.

use thiserror::Error;

use crate::draft::player::{PlayerId, Role};

/// Why a proposed sale was refused. Expected, recoverable, and meant to be
/// shown to the admin as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid price {price}: must be at least 1")]
    InvalidPrice { price: i64 },

    #[error("insufficient credits: {available} available, {price} required")]
    InsufficientCredits { available: u32, price: i64 },

    #[error("role quota reached for {role}: already owns {owned} of {quota}")]
    RoleQuotaExceeded {
        role: Role,
        owned: usize,
        quota: usize,
    },

    #[error("player {player_id} has already been sold")]
    AlreadySold { player_id: PlayerId },
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::InvalidPrice { .. } => "invalid_price",
            Rejection::InsufficientCredits { .. } => "insufficient_credits",
            Rejection::RoleQuotaExceeded { .. } => "role_quota_exceeded",
            Rejection::AlreadySold { .. } => "already_sold",
        }
    }
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Unknown session, participant or player.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The operation is not valid in the current state (e.g. moving the
    /// cursor over an empty order).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("only the session admin may {action}")]
    Unauthorized { action: &'static str },

    /// The durable write did not commit. Nothing was changed; safe to retry.
    #[error("persistence failure: {0:#}")]
    PersistenceFailure(#[source] anyhow::Error),
}

impl DraftError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DraftError::NotFound { what: what.into() }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        DraftError::PreconditionFailed(message.into())
    }

    /// Whether the caller may simply retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DraftError::PersistenceFailure(_))
    }

    /// Stable machine-readable tag, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            DraftError::Rejected(r) => r.kind(),
            DraftError::NotFound { .. } => "not_found",
            DraftError::PreconditionFailed(_) => "precondition_failed",
            DraftError::Unauthorized { .. } => "unauthorized",
            DraftError::PersistenceFailure(_) => "persistence_failure",
        }
    }

    /// The rejection reason, if this error is a validation failure.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            DraftError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_failures_are_retryable() {
        assert!(DraftError::PersistenceFailure(anyhow::anyhow!("disk full")).is_retryable());
        assert!(!DraftError::not_found("session s1").is_retryable());
        assert!(!DraftError::from(Rejection::InvalidPrice { price: 0 }).is_retryable());
    }

    #[test]
    fn kinds_are_stable() {
        let err = DraftError::from(Rejection::AlreadySold { player_id: 4 });
        assert_eq!(err.kind(), "already_sold");
        assert_eq!(err.to_string(), "player 4 has already been sold");
        assert_eq!(DraftError::precondition("empty").kind(), "precondition_failed");
        assert_eq!(
            DraftError::Unauthorized { action: "advance the cursor" }.to_string(),
            "only the session admin may advance the cursor"
        );
    }

    #[test]
    fn rejection_message_names_role() {
        let r = Rejection::RoleQuotaExceeded {
            role: Role::Goalkeeper,
            owned: 3,
            quota: 3,
        };
        assert_eq!(r.to_string(), "role quota reached for P: already owns 3 of 3");
    }

    #[test]
    fn persistence_message_includes_context_chain() {
        let inner = anyhow::anyhow!("database is locked").context("failed to commit sale");
        let err = DraftError::PersistenceFailure(inner);
        assert_eq!(
            err.to_string(),
            "persistence failure: failed to commit sale: database is locked"
        );
    }
}
