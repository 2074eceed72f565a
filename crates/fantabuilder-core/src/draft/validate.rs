// Sale validation against budget and role quota.

use super::ledger::Ledger;
use super::player::Player;
use super::session::Participant;
use crate::error::Rejection;

/// Decide whether `participant` may buy `player` at `price`.
///
/// Checks run in order and stop at the first failure: price, credits, role
/// quota, then double sale. On success the price is returned as an unsigned
/// amount ready to be recorded.
pub fn validate(
    participant: &Participant,
    player: &Player,
    price: i64,
    ledger: &Ledger,
) -> Result<u32, Rejection> {
    if price < 1 {
        return Err(Rejection::InvalidPrice { price });
    }

    if i64::from(participant.credits) < price {
        return Err(Rejection::InsufficientCredits {
            available: participant.credits,
            price,
        });
    }

    let owned = ledger.count_by_role(participant.id, player.role);
    let quota = player.role.quota();
    if owned >= quota {
        return Err(Rejection::RoleQuotaExceeded {
            role: player.role,
            owned,
            quota,
        });
    }

    // Reachable when a stale current player is resubmitted.
    if ledger.is_sold(player.id) {
        return Err(Rejection::AlreadySold {
            player_id: player.id,
        });
    }

    // Bounded by the u32 credit balance above.
    u32::try_from(price).map_err(|_| Rejection::InvalidPrice { price })
}
