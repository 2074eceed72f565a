// Circular cursor over the active draft order.

use serde::{Deserialize, Serialize};

use super::order::DraftOrder;
use super::player::PlayerId;
use crate::error::DraftError;

/// Points at the player currently under auction.
///
/// Invariant: `position` is `Some(i)` with `i < order.len()` whenever the
/// order is non-empty, and `None` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCursor {
    order: DraftOrder,
    position: Option<usize>,
}

impl DraftCursor {
    /// Start at the first player of `order`, if any.
    pub fn initialize(order: DraftOrder) -> Self {
        let position = if order.is_empty() { None } else { Some(0) };
        DraftCursor { order, position }
    }

    /// Rebuild a cursor from persisted parts, checking the invariant.
    pub fn restore(order: DraftOrder, position: Option<usize>) -> Result<Self, DraftError> {
        match (order.is_empty(), position) {
            (true, None) => Ok(DraftCursor { order, position }),
            (false, Some(p)) if p < order.len() => Ok(DraftCursor { order, position }),
            (_, p) => Err(DraftError::precondition(format!(
                "stored cursor position {p:?} is invalid for an order of {} players",
                order.len()
            ))),
        }
    }

    /// Move to the next player, wrapping from the last to the first.
    pub fn advance(&mut self) -> Result<PlayerId, DraftError> {
        let len = self.order.len();
        let pos = self.require_position("advance")?;
        self.set((pos + 1) % len)
    }

    /// Move to the previous player, wrapping from the first to the last.
    pub fn retreat(&mut self) -> Result<PlayerId, DraftError> {
        let len = self.order.len();
        let pos = self.require_position("retreat")?;
        self.set((pos + len - 1) % len)
    }

    /// Move to the first player of the order.
    pub fn jump_to_start(&mut self) -> Result<PlayerId, DraftError> {
        self.require_position("jump to start")?;
        self.set(0)
    }

    /// Move to `player_id`. Returns its index in the order.
    pub fn jump_to(&mut self, player_id: PlayerId) -> Result<usize, DraftError> {
        let idx = self
            .order
            .position_of(player_id)
            .ok_or_else(|| DraftError::not_found(format!("player {player_id} in draft order")))?;
        self.position = Some(idx);
        Ok(idx)
    }

    /// The player currently under auction.
    pub fn current(&self) -> Option<PlayerId> {
        self.position.and_then(|p| self.order.get(p))
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn order(&self) -> &DraftOrder {
        &self.order
    }

    fn require_position(&self, action: &str) -> Result<usize, DraftError> {
        self.position
            .ok_or_else(|| DraftError::precondition(format!("cannot {action}: draft order is empty")))
    }

    fn set(&mut self, pos: usize) -> Result<PlayerId, DraftError> {
        self.position = Some(pos);
        self.current()
            .ok_or_else(|| DraftError::precondition("cursor moved outside the draft order"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ids: &[PlayerId]) -> DraftOrder {
        DraftOrder::from_ids(ids.to_vec()).unwrap()
    }

    #[test]
    fn initialize_points_at_first_player() {
        let cursor = DraftCursor::initialize(order(&[10, 20, 30]));
        assert_eq!(cursor.position(), Some(0));
        assert_eq!(cursor.current(), Some(10));
    }

    #[test]
    fn initialize_empty_has_no_current() {
        let cursor = DraftCursor::initialize(DraftOrder::default());
        assert_eq!(cursor.position(), None);
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn advance_wraps_to_start() {
        let mut cursor = DraftCursor::initialize(order(&[1, 2, 3, 4, 5]));
        cursor.jump_to(5).unwrap();
        assert_eq!(cursor.position(), Some(4));
        assert_eq!(cursor.advance().unwrap(), 1);
        assert_eq!(cursor.position(), Some(0));
    }

    #[test]
    fn retreat_wraps_to_end() {
        let mut cursor = DraftCursor::initialize(order(&[1, 2, 3, 4, 5]));
        assert_eq!(cursor.retreat().unwrap(), 5);
        assert_eq!(cursor.position(), Some(4));
    }

    #[test]
    fn advance_then_retreat_is_identity() {
        let mut cursor = DraftCursor::initialize(order(&[1, 2, 3]));
        cursor.advance().unwrap();
        cursor.retreat().unwrap();
        assert_eq!(cursor.current(), Some(1));
    }

    #[test]
    fn single_player_order_stays_put() {
        let mut cursor = DraftCursor::initialize(order(&[9]));
        assert_eq!(cursor.advance().unwrap(), 9);
        assert_eq!(cursor.retreat().unwrap(), 9);
    }

    #[test]
    fn moves_on_empty_order_fail_with_precondition() {
        let mut cursor = DraftCursor::initialize(DraftOrder::default());
        assert!(matches!(cursor.advance(), Err(DraftError::PreconditionFailed(_))));
        assert!(matches!(cursor.retreat(), Err(DraftError::PreconditionFailed(_))));
        assert!(matches!(cursor.jump_to_start(), Err(DraftError::PreconditionFailed(_))));
        assert_eq!(cursor.position(), None);
    }

    #[test]
    fn jump_to_unknown_player_is_not_found() {
        let mut cursor = DraftCursor::initialize(order(&[1, 2]));
        assert!(matches!(cursor.jump_to(99), Err(DraftError::NotFound { .. })));
        assert_eq!(cursor.current(), Some(1));
    }

    #[test]
    fn jump_to_start_rewinds() {
        let mut cursor = DraftCursor::initialize(order(&[1, 2, 3]));
        cursor.jump_to(3).unwrap();
        assert_eq!(cursor.jump_to_start().unwrap(), 1);
    }

    #[test]
    fn restore_validates_position() {
        assert!(DraftCursor::restore(order(&[1, 2]), Some(1)).is_ok());
        assert!(DraftCursor::restore(DraftOrder::default(), None).is_ok());
        assert!(DraftCursor::restore(order(&[1, 2]), Some(2)).is_err());
        assert!(DraftCursor::restore(order(&[1, 2]), None).is_err());
        assert!(DraftCursor::restore(DraftOrder::default(), Some(0)).is_err());
    }
}
