// Append-only record of completed sales.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::player::{Player, PlayerId, Role};
use super::session::ParticipantId;

/// A completed sale. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// 1-based position in the session's sale sequence. Never reused.
    pub sale_order: u32,
    pub participant_id: ParticipantId,
    pub player_id: PlayerId,
    /// Role of the sold player, copied from the catalog at sale time.
    pub role: Role,
    pub price: u32,
    pub sold_at: DateTime<Utc>,
}

/// Credits and role counts for one participant, derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub participant_id: ParticipantId,
    pub credits_remaining: u32,
    pub total_spent: u32,
    pub counts_by_role: BTreeMap<Role, usize>,
}

/// Stored sales that cannot form a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("sale sequence gap: expected order {expected}, found {found}")]
    SequenceGap { expected: u32, found: u32 },

    #[error("player {player_id} sold more than once")]
    DoubleSale { player_id: PlayerId },
}

/// The session's sales in sequence order. All per-participant figures are
/// computed from this list on demand.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    sales: Vec<Sale>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored sales. Sales must be numbered 1..=n in
    /// order and sell each player at most once.
    pub fn from_sales(sales: Vec<Sale>) -> Result<Self, LedgerError> {
        let mut seen = HashSet::with_capacity(sales.len());
        for (idx, sale) in sales.iter().enumerate() {
            let expected = idx as u32 + 1;
            if sale.sale_order != expected {
                return Err(LedgerError::SequenceGap {
                    expected,
                    found: sale.sale_order,
                });
            }
            if !seen.insert(sale.player_id) {
                return Err(LedgerError::DoubleSale {
                    player_id: sale.player_id,
                });
            }
        }
        Ok(Ledger { sales })
    }

    /// Build the sale that would be appended next, without storing it.
    pub fn next_sale(&self, participant_id: ParticipantId, player: &Player, price: u32) -> Sale {
        Sale {
            sale_order: self.sales.len() as u32 + 1,
            participant_id,
            player_id: player.id,
            role: player.role,
            price,
            sold_at: Utc::now(),
        }
    }

    /// Store a sale built by [`Ledger::next_sale`] once it has been committed.
    ///
    /// Panics in debug builds if the sale is out of sequence.
    pub fn record(&mut self, sale: Sale) -> &Sale {
        debug_assert_eq!(sale.sale_order as usize, self.sales.len() + 1);
        debug_assert!(!self.is_sold(sale.player_id));
        self.sales.push(sale);
        &self.sales[self.sales.len() - 1]
    }

    /// Assign the next sequence number, store the sale and return it.
    pub fn append(&mut self, participant_id: ParticipantId, player: &Player, price: u32) -> Sale {
        let sale = self.next_sale(participant_id, player, price);
        self.record(sale).clone()
    }

    pub fn len(&self) -> usize {
        self.sales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
    }

    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    pub fn sales_for(&self, participant_id: ParticipantId) -> impl Iterator<Item = &Sale> {
        self.sales
            .iter()
            .filter(move |s| s.participant_id == participant_id)
    }

    pub fn is_sold(&self, player_id: PlayerId) -> bool {
        self.sales.iter().any(|s| s.player_id == player_id)
    }

    pub fn count_by_role(&self, participant_id: ParticipantId, role: Role) -> usize {
        self.sales_for(participant_id).filter(|s| s.role == role).count()
    }

    /// Role counts for a participant. Every role is present, zero included.
    pub fn counts_by_role(&self, participant_id: ParticipantId) -> BTreeMap<Role, usize> {
        let mut counts: BTreeMap<Role, usize> = Role::ALL.iter().map(|&r| (r, 0)).collect();
        for sale in self.sales_for(participant_id) {
            *counts.entry(sale.role).or_default() += 1;
        }
        counts
    }

    pub fn total_spent(&self, participant_id: ParticipantId) -> u32 {
        self.sales_for(participant_id).map(|s| s.price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: PlayerId, role: Role) -> Player {
        Player {
            id,
            name: format!("Player {id}"),
            role,
            team: "Test FC".into(),
            base_value: 1,
        }
    }

    #[test]
    fn append_assigns_increasing_sale_orders() {
        let mut ledger = Ledger::new();
        let a = ledger.append(1, &player(10, Role::Attacker), 15);
        let b = ledger.append(2, &player(11, Role::Attacker), 5);
        assert_eq!(a.sale_order, 1);
        assert_eq!(b.sale_order, 2);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn derived_queries_follow_sales() {
        let mut ledger = Ledger::new();
        ledger.append(1, &player(1, Role::Goalkeeper), 10);
        ledger.append(1, &player(2, Role::Goalkeeper), 3);
        ledger.append(1, &player(3, Role::Defender), 7);
        ledger.append(2, &player(4, Role::Goalkeeper), 1);

        assert_eq!(ledger.count_by_role(1, Role::Goalkeeper), 2);
        assert_eq!(ledger.count_by_role(1, Role::Attacker), 0);
        assert_eq!(ledger.count_by_role(2, Role::Goalkeeper), 1);
        assert_eq!(ledger.total_spent(1), 20);
        assert!(ledger.is_sold(3));
        assert!(!ledger.is_sold(99));

        let counts = ledger.counts_by_role(1);
        assert_eq!(counts.len(), 4);
        assert_eq!(counts[&Role::Goalkeeper], 2);
        assert_eq!(counts[&Role::Defender], 1);
        assert_eq!(counts[&Role::Midfielder], 0);
    }

    #[test]
    fn from_sales_accepts_contiguous_sequence() {
        let mut source = Ledger::new();
        source.append(1, &player(1, Role::Attacker), 4);
        source.append(1, &player(2, Role::Attacker), 4);
        let rebuilt = Ledger::from_sales(source.sales().to_vec()).unwrap();
        assert_eq!(rebuilt.sales(), source.sales());
    }

    #[test]
    fn from_sales_rejects_gaps_and_double_sales() {
        let mut source = Ledger::new();
        let first = source.append(1, &player(1, Role::Attacker), 4);

        let mut gap = first.clone();
        gap.sale_order = 2;
        assert_eq!(
            Ledger::from_sales(vec![gap]).unwrap_err(),
            LedgerError::SequenceGap {
                expected: 1,
                found: 2
            }
        );

        let mut dup = first.clone();
        dup.sale_order = 2;
        assert_eq!(
            Ledger::from_sales(vec![first, dup]).unwrap_err(),
            LedgerError::DoubleSale { player_id: 1 }
        );
    }

    #[test]
    fn next_sale_does_not_store() {
        let ledger = Ledger::new();
        let sale = ledger.next_sale(1, &player(5, Role::Midfielder), 9);
        assert_eq!(sale.sale_order, 1);
        assert_eq!(sale.role, Role::Midfielder);
        assert!(ledger.is_empty());
    }
}
