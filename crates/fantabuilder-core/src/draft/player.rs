// Player roles and catalog entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog-wide player identifier.
pub type PlayerId = i64;

/// Playing role of a catalog player.
///
/// Variants are declared in draft precedence order, so the derived `Ord`
/// matches the order roles are auctioned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Goalkeeper,
    Defender,
    Midfielder,
    Attacker,
}

impl Role {
    /// All roles in draft precedence order.
    pub const ALL: [Role; 4] = [
        Role::Goalkeeper,
        Role::Defender,
        Role::Midfielder,
        Role::Attacker,
    ];

    /// Parse a role from its short code ("P", "D", "C", "A") or its English
    /// name. Case-insensitive.
    pub fn from_str_role(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "P" | "GK" | "GOALKEEPER" => Some(Role::Goalkeeper),
            "D" | "DEF" | "DEFENDER" => Some(Role::Defender),
            "C" | "MID" | "MIDFIELDER" => Some(Role::Midfielder),
            "A" | "ATT" | "ATTACKER" => Some(Role::Attacker),
            _ => None,
        }
    }

    /// Short code used in config files, the database and the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Role::Goalkeeper => "P",
            Role::Defender => "D",
            Role::Midfielder => "C",
            Role::Attacker => "A",
        }
    }

    /// Position of this role's group in a full-catalog draft order.
    pub fn precedence(&self) -> u8 {
        match self {
            Role::Goalkeeper => 0,
            Role::Defender => 1,
            Role::Midfielder => 2,
            Role::Attacker => 3,
        }
    }

    /// Maximum number of players of this role a single participant may own.
    pub fn quota(&self) -> usize {
        match self {
            Role::Goalkeeper => 3,
            Role::Defender => 8,
            Role::Midfielder => 8,
            Role::Attacker => 6,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.code().to_string()
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Role::from_str_role(&s).ok_or_else(|| format!("unknown role `{s}`"))
    }
}

/// A player in the static catalog. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    /// Club the player belongs to.
    pub team: String,
    /// Base market valuation shown alongside the player during the auction.
    pub base_value: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codes_and_names() {
        assert_eq!(Role::from_str_role("P"), Some(Role::Goalkeeper));
        assert_eq!(Role::from_str_role("d"), Some(Role::Defender));
        assert_eq!(Role::from_str_role(" c "), Some(Role::Midfielder));
        assert_eq!(Role::from_str_role("attacker"), Some(Role::Attacker));
        assert_eq!(Role::from_str_role("X"), None);
        assert_eq!(Role::from_str_role(""), None);
    }

    #[test]
    fn code_round_trips() {
        for role in Role::ALL {
            assert_eq!(Role::from_str_role(role.code()), Some(role));
        }
    }

    #[test]
    fn precedence_matches_declaration_order() {
        let mut roles = vec![Role::Attacker, Role::Goalkeeper, Role::Midfielder, Role::Defender];
        roles.sort();
        assert_eq!(roles, Role::ALL.to_vec());
        for (i, role) in Role::ALL.iter().enumerate() {
            assert_eq!(role.precedence() as usize, i);
        }
    }

    #[test]
    fn quota_table() {
        assert_eq!(Role::Goalkeeper.quota(), 3);
        assert_eq!(Role::Defender.quota(), 8);
        assert_eq!(Role::Midfielder.quota(), 8);
        assert_eq!(Role::Attacker.quota(), 6);
    }

    #[test]
    fn display_uses_code() {
        assert_eq!(Role::Midfielder.to_string(), "C");
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&Role::Goalkeeper).unwrap(), r#""P""#);
        assert_eq!(serde_json::from_str::<Role>(r#""A""#).unwrap(), Role::Attacker);
        assert!(serde_json::from_str::<Role>(r#""Striker""#).is_err());

        // Also as map keys, e.g. per-role counts.
        let counts = std::collections::BTreeMap::from([(Role::Defender, 2usize)]);
        assert_eq!(serde_json::to_string(&counts).unwrap(), r#"{"D":2}"#);
    }
}
