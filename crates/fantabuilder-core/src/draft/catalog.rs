// Static player catalog: CSV import and scoped listing.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::order::DraftScope;
use super::player::{Player, PlayerId, Role};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed catalog row: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown role `{role}` for player {id} on line {line}")]
    UnknownRole { id: PlayerId, role: String, line: u64 },

    #[error("duplicate player id {id} on line {line}")]
    DuplicateId { id: PlayerId, line: u64 },
}

/// One row of the catalog CSV (`id,name,role,team,value`).
#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: PlayerId,
    name: String,
    role: String,
    team: String,
    value: u32,
}

/// The read-only universe of players. Insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    players: Vec<Player>,
    by_id: HashMap<PlayerId, usize>,
}

impl Catalog {
    /// Build a catalog from already-parsed players. Later duplicates of an id
    /// are rejected.
    pub fn new(players: Vec<Player>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(players.len());
        for (idx, player) in players.iter().enumerate() {
            if by_id.insert(player.id, idx).is_some() {
                return Err(CatalogError::DuplicateId {
                    id: player.id,
                    line: idx as u64 + 1,
                });
            }
        }
        Ok(Catalog { players, by_id })
    }

    /// Load a catalog from a CSV file with an `id,name,role,team,value` header.
    pub fn from_csv_path(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(file)
    }

    /// Load a catalog from any CSV source.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut players = Vec::new();
        let mut by_id = HashMap::new();

        let headers = rdr.headers()?.clone();

        for result in rdr.records() {
            let record = result?;
            // Line the record starts on; blank lines and quoted newlines count.
            let line = record.position().map_or(0, |pos| pos.line());
            let row: CatalogRow = record.deserialize(Some(&headers))?;
            let role = Role::from_str_role(&row.role).ok_or_else(|| CatalogError::UnknownRole {
                id: row.id,
                role: row.role.clone(),
                line,
            })?;
            if by_id.insert(row.id, players.len()).is_some() {
                return Err(CatalogError::DuplicateId { id: row.id, line });
            }
            players.push(Player {
                id: row.id,
                name: row.name,
                role,
                team: row.team,
                base_value: row.value,
            });
        }

        Ok(Catalog { players, by_id })
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.by_id.get(&id).map(|&idx| &self.players[idx])
    }

    /// All players, in catalog order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Players eligible under `scope`, in catalog order.
    pub fn list_players(&self, scope: DraftScope) -> Vec<&Player> {
        self.players.iter().filter(|p| scope.includes(p.role)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id,name,role,team,value
1,Maignan,P,Milan,18
2,Bastoni,D,Inter,20
3,Barella,C,Inter,24
4,Lautaro,A,Inter,40
5,Sommer,P,Inter,16
";

    #[test]
    fn loads_rows_in_order() {
        let catalog = Catalog::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.players()[0].name, "Maignan");
        assert_eq!(catalog.players()[3].role, Role::Attacker);
        assert_eq!(catalog.get(3).map(|p| p.base_value), Some(24));
        assert!(catalog.get(99).is_none());
    }

    #[test]
    fn list_players_filters_by_scope() {
        let catalog = Catalog::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        let keepers: Vec<&str> = catalog
            .list_players(DraftScope::SingleRole(Role::Goalkeeper))
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(keepers, vec!["Maignan", "Sommer"]);
        assert_eq!(catalog.list_players(DraftScope::AllRoles).len(), 5);
    }

    #[test]
    fn rejects_unknown_role() {
        let csv = "id,name,role,team,value\n1,Someone,X,Nowhere,1\n";
        let err = Catalog::from_csv_reader(csv.as_bytes()).unwrap_err();
        match err {
            CatalogError::UnknownRole { id, role, line } => {
                assert_eq!(id, 1);
                assert_eq!(role, "X");
                assert_eq!(line, 2);
            }
            other => panic!("expected UnknownRole, got: {other}"),
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let csv = "id,name,role,team,value\n1,A,P,T,1\n1,B,D,T,1\n";
        let err = Catalog::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId { id: 1, line: 3 }));
    }

    #[test]
    fn error_lines_follow_the_source_file() {
        let csv = "id,name,role,team,value\n\
                   1,A,P,T,1\n\
                   \n\
                   2,\"Two\nLines\",C,T,1\n\
                   3,Z,X,T,1\n";
        match Catalog::from_csv_reader(csv.as_bytes()).unwrap_err() {
            CatalogError::UnknownRole { id, line, .. } => {
                assert_eq!(id, 3);
                assert_eq!(line, 6);
            }
            other => panic!("expected UnknownRole, got: {other}"),
        }
    }

    #[test]
    fn rejects_malformed_value() {
        let csv = "id,name,role,team,value\n1,A,P,T,lots\n";
        let err = Catalog::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, CatalogError::Csv(_)));
    }

    #[test]
    fn new_rejects_duplicates() {
        let p = Player {
            id: 7,
            name: "Dup".into(),
            role: Role::Defender,
            team: "T".into(),
            base_value: 1,
        };
        assert!(Catalog::new(vec![p.clone(), p]).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Catalog::from_csv_path(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
