// SQLite persistence layer for catalog, sessions, draft order and sales.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::draft::ledger::Sale;
use crate::draft::order::{DraftOrder, DraftScope, OrderingPolicy};
use crate::draft::player::{Player, Role};
use crate::draft::session::{Participant, ParticipantId, Session};
use crate::error::Rejection;

/// Persisted order and cursor of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDraft {
    pub scope: DraftScope,
    pub order: DraftOrder,
    pub position: Option<usize>,
}

/// SQLite-backed store. All draft tables are keyed by session id.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id         INTEGER PRIMARY KEY,
                name       TEXT NOT NULL,
                role       TEXT NOT NULL,
                team       TEXT NOT NULL,
                base_value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id              TEXT PRIMARY KEY,
                admin_user_id   TEXT NOT NULL,
                policy          TEXT NOT NULL,
                default_scope   TEXT NOT NULL,
                initial_credits INTEGER NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS participants (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id    TEXT NOT NULL,
                nickname   TEXT NOT NULL,
                credits    INTEGER NOT NULL CHECK (credits >= 0),
                position   INTEGER NOT NULL,
                UNIQUE(session_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS draft_order (
                session_id  TEXT NOT NULL REFERENCES sessions(id),
                order_index INTEGER NOT NULL,
                player_id   INTEGER NOT NULL REFERENCES players(id),
                PRIMARY KEY (session_id, order_index),
                UNIQUE(session_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS draft_cursor (
                session_id TEXT PRIMARY KEY REFERENCES sessions(id),
                scope      TEXT NOT NULL,
                position   INTEGER
            );

            CREATE TABLE IF NOT EXISTS sales (
                session_id     TEXT NOT NULL REFERENCES sessions(id),
                sale_order     INTEGER NOT NULL,
                participant_id INTEGER NOT NULL REFERENCES participants(id),
                player_id      INTEGER NOT NULL REFERENCES players(id),
                role           TEXT NOT NULL,
                price          INTEGER NOT NULL CHECK (price >= 1),
                sold_at        TEXT NOT NULL,
                PRIMARY KEY (session_id, sale_order),
                UNIQUE(session_id, player_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_sales_participant ON sales(session_id, participant_id);",
        )
        .context("failed to create sales index")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run raw SQL against the connection. Tests use this to simulate a
    /// store that can no longer commit.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql).context("raw statement failed")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Insert or update catalog players in a single transaction.
    pub fn import_players(&self, players: &[Player]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin import transaction")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO players (id, name, role, team, base_value)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        name       = excluded.name,
                        role       = excluded.role,
                        team       = excluded.team,
                        base_value = excluded.base_value",
                )
                .context("failed to prepare player upsert")?;
            for p in players {
                stmt.execute(params![p.id, p.name, p.role.code(), p.team, p.base_value])
                    .with_context(|| format!("failed to upsert player {}", p.id))?;
            }
        }
        tx.commit().context("failed to commit player import")?;
        Ok(())
    }

    /// Load the whole catalog, ordered by id.
    pub fn load_players(&self) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, name, role, team, base_value FROM players ORDER BY id")
            .context("failed to prepare load_players query")?;
        let players = stmt
            .query_map([], |row| {
                let role_code: String = row.get(2)?;
                Ok(Player {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    role: parse_role(&role_code, 2)?,
                    team: row.get(3)?,
                    base_value: row.get(4)?,
                })
            })
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    // ------------------------------------------------------------------
    // Sessions and participants
    // ------------------------------------------------------------------

    /// Create a session or refresh its configuration.
    pub fn upsert_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn();
        let policy_json =
            serde_json::to_string(&session.policy).context("failed to serialize ordering policy")?;
        conn.execute(
            "INSERT INTO sessions (id, admin_user_id, policy, default_scope, initial_credits)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                admin_user_id   = excluded.admin_user_id,
                policy          = excluded.policy,
                default_scope   = excluded.default_scope,
                initial_credits = excluded.initial_credits",
            params![
                session.id,
                session.admin_user_id,
                policy_json,
                session.default_scope.to_string(),
                session.initial_credits,
            ],
        )
        .context("failed to upsert session")?;
        Ok(())
    }

    /// Load a session by id. Returns `None` if it does not exist.
    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, admin_user_id, policy, default_scope, initial_credits
                 FROM sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .optional()
            .context("failed to query session")?;

        let Some((id, admin_user_id, policy_json, scope, initial_credits)) = row else {
            return Ok(None);
        };
        let policy: OrderingPolicy = serde_json::from_str(&policy_json)
            .with_context(|| format!("failed to deserialize ordering policy of session {id}"))?;
        let default_scope = DraftScope::from_str_scope(&scope)
            .with_context(|| format!("invalid default scope `{scope}` for session {id}"))?;

        Ok(Some(Session {
            id,
            admin_user_id,
            policy,
            default_scope,
            initial_credits,
        }))
    }

    /// Register a participant. Re-registering the same user in the same
    /// session returns the existing record untouched (credits included).
    pub fn add_participant(
        &self,
        session_id: &str,
        user_id: &str,
        nickname: &str,
        credits: u32,
    ) -> Result<Participant> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO participants (session_id, user_id, nickname, credits, position)
             VALUES (?1, ?2, ?3, ?4,
                     (SELECT COUNT(*) FROM participants WHERE session_id = ?1))
             ON CONFLICT(session_id, user_id) DO NOTHING",
            params![session_id, user_id, nickname, credits],
        )
        .context("failed to insert participant")?;

        conn.query_row(
            "SELECT id, user_id, nickname, credits, position
             FROM participants WHERE session_id = ?1 AND user_id = ?2",
            params![session_id, user_id],
            participant_from_row,
        )
        .context("failed to read back participant")
    }

    /// Participants of a session in seat order.
    pub fn load_participants(&self, session_id: &str) -> Result<Vec<Participant>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, nickname, credits, position
                 FROM participants WHERE session_id = ?1 ORDER BY position, id",
            )
            .context("failed to prepare load_participants query")?;
        let participants = stmt
            .query_map(params![session_id], participant_from_row)
            .context("failed to query participants")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map participant rows")?;
        Ok(participants)
    }

    // ------------------------------------------------------------------
    // Draft order and cursor
    // ------------------------------------------------------------------

    /// Replace the session's order and cursor in one transaction.
    pub fn replace_order(
        &self,
        session_id: &str,
        scope: DraftScope,
        order: &DraftOrder,
        position: Option<usize>,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin order transaction")?;
        tx.execute(
            "DELETE FROM draft_order WHERE session_id = ?1",
            params![session_id],
        )
        .context("failed to clear previous draft order")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO draft_order (session_id, order_index, player_id)
                     VALUES (?1, ?2, ?3)",
                )
                .context("failed to prepare draft order insert")?;
            for (idx, player_id) in order.ids().iter().enumerate() {
                stmt.execute(params![session_id, idx as i64, player_id])
                    .context("failed to insert draft order row")?;
            }
        }
        tx.execute(
            "INSERT INTO draft_cursor (session_id, scope, position) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
                scope    = excluded.scope,
                position = excluded.position",
            params![session_id, scope.to_string(), position.map(|p| p as i64)],
        )
        .context("failed to write draft cursor")?;
        tx.commit().context("failed to commit draft order")?;
        Ok(())
    }

    /// Move the session's stored cursor.
    pub fn save_cursor_position(&self, session_id: &str, position: Option<usize>) -> Result<()> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE draft_cursor SET position = ?2 WHERE session_id = ?1",
                params![session_id, position.map(|p| p as i64)],
            )
            .context("failed to update cursor position")?;
        if updated == 0 {
            anyhow::bail!("no draft cursor stored for session {session_id}");
        }
        Ok(())
    }

    /// Load the stored order and cursor. `None` if the draft was never started.
    pub fn load_draft(&self, session_id: &str) -> Result<Option<StoredDraft>> {
        let conn = self.conn();
        let cursor = conn
            .query_row(
                "SELECT scope, position FROM draft_cursor WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()
            .context("failed to query draft cursor")?;

        let Some((scope_str, position)) = cursor else {
            return Ok(None);
        };
        let scope = DraftScope::from_str_scope(&scope_str)
            .with_context(|| format!("invalid stored scope `{scope_str}`"))?;
        let position = position
            .map(usize::try_from)
            .transpose()
            .context("negative stored cursor position")?;

        let mut stmt = conn
            .prepare(
                "SELECT player_id FROM draft_order WHERE session_id = ?1 ORDER BY order_index",
            )
            .context("failed to prepare draft order query")?;
        let ids = stmt
            .query_map(params![session_id], |row| row.get(0))
            .context("failed to query draft order")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft order rows")?;
        let order = DraftOrder::from_ids(ids).context("stored draft order repeats a player")?;

        Ok(Some(StoredDraft {
            scope,
            order,
            position,
        }))
    }

    // ------------------------------------------------------------------
    // Sales
    // ------------------------------------------------------------------

    /// Record a sale and deduct its price from the buyer in one transaction.
    ///
    /// Returns the buyer's remaining credits, or the rejection that stopped
    /// the write. Either way nothing is left half-applied: the transaction is
    /// rolled back unless both writes succeed.
    pub fn commit_sale(
        &self,
        session_id: &str,
        sale: &Sale,
    ) -> Result<std::result::Result<u32, Rejection>> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin sale transaction")?;

        let already_sold: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sales WHERE session_id = ?1 AND player_id = ?2)",
                params![session_id, sale.player_id],
                |row| row.get(0),
            )
            .context("failed to check for an existing sale")?;
        if already_sold {
            return Ok(Err(Rejection::AlreadySold {
                player_id: sale.player_id,
            }));
        }

        let debited = tx
            .execute(
                "UPDATE participants SET credits = credits - ?3
                 WHERE session_id = ?1 AND id = ?2 AND credits >= ?3",
                params![session_id, sale.participant_id, sale.price],
            )
            .context("failed to deduct credits")?;
        if debited == 0 {
            let available: Option<u32> = tx
                .query_row(
                    "SELECT credits FROM participants WHERE session_id = ?1 AND id = ?2",
                    params![session_id, sale.participant_id],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to read participant credits")?;
            return match available {
                Some(available) => Ok(Err(Rejection::InsufficientCredits {
                    available,
                    price: i64::from(sale.price),
                })),
                None => anyhow::bail!(
                    "participant {} does not belong to session {session_id}",
                    sale.participant_id
                ),
            };
        }

        tx.execute(
            "INSERT INTO sales (session_id, sale_order, participant_id, player_id, role, price, sold_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id,
                sale.sale_order,
                sale.participant_id,
                sale.player_id,
                sale.role.code(),
                sale.price,
                sale.sold_at.to_rfc3339(),
            ],
        )
        .context("failed to insert sale")?;

        let remaining: u32 = tx
            .query_row(
                "SELECT credits FROM participants WHERE id = ?1",
                params![sale.participant_id],
                |row| row.get(0),
            )
            .context("failed to read remaining credits")?;

        tx.commit().context("failed to commit sale")?;
        Ok(Ok(remaining))
    }

    /// All sales of a session in sequence order.
    pub fn load_sales(&self, session_id: &str) -> Result<Vec<Sale>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT sale_order, participant_id, player_id, role, price, sold_at
                 FROM sales WHERE session_id = ?1 ORDER BY sale_order",
            )
            .context("failed to prepare load_sales query")?;
        let sales = stmt
            .query_map(params![session_id], |row| {
                let role_code: String = row.get(3)?;
                let sold_at: String = row.get(5)?;
                Ok(Sale {
                    sale_order: row.get(0)?,
                    participant_id: row.get(1)?,
                    player_id: row.get(2)?,
                    role: parse_role(&role_code, 3)?,
                    price: row.get(4)?,
                    sold_at: parse_timestamp(&sold_at, 5)?,
                })
            })
            .context("failed to query sales")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map sale rows")?;
        Ok(sales)
    }

    /// Number of sales recorded for a session.
    #[cfg(test)]
    pub(crate) fn sale_count(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sales WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .context("failed to count sales")?;
        Ok(count as usize)
    }
}

// ----------------------------------------------------------------------
// Row helpers
// ----------------------------------------------------------------------

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get::<_, ParticipantId>(0)?,
        user_id: row.get(1)?,
        nickname: row.get(2)?,
        credits: row.get(3)?,
        position: row.get(4)?,
    })
}

fn parse_role(code: &str, column: usize) -> rusqlite::Result<Role> {
    Role::from_str_role(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            format!("unknown role code `{code}`").into(),
        )
    })
}

fn parse_timestamp(text: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
