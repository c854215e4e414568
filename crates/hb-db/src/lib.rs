//! Storage layer for heartbeat summaries.
//!
//! Provides persistence for heartbeats, cached summary fragments, aliases,
//! project labels and users using `rusqlite`, and implements every store
//! trait from `hb-core`.
//!
//! # Thread Safety
//!
//! The [`Database`] type keeps its `rusqlite::Connection` behind a `Mutex`, so
//! one instance can be shared (e.g. in an `Arc`) by every store consumer.
//! Each call holds the lock for the duration of one statement or transaction.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! and a `Z` suffix (e.g., `2024-01-15T10:30:00.000Z`). The fixed width means:
//! - Lexicographic ordering matches chronological ordering
//! - Range scans can compare strings directly
//!
//! ## Heartbeat Identity
//!
//! Heartbeat ids are content hashes ([`Heartbeat::id`]); inserts use
//! `INSERT OR IGNORE`, so replaying a batch never duplicates rows. Ties on
//! timestamp are broken by `rowid`, i.e. insertion order.
//!
//! ## Fragment Payload
//!
//! `summary_fragments.payload` holds the JSON-serialized [`Summary`] of one
//! day for one filter fingerprint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use hb_core::{
    Alias, AliasStore, CountByUser, EntityType, Heartbeat, HeartbeatStore, ProjectLabel,
    StorageError, Summary, SummaryKind, SummaryStore, TimeByUser, User, UserId, UserStore,
    UserTimezone,
};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {id}: {timestamp}")]
    TimestampParse {
        id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row could not be turned back into a domain value.
    #[error("invalid row {id}: {message}")]
    InvalidRow { id: String, message: String },
    /// A fragment payload failed to (de)serialize.
    #[error("invalid summary fragment for {user} at {from}")]
    InvalidFragment {
        user: String,
        from: String,
        #[source]
        source: serde_json::Error,
    },
    /// Another thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        Self::with_source("sqlite", err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

const HEARTBEAT_COLUMNS: &str = "id, user_id, timestamp, project, language, editor, \
     operating_system, machine, entity, entity_type, is_write, origin";

const USER_COLUMNS: &str = "id, timezone, share_editors, share_languages, share_projects, \
     share_operating_systems, share_machines, share_labels, share_data_max_days";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ---- heartbeats -------------------------------------------------------

    /// Inserts a batch of heartbeats, ignoring duplicates by content id.
    pub fn insert_heartbeats(&self, heartbeats: &[Heartbeat]) -> Result<usize, DbError> {
        if heartbeats.is_empty() {
            return Ok(0);
        }
        let created_at = format_timestamp(Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO heartbeats
                (id, user_id, timestamp, project, language, editor, operating_system,
                 machine, entity, entity_type, is_write, origin, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for hb in heartbeats {
                inserted += stmt.execute(params![
                    hb.id(),
                    hb.user_id.as_str(),
                    format_timestamp(hb.timestamp),
                    hb.project,
                    hb.language,
                    hb.editor,
                    hb.operating_system,
                    hb.machine,
                    hb.entity,
                    hb.entity_type.as_str(),
                    hb.is_write,
                    hb.origin,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(
            received = heartbeats.len(),
            inserted,
            "stored heartbeats"
        );
        Ok(inserted)
    }

    /// Counts heartbeats, optionally for one user.
    pub fn count_heartbeats(&self, user: Option<&UserId>) -> Result<u64, DbError> {
        let conn = self.conn()?;
        let count: i64 = match user {
            Some(user) => conn.query_row(
                "SELECT COUNT(*) FROM heartbeats WHERE user_id = ?",
                [user.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM heartbeats", [], |row| row.get(0))?,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Counts heartbeats per user. Users without heartbeats report zero.
    pub fn count_heartbeats_by_users(&self, users: &[UserId]) -> Result<Vec<CountByUser>, DbError> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT user_id, COUNT(*) FROM heartbeats WHERE user_id IN ({}) GROUP BY user_id",
            placeholders(users.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(users.iter().map(UserId::as_str)), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in rows {
            let (user_id, count) = row?;
            counts.insert(user_id, count);
        }
        Ok(users
            .iter()
            .map(|user| CountByUser {
                user_id: user.clone(),
                count: counts
                    .get(user.as_str())
                    .and_then(|c| u64::try_from(*c).ok())
                    .unwrap_or_default(),
            })
            .collect())
    }

    /// Lists heartbeats of `user` within a time range.
    ///
    /// The range is inclusive of `start` and exclusive of `end`.
    pub fn heartbeats_in_range(
        &self,
        user: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {HEARTBEAT_COLUMNS}
            FROM heartbeats
            WHERE user_id = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, rowid ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![user.as_str(), format_timestamp(start), format_timestamp(end)],
            heartbeat_row,
        )?;
        let mut heartbeats = Vec::new();
        for row in rows {
            heartbeats.push(row?.into_heartbeat()?);
        }
        Ok(heartbeats)
    }

    /// Earliest heartbeat time per user, ordered by user id.
    pub fn first_heartbeat_times(&self, users: &[UserId]) -> Result<Vec<TimeByUser>, DbError> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "
            SELECT user_id, MIN(timestamp)
            FROM heartbeats
            WHERE user_id IN ({})
            GROUP BY user_id
            ORDER BY user_id ASC
            ",
            placeholders(users.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(users.iter().map(UserId::as_str)), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut times = Vec::new();
        for row in rows {
            let (user_id, timestamp) = row?;
            let time = parse_timestamp(&timestamp, &user_id)?;
            times.push(TimeByUser {
                user_id: parse_user_id(user_id)?,
                time,
            });
        }
        Ok(times)
    }

    /// Most recent heartbeat of `user`, optionally restricted to one origin.
    pub fn latest_heartbeat(
        &self,
        user: &UserId,
        origin: Option<&str>,
    ) -> Result<Option<Heartbeat>, DbError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "
                    SELECT {HEARTBEAT_COLUMNS}
                    FROM heartbeats
                    WHERE user_id = ?1 AND (?2 IS NULL OR origin = ?2)
                    ORDER BY timestamp DESC, rowid DESC
                    LIMIT 1
                    "
                ),
                params![user.as_str(), origin],
                heartbeat_row,
            )
            .optional()?;
        row.map(HeartbeatRow::into_heartbeat).transpose()
    }

    /// Distinct non-empty raw values of one field for `user`, sorted.
    ///
    /// Labels live on projects, so `Label` lists the user's project labels.
    pub fn distinct_values(&self, kind: SummaryKind, user: &UserId) -> Result<Vec<String>, DbError> {
        let sql = match kind {
            SummaryKind::Label => {
                "SELECT DISTINCT label FROM project_labels WHERE user_id = ? ORDER BY label ASC"
                    .to_string()
            }
            _ => {
                let column = heartbeat_column(kind);
                format!(
                    "SELECT DISTINCT {column} FROM heartbeats \
                     WHERE user_id = ? AND {column} != '' ORDER BY {column} ASC"
                )
            }
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user.as_str()], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }

    /// Deletes heartbeats older than `cutoff`.
    pub fn delete_heartbeats_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM heartbeats WHERE timestamp < ?",
            [format_timestamp(cutoff)],
        )?;
        tracing::info!(deleted, cutoff = %cutoff, "pruned heartbeats");
        Ok(deleted)
    }

    // ---- summary fragments ------------------------------------------------

    /// Lists fragments lying entirely within `[start, end)`.
    pub fn fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Summary>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "
            SELECT from_time, payload
            FROM summary_fragments
            WHERE user_id = ? AND fingerprint = ? AND from_time >= ? AND to_time <= ?
            ORDER BY from_time ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                user.as_str(),
                fingerprint,
                format_timestamp(start),
                format_timestamp(end)
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        let mut fragments = Vec::new();
        for row in rows {
            let (from, payload) = row?;
            let summary = serde_json::from_str(&payload).map_err(|source| {
                DbError::InvalidFragment {
                    user: user.to_string(),
                    from,
                    source,
                }
            })?;
            fragments.push(summary);
        }
        Ok(fragments)
    }

    /// Inserts or replaces fragments in one transaction.
    pub fn upsert_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        fragments: &[Summary],
    ) -> Result<(), DbError> {
        if fragments.is_empty() {
            return Ok(());
        }
        let created_at = format_timestamp(Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO summary_fragments
                (user_id, fingerprint, from_time, to_time, payload, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, fingerprint, from_time) DO UPDATE SET
                    to_time = excluded.to_time,
                    payload = excluded.payload,
                    created_at = excluded.created_at
                ",
            )?;
            for fragment in fragments {
                let from = format_timestamp(fragment.from);
                let payload = serde_json::to_string(fragment).map_err(|source| {
                    DbError::InvalidFragment {
                        user: user.to_string(),
                        from: from.clone(),
                        source,
                    }
                })?;
                stmt.execute(params![
                    user.as_str(),
                    fingerprint,
                    from,
                    format_timestamp(fragment.to),
                    payload,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Deletes fragments overlapping `[start, end)`, for one fingerprint or all.
    pub fn delete_fragments_overlapping(
        &self,
        user: &UserId,
        fingerprint: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "
            DELETE FROM summary_fragments
            WHERE user_id = ?1
              AND (?2 IS NULL OR fingerprint = ?2)
              AND from_time < ?4
              AND to_time > ?3
            ",
            params![
                user.as_str(),
                fingerprint,
                format_timestamp(start),
                format_timestamp(end)
            ],
        )?;
        Ok(deleted)
    }

    /// Deletes every fragment of `user`.
    pub fn delete_user_fragments(&self, user: &UserId) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM summary_fragments WHERE user_id = ?",
            [user.as_str()],
        )?;
        Ok(deleted)
    }

    // ---- aliases and labels -----------------------------------------------

    /// Lists alias rules of `user` ordered by kind then raw name.
    pub fn aliases(&self, user: &UserId) -> Result<Vec<Alias>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "
            SELECT kind, raw, canonical
            FROM aliases
            WHERE user_id = ?
            ORDER BY kind ASC, raw ASC
            ",
        )?;
        let rows = stmt.query_map([user.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut aliases = Vec::new();
        for row in rows {
            let (kind, raw, canonical) = row?;
            let kind = kind.parse().map_err(|err| DbError::InvalidRow {
                id: format!("alias {raw}"),
                message: format!("{err}"),
            })?;
            aliases.push(Alias {
                user_id: user.clone(),
                kind,
                raw,
                canonical,
            });
        }
        Ok(aliases)
    }

    /// Adds or replaces an alias rule.
    pub fn upsert_alias(&self, alias: &Alias) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO aliases (user_id, kind, raw, canonical)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, kind, raw) DO UPDATE SET canonical = excluded.canonical
            ",
            params![
                alias.user_id.as_str(),
                alias.kind.as_str(),
                alias.raw,
                alias.canonical
            ],
        )?;
        Ok(())
    }

    /// Removes an alias rule. Returns `false` if none existed.
    pub fn remove_alias(&self, user: &UserId, kind: SummaryKind, raw: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM aliases WHERE user_id = ? AND kind = ? AND raw = ?",
            params![user.as_str(), kind.as_str(), raw],
        )?;
        Ok(deleted > 0)
    }

    /// Lists project labels of `user` ordered by project.
    pub fn project_labels(&self, user: &UserId) -> Result<Vec<ProjectLabel>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT project, label FROM project_labels WHERE user_id = ? ORDER BY project ASC",
        )?;
        let rows = stmt.query_map([user.as_str()], |row| {
            Ok(ProjectLabel {
                user_id: user.clone(),
                project: row.get(0)?,
                label: row.get(1)?,
            })
        })?;
        let mut labels = Vec::new();
        for row in rows {
            labels.push(row?);
        }
        Ok(labels)
    }

    /// Sets the label of a project, replacing any previous label.
    pub fn upsert_project_label(&self, label: &ProjectLabel) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO project_labels (user_id, project, label)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, project) DO UPDATE SET label = excluded.label
            ",
            params![label.user_id.as_str(), label.project, label.label],
        )?;
        Ok(())
    }

    /// Removes a project's label. Returns `false` if it had none.
    pub fn remove_project_label(&self, user: &UserId, project: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM project_labels WHERE user_id = ? AND project = ?",
            params![user.as_str(), project],
        )?;
        Ok(deleted > 0)
    }

    // ---- users ------------------------------------------------------------

    /// Looks up a user by id.
    pub fn user(&self, id: &UserId) -> Result<Option<User>, DbError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [id.as_str()],
                user_row,
            )
            .optional()?;
        row.map(UserRow::into_user).transpose()
    }

    /// Lists all users ordered by id.
    pub fn users(&self) -> Result<Vec<User>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))?;
        let rows = stmt.query_map([], user_row)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?.into_user()?);
        }
        Ok(users)
    }

    /// Inserts or replaces a user.
    pub fn upsert_user(&self, user: &User) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO users
            (id, timezone, share_editors, share_languages, share_projects,
             share_operating_systems, share_machines, share_labels, share_data_max_days,
             created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                timezone = excluded.timezone,
                share_editors = excluded.share_editors,
                share_languages = excluded.share_languages,
                share_projects = excluded.share_projects,
                share_operating_systems = excluded.share_operating_systems,
                share_machines = excluded.share_machines,
                share_labels = excluded.share_labels,
                share_data_max_days = excluded.share_data_max_days
            ",
            params![
                user.id.as_str(),
                user.timezone.to_string(),
                user.share_editors,
                user.share_languages,
                user.share_projects,
                user.share_operating_systems,
                user.share_machines,
                user.share_labels,
                user.share_data_max_days,
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    }
}

/// Initializes the database schema.
///
/// This is idempotent - safe to call on an already-initialized database.
fn init(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            share_editors INTEGER NOT NULL DEFAULT 0,
            share_languages INTEGER NOT NULL DEFAULT 0,
            share_projects INTEGER NOT NULL DEFAULT 0,
            share_operating_systems INTEGER NOT NULL DEFAULT 0,
            share_machines INTEGER NOT NULL DEFAULT 0,
            share_labels INTEGER NOT NULL DEFAULT 0,
            share_data_max_days INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        -- Heartbeats: raw activity signals, append-only
        -- id: content hash, so replays are ignored
        -- timestamp: RFC 3339 with millis (e.g., '2024-01-15T10:30:00.000Z')
        CREATE TABLE IF NOT EXISTS heartbeats (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            project TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT '',
            editor TEXT NOT NULL DEFAULT '',
            operating_system TEXT NOT NULL DEFAULT '',
            machine TEXT NOT NULL DEFAULT '',
            entity TEXT NOT NULL DEFAULT '',
            entity_type TEXT NOT NULL DEFAULT 'file',
            is_write INTEGER NOT NULL DEFAULT 0,
            origin TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_heartbeats_user_time ON heartbeats(user_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_heartbeats_time ON heartbeats(timestamp);
        CREATE INDEX IF NOT EXISTS idx_heartbeats_origin ON heartbeats(user_id, origin);

        -- Cached day summaries, one per (user, filter fingerprint, local day)
        CREATE TABLE IF NOT EXISTS summary_fragments (
            user_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            from_time TEXT NOT NULL,
            to_time TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, fingerprint, from_time)
        );

        CREATE INDEX IF NOT EXISTS idx_fragments_user_time ON summary_fragments(user_id, from_time);

        CREATE TABLE IF NOT EXISTS aliases (
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            raw TEXT NOT NULL,
            canonical TEXT NOT NULL,
            PRIMARY KEY (user_id, kind, raw)
        );

        CREATE TABLE IF NOT EXISTS project_labels (
            user_id TEXT NOT NULL,
            project TEXT NOT NULL,
            label TEXT NOT NULL,
            PRIMARY KEY (user_id, project)
        );
        ",
    )?;
    Ok(())
}

#[derive(Debug)]
struct HeartbeatRow {
    id: String,
    user_id: String,
    timestamp: String,
    project: String,
    language: String,
    editor: String,
    operating_system: String,
    machine: String,
    entity: String,
    entity_type: String,
    is_write: bool,
    origin: Option<String>,
}

fn heartbeat_row(row: &Row<'_>) -> rusqlite::Result<HeartbeatRow> {
    Ok(HeartbeatRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        timestamp: row.get(2)?,
        project: row.get(3)?,
        language: row.get(4)?,
        editor: row.get(5)?,
        operating_system: row.get(6)?,
        machine: row.get(7)?,
        entity: row.get(8)?,
        entity_type: row.get(9)?,
        is_write: row.get(10)?,
        origin: row.get(11)?,
    })
}

impl HeartbeatRow {
    fn into_heartbeat(self) -> Result<Heartbeat, DbError> {
        let timestamp = parse_timestamp(&self.timestamp, &self.id)?;
        let entity_type: EntityType =
            self.entity_type
                .parse()
                .map_err(|err| DbError::InvalidRow {
                    id: self.id.clone(),
                    message: format!("{err}"),
                })?;
        Ok(Heartbeat {
            user_id: parse_user_id(self.user_id)?,
            timestamp,
            project: self.project,
            language: self.language,
            editor: self.editor,
            operating_system: self.operating_system,
            machine: self.machine,
            entity: self.entity,
            entity_type,
            is_write: self.is_write,
            origin: self.origin,
        })
    }
}

#[derive(Debug)]
struct UserRow {
    id: String,
    timezone: String,
    share_editors: bool,
    share_languages: bool,
    share_projects: bool,
    share_operating_systems: bool,
    share_machines: bool,
    share_labels: bool,
    share_data_max_days: i64,
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        timezone: row.get(1)?,
        share_editors: row.get(2)?,
        share_languages: row.get(3)?,
        share_projects: row.get(4)?,
        share_operating_systems: row.get(5)?,
        share_machines: row.get(6)?,
        share_labels: row.get(7)?,
        share_data_max_days: row.get(8)?,
    })
}

impl UserRow {
    fn into_user(self) -> Result<User, DbError> {
        let timezone: UserTimezone = self.timezone.parse().map_err(|err| DbError::InvalidRow {
            id: self.id.clone(),
            message: format!("{err}"),
        })?;
        Ok(User {
            id: parse_user_id(self.id)?,
            timezone,
            share_editors: self.share_editors,
            share_languages: self.share_languages,
            share_projects: self.share_projects,
            share_operating_systems: self.share_operating_systems,
            share_machines: self.share_machines,
            share_labels: self.share_labels,
            share_data_max_days: self.share_data_max_days,
        })
    }
}

const fn heartbeat_column(kind: SummaryKind) -> &'static str {
    match kind {
        SummaryKind::Project | SummaryKind::Label => "project",
        SummaryKind::Language => "language",
        SummaryKind::Editor => "editor",
        SummaryKind::OperatingSystem => "operating_system",
        SummaryKind::Machine => "machine",
        SummaryKind::Entity => "entity",
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_user_id(id: String) -> Result<UserId, DbError> {
    UserId::new(id.clone()).map_err(|err| DbError::InvalidRow {
        id,
        message: format!("{err}"),
    })
}

fn parse_timestamp(timestamp: &str, id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl HeartbeatStore for Database {
    fn insert(&self, heartbeat: &Heartbeat) -> Result<bool, StorageError> {
        Ok(self.insert_heartbeats(std::slice::from_ref(heartbeat))? == 1)
    }

    fn insert_batch(&self, heartbeats: &[Heartbeat]) -> Result<usize, StorageError> {
        Ok(self.insert_heartbeats(heartbeats)?)
    }

    fn count(&self) -> Result<u64, StorageError> {
        Ok(self.count_heartbeats(None)?)
    }

    fn count_by_user(&self, user: &UserId) -> Result<u64, StorageError> {
        Ok(self.count_heartbeats(Some(user))?)
    }

    fn count_by_users(&self, users: &[UserId]) -> Result<Vec<CountByUser>, StorageError> {
        Ok(self.count_heartbeats_by_users(users)?)
    }

    fn all_within(
        &self,
        user: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, StorageError> {
        Ok(self.heartbeats_in_range(user, from, to)?)
    }

    fn first_by_users(&self, users: &[UserId]) -> Result<Vec<TimeByUser>, StorageError> {
        Ok(self.first_heartbeat_times(users)?)
    }

    fn first_by_user(&self, user: &UserId) -> Result<Option<DateTime<Utc>>, StorageError> {
        let times = self.first_heartbeat_times(std::slice::from_ref(user))?;
        Ok(times.into_iter().next().map(|t| t.time))
    }

    fn latest_by_user(&self, user: &UserId) -> Result<Option<Heartbeat>, StorageError> {
        Ok(self.latest_heartbeat(user, None)?)
    }

    fn latest_by_origin_and_user(
        &self,
        origin: &str,
        user: &UserId,
    ) -> Result<Option<Heartbeat>, StorageError> {
        Ok(self.latest_heartbeat(user, Some(origin))?)
    }

    fn entity_set_by_user(
        &self,
        kind: SummaryKind,
        user: &UserId,
    ) -> Result<Vec<String>, StorageError> {
        Ok(self.distinct_values(kind, user)?)
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        Ok(self.delete_heartbeats_before(cutoff)?)
    }
}

impl SummaryStore for Database {
    fn get_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Summary>, StorageError> {
        Ok(self.fragments(user, fingerprint, from, to)?)
    }

    fn insert_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        fragments: &[Summary],
    ) -> Result<(), StorageError> {
        Ok(self.upsert_fragments(user, fingerprint, fragments)?)
    }

    fn delete_fragments(
        &self,
        user: &UserId,
        fingerprint: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        Ok(self.delete_fragments_overlapping(user, fingerprint, from, to)?)
    }

    fn delete_fragments_by_user(&self, user: &UserId) -> Result<usize, StorageError> {
        Ok(self.delete_user_fragments(user)?)
    }
}

impl AliasStore for Database {
    fn aliases_by_user(&self, user: &UserId) -> Result<Vec<Alias>, StorageError> {
        Ok(self.aliases(user)?)
    }

    fn project_labels_by_user(&self, user: &UserId) -> Result<Vec<ProjectLabel>, StorageError> {
        Ok(self.project_labels(user)?)
    }

    fn put_alias(&self, alias: &Alias) -> Result<(), StorageError> {
        Ok(self.upsert_alias(alias)?)
    }

    fn delete_alias(
        &self,
        user: &UserId,
        kind: SummaryKind,
        raw: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.remove_alias(user, kind, raw)?)
    }

    fn put_project_label(&self, label: &ProjectLabel) -> Result<(), StorageError> {
        Ok(self.upsert_project_label(label)?)
    }

    fn delete_project_label(&self, user: &UserId, project: &str) -> Result<bool, StorageError> {
        Ok(self.remove_project_label(user, project)?)
    }
}

impl UserStore for Database {
    fn get_user(&self, user: &UserId) -> Result<Option<User>, StorageError> {
        Ok(self.user(user)?)
    }

    fn put_user(&self, user: &User) -> Result<(), StorageError> {
        Ok(self.upsert_user(user)?)
    }

    fn list_users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.users()?)
    }
}
