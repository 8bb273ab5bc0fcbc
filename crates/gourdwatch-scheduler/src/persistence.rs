//! SQLite-backed persistence for monitoring records, users and gourd types.
//!
//! The harvest window and evidence lists are embedded JSON columns, so a
//! record is always written as one row and `save` is atomic per record. The
//! due/elapsed filters run inside SQLite via `json_each`/`json_extract`;
//! rows with an unreadable window are still returned so they can be logged
//! and skipped in Rust instead of silently vanishing.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use gourdwatch_core::traits::MonitoringStore;
use gourdwatch_core::{
    GourdType, GourdWatchError, MonitoringRecord, MonitoringStatus, Result, UserProfile,
};
use rusqlite::{Connection, OptionalExtension, params};

const RECORD_COLUMNS: &str = "id, owner_id, plot_label, gourd_type_id, pollination_date, \
     harvest_window, pollinated_flower_evidence, harvested_fruit_evidence, status, \
     created_at, updated_at";

/// SQLite store. One connection behind a mutex; every call is short.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Row as stored, before JSON/date decoding.
struct RawRecord {
    id: String,
    owner_id: String,
    plot_label: Option<String>,
    gourd_type_id: String,
    pollination_date: String,
    harvest_window: String,
    pollinated_flower_evidence: String,
    harvested_fruit_evidence: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            plot_label: row.get(2)?,
            gourd_type_id: row.get(3)?,
            pollination_date: row.get(4)?,
            harvest_window: row.get(5)?,
            pollinated_flower_evidence: row.get(6)?,
            harvested_fruit_evidence: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<MonitoringRecord> {
        let id = self.id;
        let bad = |what: &str, e: &dyn std::fmt::Display| {
            GourdWatchError::malformed(&id, format!("{what}: {e}"))
        };

        let pollination_date = NaiveDate::parse_from_str(&self.pollination_date, "%Y-%m-%d")
            .map_err(|e| bad("pollination_date", &e))?;
        let harvest_window =
            serde_json::from_str(&self.harvest_window).map_err(|e| bad("harvest_window", &e))?;
        let pollinated_flower_evidence = serde_json::from_str(&self.pollinated_flower_evidence)
            .map_err(|e| bad("pollinated_flower_evidence", &e))?;
        let harvested_fruit_evidence = serde_json::from_str(&self.harvested_fruit_evidence)
            .map_err(|e| bad("harvested_fruit_evidence", &e))?;
        let status = MonitoringStatus::parse(&self.status)
            .ok_or_else(|| bad("status", &self.status))?;
        let created_at = parse_timestamp(&self.created_at).map_err(|e| bad("created_at", &e))?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(|e| bad("updated_at", &e))?;

        let record = MonitoringRecord {
            id: id.clone(),
            owner_id: self.owner_id,
            plot_label: self.plot_label,
            gourd_type_id: self.gourd_type_id,
            pollination_date,
            harvest_window,
            pollinated_flower_evidence,
            harvested_fruit_evidence,
            status,
            created_at,
            updated_at,
        };
        record.validate()?;
        Ok(record)
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc))
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> GourdWatchError + '_ {
    move |e| GourdWatchError::Store(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        // WAL keeps API reads from blocking on the sweep's writes
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| GourdWatchError::Store(format!("Lock: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS monitoring_records (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                plot_label TEXT,
                gourd_type_id TEXT NOT NULL,
                pollination_date TEXT NOT NULL,         -- YYYY-MM-DD
                harvest_window TEXT NOT NULL,           -- JSON: [{date, notified}] x 7
                pollinated_flower_evidence TEXT NOT NULL DEFAULT '[]',
                harvested_fruit_evidence TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'in_progress',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_monitoring_owner ON monitoring_records(owner_id);
            CREATE INDEX IF NOT EXISTS idx_monitoring_status ON monitoring_records(status);

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                push_token TEXT
            );

            CREATE TABLE IF NOT EXISTS gourd_types (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err("Migration"))
    }

    /// Run a record query and decode rows, logging and dropping the bad ones.
    fn query_records(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<MonitoringRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM monitoring_records m WHERE {where_clause}");
        let mut stmt = conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params, RawRecord::from_row)
            .map_err(db_err("Query"))?;

        let mut records = Vec::new();
        for row in rows {
            match row.map_err(db_err("Row")).and_then(RawRecord::decode) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("⚠️ Skipping record: {e}"),
            }
        }
        Ok(records)
    }

    fn write_record(&self, record: &MonitoringRecord, verb: &str) -> Result<usize> {
        let harvest_window = serde_json::to_string(&record.harvest_window)?;
        let pollinated = serde_json::to_string(&record.pollinated_flower_evidence)?;
        let harvested = serde_json::to_string(&record.harvested_fruit_evidence)?;
        let sql = format!(
            "{verb} INTO monitoring_records ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );
        self.conn()?
            .execute(
                &sql,
                params![
                    record.id,
                    record.owner_id,
                    record.plot_label,
                    record.gourd_type_id,
                    record.pollination_date.format("%Y-%m-%d").to_string(),
                    harvest_window,
                    pollinated,
                    harvested,
                    record.status.as_str(),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    GourdWatchError::Conflict(format!("record {} already exists", record.id))
                }
                other => GourdWatchError::Store(format!("Save record: {other}")),
            })
    }
}

fn read_user(conn: &Connection, id: &str) -> Result<Option<UserProfile>> {
    conn.query_row(
        "SELECT id, display_name, push_token FROM users WHERE id = ?1",
        [id],
        |row| {
            Ok(UserProfile {
                id: row.get(0)?,
                display_name: row.get(1)?,
                push_token: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(db_err("Get user"))
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl MonitoringStore for SqliteStore {
    async fn find_due_for_notification(&self, today: NaiveDate) -> Result<Vec<MonitoringRecord>> {
        let records = self.query_records(
            "CASE
                WHEN NOT json_valid(m.harvest_window) THEN 1
                WHEN json_array_length(m.harvest_window) != 7 THEN 1
                ELSE EXISTS (
                    SELECT 1 FROM json_each(m.harvest_window) d
                    WHERE json_extract(d.value, '$.date') = ?1
                      AND json_extract(d.value, '$.notified') = 0
                )
             END",
            &[&day_key(today)],
        )?;
        Ok(records
            .into_iter()
            .filter(|r| r.harvest_window.due_index(today).is_some())
            .collect())
    }

    async fn find_elapsed_active(&self, today: NaiveDate) -> Result<Vec<MonitoringRecord>> {
        let records = self.query_records(
            "m.status = 'in_progress' AND CASE
                WHEN NOT json_valid(m.harvest_window) THEN 1
                WHEN json_array_length(m.harvest_window) != 7 THEN 1
                ELSE json_extract(m.harvest_window, '$[6].date') < ?1
             END",
            &[&day_key(today)],
        )?;
        Ok(records
            .into_iter()
            .filter(|r| r.harvest_window.is_elapsed(today))
            .collect())
    }

    async fn save(&self, record: &MonitoringRecord) -> Result<()> {
        self.write_record(record, "INSERT OR REPLACE")?;
        Ok(())
    }

    async fn insert(&self, record: &MonitoringRecord) -> Result<()> {
        self.write_record(record, "INSERT")?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MonitoringRecord>> {
        let raw = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM monitoring_records WHERE id = ?1"),
                [id],
                RawRecord::from_row,
            )
            .optional()
            .map_err(db_err("Get record"))?
        };
        raw.map(RawRecord::decode).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<MonitoringRecord>> {
        self.query_records("m.owner_id = ?1 ORDER BY m.created_at DESC", &[&owner_id])
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM monitoring_records WHERE id = ?1", [id])
            .map_err(db_err("Delete record"))?;
        Ok(removed > 0)
    }

    async fn user(&self, id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        read_user(&conn, id)
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO users (id, display_name, push_token) VALUES (?1, ?2, ?3)",
                params![user.id, user.display_name, user.push_token],
            )
            .map_err(db_err("Save user"))?;
        Ok(())
    }

    async fn set_push_token(
        &self,
        user_id: &str,
        push_token: &str,
        display_name: Option<&str>,
    ) -> Result<UserProfile> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, display_name, push_token) VALUES (?1, COALESCE(?3, ''), ?2)
             ON CONFLICT(id) DO UPDATE SET
                push_token = excluded.push_token,
                display_name = COALESCE(?3, users.display_name)",
            params![user_id, push_token, display_name],
        )
        .map_err(db_err("Set push token"))?;
        read_user(&conn, user_id)?
            .ok_or_else(|| GourdWatchError::Store(format!("user {user_id} missing after write")))
    }

    async fn gourd_type(&self, id: &str) -> Result<Option<GourdType>> {
        self.conn()?
            .query_row(
                "SELECT id, name FROM gourd_types WHERE id = ?1",
                [id],
                |row| {
                    Ok(GourdType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(db_err("Get gourd type"))
    }

    async fn upsert_gourd_type(&self, gourd_type: &GourdType) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO gourd_types (id, name) VALUES (?1, ?2)",
                params![gourd_type.id, gourd_type.name],
            )
            .map_err(db_err("Save gourd type"))?;
        Ok(())
    }

    async fn list_gourd_types(&self) -> Result<Vec<GourdType>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM gourd_types ORDER BY name")
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GourdType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(db_err("Query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Row"))
    }
}
