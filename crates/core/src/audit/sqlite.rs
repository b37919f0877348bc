use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, ToSql};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore, CycleSummary, Page};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        cycle_id TEXT,
        server_id TEXT,
        category TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_audit_events_cycle_id ON audit_events(cycle_id);
    CREATE INDEX IF NOT EXISTS idx_audit_events_server_id ON audit_events(server_id);
    CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
"#;

const COLUMNS: &str = "id, timestamp, event_type, cycle_id, server_id, data";

fn db_err(e: rusqlite::Error) -> AuditError {
    AuditError::Database(e.to_string())
}

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the database file and its tables
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::init(Connection::open(path).map_err(db_err)?)
    }

    /// In-memory store, used by tests
    pub fn in_memory() -> Result<Self, AuditError> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|e| AuditError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        let columns = [
            ("cycle_id", filter.cycle_id.clone()),
            ("server_id", filter.server_id.clone()),
            ("category", filter.category.map(|c| c.as_str().to_string())),
            ("event_type", filter.event_type.clone()),
        ];
        for (column, value) in columns {
            if let Some(value) = value {
                conditions.push(format!("{} = ?", column));
                params.push(Box::new(value));
            }
        }

        if let Some(from) = filter.from {
            conditions.push("timestamp >= ?".to_string());
            params.push(Box::new(from.to_rfc3339()));
        }
        if let Some(to) = filter.to {
            conditions.push("timestamp <= ?".to_string());
            params.push(Box::new(to.to_rfc3339()));
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), params)
        }
    }

    fn select(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, read_row).map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, cycle_id, server_id, data) = row.map_err(db_err)?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| AuditError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            let data: AuditEvent = serde_json::from_str(&data)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;

            records.push(AuditRecord {
                id,
                timestamp,
                event_type,
                cycle_id,
                server_id,
                category: data.category(),
                data,
            });
        }
        Ok(records)
    }
}

type RawRow = (i64, String, String, Option<String>, Option<String>, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

impl AuditStore for SqliteAuditStore {
    fn insert_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO audit_events (timestamp, event_type, cycle_id, server_id, category, data) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .map_err(db_err)?;

            for record in records {
                let data = serde_json::to_string(&record.data)
                    .map_err(|e| AuditError::Serialization(e.to_string()))?;
                stmt.execute(params![
                    record.timestamp.to_rfc3339(),
                    record.event_type,
                    record.cycle_id,
                    record.server_id,
                    record.category.map(|c| c.as_str()),
                    data,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    fn query(&self, filter: &AuditFilter, page: Page) -> Result<Vec<AuditRecord>, AuditError> {
        let (where_clause, mut params) = Self::where_clause(filter);
        params.push(Box::new(page.limit));
        params.push(Box::new(page.offset));

        // id breaks ties between events written within the same timestamp
        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        self.select(&sql, &refs)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let (where_clause, params) = Self::where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        self.conn()?
            .query_row(&sql, refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn cycle_timeline(&self, cycle_id: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let sql = format!(
            "SELECT {} FROM audit_events WHERE cycle_id = ? ORDER BY timestamp ASC, id ASC",
            COLUMNS
        );
        self.select(&sql, &[&cycle_id])
    }

    fn recent_cycles(&self, limit: i64) -> Result<Vec<CycleSummary>, AuditError> {
        let sql = format!(
            "SELECT {} FROM audit_events WHERE event_type IN ('cycle_completed', 'cycle_failed') ORDER BY timestamp DESC, id DESC LIMIT ?",
            COLUMNS
        );
        Ok(self
            .select(&sql, &[&limit])?
            .iter()
            .filter_map(CycleSummary::from_record)
            .collect())
    }
}
