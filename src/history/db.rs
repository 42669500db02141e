use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{HistoryRecord, HistoryStore};
use crate::error::StatusError;

pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn new(db_path: &Path) -> Result<Self, StatusError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StatusError::Persistence(format!("failed to create {:?}: {}", parent, e))
            })?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StatusError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StatusError> {
        self.conn
            .lock()
            .map_err(|_| StatusError::Persistence("history connection poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StatusError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS build_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                branch_name TEXT NOT NULL,
                build_start_time INTEGER NOT NULL,
                scores_json TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bs_branch_time ON build_status(branch_name, build_start_time);
        ",
        )?;
        Ok(())
    }
}

fn insert_record(conn: &Connection, record: &HistoryRecord) -> Result<(), StatusError> {
    let scores_json = serde_json::to_string(&record.scores)?;
    conn.execute(
        "INSERT INTO build_status (branch_name, build_start_time, scores_json, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record.branch,
            record.build_start_time,
            scores_json,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn select_branch(conn: &Connection, branch: &str) -> Result<Vec<HistoryRecord>, StatusError> {
    let mut stmt = conn.prepare(
        "SELECT branch_name, build_start_time, scores_json
         FROM build_status WHERE branch_name=?1 ORDER BY build_start_time, id",
    )?;
    let rows = stmt.query_map(params![branch], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (branch, build_start_time, scores_json) = row?;
        records.push(HistoryRecord {
            branch,
            build_start_time,
            scores: serde_json::from_str(&scores_json)?,
        });
    }
    Ok(records)
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, record: &HistoryRecord) -> Result<(), StatusError> {
        let conn = self.conn()?;
        insert_record(&conn, record)
    }

    fn query_by_partition(&self, branch: &str) -> Result<Vec<HistoryRecord>, StatusError> {
        let conn = self.conn()?;
        select_branch(&conn, branch)
    }

    /// Insert and read back inside one transaction.
    fn append_and_query(&self, record: &HistoryRecord) -> Result<Vec<HistoryRecord>, StatusError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        insert_record(&tx, record)?;
        let records = select_branch(&tx, &record.branch)?;
        tx.commit()?;
        Ok(records)
    }
}
