use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{Result, SchedulerError};

/// Connection shared by the task store and the log store.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Initialise the scheduler schema in `conn`.
///
/// Creates `tasks` and `task_logs` (idempotent). Log rows reference their task
/// with `ON DELETE CASCADE`, so deleting a task drops its history.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS tasks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL,
            url             TEXT    NOT NULL,
            method          TEXT    NOT NULL DEFAULT 'GET',
            headers         TEXT    NOT NULL DEFAULT '{}',  -- JSON object
            body            TEXT    NOT NULL DEFAULT '',
            cron_expression TEXT    NOT NULL,
            status          TEXT    NOT NULL DEFAULT 'active',
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id         INTEGER NOT NULL REFERENCES tasks (id) ON DELETE CASCADE,
            status          TEXT    NOT NULL,
            response_status INTEGER,            -- NULL when no response arrived
            response_body   TEXT,
            error_message   TEXT,
            execution_time  INTEGER NOT NULL,   -- milliseconds
            executed_at     TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_task_logs_task_executed
            ON task_logs (task_id, executed_at);
        CREATE INDEX IF NOT EXISTS idx_task_logs_executed ON task_logs (executed_at);
        ",
    )?;
    Ok(())
}

/// Open (or create) the database file at `path` and initialise the schema.
pub fn open(path: impl AsRef<Path>) -> Result<SharedConnection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Fresh in-memory database with the schema applied. Used by tests.
pub fn open_in_memory() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub(crate) fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| SchedulerError::Internal("database mutex poisoned".to_string()))
}

/// Current time in the format stored in every timestamp column.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
