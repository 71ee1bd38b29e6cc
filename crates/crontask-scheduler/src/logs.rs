use rusqlite::{params, Row};
use tracing::debug;

use crate::{
    db::{lock, now_rfc3339, SharedConnection},
    error::Result,
    types::{LogEntry, LogPage, LogStatus, NewLogEntry},
};

/// Append-only execution history.
pub trait LogStore: Send + Sync {
    /// Persist one entry, stamping `executed_at`. Returns the new row id.
    fn append(&self, entry: &NewLogEntry) -> Result<i64>;
    /// One page of entries, newest first, optionally restricted to a task.
    /// `page` is 1-based.
    fn query(&self, task_id: Option<i64>, page: u32, page_size: u32) -> Result<LogPage>;
}

/// SQLite-backed [`LogStore`].
pub struct SqliteLogStore {
    conn: SharedConnection,
    max_page_size: u32,
}

impl SqliteLogStore {
    pub fn new(conn: SharedConnection, max_page_size: u32) -> Self {
        Self {
            conn,
            max_page_size: max_page_size.max(1),
        }
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let status: LogStatus = row.get::<_, String>(3)?.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(LogEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        status,
        response_status: row.get(4)?,
        response_body: row.get(5)?,
        error_message: row.get(6)?,
        execution_time: row.get::<_, i64>(7)?.max(0) as u64,
        executed_at: row.get(8)?,
    })
}

impl LogStore for SqliteLogStore {
    fn append(&self, entry: &NewLogEntry) -> Result<i64> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO task_logs
             (task_id, status, response_status, response_body, error_message,
              execution_time, executed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                entry.task_id,
                entry.status.to_string(),
                entry.response_status,
                entry.response_body,
                entry.error_message,
                i64::try_from(entry.execution_time).unwrap_or(i64::MAX),
                now_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(task_id = entry.task_id, log_id = id, status = %entry.status, "execution logged");
        Ok(id)
    }

    fn query(&self, task_id: Option<i64>, page: u32, page_size: u32) -> Result<LogPage> {
        let page = page.max(1);
        let limit = page_size.clamp(1, self.max_page_size);
        let offset = i64::from(page - 1) * i64::from(limit);

        let conn = lock(&self.conn)?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_logs WHERE ?1 IS NULL OR task_id = ?1",
            [task_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT l.id, l.task_id, t.name, l.status, l.response_status, l.response_body,
                    l.error_message, l.execution_time, l.executed_at
             FROM task_logs l
             LEFT JOIN tasks t ON t.id = l.task_id
             WHERE ?1 IS NULL OR l.task_id = ?1
             ORDER BY l.executed_at DESC, l.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let logs = stmt
            .query_map(params![task_id, limit, offset], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let total = total.max(0) as u64;
        Ok(LogPage {
            logs,
            total,
            page,
            limit,
            total_pages: total.div_ceil(u64::from(limit)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::open_in_memory,
        error::SchedulerError,
        store::{SqliteTaskStore, TaskStore},
        types::{ExecutionResult, HttpMethod, TaskDefinition, TaskStatus},
    };

    fn setup(max_page_size: u32) -> (SqliteTaskStore, SqliteLogStore) {
        let conn = open_in_memory().unwrap();
        (
            SqliteTaskStore::new(conn.clone()),
            SqliteLogStore::new(conn, max_page_size),
        )
    }

    fn task(store: &SqliteTaskStore, name: &str) -> i64 {
        store
            .insert(&TaskDefinition {
                name: name.to_string(),
                url: "http://127.0.0.1:9/".to_string(),
                method: HttpMethod::Get,
                headers: Default::default(),
                body: None,
                cron_expression: "* * * * *".to_string(),
                status: TaskStatus::Active,
            })
            .unwrap()
    }

    fn ok(task_id: i64) -> NewLogEntry {
        NewLogEntry::from_result(task_id, &ExecutionResult::response(200, Some("ok".into()), 4))
    }

    #[test]
    fn query_joins_task_name_newest_first() {
        let (tasks, logs) = setup(500);
        let a = task(&tasks, "alpha");
        let first = logs.append(&ok(a)).unwrap();
        let second = logs
            .append(&NewLogEntry::from_result(
                a,
                &ExecutionResult::transport_error("refused", 1),
            ))
            .unwrap();

        let page = logs.query(Some(a), 1, 10).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.logs[0].id, second);
        assert_eq!(page.logs[1].id, first);
        assert_eq!(page.logs[0].task_name.as_deref(), Some("alpha"));
        assert_eq!(page.logs[0].status, LogStatus::Error);
        assert_eq!(page.logs[0].error_message.as_deref(), Some("refused"));
        assert_eq!(page.logs[1].response_status, Some(200));
    }

    #[test]
    fn query_filters_by_task() {
        let (tasks, logs) = setup(500);
        let a = task(&tasks, "a");
        let b = task(&tasks, "b");
        logs.append(&ok(a)).unwrap();
        logs.append(&ok(b)).unwrap();
        logs.append(&ok(b)).unwrap();

        assert_eq!(logs.query(Some(b), 1, 10).unwrap().total, 2);
        assert_eq!(logs.query(None, 1, 10).unwrap().total, 3);
    }

    #[test]
    fn pagination_clamps_page_and_limit() {
        let (tasks, logs) = setup(2);
        let a = task(&tasks, "a");
        for _ in 0..5 {
            logs.append(&ok(a)).unwrap();
        }

        let page = logs.query(None, 0, 100).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 2);
        assert_eq!(page.logs.len(), 2);
        assert_eq!(page.total_pages, 3);

        let last = logs.query(None, 3, 2).unwrap();
        assert_eq!(last.logs.len(), 1);

        let beyond = logs.query(None, 9, 2).unwrap();
        assert!(beyond.logs.is_empty());
        assert_eq!(beyond.total, 5);
    }

    #[test]
    fn deleting_a_task_cascades_and_blocks_late_writes() {
        let (tasks, logs) = setup(500);
        let a = task(&tasks, "a");
        logs.append(&ok(a)).unwrap();
        tasks.delete(a).unwrap();

        assert_eq!(logs.query(None, 1, 10).unwrap().total, 0);
        assert!(matches!(logs.append(&ok(a)), Err(SchedulerError::Database(_))));
    }
}
