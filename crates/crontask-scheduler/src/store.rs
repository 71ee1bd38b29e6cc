use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use crate::{
    db::{lock, now_rfc3339, SharedConnection},
    error::{Result, SchedulerError},
    types::{HttpMethod, Task, TaskDefinition, TaskStatus},
};

/// Durable record of task definitions and their desired status.
pub trait TaskStore: Send + Sync {
    fn get_by_id(&self, id: i64) -> Result<Option<Task>>;
    fn get_all_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;
    /// Every task, newest first.
    fn get_all(&self) -> Result<Vec<Task>>;
    /// Persist a new task and return its id.
    fn insert(&self, def: &TaskDefinition) -> Result<i64>;
    /// Replace every caller-controlled field. Returns rows affected.
    fn update(&self, id: i64, def: &TaskDefinition) -> Result<usize>;
    fn update_status(&self, id: i64, status: TaskStatus) -> Result<usize>;
    /// Returns rows affected; zero means the id did not exist.
    fn delete(&self, id: i64) -> Result<usize>;
}

/// SQLite-backed [`TaskStore`].
pub struct SqliteTaskStore {
    conn: SharedConnection,
}

impl SqliteTaskStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

const TASK_COLUMNS: &str = "id, name, url, method, headers, body, cron_expression, status,
                            created_at, updated_at";

/// Raw column values; decoded outside the rusqlite closure so JSON and enum
/// failures surface as our own errors.
struct TaskRow {
    id: i64,
    name: String,
    url: String,
    method: String,
    headers: String,
    body: String,
    cron_expression: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            method: row.get(3)?,
            headers: row.get(4)?,
            body: row.get(5)?,
            cron_expression: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let method: HttpMethod = self.method.parse().map_err(SchedulerError::Internal)?;
        let status: TaskStatus = self.status.parse().map_err(SchedulerError::Internal)?;
        let headers: BTreeMap<String, String> = serde_json::from_str(&self.headers)?;
        Ok(Task {
            id: self.id,
            name: self.name,
            url: self.url,
            method,
            headers,
            body: Some(self.body).filter(|b| !b.is_empty()),
            cron_expression: self.cron_expression,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl SqliteTaskStore {
    fn query_tasks(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Task>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, TaskRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

impl TaskStore for SqliteTaskStore {
    fn get_by_id(&self, id: i64) -> Result<Option<Task>> {
        let conn = lock(&self.conn)?;
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                [id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn get_all_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY id"),
            &[&status.as_str()],
        )
    }

    fn get_all(&self) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, id DESC"),
            &[],
        )
    }

    fn insert(&self, def: &TaskDefinition) -> Result<i64> {
        let headers = serde_json::to_string(&def.headers)?;
        let now = now_rfc3339();
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO tasks
             (name, url, method, headers, body, cron_expression, status, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)",
            params![
                def.name,
                def.url,
                def.method.as_str(),
                headers,
                def.body.as_deref().unwrap_or(""),
                def.cron_expression,
                def.status.as_str(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(task_id = id, name = %def.name, "task inserted");
        Ok(id)
    }

    fn update(&self, id: i64, def: &TaskDefinition) -> Result<usize> {
        let headers = serde_json::to_string(&def.headers)?;
        let conn = lock(&self.conn)?;
        let n = conn.execute(
            "UPDATE tasks
             SET name = ?1, url = ?2, method = ?3, headers = ?4, body = ?5,
                 cron_expression = ?6, status = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                def.name,
                def.url,
                def.method.as_str(),
                headers,
                def.body.as_deref().unwrap_or(""),
                def.cron_expression,
                def.status.as_str(),
                now_rfc3339(),
                id,
            ],
        )?;
        Ok(n)
    }

    fn update_status(&self, id: i64, status: TaskStatus) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let n = conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_rfc3339(), id],
        )?;
        Ok(n)
    }

    fn delete(&self, id: i64) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let n = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if n > 0 {
            info!(task_id = id, "task deleted");
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn def(name: &str, status: TaskStatus) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            url: "http://127.0.0.1:9/hook".to_string(),
            method: HttpMethod::Put,
            headers: BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
            body: Some("payload".to_string()),
            cron_expression: "0 * * * *".to_string(),
            status,
        }
    }

    fn store() -> SqliteTaskStore {
        SqliteTaskStore::new(open_in_memory().unwrap())
    }

    #[test]
    fn insert_then_get_preserves_fields() {
        let store = store();
        let id = store.insert(&def("a", TaskStatus::Active)).unwrap();
        let task = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.definition(), def("a", TaskStatus::Active));
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn missing_id_is_none() {
        assert!(store().get_by_id(42).unwrap().is_none());
    }

    #[test]
    fn empty_body_reads_back_as_none() {
        let store = store();
        let id = store
            .insert(&TaskDefinition {
                body: None,
                ..def("a", TaskStatus::Active)
            })
            .unwrap();
        assert!(store.get_by_id(id).unwrap().unwrap().body.is_none());
    }

    #[test]
    fn filter_by_status() {
        let store = store();
        store.insert(&def("a", TaskStatus::Active)).unwrap();
        store.insert(&def("b", TaskStatus::Paused)).unwrap();
        store.insert(&def("c", TaskStatus::Active)).unwrap();
        let active = store.get_all_by_status(TaskStatus::Active).unwrap();
        let names: Vec<_> = active.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(store.get_all_by_status(TaskStatus::Paused).unwrap().len(), 1);
    }

    #[test]
    fn get_all_is_newest_first() {
        let store = store();
        let first = store.insert(&def("a", TaskStatus::Active)).unwrap();
        let second = store.insert(&def("b", TaskStatus::Active)).unwrap();
        let ids: Vec<_> = store.get_all().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, [second, first]);
    }

    #[test]
    fn update_and_status_report_rows_affected() {
        let store = store();
        let id = store.insert(&def("a", TaskStatus::Active)).unwrap();
        let renamed = TaskDefinition {
            name: "renamed".to_string(),
            ..def("a", TaskStatus::Active)
        };
        assert_eq!(store.update(id, &renamed).unwrap(), 1);
        assert_eq!(store.update(id + 1, &renamed).unwrap(), 0);
        assert_eq!(store.update_status(id, TaskStatus::Paused).unwrap(), 1);

        let task = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(task.name, "renamed");
        assert_eq!(task.status, TaskStatus::Paused);
    }

    #[test]
    fn delete_reports_zero_for_unknown_id() {
        let store = store();
        let id = store.insert(&def("a", TaskStatus::Active)).unwrap();
        assert_eq!(store.delete(id).unwrap(), 1);
        assert_eq!(store.delete(id).unwrap(), 0);
    }
}
