use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{Result, SchedulerError},
    logs::LogStore,
    registry::{BootstrapReport, TaskRegistry},
    store::TaskStore,
    types::{ExecutionResult, LogPage, Task, TaskAction, TaskDefinition, TaskPatch, TaskStatus},
};

/// Result of [`TaskService::perform_action`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ActionOutcome {
    StatusChanged { status: TaskStatus },
    Tested(ExecutionResult),
}

/// Operations the API layer uses to mutate tasks.
///
/// Keeps the store's `status` column and the registry's timers consistent:
/// every change that can affect scheduling stops the timer first and
/// restarts it only if the persisted row ends up `active`. Mutations of the
/// same id are serialized so that sequence never interleaves with another.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    logs: Arc<dyn LogStore>,
    registry: Arc<TaskRegistry>,
    default_page_size: u32,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        logs: Arc<dyn LogStore>,
        registry: Arc<TaskRegistry>,
        default_page_size: u32,
    ) -> Self {
        Self {
            store,
            logs,
            registry,
            default_page_size,
            locks: DashMap::new(),
        }
    }

    /// Schedule every active task. Call once at startup.
    pub fn bootstrap(&self) -> Result<BootstrapReport> {
        self.registry.bootstrap(self.store.as_ref())
    }

    pub fn create_task(&self, def: TaskDefinition) -> Result<i64> {
        self.validate(&def)?;
        let id = self.store.insert(&def)?;
        let lock = self.task_lock(id);
        let _guard = acquire(&lock)?;
        let task = self.get_task(id)?;
        if task.status == TaskStatus::Active {
            self.schedule(&task)?;
        }
        info!(task_id = id, name = %task.name, status = %task.status, "task created");
        Ok(id)
    }

    /// Merge `patch` over the stored task. Fields left unset keep their values.
    pub fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task> {
        let lock = self.task_lock(id);
        let _guard = acquire(&lock)?;
        let current = self.get_task(id)?;
        let merged = current.definition().apply(&patch);
        self.validate(&merged)?;

        let was_running = self.registry.stop_task(id);
        match self.store.update(id, &merged) {
            Ok(0) => return Err(SchedulerError::TaskNotFound { id }),
            Ok(_) => {}
            Err(e) => {
                if was_running {
                    if let Err(restore) = self.registry.start_task(&current) {
                        warn!(task_id = id, error = %restore, "could not restore timer after failed update");
                    }
                }
                return Err(e);
            }
        }

        let updated = self.get_task(id)?;
        if updated.status == TaskStatus::Active {
            self.schedule(&updated)?;
        }
        info!(task_id = id, status = %updated.status, "task updated");
        Ok(updated)
    }

    /// `status` must be `"active"` or `"paused"`.
    pub fn set_status(&self, id: i64, status: &str) -> Result<TaskStatus> {
        let status: TaskStatus = status.parse().map_err(SchedulerError::Validation)?;
        let lock = self.task_lock(id);
        let _guard = acquire(&lock)?;
        let task = self.get_task(id)?;
        if status == TaskStatus::Active {
            self.registry.clock().check(&task.cron_expression)?;
        }

        self.registry.stop_task(id);
        if self.store.update_status(id, status)? == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }
        if status == TaskStatus::Active {
            let task = Task { status, ..task };
            self.schedule(&task)?;
        }
        info!(task_id = id, %status, "task status changed");
        Ok(status)
    }

    pub fn delete_task(&self, id: i64) -> Result<()> {
        let lock = self.task_lock(id);
        let _guard = acquire(&lock)?;
        self.registry.stop_task(id);
        if self.store.delete(id)? == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }
        info!(task_id = id, "task removed");
        Ok(())
    }

    /// Run the task once now through the same pipeline as scheduled firings.
    /// The registry state of the task is untouched.
    pub async fn test_now(&self, id: i64) -> Result<ExecutionResult> {
        let task = self.get_task(id)?;
        info!(task_id = id, "manual test run");
        Ok(self.registry.execute_task(&task).await)
    }

    /// `action` is one of `pause`, `resume`, `test`.
    pub async fn perform_action(&self, id: i64, action: &str) -> Result<ActionOutcome> {
        let action: TaskAction = action.parse().map_err(SchedulerError::Validation)?;
        match action {
            TaskAction::Pause => self
                .set_status(id, TaskStatus::Paused.as_str())
                .map(|status| ActionOutcome::StatusChanged { status }),
            TaskAction::Resume => self
                .set_status(id, TaskStatus::Active.as_str())
                .map(|status| ActionOutcome::StatusChanged { status }),
            TaskAction::Test => self.test_now(id).await.map(ActionOutcome::Tested),
        }
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.get_all()
    }

    pub fn get_task(&self, id: i64) -> Result<Task> {
        self.store
            .get_by_id(id)?
            .ok_or(SchedulerError::TaskNotFound { id })
    }

    /// Defaults: first page, configured page size.
    pub fn query_logs(
        &self,
        task_id: Option<i64>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<LogPage> {
        self.logs.query(
            task_id,
            page.unwrap_or(1),
            limit.unwrap_or(self.default_page_size),
        )
    }

    pub fn running_task_ids(&self) -> Vec<i64> {
        self.registry.running_task_ids()
    }

    /// Stop every timer. In-flight executions still finish and log.
    pub fn shutdown(&self) -> usize {
        self.registry.stop_all()
    }

    /// Entries are kept after a delete: a caller already waiting on the old
    /// mutex must still exclude anyone who arrives later for the same id.
    fn task_lock(&self, id: i64) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    fn validate(&self, def: &TaskDefinition) -> Result<()> {
        def.validate()?;
        self.registry.clock().check(&def.cron_expression)
    }

    /// Start the timer; if that fails, persist `paused` so the row never
    /// claims a timer it does not have.
    fn schedule(&self, task: &Task) -> Result<()> {
        if let Err(e) = self.registry.start_task(task) {
            warn!(task_id = task.id, error = %e, "task could not be scheduled, marking paused");
            if let Err(pe) = self.store.update_status(task.id, TaskStatus::Paused) {
                warn!(task_id = task.id, error = %pe, "failed to mark unschedulable task paused");
            }
            return Err(e);
        }
        Ok(())
    }
}

fn acquire(lock: &Mutex<()>) -> Result<std::sync::MutexGuard<'_, ()>> {
    lock.lock()
        .map_err(|_| SchedulerError::Internal("task lock poisoned".to_string()))
}
