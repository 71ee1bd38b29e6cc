use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    clock::{ClockSource, FireCallback, Subscription},
    error::{Result, SchedulerError},
    executor::{HttpCall, HttpExecutor, HttpOutcome},
    logs::LogStore,
    store::TaskStore,
    types::{ExecutionResult, NewLogEntry, Task, TaskStatus},
};

/// Execution + logging pipeline shared by scheduled firings and manual tests.
pub struct TaskRunner {
    executor: HttpExecutor,
    logs: Arc<dyn LogStore>,
}

impl TaskRunner {
    pub fn new(executor: HttpExecutor, logs: Arc<dyn LogStore>) -> Self {
        Self { executor, logs }
    }

    /// Perform one HTTP call for `task` and append exactly one log entry.
    ///
    /// A failing log write is reported and swallowed; the result is always
    /// returned.
    pub async fn execute(&self, task: &Task) -> ExecutionResult {
        let started = Instant::now();
        let outcome = self.executor.execute(&HttpCall::from(task)).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            HttpOutcome::Response { status, body } => {
                ExecutionResult::response(status, body, elapsed_ms)
            }
            HttpOutcome::Transport { message } => {
                warn!(task_id = task.id, url = %task.url, error = %message, "task execution failed");
                ExecutionResult::transport_error(message, elapsed_ms)
            }
        };

        if let Err(e) = self.logs.append(&NewLogEntry::from_result(task.id, &result)) {
            warn!(task_id = task.id, error = %e, "failed to record execution log");
        }

        info!(
            task_id = task.id,
            success = result.success,
            status = ?result.status,
            elapsed_ms,
            "task executed"
        );
        result
    }
}

/// Outcome of [`TaskRegistry::bootstrap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub started: usize,
    /// Active tasks that could not be scheduled, with the reason.
    pub failed: Vec<(i64, String)>,
}

/// Owns the task id → live timer map.
///
/// Every mutation of one id goes through the map entry, so a concurrent
/// start and stop for the same task cannot leave a stray timer behind.
pub struct TaskRegistry {
    handles: DashMap<i64, Subscription>,
    clock: Arc<dyn ClockSource>,
    runner: Arc<TaskRunner>,
    bootstrapped: AtomicBool,
}

impl TaskRegistry {
    pub fn new(clock: Arc<dyn ClockSource>, runner: Arc<TaskRunner>) -> Self {
        Self {
            handles: DashMap::new(),
            clock,
            runner,
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn clock(&self) -> &dyn ClockSource {
        self.clock.as_ref()
    }

    /// Arm a timer for `task`, replacing any timer it already has.
    ///
    /// If the clock rejects the expression the task is left unscheduled and
    /// the error is returned.
    pub fn start_task(&self, task: &Task) -> Result<()> {
        let on_fire = self.fire_callback(task);
        match self.handles.entry(task.id) {
            Entry::Occupied(mut entry) => {
                entry.get().cancel();
                match self.clock.subscribe(&task.cron_expression, on_fire) {
                    Ok(sub) => {
                        entry.insert(sub);
                    }
                    Err(e) => {
                        entry.remove();
                        return Err(e);
                    }
                }
                info!(task_id = task.id, cron = %task.cron_expression, "task rescheduled");
            }
            Entry::Vacant(entry) => {
                let sub = self.clock.subscribe(&task.cron_expression, on_fire)?;
                entry.insert(sub);
                info!(task_id = task.id, cron = %task.cron_expression, "task scheduled");
            }
        }
        Ok(())
    }

    /// Cancel the timer for `id`. Returns false if there was none.
    ///
    /// Executions already in flight run to completion.
    pub fn stop_task(&self, id: i64) -> bool {
        match self.handles.remove(&id) {
            Some((_, sub)) => {
                sub.cancel();
                info!(task_id = id, "task unscheduled");
                true
            }
            None => false,
        }
    }

    /// Run `task` once right now, bypassing its timer.
    pub async fn execute_task(&self, task: &Task) -> ExecutionResult {
        self.runner.execute(task).await
    }

    /// Schedule every active task in `store`. Allowed once per registry.
    pub fn bootstrap(&self, store: &dyn TaskStore) -> Result<BootstrapReport> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyBootstrapped);
        }

        let tasks = match store.get_all_by_status(TaskStatus::Active) {
            Ok(tasks) => tasks,
            Err(e) => {
                self.bootstrapped.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let mut report = BootstrapReport::default();
        for task in &tasks {
            match self.start_task(task) {
                Ok(()) => report.started += 1,
                Err(e) => {
                    warn!(task_id = task.id, error = %e, "could not schedule task at startup");
                    report.failed.push((task.id, e.to_string()));
                }
            }
        }
        info!(
            started = report.started,
            failed = report.failed.len(),
            "registry bootstrapped"
        );
        Ok(report)
    }

    /// Ids that currently hold a live timer, ascending.
    pub fn running_task_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.handles.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_running(&self, id: i64) -> bool {
        self.handles.contains_key(&id)
    }

    /// Cancel every timer. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let ids: Vec<i64> = self.handles.iter().map(|entry| *entry.key()).collect();
        let stopped = ids.into_iter().filter(|id| self.stop_task(*id)).count();
        info!(stopped, "all timers stopped");
        stopped
    }

    /// Each firing spawns its own execution so a slow call never holds up the timer.
    fn fire_callback(&self, task: &Task) -> FireCallback {
        let runner = Arc::clone(&self.runner);
        let task = Arc::new(task.clone());
        Arc::new(move || {
            let runner = Arc::clone(&runner);
            let task = Arc::clone(&task);
            debug!(task_id = task.id, "task fired");
            tokio::spawn(async move {
                runner.execute(&task).await;
            });
        })
    }
}
