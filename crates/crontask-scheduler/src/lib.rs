//! `crontask-scheduler`: cron-driven HTTP task scheduler with SQLite persistence.
//!
//! # Overview
//!
//! Tasks are persisted to a SQLite `tasks` table. The [`registry::TaskRegistry`]
//! holds one live [`clock::Subscription`] per active task; every firing spawns an
//! independent execution that performs one bounded HTTP call through the
//! [`executor::HttpExecutor`] and appends a row to `task_logs`.
//!
//! # Components
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `store`    | Task definitions and their `active`/`paused` status     |
//! | `logs`     | Append-only execution history, paginated queries        |
//! | `clock`    | Cron expression validation and per-task firing timers   |
//! | `executor` | Single HTTP call with timeout and outcome classification |
//! | `registry` | task id → timer map, execution + logging pipeline       |
//! | `control`  | create / update / pause / resume / delete / test-now    |

pub mod clock;
pub mod control;
pub mod db;
pub mod error;
pub mod executor;
pub mod logs;
pub mod registry;
pub mod store;
pub mod types;

pub use clock::{ClockSource, CronClock, FireCallback, Subscription};
pub use control::{ActionOutcome, TaskService};
pub use error::{Result, SchedulerError};
pub use executor::{HttpCall, HttpExecutor, HttpOutcome};
pub use logs::{LogStore, SqliteLogStore};
pub use registry::{BootstrapReport, TaskRegistry, TaskRunner};
pub use store::{SqliteTaskStore, TaskStore};
pub use types::{
    ExecutionResult, HttpMethod, LogEntry, LogPage, LogStatus, NewLogEntry, Task, TaskAction,
    TaskDefinition, TaskPatch, TaskStatus,
};
