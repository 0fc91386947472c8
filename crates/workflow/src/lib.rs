//! Heartbeat scheduler: periodic tasks from `HEARTBEAT.md` dispatched to
//! the agent.
//!
//! Each task runs on its own schedule, either a fixed interval or a cron
//! expression evaluated in local time. Every firing is an independent agent
//! invocation on a fresh thread; its reply is logged and discarded (a task
//! that wants to reach the user does so through the `send_message` tool).
//!
//! Failures are isolated per task. A task whose previous firing is still
//! running is skipped for that tick rather than queued.

pub mod cron;

pub use cron::CronExpr;

use chrono::{DateTime, Local, Utc};
use homeclaw_core::agent::Agent;
use homeclaw_workspace::{ScheduleSpec, TaskEntry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Seconds between scheduler ticks.
pub const TICK_SECS: u64 = 60;

/// Build the instruction sent to the agent for one firing.
pub fn heartbeat_prompt(instruction: &str) -> String {
    format!("[HEARTBEAT] Please perform this periodic task: {instruction}")
}

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSchedule {
    Interval { minutes: u32 },
    Cron(CronExpr),
}

impl std::fmt::Display for TaskSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskSchedule::Interval { minutes } => write!(f, "every {minutes} min"),
            TaskSchedule::Cron(expr) => write!(f, "cron {expr}"),
        }
    }
}

impl TaskSchedule {
    /// Convert a parsed schedule prefix; `None` means the default interval.
    pub fn from_spec(spec: Option<&ScheduleSpec>, default_interval_minutes: u32) -> Result<Self, String> {
        match spec {
            None => Ok(TaskSchedule::Interval {
                minutes: default_interval_minutes.max(1),
            }),
            Some(ScheduleSpec::Every { minutes }) => Ok(TaskSchedule::Interval {
                minutes: (*minutes).max(1),
            }),
            Some(ScheduleSpec::Cron(expr)) => CronExpr::parse(expr).map(TaskSchedule::Cron),
        }
    }
}

/// A registered heartbeat task.
#[derive(Debug, Clone)]
pub struct HeartbeatTask {
    /// The task line as written in `HEARTBEAT.md`
    pub id: String,
    pub instruction: String,
    pub schedule: TaskSchedule,
    pub last_run: Option<DateTime<Utc>>,
    running: Arc<AtomicBool>,
}

impl HeartbeatTask {
    pub fn from_entry(entry: &TaskEntry, default_interval_minutes: u32) -> Result<Self, String> {
        Ok(Self {
            id: entry.to_line(),
            instruction: entry.instruction.clone(),
            schedule: TaskSchedule::from_spec(entry.schedule.as_ref(), default_interval_minutes)?,
            last_run: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Whether the previous firing is still in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_due(&self, now: &DateTime<Local>) -> bool {
        match &self.schedule {
            TaskSchedule::Interval { minutes } => match self.last_run {
                None => true,
                Some(last) => {
                    now.with_timezone(&Utc) - last >= chrono::Duration::minutes(i64::from(*minutes))
                }
            },
            TaskSchedule::Cron(expr) => {
                expr.matches(now)
                    && self
                        .last_run
                        .is_none_or(|last| last.timestamp().div_euclid(60) != now.timestamp().div_euclid(60))
            }
        }
    }
}

/// Runs heartbeat tasks against one agent.
pub struct HeartbeatScheduler {
    agent: Arc<dyn Agent>,
    default_interval_minutes: u32,
    tasks: RwLock<Vec<HeartbeatTask>>,
}

impl HeartbeatScheduler {
    pub fn new(agent: Arc<dyn Agent>, default_interval_minutes: u32) -> Self {
        Self {
            agent,
            default_interval_minutes: default_interval_minutes.max(1),
            tasks: RwLock::new(Vec::new()),
        }
    }

    /// Replace the registered task set with `entries`.
    ///
    /// Tasks that were already registered keep their run state. Entries with
    /// an invalid schedule are skipped; one message per rejected entry is
    /// returned.
    pub async fn register(&self, entries: &[TaskEntry]) -> Vec<String> {
        let mut errors = Vec::new();
        let mut tasks = self.tasks.write().await;
        let mut previous: HashMap<String, HeartbeatTask> =
            tasks.drain(..).map(|t| (t.id.clone(), t)).collect();

        for entry in entries {
            let id = entry.to_line();
            if let Some(existing) = previous.remove(&id) {
                tasks.push(existing);
                continue;
            }
            match HeartbeatTask::from_entry(entry, self.default_interval_minutes) {
                Ok(task) => {
                    info!(task = %task.instruction, schedule = %task.schedule, "Heartbeat task registered");
                    tasks.push(task);
                }
                Err(e) => {
                    warn!(task = %id, error = %e, "Heartbeat task rejected");
                    errors.push(format!("'{id}': {e}"));
                }
            }
        }
        errors
    }

    /// Re-read `HEARTBEAT.md`. On failure the current tasks stay registered.
    pub async fn reload_from_workspace(&self, workspace: &Path) -> Vec<String> {
        match homeclaw_workspace::list_tasks(workspace) {
            Ok(entries) => self.register(&entries).await,
            Err(e) => {
                warn!(error = %e, "Could not reload heartbeat tasks");
                vec![e.to_string()]
            }
        }
    }

    pub async fn list(&self) -> Vec<HeartbeatTask> {
        self.tasks.read().await.clone()
    }

    /// Fire every task that is due at `now`.
    ///
    /// Each firing runs on its own tokio task; the handles are returned so
    /// callers can wait for them. Agent errors are logged inside the
    /// firing and never reach the caller.
    pub async fn tick(&self, now: DateTime<Local>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let mut tasks = self.tasks.write().await;

        for task in tasks.iter_mut() {
            if !task.is_due(&now) {
                continue;
            }
            if task.running.swap(true, Ordering::SeqCst) {
                warn!(task = %task.instruction, "Previous heartbeat run still in progress, skipping");
                continue;
            }
            task.last_run = Some(now.with_timezone(&Utc));

            let agent = self.agent.clone();
            let running = task.running.clone();
            let instruction = task.instruction.clone();
            handles.push(tokio::spawn(async move {
                let thread_id = homeclaw_sessions::new_thread_id();
                info!(task = %instruction, thread_id = %thread_id, "Heartbeat task firing");
                match agent.invoke(&thread_id, &heartbeat_prompt(&instruction)).await {
                    Ok(reply) => {
                        debug!(task = %instruction, reply = %reply, "Heartbeat task completed");
                    }
                    Err(e) => {
                        error!(task = %instruction, error = %e, "Heartbeat task failed");
                    }
                }
                running.store(false, Ordering::SeqCst);
            }));
        }
        handles
    }

    /// Run the scheduler loop until `shutdown` flips to `true`: one tick
    /// immediately, then one every [`TICK_SECS`]. With a workspace, tasks
    /// are re-read from `HEARTBEAT.md` before every tick.
    pub fn start(
        self: Arc<Self>,
        workspace: Option<PathBuf>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                default_interval_minutes = self.default_interval_minutes,
                "Heartbeat scheduler started"
            );
            let mut interval = tokio::time::interval(Duration::from_secs(TICK_SECS));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Some(dir) = &workspace {
                            self.reload_from_workspace(dir).await;
                        }
                        let fired = self.tick(Local::now()).await;
                        if !fired.is_empty() {
                            debug!(count = fired.len(), "Heartbeat tasks dispatched");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Heartbeat scheduler stopping");
                            return;
                        }
                    }
                }
            }
        })
    }
}
