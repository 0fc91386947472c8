//! `homeclaw cron`: manage and run heartbeat tasks from `HEARTBEAT.md`.

use crate::context::AppContext;
use homeclaw_workflow::{HeartbeatScheduler, HeartbeatTask};
use homeclaw_workspace::TaskEntry;
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// One line per task with its effective schedule; invalid schedules are
/// flagged instead of hidden.
pub fn render_tasks(entries: &[TaskEntry], default_interval_minutes: u32) -> String {
    if entries.is_empty() {
        return "No heartbeat tasks configured.\n\nAdd one with:\n  homeclaw cron add \"[every 30m] Check my inbox\"\n"
            .to_string();
    }

    let mut out = format!("Heartbeat tasks ({}):\n", entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match HeartbeatTask::from_entry(entry, default_interval_minutes) {
            Ok(task) => {
                let _ = writeln!(out, "  {:>2}. {:<22} {}", i + 1, task.schedule.to_string(), task.instruction);
            }
            Err(e) => {
                let _ = writeln!(out, "  {:>2}. {:<22} {} (invalid: {e})", i + 1, "-", entry.instruction);
            }
        }
    }
    out
}

pub fn list(ctx: &AppContext) -> Result<(), Box<dyn std::error::Error>> {
    ctx.workspace()?;
    let entries = homeclaw_workspace::list_tasks(&ctx.workspace_dir)?;
    print!("{}", render_tasks(&entries, ctx.config.heartbeat.interval_minutes));
    if !ctx.config.heartbeat.enabled {
        println!("\nHeartbeat is disabled; set heartbeat.enabled to true in {}.", ctx.config_path.display());
    }
    Ok(())
}

pub fn add(ctx: &AppContext, task: &str) -> Result<(), Box<dyn std::error::Error>> {
    ctx.workspace()?;
    let entry = homeclaw_workspace::add_task(&ctx.workspace_dir, task)?;
    println!("Added heartbeat task: {}", entry.to_line());
    Ok(())
}

pub fn remove(ctx: &AppContext, task: &str) -> Result<(), Box<dyn std::error::Error>> {
    ctx.workspace()?;
    if homeclaw_workspace::remove_task(&ctx.workspace_dir, task)? {
        println!("Removed heartbeat task: {task}");
        Ok(())
    } else {
        Err(format!("Task not found: {task}").into())
    }
}

/// Run the scheduler in the foreground until Ctrl+C.
pub async fn start(ctx: &AppContext, model: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if !ctx.config.heartbeat.enabled {
        return Err(format!(
            "Heartbeat is disabled. Set \"heartbeat\": {{ \"enabled\": true }} in {} and try again.",
            ctx.config_path.display()
        )
        .into());
    }

    let workspace = ctx.workspace()?;
    let sessions = ctx.sessions().await?;
    let agent = ctx
        .factory(model)
        .build(&workspace, sessions.get_checkpointer(), ctx.router())?;

    let scheduler = Arc::new(HeartbeatScheduler::new(agent, ctx.config.heartbeat.interval_minutes));
    for problem in scheduler.reload_from_workspace(&ctx.workspace_dir).await {
        warn!(problem = %problem, "Heartbeat task skipped");
    }
    let count = scheduler.list().await.len();
    println!("Heartbeat scheduler running with {count} task(s). Press Ctrl+C to stop.");

    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = scheduler.start(Some(ctx.workspace_dir.clone()), stop_rx);

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, stopping scheduler");
    let _ = stop_tx.send(true);
    handle.await?;
    Ok(())
}
