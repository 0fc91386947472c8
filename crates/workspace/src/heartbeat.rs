//! The task list in `HEARTBEAT.md`.
//!
//! Tasks are `- ` lines under `## Tasks`, up to the next `## ` heading. A
//! task may start with a schedule prefix:
//!
//! ```text
//! ## Tasks
//! - Check the weather and summarize it
//! - [every 30m] Look for new mail from the bank
//! - [cron 0 18 * * *] Summarize today's news headlines
//! ```
//!
//! Tasks without a prefix run on the configured default interval. Cron
//! fields are only counted here; the scheduler validates their values.

use crate::{HEARTBEAT_FILE, is_section_boundary, read_file, section_end, write_file};
use homeclaw_core::error::WorkspaceError;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

const TASKS_HEADING: &str = "## Tasks";
const PLACEHOLDER: &str = "(none configured)";

/// A schedule written in front of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// `[every 30m]`, `[every 2h]`, `[every 1d]`
    Every { minutes: u32 },
    /// `[cron M H DOM MON DOW]`, the five fields as written
    Cron(String),
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::Every { minutes } if minutes % 1440 == 0 => {
                write!(f, "every {}d", minutes / 1440)
            }
            ScheduleSpec::Every { minutes } if minutes % 60 == 0 => {
                write!(f, "every {}h", minutes / 60)
            }
            ScheduleSpec::Every { minutes } => write!(f, "every {minutes}m"),
            ScheduleSpec::Cron(expr) => write!(f, "cron {expr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    /// What the agent is asked to do
    pub instruction: String,
    /// `None` means the configured default interval
    pub schedule: Option<ScheduleSpec>,
}

impl TaskEntry {
    /// Parse one task line body (without the leading `- `).
    pub fn parse(body: &str) -> Result<Self, WorkspaceError> {
        let body = body.trim();
        let (schedule, instruction) = match body.strip_prefix('[') {
            Some(rest) => {
                let (spec, after) = rest.split_once(']').ok_or_else(|| {
                    WorkspaceError::InvalidTask(format!("unterminated schedule in '{body}'"))
                })?;
                (Some(parse_schedule(spec)?), after.trim())
            }
            None => (None, body),
        };

        if instruction.is_empty() {
            return Err(WorkspaceError::InvalidTask(format!(
                "task '{body}' has no instruction"
            )));
        }

        Ok(Self {
            instruction: instruction.to_string(),
            schedule,
        })
    }

    /// The task as it appears in the file body, without the leading `- `.
    pub fn to_line(&self) -> String {
        match &self.schedule {
            Some(schedule) => format!("[{schedule}] {}", self.instruction),
            None => self.instruction.clone(),
        }
    }
}

fn parse_schedule(spec: &str) -> Result<ScheduleSpec, WorkspaceError> {
    let spec = spec.trim();
    let invalid = |why: &str| WorkspaceError::InvalidTask(format!("schedule '[{spec}]': {why}"));

    if let Some(expr) = spec.strip_prefix("cron ") {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid("cron needs 5 fields (min hour dom month dow)"));
        }
        return Ok(ScheduleSpec::Cron(fields.join(" ")));
    }

    if let Some(every) = spec.strip_prefix("every ") {
        let every = every.trim();
        let Some((split, _)) = every.char_indices().last() else {
            return Err(invalid("missing interval"));
        };
        let (num, unit) = every.split_at(split);
        let n: u32 = num.parse().map_err(|_| invalid("expected a number like 30m or 2h"))?;
        let minutes = match unit {
            "m" => n,
            "h" => n.saturating_mul(60),
            "d" => n.saturating_mul(1440),
            _ => return Err(invalid("unit must be m, h or d")),
        };
        if minutes == 0 {
            return Err(invalid("interval must be positive"));
        }
        return Ok(ScheduleSpec::Every { minutes });
    }

    Err(invalid("expected 'every <n>m|h|d' or 'cron <expr>'"))
}

/// Task lines in `## Tasks`. Lines that fail to parse are logged and skipped.
pub fn parse_tasks(text: &str) -> Vec<TaskEntry> {
    let mut tasks = Vec::new();
    let mut in_tasks = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(TASKS_HEADING) {
            in_tasks = true;
            continue;
        }
        if !in_tasks {
            continue;
        }
        if is_section_boundary(trimmed) {
            break;
        }
        let Some(body) = trimmed.strip_prefix("- ") else {
            continue;
        };
        let body = body.trim();
        if body.is_empty() || body == PLACEHOLDER {
            continue;
        }
        match TaskEntry::parse(body) {
            Ok(entry) => tasks.push(entry),
            Err(e) => warn!(line = %body, error = %e, "Skipping malformed heartbeat task"),
        }
    }

    tasks
}

pub fn list_tasks(dir: &Path) -> Result<Vec<TaskEntry>, WorkspaceError> {
    Ok(parse_tasks(&read_file(&dir.join(HEARTBEAT_FILE))?))
}

/// Add a task line. Rejects malformed schedules and duplicate instructions.
pub fn add_task(dir: &Path, task: &str) -> Result<TaskEntry, WorkspaceError> {
    let task = task.trim();
    let body = task.strip_prefix("- ").unwrap_or(task);
    let entry = TaskEntry::parse(body)?;

    let path = dir.join(HEARTBEAT_FILE);
    let text = read_file(&path)?;

    if parse_tasks(&text)
        .iter()
        .any(|t| t.instruction == entry.instruction)
    {
        return Err(WorkspaceError::InvalidTask(format!(
            "'{}' is already scheduled",
            entry.instruction
        )));
    }

    let updated = crate::insert_into_section(
        &text,
        TASKS_HEADING,
        PLACEHOLDER,
        &format!("- {}", entry.to_line()),
    );
    write_file(&path, &updated)?;
    info!(task = %entry.instruction, "Heartbeat task added");
    Ok(entry)
}

/// Remove the task whose instruction or full line matches `task`.
///
/// Returns `false` when nothing matched. Emptying the list restores the
/// placeholder line.
pub fn remove_task(dir: &Path, task: &str) -> Result<bool, WorkspaceError> {
    let wanted = task.trim();
    let wanted = wanted.strip_prefix("- ").unwrap_or(wanted).trim();

    let path = dir.join(HEARTBEAT_FILE);
    let text = read_file(&path)?;
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    let Some(start) = lines.iter().position(|l| l.trim().starts_with(TASKS_HEADING)) else {
        return Ok(false);
    };
    let end = section_end(&lines, start);

    let hit = (start + 1..end).find(|&i| {
        let Some(body) = lines[i].trim().strip_prefix("- ") else {
            return false;
        };
        let body = body.trim();
        body == wanted
            || TaskEntry::parse(body).is_ok_and(|e| e.instruction == wanted)
    });

    let Some(index) = hit else {
        return Ok(false);
    };
    lines.remove(index);

    let mut updated = lines.join("\n") + "\n";
    if parse_tasks(&updated).is_empty() && !updated.contains(PLACEHOLDER) {
        lines.insert(start + 1, PLACEHOLDER.to_string());
        updated = lines.join("\n") + "\n";
    }

    write_file(&path, &updated)?;
    info!(task = %wanted, "Heartbeat task removed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensure;

    #[test]
    fn parse_ignores_placeholder_and_other_sections() {
        let text = "# Heartbeat\n\n## Tasks\n(none configured)\n- (none configured)\n- Check mail\n\n## Notes\n- not a task\n";
        let tasks = parse_tasks(text);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].instruction, "Check mail");
        assert_eq!(tasks[0].schedule, None);
    }

    #[test]
    fn top_level_heading_ends_the_task_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HEARTBEAT_FILE);
        std::fs::write(&path, "# Heartbeat\n\n## Tasks\n- Check mail\n\n# Archive\n- Old chore\n").unwrap();

        assert_eq!(parse_tasks(&std::fs::read_to_string(&path).unwrap()).len(), 1);

        add_task(dir.path(), "Water plants").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("## Tasks\n- Check mail\n- Water plants\n"));

        let tasks = list_tasks(dir.path()).unwrap();
        let names: Vec<&str> = tasks.iter().map(|t| t.instruction.as_str()).collect();
        assert_eq!(names, vec!["Check mail", "Water plants"]);
    }

    #[test]
    fn schedule_prefixes() {
        let text = "## Tasks\n- [every 30m] Poll feed\n- [every 2h] Stretch reminder\n- [cron 0 18 * * *] Summarize news\n";
        let tasks = parse_tasks(text);
        assert_eq!(tasks[0].schedule, Some(ScheduleSpec::Every { minutes: 30 }));
        assert_eq!(tasks[1].schedule, Some(ScheduleSpec::Every { minutes: 120 }));
        assert_eq!(tasks[2].schedule, Some(ScheduleSpec::Cron("0 18 * * *".into())));
        assert_eq!(tasks[2].instruction, "Summarize news");
        assert_eq!(tasks[1].to_line(), "[every 2h] Stretch reminder");
    }

    #[test]
    fn malformed_prefix_is_skipped() {
        let text = "## Tasks\n- [every soon] Nope\n- [cron 0 18] Too short\n- Fine\n";
        let tasks = parse_tasks(text);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].instruction, "Fine");
    }

    #[test]
    fn add_replaces_placeholder_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();

        add_task(dir.path(), "Check the weather").unwrap();
        add_task(dir.path(), "[cron 0 18 * * *] Summarize news").unwrap();

        let text = std::fs::read_to_string(dir.path().join(HEARTBEAT_FILE)).unwrap();
        assert!(!text.contains(PLACEHOLDER));
        assert!(text.contains("## Tasks\n- Check the weather\n- [cron 0 18 * * *] Summarize news\n"));
        assert_eq!(list_tasks(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn add_rejects_duplicates_and_bad_schedules() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();
        add_task(dir.path(), "Check the weather").unwrap();

        assert!(matches!(
            add_task(dir.path(), "- Check the weather"),
            Err(WorkspaceError::InvalidTask(_))
        ));
        assert!(add_task(dir.path(), "[every 0m] Spin").is_err());
        assert!(add_task(dir.path(), "[cron * *] Short").is_err());
        assert!(add_task(dir.path(), "   ").is_err());
    }

    #[test]
    fn remove_restores_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();
        add_task(dir.path(), "[every 2h] Stretch reminder").unwrap();
        add_task(dir.path(), "Check mail").unwrap();

        assert!(remove_task(dir.path(), "Stretch reminder").unwrap());
        assert!(!remove_task(dir.path(), "Stretch reminder").unwrap());
        assert!(remove_task(dir.path(), "- Check mail").unwrap());

        let text = std::fs::read_to_string(dir.path().join(HEARTBEAT_FILE)).unwrap();
        assert!(text.contains("## Tasks\n(none configured)"));
        assert!(list_tasks(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(list_tasks(dir.path()), Err(WorkspaceError::Missing(_))));
    }
}
