//! The assistant's workspace directory.
//!
//! A workspace holds five markdown files that shape the assistant, read in
//! this fixed order:
//!
//! 1. `IDENTITY.md`: who the assistant is
//! 2. `SOUL.md`: values and communication style
//! 3. `USER.md`: what the assistant knows about its user
//! 4. `MEMORY.md`: facts the agent has learned (agent-writable)
//! 5. `HEARTBEAT.md`: periodic tasks (agent-writable)
//!
//! plus `sessions/` for the checkpoint database and `data/` as scratch space.
//! [`ensure`] must run before [`read_all`]; a missing file is an error, not
//! a silent skip.

pub mod heartbeat;

use homeclaw_core::error::WorkspaceError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use heartbeat::{ScheduleSpec, TaskEntry, add_task, list_tasks, parse_tasks, remove_task};

pub const IDENTITY_FILE: &str = "IDENTITY.md";
pub const SOUL_FILE: &str = "SOUL.md";
pub const USER_FILE: &str = "USER.md";
pub const MEMORY_FILE: &str = "MEMORY.md";
pub const HEARTBEAT_FILE: &str = "HEARTBEAT.md";

pub const SESSIONS_DIR: &str = "sessions";
pub const DATA_DIR: &str = "data";

const IDENTITY_TEMPLATE: &str = "\
# Identity

You are HomeClaw, a personal AI assistant.
You are knowledgeable, helpful, and proactive.
You remember past conversations and learn from every interaction.
";

const SOUL_TEMPLATE: &str = "\
# Values & Style

## Values
- Be honest and transparent
- Be helpful without being overbearing
- Respect the user's privacy
- Say so when you don't know something

## Style
- Concise and clear
- Markdown formatting where it helps
- Ask a clarifying question when a request is ambiguous
- Offer actionable suggestions
";

const USER_TEMPLATE: &str = "\
# User Profile

## Name
(not configured)

## Preferences
(not configured)

## Notes
(none yet)
";

const MEMORY_TEMPLATE: &str = "\
# Persistent Memory

Learned knowledge and important facts. The assistant updates this file as
it learns.

## Facts
(none yet)

## Preferences
(none yet)
";

const HEARTBEAT_TEMPLATE: &str = "\
# Heartbeat Tasks

Periodic background tasks, one per line. Prefix a task with `[every 30m]`,
`[every 2h]` or `[cron M H DOM MON DOW]` to give it its own schedule.

## Tasks
(none configured)
";

/// `(file, heading, template)` in load order.
const FILES: [(&str, &str, &str); 5] = [
    (IDENTITY_FILE, "Identity", IDENTITY_TEMPLATE),
    (SOUL_FILE, "Soul", SOUL_TEMPLATE),
    (USER_FILE, "User Profile", USER_TEMPLATE),
    (MEMORY_FILE, "Persistent Memory", MEMORY_TEMPLATE),
    (HEARTBEAT_FILE, "Scheduled Tasks", HEARTBEAT_TEMPLATE),
];

/// Names of the workspace files in load order.
pub fn file_names() -> impl Iterator<Item = &'static str> {
    FILES.iter().map(|(file, _, _)| *file)
}

/// Create the workspace and whatever parts of it are missing.
///
/// Existing files are never touched. Returns the files that were created.
pub fn ensure(dir: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    for sub in [dir.to_path_buf(), dir.join(SESSIONS_DIR), dir.join(DATA_DIR)] {
        std::fs::create_dir_all(&sub).map_err(|e| WorkspaceError::io(&sub, e))?;
    }

    let mut created = Vec::new();
    for (file, _, template) in FILES {
        let path = dir.join(file);
        if path.exists() {
            continue;
        }
        std::fs::write(&path, template).map_err(|e| WorkspaceError::io(&path, e))?;
        debug!(file = %path.display(), "Created workspace file");
        created.push(path);
    }

    if !created.is_empty() {
        info!(workspace = %dir.display(), created = created.len(), "Workspace initialized");
    }
    Ok(created)
}

/// One workspace file as loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub file: &'static str,
    pub heading: &'static str,
    pub content: String,
}

/// Snapshot of every workspace file, in load order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceContext {
    pub root: PathBuf,
    pub sections: Vec<Section>,
}

impl WorkspaceContext {
    /// Content of one file, by name.
    pub fn get(&self, file: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.file == file)
            .map(|s| s.content.as_str())
    }

    /// All files concatenated verbatim, each introduced by a marker comment.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);
        for section in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("<!-- {} -->\n", section.file));
            out.push_str(section.content.trim_end());
            out.push('\n');
        }
        out
    }
}

/// Read all five workspace files.
pub fn read_all(dir: &Path) -> Result<WorkspaceContext, WorkspaceError> {
    let mut sections = Vec::with_capacity(FILES.len());
    for (file, heading, _) in FILES {
        let content = read_file(&dir.join(file))?;
        sections.push(Section { file, heading, content });
    }
    debug!(workspace = %dir.display(), "Workspace loaded");
    Ok(WorkspaceContext {
        root: dir.to_path_buf(),
        sections,
    })
}

/// Record a learned fact under `## Facts` in `MEMORY.md`.
pub fn append_memory(dir: &Path, note: &str) -> Result<(), WorkspaceError> {
    let note = note.trim();
    if note.is_empty() {
        return Err(WorkspaceError::InvalidTask("memory note is empty".into()));
    }
    let path = dir.join(MEMORY_FILE);
    let text = read_file(&path)?;
    let updated = insert_into_section(&text, "## Facts", "(none yet)", &format!("- {note}"));
    write_file(&path, &updated)?;
    info!("Memory updated");
    Ok(())
}

pub(crate) fn read_file(path: &Path) -> Result<String, WorkspaceError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => WorkspaceError::Missing(path.to_path_buf()),
        _ => WorkspaceError::io(path, e),
    })
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), WorkspaceError> {
    std::fs::write(path, content).map_err(|e| WorkspaceError::io(path, e))
}

/// A `# ` or `## ` heading ends the section above it.
pub(crate) fn is_section_boundary(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("# ") || line.starts_with("## ")
}

/// Index one past the last line of the section starting at `start`.
pub(crate) fn section_end(lines: &[String], start: usize) -> usize {
    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, l)| is_section_boundary(l))
        .map(|(i, _)| i)
        .unwrap_or(lines.len())
}

/// Put `entry` into the section under `heading`: over the placeholder when
/// present, otherwise after the section's last non-blank line. A missing
/// section is appended to the document.
pub(crate) fn insert_into_section(text: &str, heading: &str, placeholder: &str, entry: &str) -> String {
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    let Some(start) = lines.iter().position(|l| l.trim() == heading) else {
        let mut out = text.trim_end().to_string();
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!("{heading}\n{entry}\n"));
        return out;
    };

    let end = section_end(&lines, start);
    match (start + 1..end).find(|&i| lines[i].trim() == placeholder) {
        Some(i) => lines[i] = entry.to_string(),
        None => {
            let mut at = end;
            while at > start + 1 && lines[at - 1].trim().is_empty() {
                at -= 1;
            }
            lines.insert(at, entry.to_string());
        }
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_everything_once() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("workspace");

        let created = ensure(&ws).unwrap();
        assert_eq!(created.len(), 5);
        assert!(ws.join(SESSIONS_DIR).is_dir());
        assert!(ws.join(DATA_DIR).is_dir());

        assert!(ensure(&ws).unwrap().is_empty());
    }

    #[test]
    fn ensure_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(USER_FILE), "# Me\nI like tea.\n").unwrap();

        let created = ensure(dir.path()).unwrap();
        assert_eq!(created.len(), 4);
        assert!(!created.contains(&dir.path().join(USER_FILE)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(USER_FILE)).unwrap(),
            "# Me\nI like tea.\n"
        );
    }

    #[test]
    fn read_all_keeps_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();
        let ctx = read_all(dir.path()).unwrap();
        let files: Vec<&str> = ctx.sections.iter().map(|s| s.file).collect();
        assert_eq!(files, vec![IDENTITY_FILE, SOUL_FILE, USER_FILE, MEMORY_FILE, HEARTBEAT_FILE]);
        assert!(ctx.get(IDENTITY_FILE).unwrap().contains("HomeClaw"));
    }

    #[test]
    fn read_all_requires_every_file() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(SOUL_FILE)).unwrap();
        assert!(matches!(read_all(dir.path()), Err(WorkspaceError::Missing(p)) if p.ends_with(SOUL_FILE)));
    }

    #[test]
    fn render_is_verbatim_with_markers() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();
        std::fs::write(dir.path().join(USER_FILE), "Name: Ada\n").unwrap();
        let rendered = read_all(dir.path()).unwrap().render();
        assert!(rendered.contains("<!-- USER.md -->\nName: Ada\n"));
        let identity_at = rendered.find("<!-- IDENTITY.md -->").unwrap();
        let heartbeat_at = rendered.find("<!-- HEARTBEAT.md -->").unwrap();
        assert!(identity_at < heartbeat_at);
    }

    #[test]
    fn append_memory_replaces_placeholder_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();

        append_memory(dir.path(), "User's cat is called Miso").unwrap();
        append_memory(dir.path(), "User wakes at 6am").unwrap();

        let text = std::fs::read_to_string(dir.path().join(MEMORY_FILE)).unwrap();
        assert!(text.contains("## Facts\n- User's cat is called Miso\n- User wakes at 6am\n"));
        // The Preferences placeholder is untouched.
        assert!(text.contains("## Preferences\n(none yet)"));
    }

    #[test]
    fn insert_creates_missing_section() {
        let out = insert_into_section("# Notes\n", "## Facts", "(none yet)", "- x");
        assert_eq!(out, "# Notes\n\n## Facts\n- x\n");
    }
}
