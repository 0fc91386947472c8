//! System prompt assembly from the workspace files.

use homeclaw_workspace::{
    HEARTBEAT_FILE, IDENTITY_FILE, MEMORY_FILE, SOUL_FILE, USER_FILE, WorkspaceContext,
};

const GUIDELINES: &str = "\
- Be helpful, concise, and proactive.
- Use the available tools to get things done (files, web search, shell commands).
- Keep track of context across the conversation.
- When you learn something worth keeping about the user, save it with the `remember` tool.
- Manage recurring work with the heartbeat task tools; a task may start with `[every 2h]` or `[cron 0 18 * * *]`.";

fn section_or<'a>(context: &'a WorkspaceContext, file: &str, fallback: &'a str) -> &'a str {
    context
        .get(file)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
}

/// Build the system prompt: persona opener, the workspace files in their
/// fixed order, the standing guidelines, and the workspace location.
pub fn build_system_prompt(context: &WorkspaceContext) -> String {
    let identity = section_or(context, IDENTITY_FILE, "A capable personal AI assistant.");
    let soul = section_or(context, SOUL_FILE, "Be helpful, honest, and harmless.");
    let user = section_or(context, USER_FILE, "No user profile configured yet.");
    let memory = section_or(context, MEMORY_FILE, "No persistent memories yet.");
    let tasks = section_or(context, HEARTBEAT_FILE, "No scheduled tasks yet.");

    format!(
        "You are HomeClaw, a personal AI assistant.\n\n\
         {identity}\n\n\
         {soul}\n\n\
         ## User Profile\n{user}\n\n\
         ## Persistent Memory\n{memory}\n\n\
         ## Scheduled Tasks\n{tasks}\n\n\
         ## Guidelines\n{GUIDELINES}\n\n\
         ## Workspace\n\
         Your workspace is at: {}\n\
         You can read and write files there freely.\n",
        context.root.display()
    )
}
