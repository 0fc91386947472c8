//! `homeclaw status`: show configuration, credentials and workspace state.
//!
//! Credentials are reported as present or missing, never by value.

use crate::context::AppContext;
use std::collections::BTreeSet;
use std::fmt::Write;

pub async fn run(ctx: &AppContext) -> Result<(), Box<dyn std::error::Error>> {
    let threads = match ctx.sessions().await {
        Ok(sessions) => sessions.thread_count().await.ok(),
        Err(_) => None,
    };
    print!("{}", render(ctx, threads));
    Ok(())
}

fn flag(on: bool) -> &'static str {
    if on { "enabled" } else { "disabled" }
}

/// Credential names the current configuration may need.
fn needed_keys(ctx: &AppContext) -> BTreeSet<String> {
    let config = &ctx.config;
    let mut keys = BTreeSet::new();

    if let Ok(selection) = config.resolve_model(&config.default_model)
        && let Some(env) = selection.api_key_env
    {
        keys.insert(env);
    }
    for entry in &config.model_list {
        if let Ok(selection) = config.resolve_model(&entry.name)
            && let Some(env) = selection.api_key_env
        {
            keys.insert(env);
        }
    }
    let search = &config.tools.web_search;
    if search.enabled && search.provider == "tavily" {
        keys.insert(search.api_key_env.clone());
    }
    for (_, channel) in config.channels.all() {
        if channel.enabled {
            keys.insert(channel.token_env.clone());
            if let Some(app) = &channel.app_token_env {
                keys.insert(app.clone());
            }
        }
    }
    keys
}

pub fn render(ctx: &AppContext, threads: Option<usize>) -> String {
    let config = &ctx.config;
    let mut out = String::new();

    let _ = writeln!(out, "HomeClaw Status");
    let _ = writeln!(out, "===============");
    let _ = writeln!(
        out,
        "  Config:      {} ({})",
        ctx.config_path.display(),
        if ctx.config_path.exists() { "found" } else { "missing, run `homeclaw onboard`" }
    );
    let _ = writeln!(out, "  Model:       {}", config.default_model);
    let _ = writeln!(out, "  Model list:  {} entries", config.model_list.len());
    let _ = writeln!(out, "  Temperature: {}", config.temperature);
    let _ = writeln!(out, "  Max tool iterations: {}", config.max_tool_iterations);

    let _ = writeln!(out, "\nWorkspace: {}", ctx.workspace_dir.display());
    for file in homeclaw_workspace::file_names() {
        let present = ctx.workspace_dir.join(file).exists();
        let _ = writeln!(out, "  {:<13} {}", file, if present { "ok" } else { "missing" });
    }

    let _ = writeln!(out, "\nCredentials ({}):", ctx.credentials_path.display());
    for key in needed_keys(ctx) {
        let state = if ctx.credentials.contains(&key) { "set" } else { "missing" };
        let _ = writeln!(out, "  {key:<22} {state}");
    }

    let _ = writeln!(out, "\nTools:");
    let _ = writeln!(
        out,
        "  web_search   {} ({})",
        flag(config.tools.web_search.enabled),
        config.tools.web_search.provider
    );
    let _ = writeln!(out, "  shell_exec   {}", flag(config.tools.shell_exec.enabled));

    let _ = writeln!(out, "\nChannels:");
    for (name, channel) in config.channels.all() {
        let allow = if channel.allowed_users.is_empty() {
            "everyone".to_string()
        } else {
            format!("{} allowed users", channel.allowed_users.len())
        };
        let _ = writeln!(out, "  {name:<9} {} ({allow})", flag(channel.enabled));
    }

    let _ = writeln!(
        out,
        "\nHeartbeat: {} (default interval {} min)",
        flag(config.heartbeat.enabled),
        config.heartbeat.interval_minutes
    );
    match threads {
        Some(n) => {
            let _ = writeln!(out, "Stored threads: {n}");
        }
        None => {
            let _ = writeln!(out, "Stored threads: unavailable");
        }
    }
    out
}
