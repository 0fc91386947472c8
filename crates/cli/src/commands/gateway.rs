//! `homeclaw gateway <platform|all>`: run chat gateways until Ctrl+C.
//!
//! Each gateway is its own task sharing one agent, one session store and
//! one channel registry (which also routes the agent's `send_message`).
//! With `all`, a gateway that fails to start is logged and the others keep
//! running; the heartbeat scheduler runs alongside when enabled.

use crate::context::AppContext;
use homeclaw_channels::Gateway;
use homeclaw_core::channel::MessageRouter;
use homeclaw_workflow::HeartbeatScheduler;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Which gateway(s) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    Telegram,
    Discord,
    Slack,
    All,
}

impl Platform {
    fn name(self) -> Option<&'static str> {
        match self {
            Platform::Telegram => Some("telegram"),
            Platform::Discord => Some("discord"),
            Platform::Slack => Some("slack"),
            Platform::All => None,
        }
    }
}

/// Channel names to start, or an error explaining why none can be.
pub fn select_channels(ctx: &AppContext, platform: Platform) -> Result<Vec<&'static str>, String> {
    let channels = &ctx.config.channels;
    match platform.name() {
        Some(name) => {
            let enabled = channels.get(name).is_some_and(|c| c.enabled);
            if enabled {
                Ok(vec![name])
            } else {
                Err(format!(
                    "The {name} channel is disabled. Set channels.{name}.enabled to true in {}.",
                    ctx.config_path.display()
                ))
            }
        }
        None => {
            let names: Vec<&'static str> = channels
                .all()
                .into_iter()
                .filter(|(_, c)| c.enabled)
                .map(|(name, _)| name)
                .collect();
            if names.is_empty() {
                Err(format!(
                    "No channels are enabled. Enable at least one under \"channels\" in {}.",
                    ctx.config_path.display()
                ))
            } else {
                Ok(names)
            }
        }
    }
}

pub async fn run(
    ctx: &AppContext,
    platform: Platform,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let wanted = select_channels(ctx, platform)?;

    let registry = ctx.channel_registry();
    if platform != Platform::All {
        // A single named gateway that cannot be built is a startup failure
        for name in &wanted {
            if registry.get(name).is_none() {
                let config = ctx.config.channels.get(name).ok_or("unknown channel")?;
                homeclaw_channels::build_channel(name, config, &ctx.credentials)?;
            }
        }
    }

    let workspace = ctx.workspace()?;
    let sessions = ctx.sessions().await?;
    let router: Arc<dyn MessageRouter> = registry.clone();
    let agent = ctx
        .factory(model)
        .build(&workspace, sessions.get_checkpointer(), Some(router))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut gateways = JoinSet::new();

    for name in &wanted {
        let Some(channel) = registry.get(name).cloned() else {
            continue;
        };
        let allowed = ctx
            .config
            .channels
            .get(name)
            .map(|c| c.allowed_users.clone())
            .unwrap_or_default();
        let gateway = Gateway::new(channel, agent.clone(), sessions.clone(), allowed);
        let shutdown = stop_rx.clone();
        let name = name.to_string();
        gateways.spawn(async move { (name, gateway.run(shutdown).await) });
    }

    let scheduler = if platform == Platform::All && ctx.config.heartbeat.enabled {
        let scheduler = Arc::new(HeartbeatScheduler::new(agent.clone(), ctx.config.heartbeat.interval_minutes));
        Some(scheduler.start(Some(ctx.workspace_dir.clone()), stop_rx.clone()))
    } else {
        None
    };

    if gateways.is_empty() && scheduler.is_none() {
        return Err("No gateway could be started; see the errors above.".into());
    }
    println!("HomeClaw gateway running ({}). Press Ctrl+C to stop.", wanted.join(", "));

    let mut failures = Vec::new();
    let mut running = gateways.len();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
            joined = gateways.join_next(), if running > 0 => {
                running -= 1;
                match joined {
                    Some(Ok((name, Ok(())))) => info!(channel = %name, "Gateway finished"),
                    Some(Ok((name, Err(e)))) => {
                        error!(channel = %name, error = %e, "Gateway failed");
                        failures.push(format!("{name}: {e}"));
                    }
                    Some(Err(e)) => error!(error = %e, "Gateway task panicked"),
                    None => running = 0,
                }
                if running == 0 && scheduler.is_none() {
                    break;
                }
            }
        }
    }

    let _ = stop_tx.send(true);
    while let Some(joined) = gateways.join_next().await {
        if let Ok((name, Err(e))) = joined {
            warn!(channel = %name, error = %e, "Gateway stopped with an error");
        }
    }
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    registry.stop_all().await;

    if platform != Platform::All && !failures.is_empty() {
        return Err(failures.join("; ").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeclaw_config::AppConfig;
    use std::path::PathBuf;

    fn ctx(config: AppConfig) -> AppContext {
        AppContext {
            workspace_dir: config.workspace_path(),
            config,
            config_path: PathBuf::from("/tmp/homeclaw-test/config.json"),
            credentials: Default::default(),
            credentials_path: PathBuf::from("/tmp/homeclaw-test/.env"),
        }
    }

    #[test]
    fn disabled_channel_named_explicitly_is_an_error() {
        let err = select_channels(&ctx(AppConfig::default()), Platform::Discord).unwrap_err();
        assert!(err.contains("discord channel is disabled"));
    }

    #[test]
    fn all_needs_at_least_one_enabled_channel() {
        assert!(select_channels(&ctx(AppConfig::default()), Platform::All).is_err());

        let mut config = AppConfig::default();
        config.channels.slack.enabled = true;
        config.channels.telegram.enabled = true;
        assert_eq!(
            select_channels(&ctx(config), Platform::All).unwrap(),
            vec!["telegram", "slack"]
        );
    }

    #[test]
    fn enabled_channel_is_selected() {
        let mut config = AppConfig::default();
        config.channels.telegram.enabled = true;
        assert_eq!(select_channels(&ctx(config), Platform::Telegram).unwrap(), vec!["telegram"]);
    }
}
