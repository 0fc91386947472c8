//! `homeclaw` / `homeclaw agent`: interactive or single-message chat.

use crate::context::AppContext;
use homeclaw_agent::reply_or_apology;
use homeclaw_channels::CliChannel;
use homeclaw_core::agent::Agent;
use homeclaw_core::channel::Channel;
use homeclaw_sessions::DEFAULT_THREAD_ID;
use std::io::Write;
use tracing::warn;

pub async fn run(
    ctx: &AppContext,
    message: Option<String>,
    thread: Option<String>,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = ctx.workspace()?;
    let sessions = ctx.sessions().await?;
    let agent = ctx
        .factory(model)
        .build(&workspace, sessions.get_checkpointer(), ctx.router())?;
    let thread_id = thread.unwrap_or_else(|| DEFAULT_THREAD_ID.to_string());

    if let Some(msg) = message {
        let reply = reply_or_apology(agent.invoke(&thread_id, &msg).await);
        println!("{reply}");
        return Ok(());
    }

    println!();
    println!("  HomeClaw — interactive mode");
    println!("  Model:   {}", agent.model());
    println!("  Tools:   {}", agent.tool_names().join(", "));
    println!("  Thread:  {thread_id}");
    println!();
    println!("  Type your message and press Enter. 'exit' or Ctrl+C quits.");
    println!();

    let channel = CliChannel::new();
    let mut rx = channel.start().await?;

    loop {
        print!("You > ");
        std::io::stdout().flush()?;

        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            next = rx.recv() => next,
        };

        match next {
            Some(Ok(inbound)) => {
                let reply = reply_or_apology(agent.invoke(&thread_id, &inbound.text).await);
                channel.send(&inbound.chat_id, &format!("\nHomeClaw > {reply}\n")).await?;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Terminal input failed");
                break;
            }
            None => break,
        }
    }

    println!("Goodbye!");
    Ok(())
}
