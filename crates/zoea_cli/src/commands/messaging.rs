//! Direct messages and broadcasts.

use std::time::{Duration, Instant};

use anyhow::Result;

use zoea_core::MemoryRole;

use super::App;
use crate::output;

/// Send a direct message and wait (bounded) for the assistant's response.
pub async fn send(app: App, id_or_name: &str, message: &str, wait_secs: u64) -> Result<()> {
    let mysis = app.commander.resolve(id_or_name)?;
    let id = mysis.id().clone();
    let before = app.store.count_memories(&id)?;

    app.commander.send_message(&id, message).await?;

    // The idle path auto-starts and processes asynchronously; poll for a
    // fresh assistant memory either way.
    let deadline = Instant::now() + Duration::from_secs(wait_secs);
    loop {
        let memories = app.store.get_memories(&id)?;
        if let Some(response) = memories
            .iter()
            .skip(before as usize)
            .rev()
            .find(|m| m.role == MemoryRole::Assistant && !zoea_core::is_tool_call_content(&m.content))
        {
            output::info(&response.content);
            break;
        }
        if Instant::now() >= deadline {
            output::warning("no response within the wait window");
            break;
        }
        if let Some(error) = mysis.last_error() {
            output::error(&format!("mysis errored: {error}"));
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    app.commander.stop_all().await;
    Ok(())
}

/// Broadcast to the fleet (optionally as a mysis, which is then excluded).
pub async fn broadcast(app: App, message: &str, from: Option<&str>) -> Result<()> {
    match from {
        Some(sender) => {
            let sender = app.commander.resolve(sender)?;
            let id = sender.id().clone();
            app.commander.broadcast_from(&id, message).await?;
            output::success(&format!("broadcast sent from {}", sender.name()));
        }
        None => {
            app.commander.broadcast(message).await?;
            output::success("broadcast sent");
        }
    }
    app.commander.stop_all().await;
    Ok(())
}
