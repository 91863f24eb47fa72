//! Fleet run mode: start myses, print events, stop everything on Ctrl-C.

use anyhow::Result;
use console::style;

use zoea_core::{EventKind, EventPayload, MysisState, SwarmEvent};

use super::App;
use crate::output;

/// Run the fleet (or a single mysis) until Ctrl-C. Subscribes to the event
/// bus and prints a line per event.
pub async fn run(app: App, only: Option<String>) -> Result<()> {
    // Crash recovery before anything claims.
    app.commander.account_pool().release_all()?;

    let mut subscription = app.commander.bus().subscribe(256);

    let targets = match &only {
        Some(id_or_name) => vec![app.commander.resolve(id_or_name)?],
        None => {
            // Explicitly stopped myses stay stopped; everything else runs.
            let stopped: Vec<String> = app
                .store
                .list_myses()?
                .into_iter()
                .filter(|r| r.state == MysisState::Stopped)
                .map(|r| r.id.to_string())
                .collect();
            app.commander
                .myses()
                .into_iter()
                .filter(|m| !stopped.contains(&m.id().to_string()))
                .collect()
        }
    };
    if targets.is_empty() {
        output::info("nothing to run; create a mysis first");
        return Ok(());
    }

    for mysis in &targets {
        mysis.start().await?;
        output::success(&format!("started {}", mysis.name()));
    }
    output::info("fleet running; Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = subscription.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    output::info("stopping fleet...");
    app.commander.stop_all().await;
    output::success("fleet stopped");
    Ok(())
}

fn print_event(event: &SwarmEvent) {
    if output::is_json() {
        println!("{}", serde_json::to_string(event).unwrap_or_default());
        return;
    }

    let who = event.mysis_name.as_deref().unwrap_or("-");
    let stamp = event.timestamp.format("%H:%M:%S");
    match (&event.kind, &event.payload) {
        (EventKind::MysisStateChanged, EventPayload::StateChange { old, new }) => {
            println!("{stamp} {} {old} → {new}", style(who).cyan());
        }
        (EventKind::MysisError, EventPayload::Error { error }) => {
            println!("{stamp} {} {}", style(who).cyan(), style(error).red());
        }
        (EventKind::MysisResponse, EventPayload::Message { content, .. }) => {
            println!("{stamp} {} {}", style(who).cyan(), content);
        }
        (EventKind::MysisMessage, EventPayload::Message { role, content }) => {
            let line = content.lines().next().unwrap_or("");
            println!(
                "{stamp} {} {} {}",
                style(who).cyan(),
                style(format!("[{}]", role.as_str())).dim(),
                style(line).dim()
            );
        }
        (EventKind::Broadcast, EventPayload::Message { content, .. }) => {
            println!(
                "{stamp} {} {} {}",
                style(who).cyan(),
                style("[broadcast]").magenta(),
                content
            );
        }
        (EventKind::RateLimit, EventPayload::ConfigChange { provider, model }) => {
            println!(
                "{stamp} {} rate limited by {provider} ({model})",
                style(who).cyan()
            );
        }
        (EventKind::NetworkLlm | EventKind::NetworkMcp | EventKind::NetworkIdle, _) => {
            // Spinner-grade noise; visible in --output json only.
        }
        (kind, _) => {
            println!("{stamp} {} {:?}", style(who).cyan(), kind);
        }
    }
}
