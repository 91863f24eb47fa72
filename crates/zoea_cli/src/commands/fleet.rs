//! Fleet management commands: create, delete, stop, list, configure.

use anyhow::Result;

use zoea_core::MysisState;

use super::App;
use crate::output;

pub fn create(app: App, name: &str, provider: &str, system: Option<&str>) -> Result<()> {
    let mysis = app.commander.create_mysis(name, provider, system)?;
    output::success(&format!("created mysis {} ({})", mysis.name(), mysis.id()));
    Ok(())
}

pub async fn delete(app: App, id_or_name: &str) -> Result<()> {
    let mysis = app.commander.resolve(id_or_name)?;
    let name = mysis.name().to_string();
    let id = mysis.id().clone();
    app.commander.delete_mysis(&id).await?;
    output::success(&format!("deleted mysis {name}"));
    Ok(())
}

pub async fn stop(app: App, id_or_name: &str) -> Result<()> {
    let mysis = app.commander.resolve(id_or_name)?;
    mysis.stop().await?;
    output::success(&format!("stopped mysis {}", mysis.name()));
    Ok(())
}

pub async fn stop_all(app: App) -> Result<()> {
    // Nothing is running inside this one-shot process; stop marks every
    // mysis and clears account claims left by a crashed fleet.
    for mysis in app.commander.myses() {
        if let Err(e) = mysis.stop().await {
            output::warning(&format!("stop {} failed: {e}", mysis.name()));
        }
    }
    app.commander.account_pool().release_all()?;
    output::success("fleet stopped, all accounts released");
    Ok(())
}

pub fn list(app: App) -> Result<()> {
    let records = app.store.list_myses()?;
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let memories = app.store.count_memories(&record.id).unwrap_or(0);
            vec![
                record.name.clone(),
                record.id.to_string(),
                record.config.provider.clone(),
                record.config.model.clone(),
                record.state.to_string(),
                memories.to_string(),
            ]
        })
        .collect();

    if rows.is_empty() {
        output::info("no myses; create one with `zoea create <name> --provider <provider>`");
        return Ok(());
    }
    output::table(
        &["name", "id", "provider", "model", "state", "memories"],
        rows,
    );

    let running = records
        .iter()
        .filter(|r| r.state == MysisState::Running)
        .count();
    output::info(&format!("{} myses, {} running", records.len(), running));
    Ok(())
}

pub fn configure(
    app: App,
    id_or_name: &str,
    provider: Option<&str>,
    model: Option<&str>,
    temperature: Option<f64>,
) -> Result<()> {
    let mysis = app.commander.resolve(id_or_name)?;
    let id = mysis.id().clone();
    app.commander
        .configure_mysis(&id, provider, model, temperature)?;

    let config = mysis.config();
    output::success(&format!(
        "configured {}: provider={} model={} temperature={}",
        mysis.name(),
        config.provider,
        config.model,
        config.temperature
    ));
    Ok(())
}
