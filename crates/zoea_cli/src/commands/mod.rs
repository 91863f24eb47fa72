//! Command dispatch and shared wiring.

pub mod accounts;
pub mod fleet;
pub mod messaging;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use zoea_core::Store;
use zoea_llms::{ProviderConfig, ProviderRegistry};
use zoea_mcp::HttpMcpProxy;
use zoea_runtime::{Commander, EventBus, SwarmConfig};

use crate::cli::{Cli, Command};

/// Env prefixes mapped to registry names; a provider is registered when its
/// `<PREFIX>_API_KEY` is present.
const PROVIDER_PREFIXES: [(&str, &str); 4] = [
    ("anthropic", "ANTHROPIC"),
    ("openai", "OPENAI"),
    ("zai", "ZAI"),
    ("local", "LOCAL"),
];

pub(crate) struct App {
    pub commander: Arc<Commander>,
    pub store: Arc<Store>,
}

/// Open the store, build the provider registry from the environment, wire
/// the optional MCP proxy, and hydrate the fleet.
pub(crate) fn build(db: Option<PathBuf>) -> Result<App> {
    let path = match db {
        Some(path) => path,
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zoea")
            .join("zoea.db"),
    };
    let store = Arc::new(Store::open(&path).context("open swarm database")?);

    let mut providers = ProviderRegistry::new();
    for (name, prefix) in PROVIDER_PREFIXES {
        if let Ok(config) = ProviderConfig::from_env(prefix) {
            providers = providers.register(name, config);
        }
    }
    if providers.names().is_empty() {
        anyhow::bail!(
            "no providers configured; set ANTHROPIC_API_KEY, OPENAI_API_KEY, ZAI_API_KEY or LOCAL_API_KEY"
        );
    }

    let bus = Arc::new(EventBus::new());
    let commander = Arc::new(Commander::new(
        Arc::clone(&store),
        bus,
        providers,
        SwarmConfig::from_env(),
    ));

    if let Ok(endpoint) = std::env::var("ZOEA_MCP_ENDPOINT") {
        commander.set_mcp(Arc::new(HttpMcpProxy::new(endpoint)));
    }

    commander.load_myses().context("load fleet")?;
    Ok(App { commander, store })
}

pub async fn handle(cli: Cli) -> Result<()> {
    let db = cli.db.clone();
    match cli.command {
        Command::Create {
            name,
            provider,
            system,
        } => fleet::create(build(db)?, &name, &provider, system.as_deref()),
        Command::Delete { mysis } => fleet::delete(build(db)?, &mysis).await,
        Command::Start { mysis } => run::run(build(db)?, Some(mysis)).await,
        Command::Stop { mysis } => fleet::stop(build(db)?, &mysis).await,
        Command::List => fleet::list(build(db)?),
        Command::Configure {
            mysis,
            provider,
            model,
            temperature,
        } => fleet::configure(
            build(db)?,
            &mysis,
            provider.as_deref(),
            model.as_deref(),
            temperature,
        ),
        Command::Send {
            mysis,
            message,
            wait,
        } => messaging::send(build(db)?, &mysis, &message, wait).await,
        Command::Broadcast { message, from } => {
            messaging::broadcast(build(db)?, &message, from.as_deref()).await
        }
        Command::StopAll => fleet::stop_all(build(db)?).await,
        Command::Run => run::run(build(db)?, None).await,
        Command::Account { action } => accounts::handle(build(db)?, action),
    }
}
