//! The Commander: fleet registry, lifecycle, messaging and shutdown.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use tracing::{error, info, warn};

use zoea_core::{MysisConfig, MysisId, MysisRecord, MysisState, Store, SwarmEvent};
use zoea_llms::ProviderRegistry;
use zoea_mcp::McpProxy;

use crate::accounts::AccountPool;
use crate::completion::WaitGroup;
use crate::config::SwarmConfig;
use crate::error::{Result, RuntimeError};
use crate::event_bus::EventBus;
use crate::mysis::Mysis;

/// Owns the fleet. Myses never move between Commanders.
pub struct Commander {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    providers: ProviderRegistry,
    config: SwarmConfig,
    pool: AccountPool,
    wait_group: WaitGroup,
    registry: RwLock<HashMap<MysisId, Mysis>>,
    mcp: std::sync::Mutex<Option<Arc<dyn McpProxy>>>,
}

impl Commander {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        providers: ProviderRegistry,
        config: SwarmConfig,
    ) -> Self {
        let pool = AccountPool::new(Arc::clone(&store));
        Self {
            store,
            bus,
            providers,
            config,
            pool,
            wait_group: WaitGroup::new(),
            registry: RwLock::new(HashMap::new()),
            mcp: std::sync::Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn account_pool(&self) -> &AccountPool {
        &self.pool
    }

    /// Wire an MCP proxy into the Commander and every registered mysis.
    pub fn set_mcp(&self, proxy: Arc<dyn McpProxy>) {
        *self.mcp.lock().expect("mcp lock poisoned") = Some(Arc::clone(&proxy));
        let myses = self.snapshot();
        for mysis in myses {
            mysis.set_mcp(Arc::clone(&proxy));
        }
    }

    /// Hydrate the registry from the store. Everything loads idle; records
    /// whose provider is not configured are skipped with a warning.
    pub fn load_myses(&self) -> Result<usize> {
        let records = self.store.list_myses()?;
        let mcp = self.mcp.lock().expect("mcp lock poisoned").clone();
        let mut loaded = 0;

        for record in records {
            if !self.providers.contains(&record.config.provider) {
                warn!(
                    mysis = %record.name,
                    provider = %record.config.provider,
                    "skipping mysis: provider not configured"
                );
                continue;
            }
            let provider = self
                .providers
                .create_with(
                    &record.config.provider,
                    &record.config.model,
                    record.config.temperature,
                )
                .map_err(|e| RuntimeError::ProviderNotFound(e.to_string()))?;

            if matches!(record.state, MysisState::Running | MysisState::Errored) {
                // Crash leftovers; an explicit stopped mark is kept.
                if let Err(e) = self.store.update_mysis_state(&record.id, MysisState::Idle) {
                    warn!(mysis = %record.name, error = %e, "failed to reset state to idle");
                }
            }

            let mut mysis = Mysis::new(
                &record,
                provider,
                Arc::clone(&self.store),
                Arc::clone(&self.bus),
                self.wait_group.clone(),
                self.config.clone(),
            );
            if let Some(proxy) = &mcp {
                mysis = mysis.with_mcp(Arc::clone(proxy));
            }

            self.registry
                .write()
                .expect("registry lock poisoned")
                .insert(record.id.clone(), mysis);
            loaded += 1;
        }

        info!(count = loaded, "fleet loaded");
        Ok(loaded)
    }

    /// Create a mysis. Rejected at capacity or for an unconfigured provider.
    pub fn create_mysis(
        &self,
        name: &str,
        provider_name: &str,
        system_prompt: Option<&str>,
    ) -> Result<Mysis> {
        {
            let registry = self.registry.read().expect("registry lock poisoned");
            if registry.len() >= self.config.max_myses {
                return Err(RuntimeError::AtCapacity {
                    max: self.config.max_myses,
                });
            }
        }
        if !self.providers.contains(provider_name) {
            return Err(RuntimeError::ProviderNotFound(provider_name.to_string()));
        }

        let model = self
            .providers
            .get(provider_name)
            .map(|c| c.model.clone())
            .unwrap_or_default();
        let config = MysisConfig::new(provider_name).with_model(model);
        let provider = self
            .providers
            .create_with(provider_name, &config.model, config.temperature)
            .map_err(|e| RuntimeError::ProviderNotFound(e.to_string()))?;

        let record = MysisRecord::new(name, config);
        self.store.create_mysis(&record)?;
        if let Some(prompt) = system_prompt {
            if !prompt.is_empty() {
                self.store
                    .add_memory(&zoea_core::Memory::system(record.id.clone(), prompt))?;
            }
        }

        let mut mysis = Mysis::new(
            &record,
            provider,
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            self.wait_group.clone(),
            self.config.clone(),
        );
        if let Some(proxy) = self.mcp.lock().expect("mcp lock poisoned").clone() {
            mysis = mysis.with_mcp(proxy);
        }

        {
            let mut registry = self.registry.write().expect("registry lock poisoned");
            // Re-check under the write lock; a concurrent create may have
            // filled the last slot.
            if registry.len() >= self.config.max_myses {
                if let Err(e) = self.store.delete_mysis(&record.id) {
                    warn!(error = %e, "failed to undo mysis creation at capacity");
                }
                return Err(RuntimeError::AtCapacity {
                    max: self.config.max_myses,
                });
            }
            registry.insert(record.id.clone(), mysis.clone());
        }

        self.bus
            .publish(SwarmEvent::mysis_created(record.id.as_str(), name));
        info!(mysis = %name, provider = %provider_name, "mysis created");
        Ok(mysis)
    }

    /// Remove a mysis: stop it, release its accounts, delete its record
    /// (memories cascade). Sub-step failures are logged and deletion
    /// continues best-effort.
    pub async fn delete_mysis(&self, id: &MysisId) -> Result<()> {
        let mysis = {
            let mut registry = self.registry.write().expect("registry lock poisoned");
            registry.remove(id)
        }
        .ok_or_else(|| RuntimeError::MysisNotFound(id.to_string()))?;

        if mysis.state() == MysisState::Running {
            if let Err(e) = mysis.stop().await {
                warn!(mysis = %mysis.name(), error = %e, "stop during delete failed");
            }
        }
        if let Err(e) = self.pool.release_by_mysis(id) {
            warn!(mysis = %mysis.name(), error = %e, "account release during delete failed");
        }
        if let Err(e) = self.store.delete_mysis(id) {
            error!(mysis = %mysis.name(), error = %e, "store delete failed");
        }

        self.bus
            .publish(SwarmEvent::mysis_deleted(id.as_str(), mysis.name()));
        info!(mysis = %mysis.name(), "mysis deleted");
        Ok(())
    }

    pub fn get(&self, id: &MysisId) -> Result<Mysis> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::MysisNotFound(id.to_string()))
    }

    /// Resolve a mysis by id or name.
    pub fn resolve(&self, id_or_name: &str) -> Result<Mysis> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry
            .values()
            .find(|m| m.id().as_str() == id_or_name || m.name() == id_or_name)
            .cloned()
            .ok_or_else(|| RuntimeError::MysisNotFound(id_or_name.to_string()))
    }

    fn snapshot(&self) -> Vec<Mysis> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn myses(&self) -> Vec<Mysis> {
        let mut myses = self.snapshot();
        myses.sort_by(|a, b| a.name().cmp(b.name()));
        myses
    }

    pub fn mysis_count(&self) -> usize {
        self.registry.read().expect("registry lock poisoned").len()
    }

    pub async fn start_mysis(&self, id: &MysisId) -> Result<()> {
        self.get(id)?.start().await
    }

    pub async fn stop_mysis(&self, id: &MysisId) -> Result<()> {
        self.get(id)?.stop().await
    }

    /// Reconfigure a mysis's provider/model/temperature; takes effect on
    /// its next turn.
    pub fn configure_mysis(
        &self,
        id: &MysisId,
        provider_name: Option<&str>,
        model: Option<&str>,
        temperature: Option<f64>,
    ) -> Result<()> {
        let mysis = self.get(id)?;
        let mut config = mysis.config();

        if let Some(provider_name) = provider_name {
            if !self.providers.contains(provider_name) {
                return Err(RuntimeError::ProviderNotFound(provider_name.to_string()));
            }
            config.provider = provider_name.to_string();
        }
        if let Some(model) = model {
            config.model = model.to_string();
        }
        if let Some(temperature) = temperature {
            config.temperature = temperature;
        }

        let provider = self
            .providers
            .create_with(&config.provider, &config.model, config.temperature)
            .map_err(|e| RuntimeError::ProviderNotFound(e.to_string()))?;

        self.store.update_mysis_config(id, &config)?;
        mysis.set_provider(provider);
        mysis.set_config(config.clone());

        self.bus.publish(
            SwarmEvent::config_changed(&config.provider, &config.model)
                .for_mysis(id.as_str(), mysis.name()),
        );
        Ok(())
    }

    /// Synchronous direct message: blocks until the turn completes.
    pub async fn send_message(&self, id: &MysisId, content: &str) -> Result<()> {
        self.get(id)?
            .send_message(content, zoea_core::MemorySource::Direct, "")
            .await
    }

    /// Fire-and-forget direct message.
    pub fn send_message_async(&self, id: &MysisId, content: &str) -> Result<()> {
        let mysis = self.get(id)?;
        let content = content.to_string();
        tokio::spawn(async move {
            if let Err(e) = mysis
                .send_message(&content, zoea_core::MemorySource::Direct, "")
                .await
            {
                warn!(mysis = %mysis.name(), error = %e, "async send failed");
            }
        });
        Ok(())
    }

    /// Commander broadcast to every eligible mysis.
    pub async fn broadcast(&self, content: &str) -> Result<()> {
        self.fan_out(content, None).await
    }

    /// Peer broadcast: delivered to everyone except the sender.
    pub async fn broadcast_from(&self, sender: &MysisId, content: &str) -> Result<()> {
        self.fan_out(content, Some(sender.clone())).await
    }

    /// Fire-and-forget commander broadcast.
    pub fn broadcast_async(self: &Arc<Self>, content: &str) {
        let commander = Arc::clone(self);
        let content = content.to_string();
        tokio::spawn(async move {
            if let Err(e) = commander.broadcast(&content).await {
                warn!(error = %e, "async broadcast failed");
            }
        });
    }

    /// Concurrent fan-out through `queue_broadcast`, which never blocks on
    /// LLM work; a slow mysis cannot delay the rest.
    async fn fan_out(&self, content: &str, exclude: Option<MysisId>) -> Result<()> {
        let sender_id = exclude.as_ref().map(|id| id.to_string()).unwrap_or_default();
        let recipients: Vec<Mysis> = self
            .snapshot()
            .into_iter()
            .filter(|m| Some(m.id()) != exclude.as_ref())
            .filter(|m| matches!(m.state(), MysisState::Idle | MysisState::Running))
            .collect();

        let results = join_all(recipients.iter().map(|mysis| {
            let sender_id = sender_id.clone();
            async move { (mysis.name().to_string(), mysis.queue_broadcast(content, &sender_id).await) }
        }))
        .await;

        for (name, result) in results {
            if let Err(e) = result {
                warn!(mysis = %name, error = %e, "broadcast delivery failed");
            }
        }
        Ok(())
    }

    /// Stop every running mysis and wait (bounded) for all run loops to
    /// exit. Logs and returns partial on timeout.
    pub async fn stop_all(&self) {
        let myses = self.snapshot();
        info!(count = myses.len(), "stopping fleet");

        join_all(myses.iter().map(|mysis| async move {
            if let Err(e) = mysis.stop().await {
                warn!(mysis = %mysis.name(), error = %e, "stop failed");
            }
        }))
        .await;

        if tokio::time::timeout(self.config.stop_all_timeout, self.wait_group.wait())
            .await
            .is_err()
        {
            warn!(
                outstanding = self.wait_group.count(),
                "stop-all timed out with run loops outstanding"
            );
        }
    }

    /// Maximum last-seen server tick across the fleet.
    pub fn aggregate_tick(&self) -> u64 {
        self.snapshot()
            .iter()
            .map(|m| m.last_server_tick())
            .max()
            .unwrap_or(0)
    }

    /// Per-state tallies for operator display.
    pub fn get_state_counts(&self) -> HashMap<MysisState, usize> {
        let mut counts = HashMap::new();
        for mysis in self.snapshot() {
            *counts.entry(mysis.state()).or_insert(0) += 1;
        }
        counts
    }
}
