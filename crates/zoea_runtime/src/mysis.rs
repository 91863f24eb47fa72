//! The mysis actor: state machine, lifecycle, and the autonomous run loop.
//!
//! Locking discipline: the state cell is a short-lived `std::sync::Mutex`
//! for CAS-style updates; the turn lock is a `tokio::sync::Mutex` held
//! across a whole turn. Neither is ever acquired while holding the other
//! is required, so Stop cannot deadlock against an in-flight turn.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use zoea_observability::mysis_span;

use zoea_core::{
    Memory, MemoryRole, MemorySource, MysisConfig, MysisId, MysisRecord, MysisState, Store,
    SwarmEvent,
};
use zoea_llms::Provider;
use zoea_mcp::{Caller, McpProxy};

use crate::accounts::AccountPool;
use crate::activity::{Activity, ActivityTracker};
use crate::completion::{CompletionHandle, WaitGroup};
use crate::config::SwarmConfig;
use crate::error::{Result, RuntimeError, TurnError};
use crate::event_bus::EventBus;
use crate::turn::{IncomingMessage, TurnEngine, TurnOutcome};

#[derive(Default)]
struct StateCell {
    state: MysisState,
    last_error: Option<String>,
    autonomous_turns: u32,
    nudge_fails: u32,
    current_account: String,
}

pub(crate) struct MysisInner {
    id: MysisId,
    name: String,
    store: Arc<Store>,
    bus: Arc<EventBus>,
    pool: AccountPool,
    wait_group: WaitGroup,
    config: SwarmConfig,

    cell: Mutex<StateCell>,
    /// Held for the duration of one turn; never required by the state cell.
    turn_lock: tokio::sync::Mutex<()>,
    provider: Mutex<Arc<dyn Provider>>,
    mcp: Mutex<Option<Arc<dyn McpProxy>>>,
    mysis_config: Mutex<MysisConfig>,
    activity: Arc<Mutex<ActivityTracker>>,
    cancel: Mutex<CancellationToken>,
    run_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// A single autonomous agent. Cheap to clone; all state lives behind the
/// shared inner.
#[derive(Clone)]
pub struct Mysis {
    inner: Arc<MysisInner>,
}

impl std::fmt::Debug for Mysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mysis")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Mysis {
    pub fn new(
        record: &MysisRecord,
        provider: Arc<dyn Provider>,
        store: Arc<Store>,
        bus: Arc<EventBus>,
        wait_group: WaitGroup,
        config: SwarmConfig,
    ) -> Self {
        let pool = AccountPool::new(Arc::clone(&store));
        Self {
            inner: Arc::new(MysisInner {
                id: record.id.clone(),
                name: record.name.clone(),
                store,
                bus,
                pool,
                wait_group,
                config,
                cell: Mutex::new(StateCell::default()),
                turn_lock: tokio::sync::Mutex::new(()),
                provider: Mutex::new(provider),
                mcp: Mutex::new(None),
                mysis_config: Mutex::new(record.config.clone()),
                activity: Arc::new(Mutex::new(ActivityTracker::new())),
                cancel: Mutex::new(CancellationToken::new()),
                run_handle: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn with_mcp(self, mcp: Arc<dyn McpProxy>) -> Self {
        self.set_mcp(mcp);
        self
    }

    pub fn id(&self) -> &MysisId {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> MysisState {
        self.inner.state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.cell.lock().expect("state lock poisoned").last_error.clone()
    }

    pub fn activity(&self) -> Activity {
        self.inner.activity.lock().expect("activity lock poisoned").current()
    }

    pub fn last_server_tick(&self) -> u64 {
        self.inner
            .activity
            .lock()
            .expect("activity lock poisoned")
            .last_server_tick()
    }

    /// Estimated wall-clock seconds per server tick.
    pub fn tick_duration_secs(&self) -> f64 {
        self.inner
            .activity
            .lock()
            .expect("activity lock poisoned")
            .tick_secs()
    }

    pub fn current_account(&self) -> String {
        self.inner
            .cell
            .lock()
            .expect("state lock poisoned")
            .current_account
            .clone()
    }

    pub fn nudge_fail_count(&self) -> u32 {
        self.inner.cell.lock().expect("state lock poisoned").nudge_fails
    }

    pub fn config(&self) -> MysisConfig {
        self.inner.mysis_config.lock().expect("config lock poisoned").clone()
    }

    /// Swap the provider; the next turn snapshots it.
    pub fn set_provider(&self, provider: Arc<dyn Provider>) {
        *self.inner.provider.lock().expect("provider lock poisoned") = provider;
    }

    /// Swap the MCP proxy; the next turn snapshots it.
    pub fn set_mcp(&self, mcp: Arc<dyn McpProxy>) {
        *self.inner.mcp.lock().expect("mcp lock poisoned") = Some(mcp);
    }

    pub fn set_config(&self, config: MysisConfig) {
        *self.inner.mysis_config.lock().expect("config lock poisoned") = config;
    }

    /// Record `username` as this mysis's account, claiming it in the store
    /// first and releasing any different previous holder. Empty input is a
    /// no-op.
    pub fn set_current_account(&self, username: &str) -> Result<()> {
        if username.is_empty() {
            return Ok(());
        }
        let previous = self.current_account();
        if previous == username {
            return Ok(());
        }
        // Store claim first, then the in-memory record; release runs in the
        // reverse order.
        self.inner.store.mark_account_in_use(username, &self.inner.id)?;
        self.inner
            .cell
            .lock()
            .expect("state lock poisoned")
            .current_account = username.to_string();
        if !previous.is_empty() {
            if let Err(e) = self.inner.pool.release(&previous) {
                warn!(account = %previous, error = %e, "failed to release previous account");
            }
        }
        Ok(())
    }

    /// Release the held account, if any. Idempotent.
    pub fn release_current_account(&self) {
        self.inner.release_current_account();
    }

    /// Start the run loop. Rejected when already running. The new state is
    /// persisted before any in-memory mutation, so a persistence failure
    /// leaves the mysis unchanged and no task spawned.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        // The run-handle slot doubles as the start serializer.
        let mut run_slot = inner.run_handle.lock().await;

        {
            let cell = inner.cell.lock().expect("state lock poisoned");
            if cell.state == MysisState::Running {
                return Err(RuntimeError::invalid_state(
                    MysisState::Running,
                    "it is already running",
                ));
            }
        }

        inner.store.update_mysis_state(&inner.id, MysisState::Running)?;

        // Drain any previous loop before spawning a new one.
        inner.cancel.lock().expect("cancel lock poisoned").cancel();
        if let Some(handle) = run_slot.take() {
            if tokio::time::timeout(inner.config.drain_timeout, handle)
                .await
                .is_err()
            {
                warn!(mysis = %inner.name, "previous run loop did not drain in time");
            }
        }

        let token = CancellationToken::new();
        *inner.cancel.lock().expect("cancel lock poisoned") = token.clone();

        let old = {
            let mut cell = inner.cell.lock().expect("state lock poisoned");
            let old = cell.state;
            cell.state = MysisState::Running;
            cell.last_error = None;
            cell.autonomous_turns = 0;
            old
        };
        inner.publish_state_change(old, MysisState::Running).await;

        // Claim a pooled account unless one is already held. Best effort:
        // the fleet may outnumber the pool.
        if self.current_account().is_empty() {
            match inner.pool.claim(&inner.id) {
                Ok(Some(account)) => {
                    inner.cell.lock().expect("state lock poisoned").current_account =
                        account.username;
                }
                Ok(None) => info!(mysis = %inner.name, "no pooled account available"),
                Err(e) => warn!(mysis = %inner.name, error = %e, "account claim failed"),
            }
        }

        let handle = inner.wait_group.register();
        let loop_inner = Arc::clone(inner);
        *run_slot = Some(tokio::spawn(run_loop(loop_inner, token, handle)));
        Ok(())
    }

    /// Cooperative stop. Idempotent once stopped. State goes to `stopped`
    /// (clearing any error) before waiting on the in-flight turn, so a turn
    /// failing with a cancellation can never overwrite it with `errored`.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let cell = inner.cell.lock().expect("state lock poisoned");
            if cell.state == MysisState::Stopped {
                return Ok(());
            }
        }

        inner.cancel.lock().expect("cancel lock poisoned").cancel();

        if let Err(e) = inner.store.update_mysis_state(&inner.id, MysisState::Stopped) {
            warn!(mysis = %inner.name, error = %e, "failed to persist stopped state");
        }
        let old = {
            let mut cell = inner.cell.lock().expect("state lock poisoned");
            let old = cell.state;
            cell.state = MysisState::Stopped;
            cell.last_error = None;
            old
        };
        inner.publish_state_change(old, MysisState::Stopped).await;

        // Bounded wait for the current turn to release the turn lock.
        match tokio::time::timeout(inner.config.stop_timeout, inner.turn_lock.lock()).await {
            Ok(guard) => drop(guard),
            Err(_) => warn!(mysis = %inner.name, "turn did not finish within stop timeout"),
        }

        inner.release_current_account();
        let provider = inner.provider.lock().expect("provider lock poisoned").clone();
        provider.close().await;

        Ok(())
    }

    /// Deliver a message. Accepted while idle or running; an idle mysis is
    /// auto-started and the run loop processes the persisted message. On a
    /// running mysis the turn is driven inline (use the Commander's async
    /// variant for fire-and-forget).
    pub async fn send_message(
        &self,
        content: &str,
        source: MemorySource,
        sender_id: &str,
    ) -> Result<()> {
        let inner = &self.inner;
        let state = self.state();
        match state {
            MysisState::Stopped | MysisState::Errored => Err(RuntimeError::invalid_state(
                state,
                "start it again before sending messages",
            )),
            MysisState::Idle => {
                if content.is_empty() {
                    return Ok(());
                }
                let memory = Memory::user(inner.id.clone(), source, content).with_sender(sender_id);
                inner.store.add_memory(&memory)?;
                if source == MemorySource::Direct {
                    inner.cell.lock().expect("state lock poisoned").autonomous_turns = 0;
                }
                inner.emit(SwarmEvent::message(MemoryRole::User, content));
                self.start().await
            }
            MysisState::Running => {
                if source == MemorySource::Direct {
                    inner.cell.lock().expect("state lock poisoned").autonomous_turns = 0;
                }
                let cancel = inner.cancel.lock().expect("cancel lock poisoned").clone();
                let engine = inner.snapshot_engine(cancel);

                let guard = inner.turn_lock.lock().await;
                if self.state() != MysisState::Running {
                    // Stop won while we waited; keep the message for later.
                    let memory =
                        Memory::user(inner.id.clone(), source, content).with_sender(sender_id);
                    inner.store.add_memory(&memory)?;
                    return Ok(());
                }
                let incoming = IncomingMessage {
                    content: content.to_string(),
                    source,
                    sender_id: sender_id.to_string(),
                };
                let span = mysis_span!(inner.id.as_str(), "turn");
                let result = engine.run(Some(incoming), true).instrument(span).await;
                drop(guard);

                match result {
                    Ok(_) => Ok(()),
                    Err(TurnError::Cancelled) => Ok(()),
                    Err(TurnError::Fatal(message)) => {
                        inner.set_error(message.clone()).await;
                        Err(RuntimeError::Llm(message))
                    }
                }
            }
        }
    }

    /// Persist a broadcast without waiting on any LLM work. Auto-starts an
    /// idle mysis; a running one picks the memory up on its next turn.
    pub async fn queue_broadcast(&self, content: &str, sender_id: &str) -> Result<()> {
        let inner = &self.inner;
        let state = self.state();
        match state {
            MysisState::Stopped | MysisState::Errored => Err(RuntimeError::invalid_state(
                state,
                "start it again before sending broadcasts",
            )),
            MysisState::Idle | MysisState::Running => {
                let memory = Memory::user(inner.id.clone(), MemorySource::Broadcast, content)
                    .with_sender(sender_id);
                inner.store.add_memory(&memory)?;
                inner.emit(SwarmEvent::broadcast(content));
                if state == MysisState::Idle && !content.is_empty() {
                    self.start().await?;
                }
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn set_error_for_test(&self, message: &str) {
        self.inner.set_error(message.to_string()).await;
    }
}

impl MysisInner {
    fn state(&self) -> MysisState {
        self.cell.lock().expect("state lock poisoned").state
    }

    fn emit(&self, event: SwarmEvent) {
        self.bus
            .publish(event.for_mysis(self.id.as_str(), &self.name));
    }

    async fn publish_state_change(&self, old: MysisState, new: MysisState) {
        self.bus
            .publish_blocking(
                SwarmEvent::state_changed(old, new).for_mysis(self.id.as_str(), &self.name),
                self.config.publish_timeout,
            )
            .await;
    }

    /// Mark the mysis errored. Returns without mutation when already
    /// stopped: Stop wins every race against a failing turn.
    async fn set_error(&self, message: String) {
        let old = {
            let mut cell = self.cell.lock().expect("state lock poisoned");
            if cell.state == MysisState::Stopped {
                return;
            }
            let old = cell.state;
            cell.state = MysisState::Errored;
            cell.last_error = Some(message.clone());
            cell.nudge_fails += 1;
            old
        };

        if let Err(e) = self.store.update_mysis_state(&self.id, MysisState::Errored) {
            warn!(mysis = %self.name, error = %e, "failed to persist errored state");
        }
        self.release_current_account();

        self.bus
            .publish_blocking(
                SwarmEvent::error(message).for_mysis(self.id.as_str(), &self.name),
                self.config.publish_timeout,
            )
            .await;
        self.publish_state_change(old, MysisState::Errored).await;
    }

    /// Autonomy budget exhausted: running → idle.
    async fn set_idle(&self) {
        {
            let mut cell = self.cell.lock().expect("state lock poisoned");
            if cell.state != MysisState::Running {
                return;
            }
            cell.state = MysisState::Idle;
            cell.autonomous_turns = 0;
        }
        if let Err(e) = self.store.update_mysis_state(&self.id, MysisState::Idle) {
            warn!(mysis = %self.name, error = %e, "failed to persist idle state");
        }
        self.publish_state_change(MysisState::Running, MysisState::Idle)
            .await;
    }

    fn release_current_account(&self) {
        let username = {
            let mut cell = self.cell.lock().expect("state lock poisoned");
            std::mem::take(&mut cell.current_account)
        };
        if username.is_empty() {
            return;
        }
        if let Err(e) = self.pool.release(&username) {
            warn!(account = %username, error = %e, "failed to release account");
        }
    }

    /// Snapshot the handles a turn needs. Provider and MCP swaps take
    /// effect on the next snapshot.
    fn snapshot_engine(&self, cancel: CancellationToken) -> TurnEngine {
        TurnEngine {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            provider: self.provider.lock().expect("provider lock poisoned").clone(),
            mcp: self.mcp.lock().expect("mcp lock poisoned").clone(),
            activity: Arc::clone(&self.activity),
            caller: Caller::new(self.id.as_str(), &self.name),
            cancel,
            config: self.config.clone(),
        }
    }
}

/// The autonomous loop: one task per running mysis. Exits when the state
/// leaves `running` and signals its completion handle on the way out.
async fn run_loop(inner: Arc<MysisInner>, cancel: CancellationToken, handle: CompletionHandle) {
    info!(mysis = %inner.name, "run loop started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.turn_delay) => {}
        }
        if inner.state() != MysisState::Running {
            break;
        }

        // Travel/cooldown gates the synthetic encouragement only; a real
        // prompt in the window still composes.
        let allow_synthetic = !inner
            .activity
            .lock()
            .expect("activity lock poisoned")
            .is_waiting();

        let engine = inner.snapshot_engine(cancel.clone());
        let result = {
            let _guard = inner.turn_lock.lock().await;
            if inner.state() != MysisState::Running {
                break;
            }
            let span = mysis_span!(inner.id.as_str(), "turn");
            engine.run(None, allow_synthetic).instrument(span).await
        };

        match result {
            Ok(TurnOutcome::Skipped) => continue,
            Ok(outcome) => {
                if matches!(outcome, TurnOutcome::Completed { .. }) {
                    inner.cell.lock().expect("state lock poisoned").nudge_fails = 0;
                }
                if outcome.added_synthetic() {
                    let exhausted = {
                        let mut cell = inner.cell.lock().expect("state lock poisoned");
                        cell.autonomous_turns += 1;
                        cell.autonomous_turns >= inner.config.autonomous_turn_limit
                    };
                    if exhausted {
                        info!(mysis = %inner.name, "autonomy budget exhausted, going idle");
                        inner.set_idle().await;
                        break;
                    }
                }
            }
            Err(TurnError::Cancelled) => break,
            Err(TurnError::Fatal(message)) => {
                warn!(mysis = %inner.name, error = %message, "turn failed");
                inner.set_error(message).await;
                break;
            }
        }
    }
    info!(mysis = %inner.name, "run loop exited");
    handle.done();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use zoea_llms::{ChatMessage, ChatResponse, ToolDef};

    struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn chat(&self, _messages: &[ChatMessage]) -> zoea_llms::Result<String> {
            Ok("ok".to_string())
        }

        async fn chat_with_tools(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDef],
        ) -> zoea_llms::Result<ChatResponse> {
            Ok(ChatResponse::text("ok"))
        }
    }

    fn test_mysis() -> Mysis {
        let store = Arc::new(Store::open_memory().unwrap());
        let record = MysisRecord::new("testling", MysisConfig::new("null"));
        store.create_mysis(&record).unwrap();
        Mysis::new(
            &record,
            Arc::new(NullProvider),
            store,
            Arc::new(EventBus::new()),
            WaitGroup::new(),
            SwarmConfig::new().with_turn_delay(Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let mysis = test_mysis();
        assert_eq!(mysis.state(), MysisState::Idle);
        assert_eq!(mysis.last_error(), None);
        assert!(mysis.current_account().is_empty());
    }

    #[tokio::test]
    async fn test_set_error_after_stop_is_ignored() {
        let mysis = test_mysis();
        mysis.start().await.unwrap();
        mysis.stop().await.unwrap();

        mysis.set_error_for_test("context canceled").await;
        assert_eq!(mysis.state(), MysisState::Stopped);
        assert_eq!(mysis.last_error(), None);
    }

    #[tokio::test]
    async fn test_stop_clears_earlier_error() {
        let mysis = test_mysis();
        mysis.start().await.unwrap();

        mysis.set_error_for_test("boom").await;
        assert_eq!(mysis.state(), MysisState::Errored);
        assert_eq!(mysis.last_error(), Some("boom".to_string()));

        mysis.stop().await.unwrap();
        assert_eq!(mysis.state(), MysisState::Stopped);
        assert_eq!(mysis.last_error(), None);
    }

    #[tokio::test]
    async fn test_errored_mysis_rejects_messages() {
        let mysis = test_mysis();
        mysis.start().await.unwrap();
        mysis.set_error_for_test("boom").await;

        let err = mysis
            .send_message("hi", MemorySource::Direct, "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("errored"));

        mysis.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_message_to_idle_mysis_is_noop() {
        let mysis = test_mysis();
        mysis
            .send_message("", MemorySource::Direct, "")
            .await
            .unwrap();
        // No auto-start on empty content.
        assert_eq!(mysis.state(), MysisState::Idle);
    }
}
