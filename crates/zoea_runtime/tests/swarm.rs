//! End-to-end swarm scenarios with scripted provider and MCP fakes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use zoea_core::{Account, MemoryRole, MemorySource, MysisState, Store};
use zoea_llms::{ChatMessage, ChatResponse, Provider, ProviderRegistry, ToolCall, ToolDef};
use zoea_mcp::{Caller, McpError, McpProxy, ToolCallOutcome, ToolContent, ToolInfo};
use zoea_runtime::{Commander, EventBus, SwarmConfig};

#[derive(Clone)]
enum Scripted {
    Text(&'static str),
    ToolCalls(Vec<(&'static str, &'static str, &'static str)>),
    Fail(&'static str),
}

/// Provider fake: pops scripted responses, then answers "ok" forever.
struct FakeProvider {
    script: Mutex<VecDeque<Scripted>>,
    delay: Duration,
    in_flight: AtomicBool,
    overlap: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl FakeProvider {
    fn scripted(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay: Duration::ZERO,
            in_flight: AtomicBool::new(false),
            overlap: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            delay,
            in_flight: AtomicBool::new(false),
            overlap: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::from(vec![Scripted::Fail(message); 1000])),
            delay: Duration::ZERO,
            in_flight: AtomicBool::new(false),
            overlap: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> zoea_llms::Result<String> {
        self.chat_with_tools(messages, &[]).await.map(|r| r.content)
    }

    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDef],
    ) -> zoea_llms::Result<ChatResponse> {
        // Turn mutual exclusion: no two provider calls for the same fake
        // may overlap (one fake per mysis in these tests).
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let item = self.script.lock().unwrap().pop_front();
        self.in_flight.store(false, Ordering::SeqCst);

        match item {
            Some(Scripted::Text(text)) => Ok(ChatResponse::text(text)),
            Some(Scripted::ToolCalls(calls)) => Ok(ChatResponse {
                content: String::new(),
                reasoning: String::new(),
                tool_calls: calls
                    .into_iter()
                    .map(|(id, name, args)| ToolCall::new(id, name, args))
                    .collect(),
            }),
            Some(Scripted::Fail(message)) => Err(zoea_llms::Error::Api {
                status: 500,
                message: message.to_string(),
            }),
            None => Ok(ChatResponse::text("ok")),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// MCP fake: one tool, scripted result texts.
struct FakeMcp {
    results: Mutex<VecDeque<Result<&'static str, McpError>>>,
}

impl FakeMcp {
    fn with_results(results: Vec<Result<&'static str, McpError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl McpProxy for FakeMcp {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        Ok(vec![ToolInfo {
            name: "get_status".to_string(),
            description: "Current status".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }])
    }

    async fn call_tool(
        &self,
        _caller: &Caller,
        _name: &str,
        _arguments: &str,
    ) -> Result<ToolCallOutcome, McpError> {
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(ToolCallOutcome {
                content: vec![ToolContent {
                    content_type: "text".to_string(),
                    text: text.to_string(),
                }],
                is_error: false,
            }),
            Some(Err(e)) => Err(e),
            None => Ok(ToolCallOutcome {
                content: vec![ToolContent {
                    content_type: "text".to_string(),
                    text: "done".to_string(),
                }],
                is_error: false,
            }),
        }
    }
}

fn fast_config() -> SwarmConfig {
    SwarmConfig::new()
        .with_turn_delay(Duration::from_millis(10))
        .with_stop_timeout(Duration::from_secs(5))
        .with_stop_all_timeout(Duration::from_secs(10))
}

fn commander_with(config: SwarmConfig) -> Arc<Commander> {
    let store = Arc::new(Store::open_memory().unwrap());
    let bus = Arc::new(EventBus::new());
    let providers = ProviderRegistry::new().register(
        "fake",
        zoea_llms::ProviderConfig::new("http://unused", "unused"),
    );
    Arc::new(Commander::new(store, bus, providers, config))
}

async fn wait_for_state(mysis: &zoea_runtime::Mysis, state: MysisState, within: Duration) {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if mysis.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "mysis {} did not reach {state:?} (currently {:?})",
        mysis.name(),
        mysis.state()
    );
}

// S1 — claim/release lifecycle.
#[tokio::test(flavor = "multi_thread")]
async fn claim_release_lifecycle() {
    let commander = commander_with(fast_config());
    let store = Arc::clone(commander.store());
    for name in ["user1", "user2", "user3"] {
        store.create_account(&Account::new(name, "pw")).unwrap();
    }
    let mysis = commander.create_mysis("m", "fake", None).unwrap();
    mysis.set_provider(FakeProvider::scripted(vec![]));

    mysis.set_current_account("user1").unwrap();
    assert_eq!(mysis.current_account(), "user1");
    assert!(store.get_account("user1").unwrap().in_use);

    mysis.set_current_account("user2").unwrap();
    assert_eq!(mysis.current_account(), "user2");
    assert!(!store.get_account("user1").unwrap().in_use);
    assert!(store.get_account("user2").unwrap().in_use);

    mysis.release_current_account();
    assert!(mysis.current_account().is_empty());
    for name in ["user1", "user2", "user3"] {
        assert!(!store.get_account(name).unwrap().in_use, "{name} still held");
    }

    // Releasing again is a no-op.
    mysis.release_current_account();
}

// S2 — broadcast excludes sender.
#[tokio::test(flavor = "multi_thread")]
async fn broadcast_excludes_sender() {
    let commander = commander_with(fast_config());
    let sender = commander.create_mysis("sender", "fake", None).unwrap();
    let receiver = commander.create_mysis("receiver", "fake", None).unwrap();
    sender.set_provider(FakeProvider::scripted(vec![]));
    receiver.set_provider(FakeProvider::scripted(vec![]));
    sender.start().await.unwrap();
    receiver.start().await.unwrap();

    commander.broadcast_from(sender.id(), "ping").await.unwrap();

    let store = commander.store();
    let received = store
        .get_memories(receiver.id())
        .unwrap()
        .into_iter()
        .find(|m| m.source == MemorySource::Broadcast)
        .expect("receiver should have the broadcast");
    assert_eq!(received.content, "ping");
    assert_eq!(received.sender_id, sender.id().as_str());
    assert_eq!(received.role, MemoryRole::User);

    let sender_broadcasts = store
        .get_memories(sender.id())
        .unwrap()
        .into_iter()
        .filter(|m| m.source == MemorySource::Broadcast)
        .count();
    assert_eq!(sender_broadcasts, 0);

    commander.stop_all().await;
}

// S4 — stop during an active LLM call.
#[tokio::test(flavor = "multi_thread")]
async fn stop_during_llm_call() {
    let commander = commander_with(fast_config());
    let mysis = commander.create_mysis("slowpoke", "fake", None).unwrap();
    let provider = FakeProvider::slow(Duration::from_millis(200));
    let closed = Arc::clone(&provider.closed);
    mysis.set_provider(provider);

    mysis.start().await.unwrap();
    // Let the run loop enter the provider call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    mysis.stop().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(mysis.state(), MysisState::Stopped);
    assert_eq!(mysis.last_error(), None);
    assert!(closed.load(Ordering::SeqCst), "provider close not invoked");
}

// S5 — stop always wins the race against a failing turn.
#[tokio::test(flavor = "multi_thread")]
async fn stop_race_beats_error() {
    let commander = commander_with(
        fast_config().with_turn_delay(Duration::from_millis(1)),
    );
    let mysis = commander.create_mysis("racer", "fake", None).unwrap();

    for _ in 0..100 {
        mysis.set_provider(FakeProvider::failing("context canceled"));
        mysis.start().await.unwrap();
        // A failing turn may already be in flight when stop arrives.
        tokio::task::yield_now().await;
        mysis.stop().await.unwrap();

        assert_eq!(mysis.state(), MysisState::Stopped);
        assert_eq!(mysis.last_error(), None);
    }
}

// S6 — a slow peer does not delay broadcast fan-out.
#[tokio::test(flavor = "multi_thread")]
async fn broadcast_not_blocked_by_slow_peer() {
    let commander = commander_with(fast_config());
    let slow = commander.create_mysis("slow", "fake", None).unwrap();
    let fast = commander.create_mysis("fast", "fake", None).unwrap();
    slow.set_provider(FakeProvider::slow(Duration::from_secs(2)));
    fast.set_provider(FakeProvider::scripted(vec![]));
    slow.start().await.unwrap();
    fast.start().await.unwrap();

    // Park the slow mysis inside a 2 s provider call.
    commander.send_message_async(slow.id(), "stay busy").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    commander.broadcast("hello").await.unwrap();
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "broadcast took {:?}",
        start.elapsed()
    );

    // Both recipients persisted the broadcast immediately.
    let store = commander.store();
    for mysis in [&slow, &fast] {
        let has_broadcast = store
            .get_memories(mysis.id())
            .unwrap()
            .iter()
            .any(|m| m.source == MemorySource::Broadcast && m.content == "hello");
        assert!(has_broadcast, "{} missing broadcast", mysis.name());
    }

    commander.stop_all().await;
}

// A full tool loop: call record persisted before results, in order.
#[tokio::test(flavor = "multi_thread")]
async fn tool_loop_persists_in_order() {
    let commander = commander_with(fast_config());
    let mysis = commander.create_mysis("worker", "fake", None).unwrap();
    mysis.set_provider(FakeProvider::scripted(vec![
        Scripted::ToolCalls(vec![("c1", "get_status", "{}")]),
        Scripted::Text("all done"),
    ]));
    mysis.set_mcp(FakeMcp::with_results(vec![Ok(r#"{"tick": 42}"#)]));

    mysis
        .send_message("check the status", MemorySource::Direct, "")
        .await
        .unwrap();
    // Idle path auto-starts; wait for the run loop to finish the turn.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let memories = commander.store().get_memories(mysis.id()).unwrap();
        if memories.iter().any(|m| m.content == "all done") {
            break;
        }
        assert!(Instant::now() < deadline, "turn never completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let memories = commander.store().get_memories(mysis.id()).unwrap();
    let call_idx = memories
        .iter()
        .position(|m| zoea_core::is_tool_call_content(&m.content))
        .expect("tool-call record missing");
    let result_idx = memories
        .iter()
        .position(|m| m.role == MemoryRole::Tool)
        .expect("tool result missing");
    assert!(call_idx < result_idx, "call record must precede its result");

    let (id, text) = zoea_core::parse_tool_result(&memories[result_idx].content).unwrap();
    assert_eq!(id, "c1");
    assert_eq!(text, r#"{"tick": 42}"#);

    // The activity tracker saw the tick.
    assert_eq!(mysis.last_server_tick(), 42);
    assert_eq!(commander.aggregate_tick(), 42);

    commander.stop_all().await;
}

// A tool timeout is turn-fatal: the mysis goes to errored and releases
// its account; restart recovers it.
#[tokio::test(flavor = "multi_thread")]
async fn tool_timeout_errors_mysis() {
    let commander = commander_with(fast_config());
    let store = Arc::clone(commander.store());
    store.create_account(&Account::new("user1", "pw")).unwrap();

    let mysis = commander.create_mysis("unlucky", "fake", None).unwrap();
    mysis.set_provider(FakeProvider::scripted(vec![Scripted::ToolCalls(vec![(
        "c1",
        "get_status",
        "{}",
    )])]));
    mysis.set_mcp(FakeMcp::with_results(vec![Err(McpError::Timeout)]));

    mysis.start().await.unwrap();
    wait_for_state(&mysis, MysisState::Errored, Duration::from_secs(5)).await;

    assert!(mysis.last_error().unwrap().contains("timed out"));
    assert!(mysis.current_account().is_empty());
    assert!(!store.get_account("user1").unwrap().in_use);

    // Errored → running via Start.
    mysis.set_provider(FakeProvider::scripted(vec![]));
    mysis.start().await.unwrap();
    assert_eq!(mysis.state(), MysisState::Running);
    commander.stop_all().await;
}

// Autonomy budget: synthetic-encouraged turns stop at the limit.
#[tokio::test(flavor = "multi_thread")]
async fn autonomy_budget_goes_idle() {
    let commander = commander_with(
        fast_config()
            .with_turn_delay(Duration::from_millis(5))
            .with_autonomous_turn_limit(2),
    );
    let mysis = commander.create_mysis("wanderer", "fake", None).unwrap();
    mysis.set_provider(FakeProvider::scripted(vec![]));

    mysis.start().await.unwrap();
    wait_for_state(&mysis, MysisState::Idle, Duration::from_secs(5)).await;

    let memories = commander.store().get_memories(mysis.id()).unwrap();
    let assistant_count = memories
        .iter()
        .filter(|m| m.role == MemoryRole::Assistant)
        .count();
    assert_eq!(assistant_count, 2);
    // Synthetic encouragements are never persisted.
    assert!(!memories.iter().any(|m| m.role == MemoryRole::User));
}

// Capacity bound.
#[tokio::test(flavor = "multi_thread")]
async fn capacity_bound() {
    let commander = commander_with(fast_config().with_max_myses(2));
    commander.create_mysis("a", "fake", None).unwrap();
    commander.create_mysis("b", "fake", None).unwrap();

    let err = commander.create_mysis("c", "fake", None).unwrap_err();
    assert!(err.to_string().contains("capacity"));
    assert_eq!(commander.mysis_count(), 2);
}

// Stop is idempotent; double start is rejected; stopped myses reject
// messages with an actionable hint.
#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_edges() {
    let commander = commander_with(fast_config());
    let mysis = commander.create_mysis("edge", "fake", None).unwrap();
    mysis.set_provider(FakeProvider::scripted(vec![]));

    mysis.start().await.unwrap();
    let err = mysis.start().await.unwrap_err();
    assert!(err.to_string().contains("already running"));

    mysis.stop().await.unwrap();
    mysis.stop().await.unwrap();
    assert_eq!(mysis.state(), MysisState::Stopped);

    let err = mysis
        .send_message("hello?", MemorySource::Direct, "")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stopped"));
    assert!(err.to_string().contains("start it again"));

    let err = mysis.queue_broadcast("hello?", "").await.unwrap_err();
    assert!(err.to_string().contains("stopped"));
}

// StopAll returns within its bound even with busy myses.
#[tokio::test(flavor = "multi_thread")]
async fn stop_all_progress() {
    let config = fast_config().with_stop_all_timeout(Duration::from_secs(3));
    let commander = commander_with(config);

    for name in ["a", "b", "c"] {
        let mysis = commander.create_mysis(name, "fake", None).unwrap();
        mysis.set_provider(FakeProvider::slow(Duration::from_secs(10)));
        mysis.start().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    commander.stop_all().await;
    assert!(
        start.elapsed() < Duration::from_secs(9),
        "stop_all took {:?}",
        start.elapsed()
    );
    for mysis in commander.myses() {
        assert_eq!(mysis.state(), MysisState::Stopped);
    }
}

// Delete stops the mysis, cascades memories and frees accounts.
#[tokio::test(flavor = "multi_thread")]
async fn delete_mysis_cleans_up() {
    let commander = commander_with(fast_config());
    let store = Arc::clone(commander.store());
    store.create_account(&Account::new("user1", "pw")).unwrap();

    let mysis = commander.create_mysis("doomed", "fake", None).unwrap();
    mysis.set_provider(FakeProvider::scripted(vec![]));
    mysis.start().await.unwrap();
    assert_eq!(mysis.current_account(), "user1");

    let id = mysis.id().clone();
    commander.delete_mysis(&id).await.unwrap();

    assert_eq!(commander.mysis_count(), 0);
    assert!(store.get_mysis(&id).is_err());
    assert_eq!(store.count_memories(&id).unwrap(), 0);
    assert!(!store.get_account("user1").unwrap().in_use);
}

// State counts tally the fleet.
#[tokio::test(flavor = "multi_thread")]
async fn state_counts() {
    let commander = commander_with(fast_config());
    let a = commander.create_mysis("a", "fake", None).unwrap();
    let _b = commander.create_mysis("b", "fake", None).unwrap();
    a.set_provider(FakeProvider::scripted(vec![]));
    a.start().await.unwrap();

    let counts = commander.get_state_counts();
    assert_eq!(counts.get(&MysisState::Running), Some(&1));
    assert_eq!(counts.get(&MysisState::Idle), Some(&1));

    commander.stop_all().await;
}

// Turns never overlap: the fake panics on concurrent entry while direct
// messages race the autonomous loop.
#[tokio::test(flavor = "multi_thread")]
async fn turn_mutual_exclusion() {
    let commander = commander_with(fast_config().with_turn_delay(Duration::from_millis(1)));
    let mysis = commander.create_mysis("serial", "fake", None).unwrap();
    let provider = FakeProvider::slow(Duration::from_millis(20));
    let overlap = Arc::clone(&provider.overlap);
    mysis.set_provider(provider);
    mysis.start().await.unwrap();

    for _ in 0..5 {
        commander.send_message_async(mysis.id(), "more work").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    commander.stop_all().await;
    assert!(!overlap.load(Ordering::SeqCst), "turns overlapped");
    assert_eq!(mysis.last_error(), None);
}
