//! End-to-end scenarios against a fully wired in-memory agent.

use async_trait::async_trait;
use dexto_config::{
    AgentConfig, ConfigChange, ConnectionMode, DatabaseConfig, McpServerConfig,
    ToolConfirmationMode,
};
use dexto_core::{CancelToken, SessionId};
use dexto_events::{AgentEvent, ApprovalStatus};
use dexto_llm::{MessagePayload, MessageRole, StreamEvent};
use dexto_mcp::{
    McpResult, McpService, McpServiceFactory, McpToolResult, PromptDescriptor, ResourceDescriptor,
    ServerNotice, ToolDescriptor,
};
use dexto_runtime::{DextoAgent, RunOutcome, RunState, RuntimeError};
use dexto_storage::{Database, MemoryDatabase, StorageFactory};
use dexto_test::{EventCollector, ScriptedLlmClient, ScriptedTurn, StaticApprovalHandler};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Fakes and wiring
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct TestServer {
    tools: Vec<String>,
    call_delay: Duration,
}

/// In-process MCP transport with per-server tools and call pacing.
#[derive(Default)]
struct TestMcpFactory {
    servers: std::sync::Mutex<HashMap<String, TestServer>>,
    connect_attempts: AtomicUsize,
}

impl TestMcpFactory {
    fn with_server(self, name: &str, tools: &[&str], call_delay: Duration) -> Self {
        self.servers.lock().unwrap().insert(
            name.to_owned(),
            TestServer {
                tools: tools.iter().map(|t| (*t).to_owned()).collect(),
                call_delay,
            },
        );
        self
    }

    fn attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

struct TestMcpService {
    server: TestServer,
}

#[async_trait]
impl McpService for TestMcpService {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        Ok(self
            .server
            .tools
            .iter()
            .map(|t| ToolDescriptor::new(t.clone()))
            .collect())
    }

    async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>> {
        Ok(Vec::new())
    }

    async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>> {
        Ok(Vec::new())
    }

    async fn call_tool(
        &self,
        tool: &str,
        args: serde_json::Value,
        cancel: &CancelToken,
    ) -> McpResult<McpToolResult> {
        if !self.server.call_delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(self.server.call_delay) => {},
                () = cancel.cancelled() => {
                    return Err(dexto_mcp::McpError::ToolAborted {
                        server: "test".to_owned(),
                    });
                },
            }
        }
        Ok(McpToolResult::text(format!("{tool} ran with {args}")))
    }

    async fn shutdown(&self) -> McpResult<()> {
        Ok(())
    }
}

#[async_trait]
impl McpServiceFactory for TestMcpFactory {
    async fn connect(
        &self,
        name: &str,
        _spec: &McpServerConfig,
        _notices: mpsc::UnboundedSender<ServerNotice>,
    ) -> McpResult<Arc<dyn McpService>> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let server = self
            .servers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| dexto_mcp::McpError::ConnectionFailed {
                server: name.to_owned(),
                message: "unknown test server".to_owned(),
            })?;
        Ok(Arc::new(TestMcpService { server }))
    }
}

fn stdio_spec() -> McpServerConfig {
    McpServerConfig::Stdio {
        command: "test-server".to_owned(),
        args: Vec::new(),
        env: HashMap::new(),
        timeout_ms: 30_000,
        connection_mode: ConnectionMode::Strict,
    }
}

fn base_config(mode: ToolConfirmationMode) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.agent_id = "test-agent".to_owned();
    config.tool_confirmation.mode = mode;
    config
}

/// Shared database that survives agent restarts, handed out through the
/// factory's sqlite builder slot.
fn persistent_storage(shared: &Arc<MemoryDatabase>) -> (StorageFactory, DatabaseConfig) {
    let shared = Arc::clone(shared);
    let factory = StorageFactory::new()
        .with_database_builder(move |_config| Ok(Arc::clone(&shared) as Arc<dyn Database>));
    (
        factory,
        DatabaseConfig::Sqlite {
            path: "shared-test-db".to_owned(),
        },
    )
}

struct Harness {
    agent: Arc<DextoAgent>,
    llm: Arc<ScriptedLlmClient>,
    events: EventCollector,
}

async fn start_agent(
    config: AgentConfig,
    scripts: Vec<ScriptedTurn>,
    mcp: TestMcpFactory,
) -> Harness {
    let llm = ScriptedLlmClient::new(scripts);
    let agent = DextoAgent::builder(config)
        .with_llm_client(Arc::clone(&llm) as Arc<dyn dexto_llm::LlmClient>)
        .with_mcp_factory(Arc::new(mcp))
        .with_workspace_root(std::env::temp_dir())
        .build()
        .unwrap();
    let events = EventCollector::subscribe(&agent.agent_event_bus());
    agent.start().await.unwrap();
    Harness { agent, llm, events }
}

fn response_of(outcome: &RunOutcome) -> &str {
    outcome.response().expect("expected a completed run")
}

// ---------------------------------------------------------------------------
// Scenario 1: happy path, no tools
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_streams_and_persists() {
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        vec![ScriptedTurn::text(&["Hello", " world", "!"])],
        TestMcpFactory::default(),
    )
    .await;

    let outcome = harness.agent.run("s1", "hi").await.unwrap();
    assert_eq!(response_of(&outcome), "Hello world!");

    let sessions = harness.agent.sessions().await.unwrap();
    let session = sessions.get(&SessionId::from("s1")).await.unwrap().unwrap();
    let history = session.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role(), MessageRole::User);
    assert_eq!(history[1].role(), MessageRole::Assistant);
    assert_eq!(session.run_state().await, RunState::Idle);

    // thinking → chunk×3 → response, in order.
    assert!(
        harness
            .events
            .wait_for("llmservice:response", 1, Duration::from_secs(2))
            .await
    );
    let topics: Vec<&str> = harness
        .events
        .topics()
        .into_iter()
        .filter(|t| t.starts_with("llmservice:"))
        .collect();
    assert_eq!(
        topics,
        vec![
            "llmservice:thinking",
            "llmservice:chunk",
            "llmservice:chunk",
            "llmservice:chunk",
            "llmservice:response",
        ]
    );
}

// ---------------------------------------------------------------------------
// Scenario 2: manual approval with remembered allow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_approval_remembers_allow() {
    let config = base_config(ToolConfirmationMode::Manual);
    let mcp = TestMcpFactory::default().with_server("idx", &["search"], Duration::ZERO);

    let scripts = vec![
        ScriptedTurn::tool_call("c1", "search", json!({"q": "X"})),
        ScriptedTurn::text(&["found X"]),
        ScriptedTurn::tool_call("c2", "search", json!({"q": "Y"})),
        ScriptedTurn::text(&["found Y"]),
    ];

    let llm = ScriptedLlmClient::new(scripts);
    let agent = DextoAgent::builder(config)
        .with_llm_client(Arc::clone(&llm) as Arc<dyn dexto_llm::LlmClient>)
        .with_mcp_factory(Arc::new(mcp))
        .with_workspace_root(std::env::temp_dir())
        .build()
        .unwrap();
    let handler = Arc::new(StaticApprovalHandler::new(
        dexto_approval::HandlerResponse::approve().remembered(),
    ));
    agent
        .set_approval_handler(Arc::clone(&handler) as Arc<dyn dexto_approval::ApprovalHandler>)
        .await;
    let events = EventCollector::subscribe(&agent.agent_event_bus());
    agent.start().await.unwrap();
    agent
        .connect_mcp_server("idx", stdio_spec())
        .await
        .unwrap();

    let first = agent.run("s1", "find X").await.unwrap();
    assert_eq!(response_of(&first), "found X");
    assert_eq!(handler.seen_count(), 1);
    assert_eq!(events.with_topic("dexto:approvalRequest").len(), 1);

    // Remembered: the second run asks no one.
    let second = agent.run("s1", "find Y").await.unwrap();
    assert_eq!(response_of(&second), "found Y");
    assert_eq!(handler.seen_count(), 1);
    assert_eq!(events.with_topic("dexto:approvalRequest").len(), 1);
}

// ---------------------------------------------------------------------------
// Scenario 3: cancellation mid-tool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_mid_tool_repairs_history() {
    let config = base_config(ToolConfirmationMode::AutoApprove);
    let mcp = TestMcpFactory::default().with_server("slow", &["dig"], Duration::from_secs(5));

    let harness = start_agent(
        config,
        vec![ScriptedTurn::tool_call("c1", "dig", json!({}))],
        mcp,
    )
    .await;
    harness
        .agent
        .connect_mcp_server("slow", stdio_spec())
        .await
        .unwrap();

    let agent = Arc::clone(&harness.agent);
    let run = tokio::spawn(async move { agent.run("s1", "dig deep").await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = tokio::time::Instant::now();
    harness.agent.cancel("s1").await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        outcome,
        RunOutcome::Completed {
            cancelled: true,
            ..
        }
    ));

    let sessions = harness.agent.sessions().await.unwrap();
    let session = sessions.get(&SessionId::from("s1")).await.unwrap().unwrap();
    assert_eq!(session.run_state().await, RunState::Idle);

    let history = session.history().await;
    // user, assistant(tool call), tool(cancelled), system(interrupted)
    let tool_message = history
        .iter()
        .find(|m| m.role() == MessageRole::Tool)
        .expect("cancelled tool result persisted");
    match &tool_message.payload {
        MessagePayload::Tool {
            result, is_error, ..
        } => {
            assert!(is_error);
            assert_eq!(result, &json!("Cancelled"));
        },
        other => panic!("unexpected payload: {other:?}"),
    }
    let last = history.last().unwrap();
    assert_eq!(last.role(), MessageRole::System);
    assert_eq!(
        last.text(),
        Some("Interrupted — what should Dexto do next?")
    );
}

// ---------------------------------------------------------------------------
// Scenario 4: queue coalescing and clear
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_messages_coalesce_after_completion() {
    let scripts = vec![
        ScriptedTurn::text(&["first ", "answer"]).with_delay(Duration::from_millis(60)),
        ScriptedTurn::text(&["second answer"]),
    ];
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        scripts,
        TestMcpFactory::default(),
    )
    .await;

    let agent = Arc::clone(&harness.agent);
    let first = tokio::spawn(async move { agent.run("s1", "A").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        harness.agent.run("s1", "B").await.unwrap(),
        RunOutcome::Queued { position: 1 }
    ));
    assert!(matches!(
        harness.agent.run("s1", "C").await.unwrap(),
        RunOutcome::Queued { position: 2 }
    ));

    // The original caller observes the drained follow-up run's result.
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(response_of(&outcome), "second answer");

    // The follow-up request carried the coalesced input, in order.
    let requests = harness.llm.recorded_requests();
    assert_eq!(requests.len(), 2);
    let followup_user = requests[1]
        .iter()
        .rev()
        .find(|m| m.role() == MessageRole::User)
        .unwrap();
    assert_eq!(followup_user.text(), Some("B\n\nC"));
    assert_eq!(
        harness
            .agent
            .queued_message_count("s1")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn cancel_then_clear_returns_queue_to_caller() {
    let scripts = vec![
        ScriptedTurn::text(&["a", "b", "c", "d", "e", "f"]).with_delay(Duration::from_millis(60)),
    ];
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        scripts,
        TestMcpFactory::default(),
    )
    .await;

    let agent = Arc::clone(&harness.agent);
    let first = tokio::spawn(async move { agent.run("s1", "A").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.agent.run("s1", "B").await.unwrap();
    harness.agent.run("s1", "C").await.unwrap();

    harness.agent.cancel("s1").await.unwrap();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Completed {
            cancelled: true,
            ..
        }
    ));

    let drained = harness.agent.clear_message_queue("s1").await.unwrap();
    let contents: Vec<&str> = drained.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["B", "C"]);

    // No second run was started.
    assert_eq!(harness.llm.calls(), 1);
}

// ---------------------------------------------------------------------------
// Scenario 5: MCP tool conflict
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflicting_mcp_tools_shadowed_first_wins() {
    let mcp = TestMcpFactory::default()
        .with_server("alpha", &["search"], Duration::ZERO)
        .with_server("beta", &["search", "fetch"], Duration::ZERO);
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        Vec::new(),
        mcp,
    )
    .await;

    harness
        .agent
        .connect_mcp_server("alpha", stdio_spec())
        .await
        .unwrap();
    harness
        .agent
        .connect_mcp_server("beta", stdio_spec())
        .await
        .unwrap();

    let tools = harness.agent.list_mcp_tools().await.unwrap();
    let visible_search: Vec<_> = tools
        .iter()
        .filter(|t| t.tool.name == "search" && !t.shadowed)
        .collect();
    assert_eq!(visible_search.len(), 1);
    assert_eq!(visible_search[0].server, "alpha");
    assert!(
        tools
            .iter()
            .any(|t| t.tool.name == "search" && t.shadowed && t.server == "beta")
    );
}

// ---------------------------------------------------------------------------
// Scenario 6: reload and switch_llm
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reload_with_llm_change_restarts_and_preserves_history() {
    let shared = Arc::new(MemoryDatabase::new());
    let (factory, db_config) = persistent_storage(&shared);
    let mut config = base_config(ToolConfirmationMode::AutoApprove);
    config.storage.database = db_config;

    let llm = ScriptedLlmClient::new(vec![ScriptedTurn::text(&["hello"])]);
    let agent = DextoAgent::builder(config.clone())
        .with_llm_client(Arc::clone(&llm) as Arc<dyn dexto_llm::LlmClient>)
        .with_mcp_factory(Arc::new(TestMcpFactory::default()))
        .with_storage_factory(factory)
        .with_workspace_root(std::env::temp_dir())
        .build()
        .unwrap();
    agent.start().await.unwrap();

    agent.run("s1", "hi").await.unwrap();

    let mut new_config = config;
    new_config.llm.provider = "provider-b".to_owned();
    new_config.llm.model = "m".to_owned();
    let report = agent.reload(Some(new_config)).await.unwrap();
    assert!(report.restarted);
    assert!(report.changes_applied.contains(&ConfigChange::Llm));

    // Session reloads lazily from the shared database with history intact.
    let sessions = agent.sessions().await.unwrap();
    let session = sessions.get(&SessionId::from("s1")).await.unwrap().unwrap();
    let history = session.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].text(), Some("hello"));
}

#[tokio::test]
async fn switch_llm_refuses_busy_run_unless_forced() {
    let scripts =
        vec![ScriptedTurn::text(&["a", "b", "c", "d", "e"]).with_delay(Duration::from_millis(80))];
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        scripts,
        TestMcpFactory::default(),
    )
    .await;

    let agent = Arc::clone(&harness.agent);
    let run = tokio::spawn(async move { agent.run("s1", "slow").await });
    tokio::time::sleep(Duration::from_millis(60)).await;

    let replacement = ScriptedLlmClient::new(vec![ScriptedTurn::text(&["new model"])]);

    let refused = harness
        .agent
        .switch_llm(
            Arc::clone(&replacement) as Arc<dyn dexto_llm::LlmClient>,
            None,
            false,
        )
        .await;
    assert!(matches!(refused, Err(RuntimeError::BusyRun(_))));

    harness
        .agent
        .switch_llm(
            Arc::clone(&replacement) as Arc<dyn dexto_llm::LlmClient>,
            None,
            true,
        )
        .await
        .unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Completed {
            cancelled: true,
            ..
        }
    ));

    // The next run uses the replacement client.
    let next = harness.agent.run("s1", "again").await.unwrap();
    assert_eq!(response_of(&next), "new model");
    assert_eq!(replacement.calls(), 1);
}

// ---------------------------------------------------------------------------
// Universal invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn startup_safety_manual_mode_without_handler() {
    let config = base_config(ToolConfirmationMode::Manual);
    let mut with_server = config;
    with_server
        .mcp_servers
        .insert("idx".to_owned(), stdio_spec());

    let mcp = Arc::new(TestMcpFactory::default().with_server("idx", &["search"], Duration::ZERO));
    let llm = ScriptedLlmClient::new(Vec::new());
    let agent = DextoAgent::builder(with_server)
        .with_llm_client(llm as Arc<dyn dexto_llm::LlmClient>)
        .with_mcp_factory(Arc::clone(&mcp) as Arc<dyn McpServiceFactory>)
        .build()
        .unwrap();

    let result = agent.start().await;
    assert!(matches!(result, Err(RuntimeError::Approval(_))));
    // Failed before any MCP connection was opened.
    assert_eq!(mcp.attempts(), 0);
    assert_eq!(agent.status().await, dexto_runtime::AgentStatus::Stopped);
}

#[tokio::test]
async fn tool_call_result_pairing_holds() {
    let mcp = TestMcpFactory::default().with_server("idx", &["search"], Duration::ZERO);
    let scripts = vec![
        ScriptedTurn::from_events(vec![
            StreamEvent::ToolCallStart {
                id: "c1".to_owned(),
                name: "search".to_owned(),
            },
            StreamEvent::ToolCallEnd {
                id: "c1".to_owned(),
            },
            StreamEvent::ToolCallStart {
                id: "c2".to_owned(),
                name: "search".to_owned(),
            },
            StreamEvent::ToolCallEnd {
                id: "c2".to_owned(),
            },
            StreamEvent::Done,
        ]),
        ScriptedTurn::text(&["done"]),
    ];
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        scripts,
        mcp,
    )
    .await;
    harness
        .agent
        .connect_mcp_server("idx", stdio_spec())
        .await
        .unwrap();

    harness.agent.run("s1", "go").await.unwrap();

    let sessions = harness.agent.sessions().await.unwrap();
    let session = sessions.get(&SessionId::from("s1")).await.unwrap().unwrap();
    let history = session.history().await;

    for (i, message) in history.iter().enumerate() {
        let calls = message.tool_calls();
        if calls.is_empty() {
            continue;
        }
        let following: Vec<&str> = history[i + 1..i + 1 + calls.len()]
            .iter()
            .map(|m| match &m.payload {
                MessagePayload::Tool { tool_call_id, .. } => tool_call_id.as_str(),
                other => panic!("expected tool message, got {other:?}"),
            })
            .collect();
        let mut expected: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        let mut actual = following.clone();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(expected, actual);
    }
}

#[tokio::test]
async fn session_table_stays_bounded() {
    let mut config = base_config(ToolConfirmationMode::AutoApprove);
    config.sessions.max_sessions = 2;

    let scripts = (0..4).map(|i| ScriptedTurn::text(&["ok", &i.to_string()])).collect();
    let harness = start_agent(config, scripts, TestMcpFactory::default()).await;

    for i in 0..4 {
        harness
            .agent
            .run(format!("s{i}"), "hi")
            .await
            .unwrap();
    }
    let sessions = harness.agent.sessions().await.unwrap();
    assert!(sessions.size() <= 2);
    // Nothing lost: every session remains listed in storage.
    assert_eq!(sessions.list().await.unwrap().len(), 4);
}

#[tokio::test]
async fn evicted_session_round_trips_identically() {
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        vec![ScriptedTurn::text(&["first"])],
        TestMcpFactory::default(),
    )
    .await;

    harness.agent.run("s1", "hello").await.unwrap();
    let sessions = harness.agent.sessions().await.unwrap();
    let before = sessions
        .get(&SessionId::from("s1"))
        .await
        .unwrap()
        .unwrap()
        .history()
        .await;

    // Evict by sweeping with a zero TTL, then lazily reload.
    assert_eq!(sessions.sweep_expired(Duration::ZERO).await, 1);
    assert_eq!(sessions.size(), 0);

    let after = sessions
        .get(&SessionId::from("s1"))
        .await
        .unwrap()
        .unwrap()
        .history()
        .await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn queue_overflow_is_a_typed_error() {
    let mut config = base_config(ToolConfirmationMode::AutoApprove);
    config.sessions.max_queued = 16;

    let scripts = vec![
        ScriptedTurn::text(&["a", "b", "c", "d", "e", "f", "g", "h"])
            .with_delay(Duration::from_millis(50)),
    ];
    let harness = start_agent(config, scripts, TestMcpFactory::default()).await;

    let agent = Arc::clone(&harness.agent);
    let run = tokio::spawn(async move { agent.run("s1", "A").await });
    tokio::time::sleep(Duration::from_millis(40)).await;

    for i in 0..16 {
        harness
            .agent
            .run("s1", format!("queued-{i}"))
            .await
            .unwrap();
    }
    let overflow = harness.agent.run("s1", "one too many").await;
    assert!(matches!(
        overflow,
        Err(RuntimeError::QueueFull { capacity: 16, .. })
    ));

    harness.agent.cancel("s1").await.unwrap();
    let _ = run.await.unwrap();
}

#[tokio::test]
async fn denied_tool_surfaces_as_error_result_and_run_continues() {
    let mut config = base_config(ToolConfirmationMode::AutoApprove);
    config
        .tool_confirmation
        .tool_policies
        .always_deny
        .push("search".to_owned());

    let mcp = TestMcpFactory::default().with_server("idx", &["search"], Duration::ZERO);
    let scripts = vec![
        ScriptedTurn::tool_call("c1", "search", json!({"q": "x"})),
        ScriptedTurn::text(&["I could not search."]),
    ];
    let harness = start_agent(config, scripts, mcp).await;
    harness
        .agent
        .connect_mcp_server("idx", stdio_spec())
        .await
        .unwrap();

    let outcome = harness.agent.run("s1", "look it up").await.unwrap();
    assert_eq!(response_of(&outcome), "I could not search.");

    let sessions = harness.agent.sessions().await.unwrap();
    let session = sessions.get(&SessionId::from("s1")).await.unwrap().unwrap();
    let history = session.history().await;
    let tool = history
        .iter()
        .find(|m| m.role() == MessageRole::Tool)
        .unwrap();
    match &tool.payload {
        MessagePayload::Tool {
            is_error, result, ..
        } => {
            assert!(is_error);
            assert!(result.as_str().unwrap().contains("denied"));
        },
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn approval_response_follows_request() {
    let config = base_config(ToolConfirmationMode::Manual);
    let mcp = TestMcpFactory::default().with_server("idx", &["search"], Duration::ZERO);
    let scripts = vec![
        ScriptedTurn::tool_call("c1", "search", json!({})),
        ScriptedTurn::text(&["done"]),
    ];

    let llm = ScriptedLlmClient::new(scripts);
    let agent = DextoAgent::builder(config)
        .with_llm_client(llm as Arc<dyn dexto_llm::LlmClient>)
        .with_mcp_factory(Arc::new(mcp))
        .build()
        .unwrap();
    agent
        .set_approval_handler(Arc::new(StaticApprovalHandler::approving()))
        .await;
    let events = EventCollector::subscribe(&agent.agent_event_bus());
    agent.start().await.unwrap();
    agent.connect_mcp_server("idx", stdio_spec()).await.unwrap();

    agent.run("s1", "go").await.unwrap();

    let topics = events.topics();
    let request_at = topics
        .iter()
        .position(|t| *t == "dexto:approvalRequest")
        .unwrap();
    let response_at = topics
        .iter()
        .position(|t| *t == "dexto:approvalResponse")
        .unwrap();
    assert!(request_at < response_at);

    let responses = events.with_topic("dexto:approvalResponse");
    match responses[0].as_ref() {
        AgentEvent::ApprovalResponse { status, .. } => {
            assert_eq!(*status, ApprovalStatus::Approved);
        },
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn stop_is_idempotent_and_cancels_runs() {
    let scripts =
        vec![ScriptedTurn::text(&["a", "b", "c", "d"]).with_delay(Duration::from_millis(80))];
    let harness = start_agent(
        base_config(ToolConfirmationMode::AutoApprove),
        scripts,
        TestMcpFactory::default(),
    )
    .await;

    let agent = Arc::clone(&harness.agent);
    let run = tokio::spawn(async move { agent.run("s1", "slow").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness.agent.stop().await.unwrap();
    harness.agent.stop().await.unwrap();
    assert_eq!(harness.agent.status().await, dexto_runtime::AgentStatus::Stopped);

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Completed {
            cancelled: true,
            ..
        }
    ));

    // Operations after stop are lifecycle errors.
    assert!(matches!(
        harness.agent.run("s1", "again").await,
        Err(RuntimeError::Lifecycle { .. })
    ));
}

#[tokio::test]
async fn max_iterations_truncates_with_system_notice() {
    let mut config = base_config(ToolConfirmationMode::AutoApprove);
    config.llm.max_iterations = 2;

    let mcp = TestMcpFactory::default().with_server("idx", &["search"], Duration::ZERO);
    // Every turn requests another tool call; the loop must stop at 2.
    let scripts = vec![
        ScriptedTurn::tool_call("c1", "search", json!({})),
        ScriptedTurn::tool_call("c2", "search", json!({})),
        ScriptedTurn::tool_call("c3", "search", json!({})),
    ];
    let harness = start_agent(config, scripts, mcp).await;
    harness
        .agent
        .connect_mcp_server("idx", stdio_spec())
        .await
        .unwrap();

    harness.agent.run("s1", "loop").await.unwrap();

    assert!(
        harness
            .events
            .wait_for("llmservice:error", 1, Duration::from_secs(2))
            .await
    );
    let errors = harness.events.with_topic("llmservice:error");
    match errors[0].as_ref() {
        AgentEvent::LlmError { code, .. } => assert_eq!(code, "MaxIterations"),
        other => panic!("unexpected event: {other:?}"),
    }

    let sessions = harness.agent.sessions().await.unwrap();
    let session = sessions.get(&SessionId::from("s1")).await.unwrap().unwrap();
    let history = session.history().await;
    let last = history.last().unwrap();
    assert_eq!(last.role(), MessageRole::System);
    assert!(last.text().unwrap().contains("truncated"));
    assert_eq!(harness.llm.calls(), 2);
}
