//! End-to-end conductor scenarios driven through the reducer with a
//! scripted provider and a channel-backed emitter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use vx_domain::config::Config;
use vx_domain::error::{Error, Result};
use vx_domain::turn::{ConversationTurn, ToolUseBlock};
use vx_gateway::conductor::Conductor;
use vx_gateway::state::AppState;
use vx_protocol::Envelope;
use vx_providers::chunk::stream_from_chunks;
use vx_providers::{GenerateRequest, ModelProvider, ModelResponse};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Scripted {
    full_text: String,
    chunks: Vec<String>,
    tool_calls: Vec<ToolUseBlock>,
}

impl Scripted {
    fn text(full_text: &str, chunks: &[&str]) -> std::result::Result<Self, String> {
        Ok(Self {
            full_text: full_text.to_owned(),
            chunks: chunks.iter().map(|c| (*c).to_owned()).collect(),
            tool_calls: vec![],
        })
    }

    fn tool_use(blocks: Vec<ToolUseBlock>) -> std::result::Result<Self, String> {
        Ok(Self {
            full_text: String::new(),
            chunks: vec![],
            tool_calls: blocks,
        })
    }
}

struct StubProvider {
    script: Mutex<VecDeque<std::result::Result<Scripted, String>>>,
    /// History snapshot observed at each call.
    histories: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl StubProvider {
    fn new(script: Vec<std::result::Result<Scripted, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            histories: Mutex::new(vec![]),
        })
    }
}

#[async_trait::async_trait]
impl ModelProvider for StubProvider {
    async fn generate_response(&self, req: GenerateRequest) -> Result<ModelResponse> {
        self.histories.lock().push(req.history);
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(scripted)) => Ok(ModelResponse {
                full_text: scripted.full_text,
                chunks: stream_from_chunks(scripted.chunks, 0),
                tool_calls: scripted.tool_calls,
            }),
            Some(Err(message)) => Err(Error::Provider {
                provider: "stub".into(),
                message,
            }),
            None => Err(Error::Provider {
                provider: "stub".into(),
                message: "script exhausted".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    state: AppState,
    conductor: Conductor,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

fn harness_with(provider: Arc<StubProvider>, config: Config) -> Harness {
    let state = AppState::new(Arc::new(config), provider);
    let conductor = Conductor::new(state.clone());
    let (tx, rx) = mpsc::channel(256);
    Harness {
        state,
        conductor,
        tx,
        rx,
    }
}

fn harness(provider: Arc<StubProvider>) -> Harness {
    harness_with(provider, Config::default())
}

fn inbound(id: &str, event_type: &str, session_id: &str, payload: Value) -> Envelope {
    Envelope {
        id: id.to_owned(),
        event_type: event_type.to_owned(),
        timestamp: "2026-01-01T00:00:00Z".to_owned(),
        session_id: session_id.to_owned(),
        payload: payload.as_object().expect("object payload").clone(),
    }
}

async fn recv(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an outbound envelope")
        .expect("emitter closed")
}

/// Name of the tool.call, when the envelope is one.
fn tool_name(env: &Envelope) -> Option<&str> {
    (env.event_type == "tool.call")
        .then(|| env.payload_str("name"))
        .flatten()
}

/// Parsed `arguments` of a tool.call envelope.
fn tool_args(env: &Envelope) -> Value {
    serde_json::from_str(env.payload_str("arguments").unwrap_or("{}")).unwrap()
}

fn is_idle_closer(env: &Envelope) -> bool {
    tool_name(env) == Some("convo.setState") && tool_args(env)["state"] == "idle"
}

/// Collect outbound envelopes until (and including) the idle closer.
async fn drain_until_idle(rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
    let mut out = Vec::new();
    loop {
        let env = recv(rx).await;
        let done = is_idle_closer(&env);
        out.push(env);
        if done {
            return out;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario A — simple turn, no tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn simple_turn_emits_the_full_sequence() {
    let provider = StubProvider::new(vec![Scripted::text("Hi there.", &["Hi", " there."])]);
    let mut h = harness(provider);

    h.conductor
        .handle_event(
            inbound("e1", "session.start", "S", json!({"sessionId": "S"})),
            &h.tx,
        )
        .await;
    let started = recv(&mut h.rx).await;
    assert_eq!(started.event_type, "session.started");
    assert_eq!(started.session_id, "S");
    assert_eq!(started.payload_str("sessionId"), Some("S"));

    h.conductor
        .handle_event(
            inbound(
                "e2",
                "user.audio.transcript.final",
                "S",
                json!({"text": "hello"}),
            ),
            &h.tx,
        )
        .await;

    let out = drain_until_idle(&mut h.rx).await;
    let shape: Vec<(String, Option<String>)> = out
        .iter()
        .map(|e| {
            (
                e.event_type.clone(),
                tool_name(e).map(str::to_owned),
            )
        })
        .collect();

    let expected: Vec<(String, Option<String>)> = vec![
        ("tool.call".into(), Some("convo.setState".into())),
        ("tool.call".into(), Some("convo.appendMessage".into())),
        ("assistant.speech.partial".into(), None),
        ("assistant.speech.partial".into(), None),
        ("assistant.speech.final".into(), None),
        ("tool.call".into(), Some("convo.appendMessage".into())),
        ("tool.call".into(), Some("convo.setState".into())),
        ("tool.call".into(), Some("tts.speak".into())),
        ("tool.call".into(), Some("convo.setState".into())),
    ];
    assert_eq!(shape, expected);

    // Payload-level checks.
    assert_eq!(tool_args(&out[0])["state"], "thinking");
    assert_eq!(tool_args(&out[1])["role"], "user");
    assert_eq!(tool_args(&out[1])["text"], "hello");
    assert_eq!(out[2].payload_str("text"), Some("Hi"));
    assert_eq!(out[3].payload_str("text"), Some("Hi there."));
    assert_eq!(out[4].payload_str("text"), Some("Hi there."));
    assert_eq!(tool_args(&out[5])["role"], "assistant");
    assert_eq!(tool_args(&out[5])["text"], "Hi there.");
    assert_eq!(tool_args(&out[6])["state"], "speaking");
    assert_eq!(tool_args(&out[7])["text"], "Hi there.");

    // Invariant: every partial is a prefix of the next and of the final.
    let final_text = out[4].payload_str("text").unwrap();
    assert!(final_text.starts_with(out[2].payload_str("text").unwrap()));
    assert!(final_text.starts_with(out[3].payload_str("text").unwrap()));

    // Every outbound envelope carries this session's id only.
    assert!(out.iter().all(|e| e.session_id == "S"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario B — tool bridging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_bridging_suspends_and_resumes_the_turn() {
    let provider = StubProvider::new(vec![
        Scripted::tool_use(vec![ToolUseBlock {
            id: "u1".into(),
            name: "agent.spawn".into(),
            input: json!({"prompt": "fix bug"}),
        }]),
        Scripted::text("Started.", &["Started."]),
    ]);
    let stub = provider.clone();
    let mut h = harness(provider);

    h.conductor
        .handle_event(
            inbound(
                "e1",
                "user.audio.transcript.final",
                "S",
                json!({"text": "spawn an agent"}),
            ),
            &h.tx,
        )
        .await;

    // Preamble: thinking + appendMessage, then the bridged call.
    let thinking = recv(&mut h.rx).await;
    assert_eq!(tool_args(&thinking)["state"], "thinking");
    let append = recv(&mut h.rx).await;
    assert_eq!(tool_name(&append), Some("convo.appendMessage"));

    let bridged = recv(&mut h.rx).await;
    assert_eq!(tool_name(&bridged), Some("agent.spawn"));
    assert_eq!(tool_args(&bridged)["prompt"], "fix bug");
    let call_id = bridged.payload_str("callId").unwrap().to_owned();
    // The client-facing call id is fresh, never the provider's block id.
    assert_ne!(call_id, "u1");

    // Suspended: nothing further until the result arrives.
    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.rx.recv())
            .await
            .is_err()
    );

    h.conductor
        .handle_event(
            inbound(
                "e2",
                "tool.result",
                "S",
                json!({"callId": call_id, "result": "{\"id\":\"A\"}", "error": null}),
            ),
            &h.tx,
        )
        .await;

    let out = drain_until_idle(&mut h.rx).await;
    let finals: Vec<&Envelope> = out
        .iter()
        .filter(|e| e.event_type == "assistant.speech.final")
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].payload_str("text"), Some("Started."));
    assert!(is_idle_closer(out.last().unwrap()));

    // The second provider call saw the bridged turns with the provider's
    // tool_use id restored.
    let histories = stub.histories.lock();
    assert_eq!(histories.len(), 2);
    let second = &histories[1];
    assert!(matches!(
        &second[second.len() - 2],
        ConversationTurn::AssistantToolUse { blocks } if blocks[0].id == "u1"
    ));
    match &second[second.len() - 1] {
        ConversationTurn::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            assert_eq!(tool_use_id, "u1");
            assert_eq!(content, "{\"id\":\"A\"}");
            assert!(!is_error);
        }
        other => panic!("expected tool result turn, got {other:?}"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario F — provider failure
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn provider_failure_reports_and_returns_to_idle() {
    let provider = StubProvider::new(vec![Err("upstream exploded".into())]);
    let mut h = harness(provider);

    h.conductor
        .handle_event(
            inbound(
                "e1",
                "user.audio.transcript.final",
                "S",
                json!({"text": "hello"}),
            ),
            &h.tx,
        )
        .await;

    let out = drain_until_idle(&mut h.rx).await;
    assert!(out.iter().all(|e| e.event_type != "assistant.speech.final"));

    let error = out
        .iter()
        .find(|e| e.event_type == "error")
        .expect("an error envelope");
    assert_eq!(error.payload_str("code"), Some("model_provider_failed"));
    assert!(is_idle_closer(out.last().unwrap()));

    // History keeps the user turn and gains no assistant turn. The
    // errored turn's pending calls were cleared; only the recovery idle
    // closer remains pending (it is a tool.call like any other).
    let session = h.state.sessions.get("S").unwrap();
    let state = session.lock();
    let history = state.history_snapshot();
    assert!(matches!(&history[..], [ConversationTurn::User { content }] if content == "hello"));
    assert_eq!(state.pending_count(), 1);
    let closer = state.pending_calls().next().unwrap();
    assert_eq!(closer.tool_name, "convo.setState");
    assert!(closer.provider_tool_use_id.is_none());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dedup, correlation, validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn duplicate_event_ids_have_no_side_effects() {
    let provider = StubProvider::new(vec![]);
    let mut h = harness(provider);

    let start = inbound("e3", "session.start", "S", json!({"sessionId": "S"}));
    h.conductor.handle_event(start.clone(), &h.tx).await;
    // Redelivery after a reconnect: same id, same content.
    h.conductor.handle_event(start, &h.tx).await;
    h.conductor
        .handle_event(
            inbound("e4", "session.start", "S", json!({"sessionId": "S"})),
            &h.tx,
        )
        .await;

    assert_eq!(recv(&mut h.rx).await.event_type, "session.started");
    assert_eq!(recv(&mut h.rx).await.event_type, "session.started");
    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.rx.recv())
            .await
            .is_err(),
        "duplicate produced a third emission"
    );
}

#[tokio::test]
async fn unknown_tool_result_yields_no_pending_tool_call() {
    let provider = StubProvider::new(vec![]);
    let mut h = harness(provider);

    h.conductor
        .handle_event(
            inbound(
                "e1",
                "tool.result",
                "S",
                json!({"callId": "ghost", "result": "{}", "error": null}),
            ),
            &h.tx,
        )
        .await;

    let out = recv(&mut h.rx).await;
    assert_eq!(out.event_type, "error");
    assert_eq!(out.payload_str("code"), Some("no_pending_tool_call"));
}

#[tokio::test]
async fn empty_transcript_is_rejected() {
    let provider = StubProvider::new(vec![]);
    let mut h = harness(provider);

    h.conductor
        .handle_event(
            inbound("e1", "user.audio.transcript.final", "S", json!({"text": ""})),
            &h.tx,
        )
        .await;

    let out = recv(&mut h.rx).await;
    assert_eq!(out.event_type, "error");
    assert_eq!(out.payload_str("code"), Some("invalid_transcript"));
}

#[tokio::test]
async fn transcript_partials_and_unknown_types_are_ignored() {
    let provider = StubProvider::new(vec![]);
    let mut h = harness(provider);

    h.conductor
        .handle_event(
            inbound(
                "e1",
                "user.audio.transcript.partial",
                "S",
                json!({"text": "hel"}),
            ),
            &h.tx,
        )
        .await;
    h.conductor
        .handle_event(inbound("e2", "made.up.event", "S", json!({})), &h.tx)
        .await;

    assert!(
        tokio::time::timeout(Duration::from_millis(100), h.rx.recv())
            .await
            .is_err()
    );
    // Partials never reach history.
    let session = h.state.sessions.get("S").unwrap();
    assert_eq!(session.lock().history_len(), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History bound across many turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn history_stays_within_twice_max_turns() {
    let mut config = Config::default();
    config.limits.max_turns = 2;
    let script = (0..6)
        .map(|i| {
            let text = format!("reply {i}");
            Scripted::text(&text, &[text.as_str()])
        })
        .collect();
    let provider = StubProvider::new(script);
    let mut h = harness_with(provider, config);

    for i in 0..6 {
        h.conductor
            .handle_event(
                inbound(
                    &format!("e{i}"),
                    "user.audio.transcript.final",
                    "S",
                    json!({"text": format!("turn {i}")}),
                ),
                &h.tx,
            )
            .await;
        drain_until_idle(&mut h.rx).await;
    }

    let session = h.state.sessions.get("S").unwrap();
    assert!(session.lock().history_len() <= 4);
}
