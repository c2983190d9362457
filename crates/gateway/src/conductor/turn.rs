//! Turn execution: the loop that streams provider output, bridges tool
//! calls, and finalizes speech.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use vx_domain::trace::TraceEvent;
use vx_domain::turn::{ConversationTurn, ToolUseBlock};
use vx_protocol::{codes, tools, Envelope};
use vx_providers::GenerateRequest;
use vx_sessions::{PendingToolCall, SessionState};

use crate::state::AppState;

use super::bridge::ToolOutcome;
use super::Emitter;

/// Hard cap on provider invocations within one logical turn.
const MAX_PROVIDER_LOOPS: u32 = 24;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failure modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum TurnFailure {
    /// Reported to the client as an `error` envelope with this code,
    /// followed by the idle closer.
    Coded {
        code: &'static str,
        message: String,
    },
    /// The outbound channel is gone; nothing left to tell.
    ConnectionClosed,
    /// The session's last connection dropped mid-turn.
    Cancelled,
    /// Process-wide shutdown.
    Shutdown,
}

impl TurnFailure {
    fn provider(message: impl Into<String>) -> Self {
        Self::Coded {
            code: codes::MODEL_PROVIDER_FAILED,
            message: message.into(),
        }
    }

    fn conductor(message: impl Into<String>) -> Self {
        Self::Coded {
            code: codes::CONDUCTOR_ERROR,
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one conductor turn for a non-empty user transcript.
///
/// Holds the session's turn permit for the whole duration, so at most one
/// turn per session runs at any instant.
pub async fn run_turn(state: AppState, session_id: String, text: String, emitter: Emitter) {
    let permit = tokio::select! {
        p = state.turn_gate.acquire(&session_id) => p,
        () = state.shutdown.cancelled() => return,
    };
    let Ok(_permit) = permit else {
        return;
    };

    let cancel = state.cancel_map.register(&session_id);
    let result = run_turn_inner(&state, &session_id, &text, &emitter, &cancel).await;
    state.cancel_map.remove(&session_id);

    if let Err(failure) = result {
        fail_turn(&state, &session_id, &emitter, failure).await;
    }
}

/// Unwind a failed turn: clear its pending calls, then report the error
/// and return the client UI to neutral.
async fn fail_turn(state: &AppState, session_id: &str, emitter: &Emitter, failure: TurnFailure) {
    if let Some(entry) = state.sessions.get(session_id) {
        let cleared = entry.lock().clear_pending();
        if cleared > 0 {
            tracing::debug!(session_id = %session_id, cleared, "cleared pending tool calls");
        }
    }
    state.bridge.drop_session(session_id);

    match failure {
        TurnFailure::Coded { code, message } => {
            TraceEvent::TurnFailed {
                session_id: session_id.to_owned(),
                code: code.to_owned(),
            }
            .emit();
            let _ = emitter
                .send(Envelope::error(session_id, code, &message))
                .await;
            if let Some(entry) = state.sessions.get(session_id) {
                let _ = emit_ui_call(
                    &entry,
                    emitter,
                    session_id,
                    tools::CONVO_SET_STATE,
                    serde_json::json!({"state": "idle"}),
                )
                .await;
            }
        }
        TurnFailure::ConnectionClosed => {
            tracing::debug!(session_id = %session_id, "turn abandoned: connection closed");
        }
        TurnFailure::Cancelled => {
            tracing::info!(session_id = %session_id, "turn cancelled");
        }
        TurnFailure::Shutdown => {
            tracing::info!(session_id = %session_id, "turn aborted by shutdown");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The turn loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    session_id: &str,
    text: &str,
    emitter: &Emitter,
    cancel: &CancellationToken,
) -> Result<(), TurnFailure> {
    let (session, _) = state.sessions.get_or_create(session_id);

    let aux_credential = {
        let mut s = session.lock();
        // Unacked calls from previous turns age out here; a late
        // tool.result for one then yields no_pending_tool_call.
        let expired = s.expire_pending(Utc::now(), state.config.limits.pending_ttl_secs);
        if expired > 0 {
            tracing::debug!(session_id = %session_id, expired, "expired stale pending tool calls");
        }
        s.transcript_count += 1;
        s.reset_trace();
        s.record_trace("transcript.final");
        s.push_turn(ConversationTurn::user(text));
        TraceEvent::TurnStarted {
            session_id: session_id.to_owned(),
            transcript_count: s.transcript_count,
        }
        .emit();
        s.aux_credential.clone()
    };

    emit_ui_call(
        &session,
        emitter,
        session_id,
        tools::CONVO_SET_STATE,
        serde_json::json!({"state": "thinking"}),
    )
    .await?;
    emit_ui_call(
        &session,
        emitter,
        session_id,
        tools::CONVO_APPEND_MESSAGE,
        serde_json::json!({"role": "user", "text": text, "isPartial": false}),
    )
    .await?;

    // The accumulator persists across provider invocations of this logical
    // turn, so every partial stays a prefix of the eventual final.
    let mut response_text = String::new();
    let mut provider_calls: u32 = 0;

    loop {
        if provider_calls >= MAX_PROVIDER_LOOPS {
            return Err(TurnFailure::conductor(format!(
                "provider loop limit reached ({MAX_PROVIDER_LOOPS} calls)"
            )));
        }
        provider_calls += 1;

        // ── Provider call ──────────────────────────────────────────
        let request = GenerateRequest {
            history: session.lock().history_snapshot(),
            tools: state.config.tools.catalog.clone(),
            aux_credential: aux_credential.clone(),
        };

        let started = std::time::Instant::now();
        let response = tokio::select! {
            r = state.provider.generate_response(request) => r,
            () = cancel.cancelled() => return Err(TurnFailure::Cancelled),
            () = state.shutdown.cancelled() => return Err(TurnFailure::Shutdown),
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => return Err(TurnFailure::provider(e.to_string())),
        };

        TraceEvent::ProviderCall {
            provider: state.provider.name().to_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
            text_chars: response.full_text.len(),
            tool_use_blocks: response.tool_calls.len(),
        }
        .emit();
        session.lock().record_trace("provider.call");

        // ── Stream speech partials (cumulative text, not deltas) ───
        let mut chunks = response.chunks;
        loop {
            let maybe_chunk = tokio::select! {
                c = chunks.next() => c,
                () = cancel.cancelled() => return Err(TurnFailure::Cancelled),
                () = state.shutdown.cancelled() => return Err(TurnFailure::Shutdown),
            };
            let Some(chunk) = maybe_chunk else { break };
            response_text.push_str(&chunk);
            send(emitter, Envelope::speech_partial(session_id, &response_text)).await?;
        }

        // A provider with no usable chunk pass still owes us its text.
        if response_text.is_empty() && !response.full_text.is_empty() {
            response_text = response.full_text.clone();
        }

        // ── Tool bridging ──────────────────────────────────────────
        let usable = screen_tool_blocks(response.tool_calls, session_id, emitter).await?;
        if usable.is_empty() {
            break;
        }

        session
            .lock()
            .push_turn(ConversationTurn::tool_use(usable.clone()));

        let waits = emit_bridged_calls(state, &session, session_id, emitter, &usable).await?;

        // Suspend: all results must arrive (any order) before the provider
        // sees the extended history.
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(state.config.limits.pending_ttl_secs);
        for (provider_tool_use_id, call_id, rx) in waits {
            let outcome = tokio::select! {
                r = rx => r,
                () = tokio::time::sleep_until(deadline) => {
                    return Err(TurnFailure::conductor(format!(
                        "tool call {call_id} received no result within the TTL"
                    )));
                }
                () = cancel.cancelled() => return Err(TurnFailure::Cancelled),
                () = state.shutdown.cancelled() => return Err(TurnFailure::Shutdown),
            };
            let outcome: ToolOutcome = outcome.map_err(|_| {
                TurnFailure::conductor(format!("tool call {call_id} waiter dropped"))
            })?;

            let mut s = session.lock();
            s.push_turn(ConversationTurn::tool_result(
                provider_tool_use_id,
                outcome.content,
                outcome.is_error,
            ));
        }
        // Loop: re-invoke the provider and resume this same logical turn.
    }

    // ── Finalize ───────────────────────────────────────────────────
    let final_text = response_text.trim().to_owned();
    send(emitter, Envelope::speech_final(session_id, &final_text)).await?;
    {
        let mut s = session.lock();
        s.push_turn(ConversationTurn::assistant(final_text.clone()));
        s.record_trace("speech.final");
    }

    emit_ui_call(
        &session,
        emitter,
        session_id,
        tools::CONVO_APPEND_MESSAGE,
        serde_json::json!({"role": "assistant", "text": final_text, "isPartial": false}),
    )
    .await?;
    emit_ui_call(
        &session,
        emitter,
        session_id,
        tools::CONVO_SET_STATE,
        serde_json::json!({"state": "speaking"}),
    )
    .await?;
    emit_ui_call(
        &session,
        emitter,
        session_id,
        tools::TTS_SPEAK,
        serde_json::json!({"text": final_text}),
    )
    .await?;
    emit_ui_call(
        &session,
        emitter,
        session_id,
        tools::CONVO_SET_STATE,
        serde_json::json!({"state": "idle"}),
    )
    .await?;

    TraceEvent::TurnCompleted {
        session_id: session_id.to_owned(),
        provider_calls,
        trace: session.lock().trace_summary(),
    }
    .emit();

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drop tool-use blocks without a usable name, reporting each one.
async fn screen_tool_blocks(
    blocks: Vec<ToolUseBlock>,
    session_id: &str,
    emitter: &Emitter,
) -> Result<Vec<ToolUseBlock>, TurnFailure> {
    let mut usable = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.name.trim().is_empty() {
            send(
                emitter,
                Envelope::error(
                    session_id,
                    codes::INVALID_TOOL_CALL,
                    "provider produced a tool-use block without a usable name",
                ),
            )
            .await?;
            continue;
        }
        usable.push(block);
    }
    Ok(usable)
}

/// Emit one `tool.call` per block: fresh client call id, pending record
/// carrying the provider's tool_use id, and a registered bridge waiter.
async fn emit_bridged_calls(
    state: &AppState,
    session: &Arc<Mutex<SessionState>>,
    session_id: &str,
    emitter: &Emitter,
    blocks: &[ToolUseBlock],
) -> Result<Vec<(String, String, tokio::sync::oneshot::Receiver<ToolOutcome>)>, TurnFailure> {
    let mut waits = Vec::with_capacity(blocks.len());
    for block in blocks {
        let call_id = uuid::Uuid::new_v4().to_string();
        let rx = state.bridge.register(session_id, &call_id);
        {
            let mut s = session.lock();
            s.insert_pending(PendingToolCall {
                call_id: call_id.clone(),
                tool_name: block.name.clone(),
                emitted_at: Utc::now(),
                provider_tool_use_id: Some(block.id.clone()),
            });
            s.record_trace(format!("tool.call {}", block.name));
        }

        let arguments =
            serde_json::to_string(&block.input).unwrap_or_else(|_| "{}".to_owned());
        send(
            emitter,
            Envelope::tool_call(session_id, &call_id, &block.name, arguments),
        )
        .await?;

        TraceEvent::ToolCallBridged {
            session_id: session_id.to_owned(),
            call_id: call_id.clone(),
            tool_name: block.name.clone(),
        }
        .emit();

        waits.push((block.id.clone(), call_id, rx));
    }
    Ok(waits)
}

/// Emit a conductor-originated UI tool call (`convo.*` / `tts.*`). These
/// are recorded pending like any `tool.call`, but carry no provider id
/// and no waiter — a client ack simply clears the entry.
async fn emit_ui_call(
    session: &Arc<Mutex<SessionState>>,
    emitter: &Emitter,
    session_id: &str,
    name: &str,
    args: serde_json::Value,
) -> Result<(), TurnFailure> {
    let call_id = uuid::Uuid::new_v4().to_string();
    {
        let mut s = session.lock();
        s.insert_pending(PendingToolCall {
            call_id: call_id.clone(),
            tool_name: name.to_owned(),
            emitted_at: Utc::now(),
            provider_tool_use_id: None,
        });
        s.record_trace(name);
    }
    send(
        emitter,
        Envelope::tool_call(session_id, &call_id, name, args.to_string()),
    )
    .await
}

async fn send(emitter: &Emitter, env: Envelope) -> Result<(), TurnFailure> {
    emitter
        .send(env)
        .await
        .map_err(|_| TurnFailure::ConnectionClosed)
}
