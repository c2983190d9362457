//! The conductor: a reducer over inbound envelopes.
//!
//! Flow for one user turn:
//! 1. `user.audio.transcript.final` starts a turn task (serialized per
//!    session by the turn gate).
//! 2. The turn streams provider output as cumulative speech partials.
//! 3. Model tool-use blocks are bridged to the client as `tool.call`
//!    envelopes; the turn suspends on the bridge.
//! 4. Inbound `tool.result` envelopes resolve pending calls and wake the
//!    turn, which re-invokes the provider with the extended history.
//! 5. A response without tool use finalizes the turn: speech final plus
//!    the closing UI tool-call chain.

pub mod bridge;
pub mod cancel;
pub mod turn;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use vx_domain::trace::TraceEvent;
use vx_protocol::{codes, Envelope, EventKind};
use vx_sessions::SessionState;

use crate::state::AppState;

use bridge::ToolOutcome;

/// Outbound envelope sink. One per connection; emission order is delivery
/// order.
pub type Emitter = mpsc::Sender<Envelope>;

pub struct Conductor {
    state: AppState,
}

impl Conductor {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Reduce one validated inbound envelope.
    pub async fn handle_event(&self, env: Envelope, emitter: &Emitter) {
        let (session, _) = self.state.sessions.get_or_create(&env.session_id);

        // Dedup before any side effect: reconnecting clients replay.
        if session.lock().seen_ids.check_and_insert(&env.id) {
            tracing::debug!(
                event_id = %env.id,
                session_id = %env.session_id,
                "dropping duplicate inbound event"
            );
            return;
        }

        match EventKind::classify(&env.event_type) {
            EventKind::SessionStart => self.on_session_start(&env, &session, emitter).await,
            EventKind::TranscriptFinal => self.on_transcript_final(&env, emitter).await,
            EventKind::ToolResult => self.on_tool_result(&env, &session, emitter).await,
            EventKind::AudioInterrupted => {
                let reason = env.payload_str("reason").unwrap_or("unspecified");
                tracing::info!(
                    session_id = %env.session_id,
                    reason = %reason,
                    "audio output interrupted"
                );
            }
            EventKind::TranscriptPartial => {
                // UI signal only; never reaches history.
                tracing::debug!(session_id = %env.session_id, "transcript partial ignored");
            }
            EventKind::Unknown => {
                tracing::debug!(
                    session_id = %env.session_id,
                    event_type = %env.event_type,
                    "ignoring unknown event type"
                );
            }
        }
    }

    async fn on_session_start(
        &self,
        env: &Envelope,
        session: &Arc<Mutex<SessionState>>,
        emitter: &Emitter,
    ) {
        if let Some(token) = env.payload_str("authToken") {
            session.lock().aux_credential = Some(token.to_owned());
        }
        emit(emitter, Envelope::session_started(&env.session_id)).await;
    }

    async fn on_transcript_final(&self, env: &Envelope, emitter: &Emitter) {
        let Some(text) = env.payload_str("text") else {
            emit(
                emitter,
                Envelope::error(
                    &env.session_id,
                    codes::INVALID_TRANSCRIPT,
                    "transcript.final requires non-empty text",
                ),
            )
            .await;
            return;
        };

        // The turn runs in its own task so this read path stays free to
        // deliver tool.result envelopes while the turn is suspended.
        tokio::spawn(turn::run_turn(
            self.state.clone(),
            env.session_id.clone(),
            text.to_owned(),
            emitter.clone(),
        ));
    }

    async fn on_tool_result(
        &self,
        env: &Envelope,
        session: &Arc<Mutex<SessionState>>,
        emitter: &Emitter,
    ) {
        let Some(call_id) = env.payload_str("callId") else {
            emit(
                emitter,
                Envelope::error(
                    &env.session_id,
                    codes::NO_PENDING_TOOL_CALL,
                    "tool.result without a callId",
                ),
            )
            .await;
            return;
        };

        let pending = session.lock().remove_pending(call_id);
        let Some(pending) = pending else {
            emit(
                emitter,
                Envelope::error(
                    &env.session_id,
                    codes::NO_PENDING_TOOL_CALL,
                    &format!("no pending tool call for callId {call_id}"),
                ),
            )
            .await;
            return;
        };

        // Exactly one of result/error is non-null; both-null is an empty
        // success.
        let error = env.payload_opt_str("error");
        let is_error = error.is_some();
        let content = env
            .payload_opt_str("result")
            .or(error)
            .unwrap_or("{}")
            .to_owned();

        TraceEvent::ToolResultResolved {
            session_id: env.session_id.clone(),
            call_id: call_id.to_owned(),
            is_error,
        }
        .emit();
        session
            .lock()
            .record_trace(format!("tool.result {}", pending.tool_name));

        // UI-chain calls carry no provider id and no waiter; the ack has
        // already cleared the entry.
        if pending.provider_tool_use_id.is_some() {
            let delivered =
                self.state
                    .bridge
                    .complete(&env.session_id, call_id, ToolOutcome { content, is_error });
            if !delivered {
                tracing::warn!(
                    call_id = %call_id,
                    session_id = %env.session_id,
                    "resolved tool call had no suspended turn"
                );
            }
        }
    }
}

pub(crate) async fn emit(emitter: &Emitter, env: Envelope) {
    if emitter.send(env).await.is_err() {
        tracing::debug!("outbound channel closed; dropping envelope");
    }
}
